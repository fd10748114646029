use std::fs;

use quill::{Context, Engine, ErrorKind, Escape, Frame};

#[test]
fn engine_add_template_and_load() {
    let mut engine = Engine::new();
    engine.add_template("hello", "Hello {{ name }}!").unwrap();

    let mut ctx = Context::new();
    ctx.set("name", "World");
    let template = engine.load_by_name("hello", None).unwrap();
    assert_eq!(template.name(), Some("hello"));
    assert_eq!(template.source(), "Hello {{ name }}!");
    assert_eq!(template.render(&mut ctx).unwrap(), "Hello World!");
}

#[test]
fn engine_add_template_syntax_error() {
    let mut engine = Engine::new();
    let err = engine
        .add_template("bad", "lorem\n{% if x %}")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.template_name(), Some("bad"));
    assert_eq!(err.line(), Some(2));
    assert!(!engine.is_cached("bad"));
}

#[test]
fn engine_compile_is_anonymous() {
    let engine = Engine::new();
    let template = engine.compile("lorem").unwrap();
    assert_eq!(template.name(), None);
    assert!(!engine.is_cached(""));
}

#[test]
fn engine_names_are_normalized() {
    let mut engine = Engine::new();
    engine.add_template("a/./b/../c.html", "ok").unwrap();
    assert!(engine.is_cached("a/c.html"));
    let result = engine
        .load_by_name("a\\c.html", None)
        .unwrap()
        .render(&mut Context::new())
        .unwrap();
    assert_eq!(result, "ok");
}

#[test]
fn engine_load_missing_template() {
    let engine = Engine::new();
    let err = engine.load_by_name("nope.html", Some(7)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert_eq!(err.line(), Some(7));
    assert_eq!(err.to_string(), "line 7: template `nope.html` not found");
}

#[test]
fn engine_template_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("partials")).unwrap();
    fs::write(dir.path().join("page.html"), "<{% include 'partials/nav.html' %}>").unwrap();
    fs::write(dir.path().join("partials/nav.html"), "nav").unwrap();

    let mut engine = Engine::new();
    engine.set_template_dir(dir.path());
    assert_eq!(engine.template_dir(), Some(dir.path()));

    let result = engine
        .load_by_name("partials/../page.html", None)
        .unwrap()
        .render(&mut Context::new())
        .unwrap();
    assert_eq!(result, "<nav>");
    assert!(engine.is_cached("page.html"));
    assert!(engine.is_cached("partials/nav.html"));
}

#[test]
fn engine_added_templates_take_priority() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.html"), "from disk").unwrap();

    let mut engine = Engine::new();
    engine.set_template_dir(dir.path());
    engine.add_template("a.html", "from memory").unwrap();
    let result = engine
        .load_by_name("a.html", None)
        .unwrap()
        .render(&mut Context::new())
        .unwrap();
    assert_eq!(result, "from memory");

    engine.remove_template("a.html");
    let result = engine
        .load_by_name("a.html", None)
        .unwrap()
        .render(&mut Context::new())
        .unwrap();
    assert_eq!(result, "from disk");
}

#[test]
fn engine_evict_unused() {
    let mut engine = Engine::new();
    engine.add_template("a", "A").unwrap();
    engine.add_template("b", "B").unwrap();

    let a = engine.load_by_name("a", None).unwrap();
    let a2 = a.clone();
    assert_eq!(engine.evict_unused(), 1);
    assert!(engine.is_cached("a"));
    assert!(!engine.is_cached("b"));

    drop(a);
    assert_eq!(engine.evict_unused(), 0);
    engine.unload(a2);
    assert_eq!(engine.evict_unused(), 1);
    assert!(!engine.is_cached("a"));

    // evicted templates are recompiled from their source
    let result = engine
        .load_by_name("b", None)
        .unwrap()
        .render(&mut Context::new())
        .unwrap();
    assert_eq!(result, "B");
}

#[test]
fn engine_include() {
    let mut engine = Engine::new();
    engine
        .add_template("item", "<li>{{ label }}{{ suffix }}</li>")
        .unwrap();
    engine
        .add_template(
            "list",
            "{% for x in xs %}{% include 'item' with label=x, suffix='!' %}{% endfor %}{{ label }}",
        )
        .unwrap();

    let mut ctx = Context::new();
    ctx.set("xs", vec!["a", "b"]);
    let result = engine
        .load_by_name("list", None)
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "<li>a!</li><li>b!</li>");
}

#[test]
fn engine_include_sees_enclosing_scopes() {
    let mut engine = Engine::new();
    engine.add_template("inner", "{{ outer }}{{ forloop.counter }}").unwrap();
    engine
        .add_template("outer", "{% for x in xs %}{% include 'inner' %}{% endfor %}")
        .unwrap();

    let mut ctx = Context::new();
    ctx.set("outer", "o");
    ctx.set("xs", vec![1, 2]);
    let result = engine
        .load_by_name("outer", None)
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "o1o2");
}

#[test]
fn engine_include_dynamic_name() {
    let mut engine = Engine::new();
    engine.add_template("en", "hello").unwrap();
    engine.add_template("fr", "bonjour").unwrap();
    let template = engine.compile("{% include lang %}").unwrap();

    let mut ctx = Context::new();
    ctx.set("lang", "fr");
    assert_eq!(template.render(&mut ctx).unwrap(), "bonjour");
}

#[test]
fn engine_include_missing_template() {
    let mut engine = Engine::new();
    engine
        .add_template("outer", "lorem\n{% include 'inner' %}")
        .unwrap();
    engine
        .add_template("inner", "ipsum\n\n{% include 'nope' %}")
        .unwrap();

    let err = engine
        .load_by_name("outer", None)
        .unwrap()
        .render(&mut Context::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert_eq!(err.template_name(), Some("inner"));
    assert_eq!(err.line(), Some(3));
    assert_eq!(
        err.chain(),
        [Frame {
            name: "outer".into(),
            line: 2
        }]
    );
    assert_eq!(
        err.to_string(),
        "inner:3: template `nope` not found\n  included from outer:2"
    );
}

#[test]
fn engine_include_syntax_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bad.html"), "\n{% nope %}").unwrap();

    let mut engine = Engine::new();
    engine.set_template_dir(dir.path());
    engine.add_template("outer", "{% include 'bad.html' %}").unwrap();

    let err = engine
        .load_by_name("outer", None)
        .unwrap()
        .render(&mut Context::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(
        err.to_string(),
        "bad.html:2: unknown tag `nope`\n  included from outer:1"
    );
}

#[test]
fn engine_max_include_depth() {
    let mut engine = Engine::new();
    engine.set_max_include_depth(3);
    engine.add_template("loop", "x{% include 'loop' %}").unwrap();

    let err = engine
        .load_by_name("loop", None)
        .unwrap()
        .render(&mut Context::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
    assert_eq!(err.message(), "reached maximum include depth (3)");
    assert_eq!(err.template_name(), Some("loop"));
    assert_eq!(err.chain().len(), 3);
}

struct Html;

impl Escape for Html {
    fn escape(&mut self, text: &str) -> String {
        text.replace('<', "&lt;").replace('>', "&gt;")
    }
}

#[test]
fn engine_create() {
    let out = tempfile::tempdir().unwrap();

    let mut engine = Engine::new();
    engine.add_template("page", "<h1>{{ title }}</h1>\n").unwrap();
    let template = engine
        .compile(
            "{% for p in pages %}{% with title=p %}\
             {% create p|prepend: 'site/'|append: '.html' from 'page' %}\
             {% endwith %}{% endfor %}{{ '<done>' }}",
        )
        .unwrap();

    let mut ctx = Context::new();
    ctx.set_output_directory(out.path());
    ctx.set_escape_policy(".HTML", Box::new(Html));
    ctx.set("pages", vec!["<a>", "b"]);
    assert_eq!(template.render(&mut ctx).unwrap(), "<done>");

    let a = fs::read_to_string(out.path().join("site/<a>.html")).unwrap();
    assert_eq!(a, "<h1>&lt;a&gt;</h1>\n");
    let b = fs::read_to_string(out.path().join("site/b.html")).unwrap();
    assert_eq!(b, "<h1>b</h1>\n");
}

#[cfg(unix)]
#[test]
fn engine_create_stays_under_output_directory() {
    let out = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let absolute = other.path().join("abs.txt");

    let mut engine = Engine::new();
    engine.add_template("page", "x").unwrap();
    let template = engine
        .compile(
            "{% create absolute from 'page' %}\
             {% create '../up.txt' from 'page' %}\
             {% create 'a/../../b/./c.txt' from 'page' %}",
        )
        .unwrap();

    let mut ctx = Context::new();
    ctx.set_output_directory(out.path());
    ctx.set("absolute", absolute.to_str().unwrap());
    template.render(&mut ctx).unwrap();

    assert!(!absolute.exists());
    assert_eq!(fs::read_dir(other.path()).unwrap().count(), 0);
    let nested = out.path().join(absolute.strip_prefix("/").unwrap());
    assert_eq!(fs::read_to_string(nested).unwrap(), "x");
    assert_eq!(fs::read_to_string(out.path().join("up.txt")).unwrap(), "x");
    assert_eq!(fs::read_to_string(out.path().join("b/c.txt")).unwrap(), "x");
}

#[test]
fn engine_create_without_output_directory() {
    let mut engine = Engine::new();
    engine.add_template("page", "x").unwrap();
    engine
        .add_template("main", "lorem\n{% create 'a.txt' from 'page' %}")
        .unwrap();

    let err = engine
        .load_by_name("main", None)
        .unwrap()
        .render(&mut Context::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
    assert_eq!(
        err.to_string(),
        "main:2: cannot create `a.txt`, no output directory set"
    );
}

#[test]
fn engine_custom_filter() {
    let mut engine = Engine::new();
    engine.add_filter("shout", quill::Arity::None, |v, _| {
        quill::Value::from(format!("{}!", v.to_string().to_uppercase()))
    });
    let mut ctx = Context::new();
    ctx.set("s", "hey");
    let result = engine
        .compile("{{ s|shout|lower }}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "hey!");
}

#[test]
fn engine_render_from_serialize() {
    #[derive(serde::Serialize)]
    struct Data {
        items: Vec<Item>,
    }

    #[derive(serde::Serialize)]
    struct Item {
        name: &'static str,
        price: u32,
    }

    let data = Data {
        items: vec![
            Item {
                name: "apple",
                price: 3,
            },
            Item {
                name: "pear",
                price: 4,
            },
        ],
    };
    let result = Engine::new()
        .compile("{% for i in items %}{{ i.name }}={{ i.price }};{% endfor %}")
        .unwrap()
        .render_from(&data)
        .unwrap();
    assert_eq!(result, "apple=3;pear=4;");
}
