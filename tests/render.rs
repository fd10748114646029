use std::cell::RefCell;
use std::rc::Rc;

use quill::{value, Context, Engine, Escape, Spaceless, Value};

#[test]
fn render_raw_is_identity() {
    let source = "lorem ipsum\n  dolor { sit } 50% #amet\n";
    let result = Engine::new()
        .compile(source)
        .unwrap()
        .render(&mut Context::new())
        .unwrap();
    assert_eq!(result, source);
}

#[test]
fn render_inline_expr_scalars() {
    let mut ctx = Context::new();
    ctx.set("b", true);
    ctx.set("i", -42);
    ctx.set("s", "dolor");
    let result = Engine::new()
        .compile("{{ b }} {{ i }} {{ s }} {{ 7 }} {{ -3 }} {{ 'a\\tb' }}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "true -42 dolor 7 -3 a\tb");
}

#[test]
fn render_inline_expr_path() {
    let mut ctx = Context::new();
    ctx.set(
        "users",
        value!([
            { name: "John", roles: ["admin"] },
            { name: "Jane", roles: ["dev", "ops"] },
        ]),
    );
    let result = Engine::new()
        .compile("{{ users.1.name }} {{ users.1.roles.1 }} {{ users.0.roles.0 }}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "Jane ops admin");
}

#[test]
fn render_missing_lookups_are_empty() {
    let mut ctx = Context::new();
    ctx.set("user", value! { name: "John" });
    ctx.set("list", vec![1]);
    let result = Engine::new()
        .compile("[{{ nobody }}][{{ user.age }}][{{ user.name.first }}][{{ list.3 }}]")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "[][][][]");
}

#[test]
fn render_callables() {
    let mut ctx = Context::new();
    ctx.set(
        "greet",
        Value::callable(|args| {
            let who = args.first().map(Value::to_string).unwrap_or_default();
            Value::from(format!("hi {who}"))
        }),
    );
    let user = quill::TemplateStruct::alloc();
    user.set("age", Value::callable(|_| Value::from(31)));
    ctx.set("user", user);
    let result = Engine::new()
        .compile("{{ greet('bob') }}|{{ greet }}|{{ user.age }}|{{ user.age('x') }}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "hi bob|hi |31|31");
}

#[test]
fn render_if_elif_else() {
    let engine = Engine::new();
    let template = engine
        .compile("{% if x == 1 %}a{% elif x == 2 %}b{% else %}c{% endif %}")
        .unwrap();
    for (x, expected) in [(1, "a"), (2, "b"), (3, "c")] {
        let mut ctx = Context::new();
        ctx.set("x", x);
        assert_eq!(template.render(&mut ctx).unwrap(), expected);
    }
}

#[test]
fn render_if_logic() {
    let mut ctx = Context::new();
    ctx.set("t", true);
    ctx.set("f", false);
    let result = Engine::new()
        .compile(
            "{% if t and not f %}1{% endif %}\
             {% if f or t %}2{% endif %}\
             {% if not (t and f) %}3{% endif %}\
             {% if f and missing.x %}4{% endif %}",
        )
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "123");
}

#[test]
fn render_if_compare() {
    let mut ctx = Context::new();
    ctx.set("n", 10);
    let result = Engine::new()
        .compile(
            "{% if n > 9 %}a{% endif %}\
             {% if '10' > '9' %}b{% endif %}\
             {% if n >= 10 and n <= 10 %}c{% endif %}\
             {% if missing < 1 %}d{% endif %}\
             {% if missing >= 1 %}e{% endif %}\
             {% if missing != 1 %}f{% endif %}\
             {% if missing == missing %}g{% endif %}\
             {% if n == '10' %}h{% endif %}",
        )
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "acfh");
}

#[test]
fn render_for_loop() {
    let mut ctx = Context::new();
    ctx.set("xs", vec![1, 2, 3]);
    let result = Engine::new()
        .compile("{% for x in xs %}{{ x }}{% endfor %}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "123");
}

#[test]
fn render_for_loop_reversed() {
    let mut ctx = Context::new();
    ctx.set("xs", vec![1, 2, 3]);
    let result = Engine::new()
        .compile("{% for x in xs reversed %}{{ x }}{% endfor %}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "321");
}

#[test]
fn render_for_loop_empty() {
    let engine = Engine::new();
    let template = engine
        .compile("{% for x in xs %}{{ x }}{% empty %}nothing{% endfor %}")
        .unwrap();

    let mut ctx = Context::new();
    ctx.set("xs", Vec::<i64>::new());
    assert_eq!(template.render(&mut ctx).unwrap(), "nothing");

    let mut ctx = Context::new();
    assert_eq!(template.render(&mut ctx).unwrap(), "nothing");
}

#[test]
fn render_for_loop_single_value() {
    let mut ctx = Context::new();
    ctx.set("s", "abc");
    let result = Engine::new()
        .compile("{% for x in s %}[{{ x }}]{% endfor %}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "[abc]");
}

#[test]
fn render_for_loop_vars() {
    let mut ctx = Context::new();
    ctx.set("xs", vec!["a", "b"]);
    let result = Engine::new()
        .compile(
            "{% for x in xs %}{{ forloop.counter }}{{ forloop.counter0 }}{{ forloop.index }}\
             {{ forloop.revcounter }}{{ forloop.revcounter0 }}\
             {{ forloop.first }}-{{ forloop.last }}|{% endfor %}",
        )
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "10021true-false|21110false-true|");
}

#[test]
fn render_for_loop_parentloop() {
    let mut ctx = Context::new();
    ctx.set("xs", vec![1, 2]);
    let result = Engine::new()
        .compile(
            "{% for a in xs %}{% for b in xs %}\
             {{ forloop.parentloop.counter }}{{ forloop.counter }} \
             {% endfor %}{% endfor %}{{ forloop.counter }}",
        )
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "11 12 21 22 ");
}

#[test]
fn render_for_loop_scope_is_popped() {
    let mut ctx = Context::new();
    ctx.set("x", "outer");
    ctx.set("xs", vec![1, 2]);
    let result = Engine::new()
        .compile("{% for x in xs %}{% set y=x %}{% endfor %}{{ x }}{{ y }}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "outer");
}

#[test]
fn render_standalone_tag_lines_are_removed() {
    let mut ctx = Context::new();
    ctx.set("xs", vec![1, 2, 3]);
    let result = Engine::new()
        .compile("<ul>\n  {% for x in xs %}\n  <li>{{ x }}</li>\n  {% endfor %}\n</ul>\n{# note #}\n")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "<ul>\n  <li>1</li>\n  <li>2</li>\n  <li>3</li>\n</ul>\n");
}

#[test]
fn render_comment() {
    let result = Engine::new()
        .compile("lorem {# ipsum {{ dolor }} #}sit")
        .unwrap()
        .render(&mut Context::new())
        .unwrap();
    assert_eq!(result, "lorem sit");
}

#[test]
fn render_with() {
    let mut ctx = Context::new();
    ctx.set("user", value! { name: "John" });
    let result = Engine::new()
        .compile("{% with a=1 name=user.name %}{{ a }}{{ name }}{% endwith %}[{{ a }}]")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "1John[]");
}

#[test]
fn render_set() {
    let result = Engine::new()
        .compile("{% set n=5 %}{{ n }}{% set n='x' %}{{ n }}")
        .unwrap()
        .render(&mut Context::new())
        .unwrap();
    assert_eq!(result, "5x");
}

#[test]
fn render_cycle() {
    let mut ctx = Context::new();
    ctx.set("xs", vec![1, 2, 3]);
    let result = Engine::new()
        .compile(
            "{% for x in xs %}{% cycle 'odd' 'even' %}/{% cycle 'a', 'b', 'c' %} {% endfor %}",
        )
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "odd/a even/b odd/c ");
}

#[test]
fn render_cycle_restarts_each_render() {
    let engine = Engine::new();
    let template = engine.compile("{% cycle 1 2 %}{% cycle 3 4 %}").unwrap();
    assert_eq!(template.render(&mut Context::new()).unwrap(), "13");
    assert_eq!(template.render(&mut Context::new()).unwrap(), "13");
}

struct Collapse {
    resets: Rc<RefCell<usize>>,
}

impl Spaceless for Collapse {
    fn remove(&mut self, text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn reset(&mut self) {
        *self.resets.borrow_mut() += 1;
    }
}

#[test]
fn render_spaceless() {
    let resets = Rc::new(RefCell::new(0));
    let mut ctx = Context::new();
    ctx.set_spaceless_policy(Box::new(Collapse {
        resets: resets.clone(),
    }));
    ctx.set("x", "b");
    let result = Engine::new()
        .compile("{% spaceless %}  a \n  {{ x }}  {% endspaceless %}|")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "a b|");
    assert_eq!(*resets.borrow(), 1);
}

#[test]
fn render_spaceless_without_policy() {
    let result = Engine::new()
        .compile("{% spaceless %} a  b {% endspaceless %}")
        .unwrap()
        .render(&mut Context::new())
        .unwrap();
    assert_eq!(result, " a  b ");
}

struct Html {
    tabbing: Rc<RefCell<Vec<bool>>>,
}

impl Escape for Html {
    fn escape(&mut self, text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    }

    fn enable_tabbing(&mut self, enable: bool) {
        self.tabbing.borrow_mut().push(enable);
    }
}

fn html_context() -> (Context, Rc<RefCell<Vec<bool>>>) {
    let tabbing = Rc::new(RefCell::new(Vec::new()));
    let mut ctx = Context::new();
    ctx.set_escape_policy(
        "html",
        Box::new(Html {
            tabbing: tabbing.clone(),
        }),
    );
    ctx.select_escape_policy("html");
    (ctx, tabbing)
}

#[test]
fn render_escape_policy() {
    let (mut ctx, _) = html_context();
    ctx.set("s", "<b>");
    ctx.set("r", Value::raw_string("<i>"));
    let result = Engine::new()
        .compile("<p>{{ s }}{{ s|raw }}{{ r }}{{ s|upper }}</p>")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "<p>&lt;b&gt;<b><i>&lt;B&gt;</p>");
}

#[test]
fn render_tabbing() {
    let (mut ctx, tabbing) = html_context();
    let result = Engine::new()
        .compile("{% tabbing %}x{% endtabbing %}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "x");
    assert_eq!(*tabbing.borrow(), [true, false]);
}

#[test]
fn render_tabbing_nested() {
    let (mut ctx, tabbing) = html_context();
    let result = Engine::new()
        .compile("{% tabbing %}a{% tabbing %}b{% endtabbing %}c{% endtabbing %}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "abc");
    assert_eq!(*tabbing.borrow(), [true, false]);
}

#[test]
fn render_msg_is_not_written() {
    let mut ctx = Context::new();
    ctx.set("x", 1);
    let result = Engine::new()
        .compile("a{% msg %}processing {{ x }}{% endmsg %}b")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "ab");
}

#[test]
fn render_markers() {
    let mut ctx = Context::new();
    ctx.set("xs", vec!["a", "b"]);
    let result = Engine::new()
        .compile("{% markers item in xs with '<@0|@1|@5|@x>' %}[{{ item }}]{% endmarkers %}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "<[a]|[b]||@x>");
}

#[test]
fn render_markers_repeated_index() {
    let mut ctx = Context::new();
    ctx.set("args", vec!["x"]);
    ctx.set("pattern", "f(@0, @0)");
    let result = Engine::new()
        .compile("{% markers a in args with pattern %}{{ a }}{% endmarkers %}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "f(x, x)");
}

#[test]
fn render_recursetree() {
    let mut ctx = Context::new();
    ctx.set(
        "tree",
        value!([
            { name: "a", children: [{ name: "b", children: [] }] },
            { name: "c" },
        ]),
    );
    let result = Engine::new()
        .compile("{% recursetree tree %}({{ node.name }}{{ children }}){% endrecursetree %}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "(a(b))(c)");
}

#[test]
fn render_recursetree_single_struct() {
    let mut ctx = Context::new();
    ctx.set("root", value! { name: "r", children: [{ name: "leaf" }] });
    let result = Engine::new()
        .compile("{% recursetree root %}<{{ node.name }}{{ children }}>{% endrecursetree %}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "<r<leaf>>");
}

#[test]
fn render_range() {
    let engine = Engine::new();
    let cases = [
        ("{% range i from 1 to 3 %}{{ i }}{% endrange %}", "123"),
        ("{% range i from 1 to 6 step 2 %}{{ i }}{% endrange %}", "135"),
        ("{% range i from 3 downto 1 %}{{ i }}{% endrange %}", "321"),
        ("{% range i from 10 downto 0 step 5 %}{{ i }},{% endrange %}", "10,5,0,"),
        ("{% range i from 3 to 1 %}{{ i }}{% endrange %}", ""),
        ("{% range i from 1 to 3 step 0 %}{{ i }}{% endrange %}", ""),
        ("{% range i from -1 to 1 %}{{ i }}{% endrange %}", "-101"),
        (
            "{% range i from 1 to 2 %}{{ forloop.counter }}{{ forloop.last }}{% endrange %}",
            "1false2true",
        ),
    ];
    for (source, expected) in cases {
        let result = engine
            .compile(source)
            .unwrap()
            .render(&mut Context::new())
            .unwrap();
        assert_eq!(result, expected, "{source}");
    }
}

#[test]
fn render_to_writer() {
    let mut ctx = Context::new();
    ctx.set("name", "John");
    let mut buf = Vec::new();
    Engine::new()
        .compile("Hello {{ name }}!")
        .unwrap()
        .render_to_writer(&mut buf, &mut ctx)
        .unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), "Hello John!");
}

#[test]
fn render_error_leaves_context_balanced() {
    let engine = Engine::new();
    let mut ctx = Context::new();
    ctx.set("xs", vec![1]);
    engine
        .compile("{% for x in xs %}{% with y=1 %}{% create 'a' from 'b' %}{% endwith %}{% endfor %}")
        .unwrap()
        .render(&mut ctx)
        .unwrap_err();
    let result = engine
        .compile("[{{ x }}{{ y }}{{ forloop.counter }}]{{ xs.0 }}")
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "[]1");
}
