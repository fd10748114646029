use quill::{Context, Engine, ErrorKind};

fn engine() -> Engine {
    let mut engine = Engine::new();
    engine
        .add_template(
            "base",
            "<title>{% block title %}Site{% endblock %}</title>\
             <main>{% block body %}empty{% endblock body %}</main>",
        )
        .unwrap();
    engine
        .add_template(
            "page",
            "{% extend 'base' %}\
             {% block title %}{{ block.super }} | Page{% endblock %}\
             {% block body %}[{% block content %}page{% endblock %}]{% endblock %}",
        )
        .unwrap();
    engine
        .add_template(
            "article",
            "{% set author='ann' %}\
             {% extend 'page' %}\
             ignored text\
             {% block content %}{{ block.super }} by {{ author }}{% endblock %}",
        )
        .unwrap();
    engine
}

fn render(engine: &Engine, name: &str) -> String {
    engine
        .load_by_name(name, None)
        .unwrap()
        .render(&mut Context::new())
        .unwrap()
}

#[test]
fn inherit_base_renders_defaults() {
    let engine = engine();
    assert_eq!(
        render(&engine, "base"),
        "<title>Site</title><main>empty</main>"
    );
}

#[test]
fn inherit_override_and_super() {
    let engine = engine();
    assert_eq!(
        render(&engine, "page"),
        "<title>Site | Page</title><main>[page]</main>"
    );
}

#[test]
fn inherit_three_levels() {
    let engine = engine();
    assert_eq!(
        render(&engine, "article"),
        "<title>Site | Page</title><main>[page by ann]</main>"
    );
}

#[test]
fn inherit_super_outside_override_is_empty() {
    let mut engine = Engine::new();
    engine
        .add_template("base", "{% block a %}[{{ block.super }}]{% endblock %}")
        .unwrap();
    assert_eq!(render(&engine, "base"), "[]");
}

#[test]
fn inherit_block_missing_from_child_uses_parent() {
    let mut engine = Engine::new();
    engine
        .add_template("base", "{% block a %}A{% endblock %}{% block b %}B{% endblock %}")
        .unwrap();
    engine
        .add_template("child", "{% extend 'base' %}{% block b %}b{% endblock %}")
        .unwrap();
    assert_eq!(render(&engine, "child"), "Ab");
}

#[test]
fn inherit_child_sees_context() {
    let mut engine = Engine::new();
    engine
        .add_template("base", "{% for x in xs %}{% block item %}{% endblock %}{% endfor %}")
        .unwrap();
    engine
        .add_template(
            "child",
            "{% extend 'base' %}{% block item %}{{ x }}{{ forloop.last }};{% endblock %}",
        )
        .unwrap();

    let mut ctx = Context::new();
    ctx.set("xs", vec![1, 2]);
    let result = engine
        .load_by_name("child", None)
        .unwrap()
        .render(&mut ctx)
        .unwrap();
    assert_eq!(result, "1false;2true;");
}

#[test]
fn inherit_dynamic_base() {
    let mut engine = Engine::new();
    engine.add_template("light", "light:{% block c %}{% endblock %}").unwrap();
    engine.add_template("dark", "dark:{% block c %}{% endblock %}").unwrap();
    let template = engine
        .compile("{% extend theme %}{% block c %}x{% endblock %}")
        .unwrap();

    let mut ctx = Context::new();
    ctx.set("theme", "dark");
    assert_eq!(template.render(&mut ctx).unwrap(), "dark:x");
}

#[test]
fn inherit_missing_base() {
    let engine = Engine::new();
    let err = engine
        .compile("lorem\n{% extend 'nope' %}")
        .unwrap()
        .render(&mut Context::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert_eq!(err.to_string(), "line 2: template `nope` not found");
}

#[test]
fn inherit_duplicate_block() {
    let err = Engine::new()
        .compile("{% block a %}{% endblock %}{% block a %}{% endblock %}")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.message(), "block `a` is defined more than once");
}

#[test]
fn inherit_extend_twice() {
    let err = Engine::new()
        .compile("{% extend 'a' %}{% extend 'b' %}")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(
        err.message(),
        "a template can only extend one other template"
    );
}

#[test]
fn inherit_self_extend_hits_max_depth() {
    let mut engine = Engine::new();
    engine.set_max_include_depth(4);
    engine
        .add_template("self", "{% extend 'self' %}{% block a %}{% endblock %}")
        .unwrap();
    let err = engine
        .load_by_name("self", None)
        .unwrap()
        .render(&mut Context::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
    assert_eq!(err.chain().len(), 4);
}
