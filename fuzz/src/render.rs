#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde::Serialize;

#[derive(Debug, Serialize, Arbitrary)]
enum Value {
    None,
    Bool(bool),
    Integer(i64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

fuzz_target!(|data: (&str, Vec<(&str, &str)>, BTreeMap<String, Value>)| {
    let (root, includes, globals) = data;
    let mut engine = quill::Engine::new();
    if engine.add_template("fuzz", root).is_err() {
        return;
    }
    for (name, source) in includes {
        let _ = engine.add_template(name, source);
    }
    let mut ctx = match quill::Context::from_serialize(&globals) {
        Ok(ctx) => ctx,
        Err(_) => return,
    };
    if let Ok(template) = engine.load_by_name("fuzz", None) {
        let _ = template.render(&mut ctx);
    }
});
