use std::collections::BTreeMap;

use similar_asserts::assert_eq;

use stencil::{Environment, Error, ErrorKind};

#[test]
fn test_add_get_remove() {
    let mut env = Environment::new();
    env.add_template("hello.html", "Hello <%= name %>!").unwrap();
    let template = env.get_template("hello.html").unwrap();
    assert_eq!(template.name(), "hello.html");

    let mut ctx = BTreeMap::new();
    ctx.insert("name", "World");
    assert_eq!(template.render(&ctx).unwrap(), "Hello World!");

    env.remove_template("hello.html");
    assert_eq!(
        env.get_template("hello.html").unwrap_err().kind(),
        ErrorKind::TemplateNotFound
    );
}

#[test]
fn test_compile_error_surfaces_on_add() {
    let mut env = Environment::new();
    let err = env.add_template("broken", "<%= unclosed").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnterminatedDirective);
}

#[test]
fn test_clear_templates() {
    let mut env = Environment::new();
    env.add_template("a", "a").unwrap();
    env.add_template("b", "b").unwrap();
    env.clear_templates();
    assert_eq!(
        env.get_template("a").unwrap_err().kind(),
        ErrorKind::TemplateNotFound
    );
}

#[test]
fn test_source_change_invalidates() {
    let mut env = Environment::new();
    env.add_template("page", "old <%= v %>").unwrap();
    env.add_template("page", "new <%= v %>").unwrap();
    let mut ctx = BTreeMap::new();
    ctx.insert("v", 1);
    assert_eq!(env.get_template("page").unwrap().render(&ctx).unwrap(), "new 1");
}

#[test]
fn test_reserved_context_keys_rejected() {
    let env = Environment::new();
    let mut ctx = BTreeMap::new();
    ctx.insert("print", "x");
    let err = env.render_str("hi", &ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReservedName);

    // builtin function names are reserved as well
    let mut ctx = BTreeMap::new();
    ctx.insert("range", "x");
    let err = env.render_str("hi", &ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReservedName);
}

#[test]
fn test_custom_function_name_is_reserved() {
    fn answer(_env: &Environment) -> Result<i64, Error> {
        Ok(42)
    }

    let mut env = Environment::new();
    env.add_function("answer", answer);
    assert_eq!(env.render_str("<%= answer() %>", ()).unwrap(), "42");

    let mut ctx = BTreeMap::new();
    ctx.insert("answer", 1);
    let err = env.render_str("<%= answer() %>", &ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReservedName);
}

#[test]
fn test_non_map_context_rejected() {
    let env = Environment::new();
    let err = env.render_str("hi", 42).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_unit_context_is_empty() {
    let env = Environment::new();
    assert_eq!(env.render_str("hi", ()).unwrap(), "hi");
}

#[test]
fn test_removed_function_is_unknown() {
    let mut env = Environment::new();
    env.remove_function("range");
    let err = env.render_str("<%= range(3) %>", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFunction);
}

#[test]
fn test_function_argument_errors() {
    let env = Environment::new();
    let err = env.render_str("<%= range('x') %>", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    let err = env.render_str("<%= range(1, 2, 3) %>", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
}

#[test]
fn test_error_reports_template_name() {
    let mut env = Environment::new();
    env.add_template("profile.html", "<%= nope %>").unwrap();
    let err = env.get_template("profile.html").unwrap().render(()).unwrap_err();
    assert_eq!(err.name(), Some("profile.html"));
    assert_eq!(err.line(), Some(1));
    let display = err.to_string();
    assert!(display.contains("profile.html"));
    assert!(display.contains("nope"));
}

#[cfg(feature = "json")]
#[test]
fn test_json_builtin() {
    let env = Environment::new();
    let mut ctx = BTreeMap::new();
    ctx.insert("items", vec![1, 2]);
    assert_eq!(
        env.render_str("<%- json(items) %>", &ctx).unwrap(),
        "[1,2]"
    );
}
