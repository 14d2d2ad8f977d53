#![cfg(feature = "loader")]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use similar_asserts::assert_eq;

use stencil::{Environment, ErrorKind};

#[test]
fn test_dynamic_loading() {
    let mut env = Environment::new();
    env.set_loader(|name| {
        if name == "card.html" {
            Ok(Some("<b><%= name %></b>".to_string()))
        } else {
            Ok(None)
        }
    });

    let template = env.get_template("card.html").unwrap();
    let mut ctx = BTreeMap::new();
    ctx.insert("name", "Ada");
    assert_eq!(template.render(&ctx).unwrap(), "<b>Ada</b>");

    assert_eq!(
        env.get_template("other.html").unwrap_err().kind(),
        ErrorKind::TemplateNotFound
    );
}

#[test]
fn test_loaded_templates_are_memoized() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut env = Environment::new();
    {
        let counter = counter.clone();
        env.set_loader(move |name| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("hello {}", name)))
        });
    }

    env.get_template("a").unwrap();
    env.get_template("a").unwrap();
    env.get_template("b").unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_added_templates_shadow_loader() {
    let mut env = Environment::new();
    env.set_loader(|_| Ok(Some("from loader".to_string())));
    env.add_template("page", "from env").unwrap();
    assert_eq!(env.get_template("page").unwrap().render(()).unwrap(), "from env");
}

#[test]
fn test_clear_templates_evicts_loader_cache() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut env = Environment::new();
    {
        let counter = counter.clone();
        env.set_loader(move |name| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("hello {}", name)))
        });
    }

    env.get_template("a").unwrap();
    env.clear_templates();
    env.get_template("a").unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_loader_compile_errors_propagate() {
    let mut env = Environment::new();
    env.set_loader(|_| Ok(Some("<% if (broken %>".to_string())));
    let err = env.get_template("broken.html").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
}
