use std::collections::BTreeMap;

use serde::Serialize;
use similar_asserts::assert_eq;

use stencil::{compile_and_render, Environment, ErrorKind};

fn render(source: &str, ctx: impl Serialize) -> String {
    compile_and_render(source, ctx).unwrap()
}

fn ctx1(key: &str, value: impl Serialize) -> BTreeMap<String, serde_json::Value> {
    let mut rv = BTreeMap::new();
    rv.insert(key.to_string(), serde_json::to_value(value).unwrap());
    rv
}

#[test]
fn test_plain_text_passes_through() {
    let source = "no directives here\n  whitespace stays   intact\t";
    assert_eq!(render(source, ()), source);
}

#[test]
fn test_literals_preserved_around_directives() {
    let tail = " <p>trailing & untouched</p>\n";
    let rv = render(&format!("<%= 1 + 1 %>{}", tail), ());
    assert_eq!(rv, format!("2{}", tail));
}

#[test]
fn test_escaped_output() {
    let rv = render("<%= v %>", ctx1("v", "<b>"));
    assert_eq!(rv, "&lt;b&gt;");
    let rv = render("<%= v %>", ctx1("v", "a \"quote\" & 'tick'"));
    assert_eq!(rv, "a &quot;quote&quot; &amp; &#x27;tick&#x27;");
}

#[test]
fn test_raw_output() {
    let rv = render("<%- v %>", ctx1("v", "<b>"));
    assert_eq!(rv, "<b>");
}

#[test]
fn test_loop_interleaving() {
    let rv = render(
        "<% items.forEach(function(item) { %><%= item %>,<% }) %>",
        ctx1("items", vec!["a", "b"]),
    );
    assert_eq!(rv, "a,b,");
}

#[test]
fn test_loop_with_index() {
    let rv = render(
        "<% items.forEach(function(item, i) { %><%= i %>=<%= item %>;<% }) %>",
        ctx1("items", vec!["x", "y"]),
    );
    assert_eq!(rv, "0=x;1=y;");
}

#[test]
fn test_arrow_callbacks() {
    let ctx = ctx1("items", vec![1, 2]);
    let rv = render("<% items.forEach(n => { %><%= n %><% }) %>", &ctx);
    assert_eq!(rv, "12");
    let rv = render("<% items.forEach((n, i) => { %><%= n * 10 + i %><% }) %>", &ctx);
    assert_eq!(rv, "1021");
}

#[test]
fn test_for_of_loop() {
    let rv = render(
        "<% for (var item of items) { %>(<%= item %>)<% } %>",
        ctx1("items", vec!["a", "b"]),
    );
    assert_eq!(rv, "(a)(b)");
}

#[test]
fn test_for_in_loop() {
    let mut map = BTreeMap::new();
    map.insert("alpha", 1);
    map.insert("beta", 2);
    let rv = render(
        "<% for (var key in obj) { %><%= key %>=<%= obj[key] %> <% } %>",
        ctx1("obj", map),
    );
    assert_eq!(rv, "alpha=1 beta=2 ");
}

#[test]
fn test_conditionals_across_directives() {
    let source = "<% if (count > 1) { %>many<% } else if (count == 1) { %>one<% } else { %>none<% } %>";
    assert_eq!(render(source, ctx1("count", 5)), "many");
    assert_eq!(render(source, ctx1("count", 1)), "one");
    assert_eq!(render(source, ctx1("count", 0)), "none");
}

#[test]
fn test_missing_identifier_is_named() {
    let err = compile_and_render("<%= missing %>", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedReference);
    assert!(err.detail().unwrap().contains("missing"));
}

#[test]
fn test_unterminated_directive() {
    let err = compile_and_render("<% if (true) {", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnterminatedDirective);
}

#[test]
fn test_repeated_renders_are_identical() {
    let mut env = Environment::new();
    env.add_template(
        "page",
        "<% items.forEach(function(x) { %><%= x %>|<% }) %>",
    )
    .unwrap();
    let ctx = ctx1("items", vec!["a", "b", "c"]);
    let template = env.get_template("page").unwrap();
    let first = template.render(&ctx).unwrap();
    let second = template.render(&ctx).unwrap();
    assert_eq!(first, "a|b|c|");
    assert_eq!(first, second);
}

#[test]
fn test_portfolio_end_to_end() {
    #[derive(Serialize)]
    struct Portfolio {
        name: String,
        skills: Vec<String>,
    }

    #[derive(Serialize)]
    struct Ctx {
        portfolio: Portfolio,
    }

    let rv = render(
        "<h1><%= portfolio.name %></h1><ul><% portfolio.skills.forEach(function(s){ %><li><%= s %></li><% }) %></ul>",
        Ctx {
            portfolio: Portfolio {
                name: "Ada".into(),
                skills: vec!["JS".into(), "CSS".into()],
            },
        },
    );
    assert_eq!(rv, "<h1>Ada</h1><ul><li>JS</li><li>CSS</li></ul>");
}

#[test]
fn test_print_helper() {
    let rv = render(
        "<% items.forEach(function(x) { print(x, '!') }) %>",
        ctx1("items", vec!["a", "b"]),
    );
    assert_eq!(rv, "a!b!");
}

#[test]
fn test_print_is_unescaped() {
    let rv = render("<% print(v) %>", ctx1("v", "<i>"));
    assert_eq!(rv, "<i>");
}

#[test]
fn test_declarations_and_assignment() {
    let rv = render(
        "<% var greeting = 'hi' %><%= greeting %><% greeting = 'bye' %> <%= greeting %>",
        (),
    );
    assert_eq!(rv, "hi bye");
}

#[test]
fn test_augmented_assignment_concatenates() {
    let rv = render(
        "<% var title = 'Hello' %><% title += ', ' + name %><%= title %>",
        ctx1("name", "Ada"),
    );
    assert_eq!(rv, "Hello, Ada");
}

#[test]
fn test_counting_with_augmented_assignment() {
    let rv = render(
        "<% var total = 0 %><% items.forEach(function(x) { total += x }) %><%= total %>",
        ctx1("items", vec![1, 2, 3]),
    );
    assert_eq!(rv, "6");
}

#[test]
fn test_ternary_expression() {
    let source = "<%= active ? 'on' : 'off' %>";
    assert_eq!(render(source, ctx1("active", true)), "on");
    assert_eq!(render(source, ctx1("active", false)), "off");
}

#[test]
fn test_logical_operators_keep_operand_values() {
    let rv = render("<%= nickname || 'anonymous' %>", ctx1("nickname", ""));
    assert_eq!(rv, "anonymous");
    let rv = render("<%= nickname || 'anonymous' %>", ctx1("nickname", "ada"));
    assert_eq!(rv, "ada");
    let rv = render("<%= a && b %>", {
        let mut ctx = BTreeMap::new();
        ctx.insert("a", true);
        ctx.insert("b", false);
        ctx
    });
    assert_eq!(rv, "false");
}

#[test]
fn test_comparisons_and_arithmetic() {
    assert_eq!(render("<%= 2 * 3 + 1 %>", ()), "7");
    assert_eq!(render("<%= 7 / 2 %>", ()), "3.5");
    assert_eq!(render("<%= 7 % 2 %>", ()), "1");
    assert_eq!(render("<%= 1 < 2 %>", ()), "true");
    assert_eq!(render("<%= 1 === 1 %>", ()), "true");
    assert_eq!(render("<%= 1 !== 2 %>", ()), "true");
    assert_eq!(render("<%= -value %>", ctx1("value", 4)), "-4");
    assert_eq!(render("<%= !value %>", ctx1("value", 0)), "true");
}

#[test]
fn test_indexing() {
    let ctx = ctx1("items", vec!["a", "b"]);
    assert_eq!(render("<%= items[1] %>", &ctx), "b");
    // out of range yields nothing rather than a crash
    assert_eq!(render("<%= items[9] %>", &ctx), "");
}

#[test]
fn test_length_property() {
    let ctx = ctx1("items", vec!["a", "b", "c"]);
    assert_eq!(render("<%= items.length %>", &ctx), "3");
    assert_eq!(render("<%= name.length %>", ctx1("name", "Ada")), "3");
}

#[test]
fn test_safe_methods() {
    assert_eq!(
        render("<%= name.toUpperCase() %>", ctx1("name", "ada")),
        "ADA"
    );
    assert_eq!(
        render("<%= name.trim() %>", ctx1("name", "  ada ")),
        "ada"
    );
    assert_eq!(
        render("<%= items.join(' / ') %>", ctx1("items", vec!["a", "b"])),
        "a / b"
    );
    assert_eq!(
        render("<%= items.join() %>", ctx1("items", vec!["a", "b"])),
        "a,b"
    );
    assert_eq!(
        render(
            "<%= items.includes('b') ? 'yes' : 'no' %>",
            ctx1("items", vec!["a", "b"])
        ),
        "yes"
    );
    assert_eq!(
        render("<%= items.indexOf('b') %>", ctx1("items", vec!["a", "b"])),
        "1"
    );
}

#[test]
fn test_unknown_method_fails() {
    let err = compile_and_render("<%= name.reverse() %>", ctx1("name", "ada")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_builtin_functions() {
    assert_eq!(
        render("<% range(3).forEach(function(n) { %><%= n %><% }) %>", ()),
        "012"
    );
    assert_eq!(
        render("<%= length(items) %>", ctx1("items", vec![1, 2])),
        "2"
    );
}

#[test]
fn test_unknown_function_fails() {
    let err = compile_and_render("<%= nope() %>", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFunction);
}

#[test]
fn test_missing_attribute_renders_empty() {
    let mut inner = BTreeMap::new();
    inner.insert("name", "Ada");
    let rv = render("[<%= user.hobby %>]", ctx1("user", inner));
    assert_eq!(rv, "[]");
}

#[test]
fn test_attribute_on_missing_record_fails() {
    let mut inner: BTreeMap<&str, Option<&str>> = BTreeMap::new();
    inner.insert("bio", None);
    let err = compile_and_render("<%= user.bio.length %>", ctx1("user", inner)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_nested_loops() {
    #[derive(Serialize)]
    struct Project {
        title: String,
        tags: Vec<String>,
    }

    let ctx = ctx1(
        "projects",
        vec![
            Project {
                title: "one".into(),
                tags: vec!["a".into(), "b".into()],
            },
            Project {
                title: "two".into(),
                tags: vec!["c".into()],
            },
        ],
    );
    let rv = render(
        "<% projects.forEach(function(p) { %><%= p.title %>:<% p.tags.forEach(function(t) { %><%= t %>.<% }) %> <% }) %>",
        &ctx,
    );
    assert_eq!(rv, "one:a.b. two:c. ");
}

#[test]
fn test_error_location_points_at_directive() {
    let err = compile_and_render("line one\nline two\n<%= boom %>", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedReference);
    assert_eq!(err.line(), Some(3));
}

#[test]
fn test_statement_only_whitespace_is_ignored() {
    assert_eq!(render("a<%   %>b", ()), "ab");
}

#[test]
fn test_full_page_snapshot() {
    #[derive(Serialize)]
    struct Portfolio {
        name: String,
        headline: String,
        skills: Vec<String>,
    }

    #[derive(Serialize)]
    struct Ctx {
        portfolio: Portfolio,
    }

    let source = "\
<header>
  <h1><%= portfolio.name %></h1>
  <p><%= portfolio.headline %></p>
</header>
<ul>
<% portfolio.skills.forEach(function(skill) { %>  <li><%= skill %></li>
<% }) %></ul>";
    let rv = render(
        source,
        Ctx {
            portfolio: Portfolio {
                name: "Grace".into(),
                headline: "Systems & Compilers".into(),
                skills: vec!["Rust".into(), "C".into()],
            },
        },
    );
    insta::assert_snapshot!(rv, @r###"
    <header>
      <h1>Grace</h1>
      <p>Systems &amp; Compilers</p>
    </header>
    <ul>
      <li>Rust</li>
      <li>C</li>
    </ul>
    "###);
}
