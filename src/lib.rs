//! Stencil is a small template engine for the directive syntax used by the
//! portfolio site builder: literal text interleaved with `<% %>` blocks,
//! rendered against [serde](https://serde.rs/) serializable data.
//!
//! ```text
//! <ul><% portfolio.skills.forEach(function(skill) { %>
//!   <li><%= skill %></li>
//! <% }) %></ul>
//! ```
//!
//! Three directive forms exist: `<%= expr %>` evaluates an expression and
//! appends it HTML escaped, `<%- expr %>` appends it raw, and `<% stmt %>`
//! executes control flow.  Control constructs may open in one directive and
//! close in a later one; the literal text in between is emitted once per
//! reached pass, which is how loops interleave markup with data.
//!
//! # Design
//!
//! Templates compile into a flat instruction sequence executed by a small
//! stack machine.  Directive code is parsed against a closed grammar —
//! arithmetic, comparisons, member and index access, calls into a fixed
//! function set, conditionals and loops over supplied data — so rendering a
//! template never executes anything the host did not register.  Identifier
//! resolution is an explicit scope lookup: referencing a name that exists
//! nowhere fails with an error naming the identifier instead of silently
//! producing an empty value.
//!
//! # Template Usage
//!
//! To use stencil one creates an [`Environment`] and populates it with
//! templates.  Afterwards templates can be loaded and rendered.  To pass
//! data one can pass any serde serializable value that forms a map:
//!
//! ```
//! use std::collections::BTreeMap;
//! use stencil::Environment;
//!
//! let mut env = Environment::new();
//! env.add_template("hello", "Hello <%= name %>!").unwrap();
//! let mut ctx = BTreeMap::new();
//! ctx.insert("name", "John");
//! println!("{}", env.get_template("hello").unwrap().render(&ctx).unwrap());
//! ```
//!
//! For a single render without an environment the
//! [`compile_and_render`] shortcut exists:
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! let mut ctx = BTreeMap::new();
//! ctx.insert("user", "Ada");
//! let rv = stencil::compile_and_render("<b><%= user %></b>", &ctx).unwrap();
//! assert_eq!(rv, "<b>Ada</b>");
//! ```
//!
//! # Learn more
//!
//! - [`functions`]: list of built-in functions and how to register custom ones.
//! - [`value`]: for information about the runtime value object.
//! - [`Environment`]: the main API entry point.
//! - [`Template`]: the template object API.
//!
//! # Optional Features
//!
//! There are some additional features that can be enabled:
//!
//! - `loader`: enables [`Environment::set_loader`] and [`path_loader`] for
//!   loading templates from a directory with compile memoization.
//! - `json`: provides the `json` builtin for serializing values.
#![cfg_attr(docsrs, feature(doc_cfg))]
mod ast;
mod compiler;
mod environment;
mod error;
mod instructions;
mod lexer;
#[cfg(feature = "loader")]
mod loader;
mod parser;
mod tokens;
mod utils;
mod vm;

pub mod functions;
pub mod value;

pub use self::environment::{Environment, Template};
pub use self::error::{Error, ErrorKind};
#[cfg(feature = "loader")]
#[cfg_attr(docsrs, doc(cfg(feature = "loader")))]
pub use self::loader::path_loader;

use serde::Serialize;

/// Compiles a template source and renders it against a context in one call.
///
/// This is the plain entry point for callers that hold a template source and
/// a context and want the substituted output, with no environment
/// configuration and no caching across calls.
///
/// ```
/// # use std::collections::BTreeMap;
/// let mut ctx = BTreeMap::new();
/// ctx.insert("name", "Ada");
/// let rv = stencil::compile_and_render("<h1><%= name %></h1>", &ctx).unwrap();
/// assert_eq!(rv, "<h1>Ada</h1>");
/// ```
pub fn compile_and_render<S: Serialize>(source: &str, ctx: S) -> Result<String, Error> {
    Environment::new().render_str(source, ctx)
}
