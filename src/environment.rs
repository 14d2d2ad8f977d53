use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::compiler::Compiler;
use crate::error::{Error, ErrorKind};
use crate::functions::{self, BoxedFunction};
use crate::instructions::Instructions;
use crate::parser::{parse, RESERVED_NAMES};
use crate::value::Value;
use crate::vm::Vm;

/// Represents a handle to a template.
///
/// Templates are stored in the [`Environment`] as compiled instructions.  With
/// the [`Environment::get_template`] method that is looked up and returned in
/// form of this handle.  Such a template can be cheaply copied as it only
/// holds two pointers.  To render the [`render`](Template::render) method can
/// be used.
#[derive(Copy, Clone)]
pub struct Template<'env, 'source> {
    env: &'env Environment<'env>,
    compiled: &'env CompiledTemplate<'source>,
}

impl<'env, 'source> fmt::Debug for Template<'env, 'source> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.compiled.name)
            .field("instructions", &self.compiled.instructions)
            .finish()
    }
}

/// Represents a compiled template in memory.
///
/// Compilation happens once when the template enters the environment; every
/// following render reuses the instructions, which is what makes repeated
/// renders of the same template cheap.
#[derive(Debug)]
pub struct CompiledTemplate<'source> {
    name: &'source str,
    instructions: Instructions<'source>,
}

impl<'source> CompiledTemplate<'source> {
    pub(crate) fn new(name: &'source str, source: &'source str) -> Result<Self, Error> {
        let ast = parse(source)?;
        let mut compiler = Compiler::new();
        compiler.compile_stmt(&ast)?;
        Ok(CompiledTemplate {
            name,
            instructions: compiler.finish(),
        })
    }
}

impl<'env, 'source> Template<'env, 'source> {
    /// Returns the name of the template.
    pub fn name(&self) -> &str {
        self.compiled.name
    }

    /// Renders the template into a string.
    ///
    /// The provided value is used as the root context for the template.  It
    /// can be any object that implements [`Serialize`](serde::Serialize) and
    /// serializes to a map.  Typically custom structs annotated with
    /// `#[derive(Serialize)]` would be used for this purpose.
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, Error> {
        self.env.render_compiled(self.compiled, ctx)
    }
}

/// An abstraction that holds the engine configuration.
///
/// This object holds the central configuration state for templates.  It is
/// also the owner of all loaded templates: adding a template compiles it once
/// and each [`get_template`](Environment::get_template) call hands out a
/// cheap handle onto the compiled program.  Re-adding a template under the
/// same name replaces the compiled program, which is how a changed source is
/// invalidated.
pub struct Environment<'source> {
    templates: BTreeMap<&'source str, CompiledTemplate<'source>>,
    functions: BTreeMap<&'source str, BoxedFunction>,
    #[cfg(feature = "loader")]
    loader: crate::loader::LoaderStore,
}

impl<'source> Default for Environment<'source> {
    fn default() -> Self {
        Environment::empty()
    }
}

impl<'source> fmt::Debug for Environment<'source> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("templates", &self.templates)
            .finish()
    }
}

impl<'source> Environment<'source> {
    /// Creates a new environment with sensible defaults.
    ///
    /// This environment does not yet contain any templates but it will have
    /// all the builtin functions loaded.  If you do not want any default
    /// configuration you can use the alternative
    /// [`empty`](Environment::empty) method.
    pub fn new() -> Environment<'source> {
        Environment {
            templates: BTreeMap::new(),
            functions: functions::get_builtin_functions(),
            #[cfg(feature = "loader")]
            loader: crate::loader::LoaderStore::new(),
        }
    }

    /// Creates a completely empty environment.
    pub fn empty() -> Environment<'source> {
        Environment {
            templates: BTreeMap::new(),
            functions: BTreeMap::new(),
            #[cfg(feature = "loader")]
            loader: crate::loader::LoaderStore::new(),
        }
    }

    /// Loads a template from a string.
    ///
    /// The `name` parameter defines the name of the template which identifies
    /// it.  To look up a loaded template use the
    /// [`get_template`](Self::get_template) method.  Adding a template with a
    /// name that is already in use replaces the old template.
    pub fn add_template(&mut self, name: &'source str, source: &'source str) -> Result<(), Error> {
        let compiled = CompiledTemplate::new(name, source)?;
        #[cfg(feature = "loader")]
        self.loader.remove(name);
        self.templates.insert(name, compiled);
        Ok(())
    }

    /// Removes a template by name.
    pub fn remove_template(&mut self, name: &str) {
        self.templates.remove(name);
        #[cfg(feature = "loader")]
        self.loader.remove(name);
    }

    /// Removes all templates, including ones cached from the loader.
    pub fn clear_templates(&mut self) {
        self.templates.clear();
        #[cfg(feature = "loader")]
        self.loader.clear();
    }

    /// Sets a loader that is invoked for templates not added directly.
    ///
    /// Loaded templates are compiled once and memoized, so repeated renders
    /// of the same template do not recompile.  Use
    /// [`clear_templates`](Self::clear_templates) to evict when sources
    /// change on disk.
    #[cfg(feature = "loader")]
    #[cfg_attr(docsrs, doc(cfg(feature = "loader")))]
    pub fn set_loader<F>(&mut self, f: F)
    where
        F: Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static,
    {
        self.loader.set_loader(f);
    }

    /// Fetches a template by name.
    pub fn get_template<'env>(&'env self, name: &str) -> Result<Template<'env, 'env>, Error> {
        if let Some(compiled) = self.templates.get(name) {
            return Ok(Template {
                env: self,
                compiled,
            });
        }
        #[cfg(feature = "loader")]
        {
            if let Some(compiled) = self.loader.get(name)? {
                return Ok(Template {
                    env: self,
                    compiled,
                });
            }
        }
        Err(Error::new(
            ErrorKind::TemplateNotFound,
            format!("template {} does not exist", name),
        ))
    }

    /// Compiles and renders a template from a string in one go.
    ///
    /// This is the one-shot entry point: nothing is cached, which suits
    /// callers that render a source exactly once.
    pub fn render_str<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, Error> {
        let compiled = CompiledTemplate::new("<string>", source)?;
        self.render_compiled(&compiled, ctx)
    }

    /// Adds a new global function.
    ///
    /// For details about functions have a look at [`functions`].
    pub fn add_function<F, Rv, Args>(&mut self, name: &'source str, f: F)
    where
        F: functions::Function<Rv, Args>,
        Rv: Into<Value>,
        Args: crate::value::FunctionArgs,
    {
        self.functions.insert(name, BoxedFunction::new(f));
    }

    /// Removes a global function by name.
    pub fn remove_function(&mut self, name: &str) {
        self.functions.remove(name);
    }

    /// Invokes a global function.
    pub(crate) fn call_function(&self, name: &str, args: Vec<Value>) -> Result<Value, Error> {
        if let Some(func) = self.functions.get(name) {
            func.invoke(self, args)
        } else {
            Err(Error::new(
                ErrorKind::UnknownFunction,
                format!("function {} is unknown", name),
            ))
        }
    }

    fn render_compiled<S: Serialize>(
        &self,
        compiled: &CompiledTemplate<'_>,
        ctx: S,
    ) -> Result<String, Error> {
        let root = Value::from_serializable(&ctx)?;
        self.check_context(&root)?;
        let mut output = String::new();
        Vm::new(self).eval(&compiled.instructions, root, compiled.name, &mut output)?;
        Ok(output)
    }

    /// Context keys that collide with the implicit `print` helper or a
    /// registered function are rejected up front, otherwise the colliding
    /// name would be unreachable from directives.
    fn check_context(&self, root: &Value) -> Result<(), Error> {
        if root.is_null() || root.is_undefined() {
            return Ok(());
        }
        match root.map_keys() {
            Some(keys) => {
                for key in keys {
                    if RESERVED_NAMES.contains(&key.as_str())
                        || self.functions.contains_key(key.as_str())
                    {
                        return Err(Error::new(
                            ErrorKind::ReservedName,
                            format!("context key {} collides with a builtin name", key),
                        ));
                    }
                }
                Ok(())
            }
            None => Err(Error::new(
                ErrorKind::InvalidOperation,
                "template context must be a map",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let mut env = Environment::new();
        env.add_template(
            "test",
            "<% seq.forEach(function(x) { %>[<%= x %>]<% }) %>",
        )
        .unwrap();
        let t = env.get_template("test").unwrap();
        let mut ctx = BTreeMap::new();
        ctx.insert("seq", Value::from((0..3).map(Value::from).collect::<Vec<_>>()));
        let rv = t.render(ctx).unwrap();
        assert_eq!(rv, "[0][1][2]");
    }

    #[test]
    fn test_template_not_found() {
        let env = Environment::new();
        let err = env.get_template("missing.html").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
    }

    #[test]
    fn test_reserved_context_key() {
        let env = Environment::new();
        let mut ctx = BTreeMap::new();
        ctx.insert("print", Value::from("nope"));
        let err = env.render_str("x", ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReservedName);
    }

    #[test]
    fn test_readding_replaces() {
        let mut env = Environment::new();
        env.add_template("page", "one").unwrap();
        env.add_template("page", "two").unwrap();
        let rv = env.get_template("page").unwrap().render(()).unwrap();
        assert_eq!(rv, "two");
    }

    #[test]
    fn test_custom_function() {
        fn shout(_env: &Environment, v: String) -> Result<String, Error> {
            Ok(v.to_uppercase())
        }

        let mut env = Environment::new();
        env.add_function("shout", shout);
        let rv = env.render_str("<%= shout('hi') %>", ()).unwrap();
        assert_eq!(rv, "HI");
    }
}
