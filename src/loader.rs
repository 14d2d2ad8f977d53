use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memo_map::MemoMap;
use self_cell::self_cell;

use crate::environment::CompiledTemplate;
use crate::error::{Error, ErrorKind};

type LoadFunc = dyn for<'a> Fn(&'a str) -> Result<Option<String>, Error> + Send + Sync;

/// Internal utility for dynamic template loading.
///
/// Templates pulled in through the loader own their sources, so the
/// environment can hand out handles without borrowing from the caller.  A
/// loaded template is compiled exactly once and memoized under its name.
pub(crate) struct LoaderStore {
    loader: Option<Arc<LoadFunc>>,
    owned_templates: MemoMap<Arc<str>, Arc<LoadedTemplate>>,
}

impl fmt::Debug for LoaderStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut l = f.debug_list();
        for key in self.owned_templates.keys() {
            l.entry(key);
        }
        l.finish()
    }
}

self_cell! {
    struct LoadedTemplate {
        owner: (Arc<str>, Box<str>),
        #[covariant]
        dependent: CompiledTemplate,
    }
}

impl fmt::Debug for LoadedTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.borrow_dependent(), f)
    }
}

impl LoaderStore {
    pub fn new() -> LoaderStore {
        LoaderStore {
            loader: None,
            owned_templates: MemoMap::default(),
        }
    }

    pub fn set_loader<F>(&mut self, f: F)
    where
        F: Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(f));
    }

    pub fn remove(&mut self, name: &str) {
        self.owned_templates.remove(name);
    }

    pub fn clear(&mut self) {
        self.owned_templates.clear();
    }

    pub fn get(&self, name: &str) -> Result<Option<&CompiledTemplate<'_>>, Error> {
        let loader = match self.loader {
            Some(ref loader) => loader.clone(),
            None => return Ok(None),
        };
        let name: Arc<str> = name.into();
        self.owned_templates
            .get_or_try_insert(&name.clone(), || -> Result<_, Error> {
                let source = loader(&name)?.ok_or_else(|| {
                    Error::new(
                        ErrorKind::TemplateNotFound,
                        format!("template {} does not exist", name),
                    )
                })?;
                LoadedTemplate::try_new(
                    (name, source.into_boxed_str()),
                    |(name, source)| -> Result<_, Error> { CompiledTemplate::new(name, source) },
                )
                .map(Arc::new)
            })
            .map(|x| Some(x.borrow_dependent()))
    }
}

/// Safely joins two paths.
pub fn safe_join(base: &Path, template: &str) -> Option<PathBuf> {
    let mut rv = base.to_path_buf();
    for segment in template.split('/') {
        if segment.starts_with('.') || segment.contains('\\') {
            return None;
        }
        rv.push(segment);
    }
    Some(rv)
}

/// Helper to load templates from a given directory.
///
/// This creates a dynamic loader which looks up templates in the
/// given directory.  Templates that start with a dot (`.`) or are contained in
/// a folder starting with a dot cannot be loaded.
///
/// # Example
///
/// ```rust
/// # use stencil::{path_loader, Environment};
/// fn create_env() -> Environment<'static> {
///     let mut env = Environment::new();
///     env.set_loader(path_loader("path/to/templates"));
///     env
/// }
/// ```
#[cfg_attr(docsrs, doc(cfg(feature = "loader")))]
pub fn path_loader<'x, P: AsRef<Path> + 'x>(
    dir: P,
) -> impl for<'a> Fn(&'a str) -> Result<Option<String>, Error> + Send + Sync + 'static {
    let dir = dir.as_ref().to_path_buf();
    move |name| {
        let path = match safe_join(&dir, name) {
            Some(path) => path,
            None => return Ok(None),
        };
        match fs::read_to_string(path) {
            Ok(result) => Ok(Some(result)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(
                Error::new(ErrorKind::InvalidOperation, "could not read template").with_source(err),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_safe_join() {
        assert_eq!(
            safe_join(Path::new("foo"), "bar/baz"),
            Some(PathBuf::from("foo").join("bar").join("baz"))
        );
        assert_eq!(safe_join(Path::new("foo"), ".bar/baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/.baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/../baz"), None);
    }

    #[test]
    fn test_loader_memoizes() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let counter = Arc::new(AtomicUsize::new(0));
        let mut store = LoaderStore::new();
        {
            let counter = counter.clone();
            store.set_loader(move |name| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(format!("hello {}", name)))
            });
        }
        store.get("a").unwrap().unwrap();
        store.get("a").unwrap().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
