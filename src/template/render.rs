//! Directory-backed template lookup.
//!
//! A [`Render`] maps template names to files under a root directory:
//! `render.template("users/list")` finds `users/list.*`, skipping editor
//! backups ending in `~` and taking the lexicographically first match. A
//! name that is a directory resolves to a child render rooted there.
//! Compiled templates are cached for the lifetime of the render when caching
//! is enabled; restart to pick up edits.

// Internal imports (std, crate)
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::errors::ResolutionError;
use super::template::{Template, TemplateOptions};
use crate::core::config::RenderConfig;
use crate::core::error::Result;
use crate::runtime::{Args, EscapeMode, EvalError, EvalResult, Object, OutputRecord, Value};

// External imports (alphabetized)
use indexmap::IndexMap;
use tracing::{debug, trace};

/// What a name resolves to under a render root
#[derive(Debug, Clone)]
pub enum Resolved {
    Template(Arc<Template>),
    Directory(Render),
}

type Cache = RwLock<HashMap<String, Resolved>>;

/// Layout template wrapped around every leaf template
#[derive(Debug)]
struct Base {
    name: String,
    /// Render the layout is looked up in, without a base of its own
    render: Render,
}

#[derive(Clone)]
pub struct Render {
    root: PathBuf,
    globals: IndexMap<String, Value>,
    escape: Option<EscapeMode>,
    cache: Option<Arc<Cache>>,
    base: Option<Arc<Base>>,
    /// Name under which templates see this render
    expose_as: Option<String>,
    compilations: Arc<AtomicUsize>,
}

impl Render {
    /// A caching render over `root` with no globals and no base
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            globals: IndexMap::new(),
            escape: None,
            cache: Some(Arc::default()),
            base: None,
            expose_as: None,
            compilations: Arc::default(),
        }
    }

    /// A render over `root` configured from `config`
    pub fn from_config<P: Into<PathBuf>>(root: P, config: &RenderConfig) -> Self {
        let mut render = Self::new(root).with_cache(config.cache);
        render.escape = config.escape;
        render.expose_as = config.expose_as.clone();
        for (name, value) in &config.globals {
            render.globals.insert(name.clone(), Value::from(value.clone()));
        }
        match &config.base {
            Some(base) => render.with_base(base.clone()),
            None => render,
        }
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(Arc::default);
        self
    }

    /// Wrap every leaf template's output in the layout template `name`
    pub fn with_base<S: Into<String>>(mut self, name: S) -> Self {
        let layout = Self {
            base: None,
            ..self.clone()
        };
        self.base = Some(Arc::new(Base {
            name: name.into(),
            render: layout,
        }));
        self
    }

    pub fn with_escape(mut self, escape: EscapeMode) -> Self {
        self.escape = Some(escape);
        self
    }

    /// Add a name visible to every template compiled from now on
    pub fn with_global<S: Into<String>>(mut self, name: S, value: Value) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    /// Let templates reach this render, e.g. `$:render.header(title)`
    pub fn expose_as<S: Into<String>>(mut self, name: S) -> Self {
        self.expose_as = Some(name.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of templates compiled by this render and its children
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Resolve `name` to a template or a child render
    pub fn resolve(&self, name: &str) -> Result<Resolved> {
        if let Some(cache) = &self.cache {
            let cached = cache
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(name)
                .cloned();
            if let Some(resolved) = cached {
                trace!(name, "template cache hit");
                return Ok(resolved);
            }
        }

        let resolved = self.load(name)?;
        match &self.cache {
            Some(cache) => {
                let mut entries = cache.write().unwrap_or_else(PoisonError::into_inner);
                Ok(entries.entry(name.to_string()).or_insert(resolved).clone())
            }
            None => Ok(resolved),
        }
    }

    /// Resolve `name`, which must be a template
    pub fn template(&self, name: &str) -> Result<Arc<Template>> {
        match self.resolve(name)? {
            Resolved::Template(template) => Ok(template),
            Resolved::Directory(_) => Err(ResolutionError::NotATemplate(name.to_string()).into()),
        }
    }

    /// Render template `name` with named parameters, wrapped in the base
    /// layout when one is configured
    pub fn render(&self, name: &str, params: &IndexMap<String, Value>) -> Result<OutputRecord> {
        let template = self.template(name)?;
        Ok(self.invoke(&template, Args::named(params.clone()))?)
    }

    fn invoke(&self, template: &Template, args: Args) -> EvalResult<OutputRecord> {
        let exposed: Vec<(&str, Value)> = match &self.expose_as {
            Some(name) => vec![(name.as_str(), Value::object(self.clone()))],
            None => Vec::new(),
        };
        let record = template.run(args, &exposed)?;
        let Some(base) = &self.base else {
            return Ok(record);
        };
        let layout = base.render.template(&base.name)?;
        debug!(template = template.name(), layout = layout.name(), "applying base layout");
        base.render
            .invoke(&layout, Args::new(vec![Value::from(record)]))
    }

    fn load(&self, name: &str) -> Result<Resolved> {
        let path = self.path_for(name)?;
        if path.is_dir() {
            debug!(name, path = %path.display(), "resolved directory");
            let child = Self {
                root: path,
                cache: self.cache.as_ref().map(|_| Arc::default()),
                ..self.clone()
            };
            return Ok(Resolved::Directory(child));
        }

        let file = find_file(&path).ok_or_else(|| ResolutionError::NotFound {
            name: name.to_string(),
            root: self.root.display().to_string(),
        })?;
        let file_name = file
            .strip_prefix(&self.root)
            .unwrap_or(file.as_path())
            .to_string_lossy()
            .replace('\\', "/");
        debug!(name, file = %file.display(), "compiling template");
        let text = std::fs::read_to_string(&file)?;
        let options = TemplateOptions {
            globals: self.globals.clone(),
            escape: self.escape,
        };
        let template = Template::compile_with(&text, &file_name, options)?;
        self.compilations.fetch_add(1, Ordering::Relaxed);
        Ok(Resolved::Template(Arc::new(template)))
    }

    /// Join a relative template name onto the root
    fn path_for(&self, name: &str) -> std::result::Result<PathBuf, ResolutionError> {
        if name.is_empty() {
            return Err(ResolutionError::invalid(name, "empty name"));
        }
        for component in Path::new(name).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(ResolutionError::invalid(name, "`..` is not allowed"));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ResolutionError::invalid(name, "absolute paths are not allowed"));
                }
            }
        }
        Ok(self.root.join(name))
    }
}

/// First `prefix.*` file in lexicographic order, skipping `~` backups.
/// Falls back to `prefix` itself when it names a file.
fn find_file(prefix: &Path) -> Option<PathBuf> {
    let pattern = format!("{}.*", glob::Pattern::escape(&prefix.to_string_lossy()));
    let mut matches: Vec<PathBuf> = glob::glob(&pattern)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file() && !path.to_string_lossy().ends_with('~'))
        .collect();
    matches.sort();
    matches
        .into_iter()
        .next()
        .or_else(|| prefix.is_file().then(|| prefix.to_path_buf()))
}

impl fmt::Debug for Render {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Render")
            .field("root", &self.root)
            .field("cache", &self.cache.is_some())
            .field("base", &self.base.as_ref().map(|b| b.name.as_str()))
            .finish_non_exhaustive()
    }
}

/// A template reached through a render, e.g. `render.header`; calling it
/// applies the render's base layout and exposure
#[derive(Debug)]
struct RenderedTemplate {
    render: Render,
    template: Arc<Template>,
}

impl Object for RenderedTemplate {
    fn type_name(&self) -> &str {
        "template"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: Args) -> EvalResult<Value> {
        Ok(Value::from(self.render.invoke(&self.template, args)?))
    }

    fn to_text(&self) -> String {
        format!("<template {}>", self.template.name())
    }
}

impl Object for Render {
    fn type_name(&self) -> &str {
        "render"
    }

    fn get_attr(&self, name: &str) -> EvalResult<Value> {
        match self.resolve(name).map_err(EvalError::from)? {
            Resolved::Template(template) => Ok(Value::object(RenderedTemplate {
                render: self.clone(),
                template,
            })),
            Resolved::Directory(child) => Ok(Value::object(child)),
        }
    }

    fn get_index(&self, key: &Value) -> EvalResult<Value> {
        self.get_attr(key.expect_str("template name")?)
    }

    fn to_text(&self) -> String {
        format!("<render {}>", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, text: &str) {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    fn no_params() -> IndexMap<String, Value> {
        IndexMap::new()
    }

    #[test]
    fn test_resolves_by_extension_glob_skipping_backups() {
        let dir = TempDir::new().unwrap();
        write(&dir, "page.txt", "txt\n");
        write(&dir, "page.html", "html\n");
        write(&dir, "page.a~", "backup\n");
        let render = Render::new(dir.path());
        let template = render.template("page").unwrap();
        assert_eq!(template.name(), "page.html");
        assert_eq!(render.render("page", &no_params()).unwrap().to_string(), "html\n");
    }

    #[test]
    fn test_directory_resolves_to_child_render() {
        let dir = TempDir::new().unwrap();
        write(&dir, "users/list.txt", "users\n");
        let render = Render::new(dir.path());
        let Resolved::Directory(child) = render.resolve("users").unwrap() else {
            panic!("expected a directory");
        };
        assert_eq!(child.render("list", &no_params()).unwrap().to_string(), "users\n");
        assert_eq!(render.render("users/list", &no_params()).unwrap().to_string(), "users\n");
    }

    #[test]
    fn test_rejects_unresolvable_and_unsafe_names() {
        let dir = TempDir::new().unwrap();
        let render = Render::new(dir.path());
        assert!(matches!(
            render.template("missing"),
            Err(Error::Resolution(ResolutionError::NotFound { .. }))
        ));
        assert!(matches!(
            render.template("../etc/passwd"),
            Err(Error::Resolution(ResolutionError::InvalidName { .. }))
        ));
        assert!(matches!(
            render.template("/etc/passwd"),
            Err(Error::Resolution(ResolutionError::InvalidName { .. }))
        ));
    }

    #[test]
    fn test_cache_compiles_once() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.txt", "a\n");
        let render = Render::new(dir.path());
        render.template("a").unwrap();
        render.template("a").unwrap();
        assert_eq!(render.compilations(), 1);

        let uncached = Render::new(dir.path()).with_cache(false);
        uncached.template("a").unwrap();
        uncached.template("a").unwrap();
        assert_eq!(uncached.compilations(), 2);
    }

    #[test]
    fn test_concurrent_first_access_keeps_one_entry() {
        const THREADS: usize = 8;
        let dir = TempDir::new().unwrap();
        write(&dir, "page.txt", "$def with (n=3)\n$for i in range(n):\n    $i\n");
        let render = Render::new(dir.path());
        let barrier = Arc::new(std::sync::Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let render = render.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    render.render("page", &IndexMap::new()).unwrap().to_string()
                })
            })
            .collect();
        let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(outputs.iter().all(|out| out == "0\n1\n2\n"));
        let entries = render.cache.as_ref().unwrap().read().unwrap().len();
        assert_eq!(entries, 1);
        assert!((1..=THREADS).contains(&render.compilations()));
        assert!(Arc::ptr_eq(
            &render.template("page").unwrap(),
            &render.template("page").unwrap()
        ));
    }

    #[test]
    fn test_cache_serves_stale_text_until_restart() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.txt", "old\n");
        let render = Render::new(dir.path());
        assert_eq!(render.render("a", &no_params()).unwrap().to_string(), "old\n");
        write(&dir, "a.txt", "new\n");
        assert_eq!(render.render("a", &no_params()).unwrap().to_string(), "old\n");
        let fresh = Render::new(dir.path());
        assert_eq!(fresh.render("a", &no_params()).unwrap().to_string(), "new\n");
    }

    #[test]
    fn test_base_layout_wraps_leaf_output() {
        let dir = TempDir::new().unwrap();
        write(&dir, "layout.html", "$def with (page)\n<title>$page.title</title>\n$:page\n");
        write(&dir, "home.html", "$var title: Home\n<p>hi</p>\n");
        let render = Render::new(dir.path()).with_base("layout");
        let out = render.render("home", &no_params()).unwrap();
        assert_eq!(out.to_string(), "<title>Home</title>\n<p>hi</p>\n\n");
    }

    #[test]
    fn test_layout_calls_function_set_by_leaf() {
        let dir = TempDir::new().unwrap();
        write(&dir, "layout.txt", "$def with (page)\n$:page.sidebar()\n$:page\n");
        write(
            &dir,
            "home.txt",
            "$def with (user='ada')\n$def side():\n    hi $user\n$var sidebar = side\nbody\n",
        );
        let render = Render::new(dir.path()).with_base("layout");
        let out = render.render("home", &no_params()).unwrap();
        assert_eq!(out.to_string(), "hi ada\n\nbody\n\n");
    }

    #[test]
    fn test_exposed_render_includes_other_templates() {
        let dir = TempDir::new().unwrap();
        write(&dir, "header.html", "$def with (title)\n<h1>$title</h1>\n");
        write(&dir, "page.html", "$:render.header('A & B')body\n");
        let render = Render::new(dir.path()).expose_as("render");
        let out = render.render("page", &no_params()).unwrap();
        assert_eq!(out.to_string(), "<h1>A &amp; B</h1>\nbody\n");
    }

    #[test]
    fn test_globals_reach_templates() {
        let dir = TempDir::new().unwrap();
        write(&dir, "g.txt", "$site\n");
        let render = Render::new(dir.path()).with_global("site", Value::from("demo"));
        assert_eq!(render.render("g", &no_params()).unwrap().to_string(), "demo\n");
    }
}
