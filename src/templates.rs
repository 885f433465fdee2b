//! # Template Module
//!
//! Render-artifact caching for the default finish path.
//!
//! ## Overview
//!
//! Template sources are preloaded once at startup — either from a directory
//! walk ([`TemplateCache::from_dir`]) or from an in-memory map — and compiled
//! with `minijinja` on first use. A compiled artifact lives for the process
//! lifetime: there is no eviction and no hot reload, so a request never pays
//! the compile cost twice for the same name.
//!
//! [`ViewContext`] is the mutable key→value mapping a controller fills in
//! before calling `finish`; it is owned by exactly one request and read once
//! at render time.

use anyhow::{anyhow, Context, Result};
use minijinja::Environment;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::RwLock;
use tracing::debug;

/// Per-request view model passed to template rendering.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct ViewContext {
    values: HashMap<String, Value>,
}

impl ViewContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Lookup-and-compile-on-miss cache of compiled templates, keyed by name.
///
/// Shared across all requests behind an `Arc`; interior locking keeps it
/// safe when handlers run on more than one coroutine.
pub struct TemplateCache {
    sources: HashMap<String, String>,
    env: RwLock<Environment<'static>>,
    compiled: RwLock<HashSet<String>>,
}

impl TemplateCache {
    /// Build a cache from an in-memory name → source map.
    #[must_use]
    pub fn from_sources(sources: HashMap<String, String>) -> Self {
        TemplateCache {
            sources,
            env: RwLock::new(Environment::new()),
            compiled: RwLock::new(HashSet::new()),
        }
    }

    /// Preload every file under `dir` (recursively) as a template source.
    ///
    /// Template names are the paths relative to `dir` with `/` separators,
    /// e.g. `mail/report.html`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut sources = HashMap::new();
        collect_sources(dir, "", &mut sources)
            .with_context(|| format!("loading templates from {}", dir.display()))?;
        debug!(dir = %dir.display(), count = sources.len(), "template sources preloaded");
        Ok(Self::from_sources(sources))
    }

    /// Render the named template against `view`.
    ///
    /// Compiles the template on first use and serves the cached artifact on
    /// every later call.
    pub fn render(&self, name: &str, view: &ViewContext) -> Result<Vec<u8>> {
        self.ensure_compiled(name)?;
        let env = self.env.read().unwrap();
        let tmpl = env
            .get_template(name)
            .with_context(|| format!("template not in cache: {name}"))?;
        let rendered = tmpl
            .render(view)
            .with_context(|| format!("rendering template: {name}"))?;
        Ok(rendered.into_bytes())
    }

    fn ensure_compiled(&self, name: &str) -> Result<()> {
        if self.compiled.read().unwrap().contains(name) {
            return Ok(());
        }
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| anyhow!("unknown template: {name}"))?;
        let mut env = self.env.write().unwrap();
        let mut compiled = self.compiled.write().unwrap();
        // Another coroutine may have compiled it while we waited on the lock.
        if compiled.contains(name) {
            return Ok(());
        }
        env.add_template_owned(name.to_string(), source.clone())
            .with_context(|| format!("compiling template: {name}"))?;
        compiled.insert(name.to_string());
        debug!(template = %name, "template compiled");
        Ok(())
    }

    /// Whether a compiled artifact exists for `name`.
    #[must_use]
    pub fn is_compiled(&self, name: &str) -> bool {
        self.compiled.read().unwrap().contains(name)
    }

    /// Number of compiled artifacts currently cached.
    #[must_use]
    pub fn compiled_count(&self) -> usize {
        self.compiled.read().unwrap().len()
    }

    /// Whether a source was preloaded under `name`.
    #[must_use]
    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }
}

fn collect_sources(
    dir: &Path,
    prefix: &str,
    out: &mut HashMap<String, String>,
) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let path = entry.path();
        if path.is_dir() {
            collect_sources(&path, &key, out)?;
        } else {
            out.insert(key, fs::read_to_string(&path)?);
        }
    }
    Ok(())
}
