//! VL-003: Template location: maps template names to sources and cache paths.
//!
//! The compiler never decides this mapping itself; it asks a [`TemplateLocator`].
//! [`DirLocator`] is the filesystem implementation used by the CLI: template sets
//! live under one root, the active set falls back to a default set, `NAME.tpl`
//! files compile and `NAME.html` files are taken as raw text.

use super::types::{Location, VellumConfig};
use crate::cache::hasher;
use std::path::{Path, PathBuf};

/// Source file extension for compiled templates.
pub const TEMPLATE_EXT: &str = "tpl";

/// Source file extension for raw (verbatim) templates.
pub const RAW_EXT: &str = "html";

/// Resolves a template name to where its source and compiled output live.
pub trait TemplateLocator {
    fn locate(&self, name: &str) -> Result<Location, String>;
}

impl<T: TemplateLocator + ?Sized> TemplateLocator for &T {
    fn locate(&self, name: &str) -> Result<Location, String> {
        (**self).locate(name)
    }
}

/// Filesystem locator over template sets.
#[derive(Debug, Clone)]
pub struct DirLocator {
    root: PathBuf,
    set: String,
    default_set: String,
    cache_dir: PathBuf,
}

impl DirLocator {
    pub fn new(root: &Path, set: &str, default_set: &str, cache_dir: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            set: set.to_string(),
            default_set: default_set.to_string(),
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Build from config, resolving relative paths against `base`.
    pub fn from_config(config: &VellumConfig, base: &Path) -> Self {
        Self::new(
            &base.join(&config.template_dir),
            &config.template,
            &config.default_template,
            &base.join(&config.cache_dir),
        )
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Stage1 path for a template of a given set.
    pub fn output_path(&self, set: &str, name: &str) -> PathBuf {
        let root_hash = hasher::short_hash(&self.root.display().to_string());
        self.cache_dir
            .join(format!("tpl-{}-{}-{}", sanitize(set), sanitize(name), root_hash))
    }

    fn sets(&self) -> Vec<&str> {
        if self.set == self.default_set {
            vec![self.set.as_str()]
        } else {
            vec![self.set.as_str(), self.default_set.as_str()]
        }
    }
}

impl TemplateLocator for DirLocator {
    fn locate(&self, name: &str) -> Result<Location, String> {
        check_name(name)?;
        for set in self.sets() {
            let dir = self.root.join(set);
            let source = dir.join(format!("{}.{}", name, TEMPLATE_EXT));
            if source.is_file() {
                return Ok(Location::Compiled {
                    source,
                    output: self.output_path(set, name),
                });
            }
            let raw = dir.join(format!("{}.{}", name, RAW_EXT));
            if raw.is_file() {
                return Ok(Location::Raw(raw));
            }
        }
        Err(format!(
            "template '{}' not found in set '{}' or '{}' under {}",
            name,
            self.set,
            self.default_set,
            self.root.display()
        ))
    }
}

/// Reject names that would escape the template set directory.
fn check_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty template name".to_string());
    }
    if name.starts_with('/') || name.starts_with('\\') || name.split(['/', '\\']).any(|s| s == "..")
    {
        return Err(format!("invalid template name '{}'", name));
    }
    Ok(())
}

/// Keep file-name-safe characters, map the rest to `_`.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
