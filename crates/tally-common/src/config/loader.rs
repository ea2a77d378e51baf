//! Multi-file configuration loading.
//!
//! Every source is interpolated, parsed, and merged into a single config.
//! Errors from all sources are collected so one run reports every broken
//! file instead of the first.

use std::path::Path;

use indexmap::IndexMap;
use snafu::prelude::*;

use crate::config::{ConfigPath, GlobalConfig, MetricsConfig, interpolate, is_yaml_file};
use crate::error::{ConfigError, DuplicateComponentsSnafu, ReadDirSnafu, ReadFileSnafu};

/// Trait for configs that can be merged from multiple files.
pub trait Mergeable: Sized + Default {
    type Key: Eq + std::hash::Hash + Clone + std::fmt::Display;
    type Component;

    fn components_mut(&mut self) -> &mut IndexMap<Self::Key, Self::Component>;
    fn global_mut(&mut self) -> &mut GlobalConfig;
    fn metrics_mut(&mut self) -> &mut MetricsConfig;
    fn parse_yaml(contents: &str) -> Result<Self, ConfigError>;

    /// Fold `other` into `self`. Component keys must be unique across files.
    fn merge(&mut self, mut other: Self) -> Result<(), ConfigError> {
        let duplicates: Vec<String> = other
            .components_mut()
            .keys()
            .filter(|key| self.components_mut().contains_key(*key))
            .map(|key| key.to_string())
            .collect();

        if !duplicates.is_empty() {
            return DuplicateComponentsSnafu { keys: duplicates }.fail();
        }

        for (key, component) in other.components_mut().drain(..) {
            self.components_mut().insert(key, component);
        }

        self.global_mut()
            .merge_from(std::mem::take(other.global_mut()));
        self.metrics_mut()
            .merge_from(std::mem::take(other.metrics_mut()));
        Ok(())
    }
}

/// Load and merge every file and directory in `paths`.
pub fn load_from_paths<C: Mergeable>(paths: &[ConfigPath]) -> Result<C, ConfigError> {
    let mut config = C::default();
    let mut errors = Vec::new();

    for path in paths {
        let (label, partial) = match path {
            ConfigPath::File(file) => (file.as_path(), load_file::<C>(file)),
            ConfigPath::Dir(dir) => (dir.as_path(), load_dir::<C>(dir)),
        };
        merge_into(&mut config, label, partial, &mut errors);
    }

    finish(config, errors)
}

fn merge_into<C: Mergeable>(
    config: &mut C,
    label: &Path,
    partial: Result<C, ConfigError>,
    errors: &mut Vec<String>,
) {
    let merged = partial.and_then(|partial| config.merge(partial));
    if let Err(e) = merged {
        errors.push(format!("{}: {}", label.display(), e));
    }
}

fn finish<C>(config: C, errors: Vec<String>) -> Result<C, ConfigError> {
    if errors.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::MultipleErrors { errors })
    }
}

fn load_file<C: Mergeable>(path: &Path) -> Result<C, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;

    let result = interpolate(&contents);
    if !result.is_ok() {
        return Err(ConfigError::EnvInterpolation {
            message: result.errors.join("\n"),
        });
    }

    C::parse_yaml(&result.text)
}

fn load_dir<C: Mergeable>(dir: &Path) -> Result<C, ConfigError> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .context(ReadDirSnafu { path: dir })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_yaml_file(path))
        .collect();

    // Directory iteration order is platform dependent
    files.sort();

    let mut config = C::default();
    let mut errors = Vec::new();
    for file in &files {
        merge_into(&mut config, file, load_file::<C>(file), &mut errors);
    }

    finish(config, errors)
}
