//! TypeScript compiler configuration (`tsconfig.json`)
//!
//! A loaded config can inline its whole `extends` chain so the rewritten
//! build-directory copy is self-contained: the compiler never resolves
//! configuration files outside the isolated build directory.

use crate::package_json::NODE_MODULES_DIRNAME;
use crate::{PackageError, Result};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const COMPILER_OPTIONS_KEY: &str = "compilerOptions";
const EXTENDS_KEY: &str = "extends";

/// Strip the leading `./` and any trailing `/` from an output directory name
pub fn normalize_out_dir(dir: &str) -> String {
    dir.trim_start_matches("./").trim_end_matches('/').to_string()
}

/// A `tsconfig.json` document bound to its on-disk location
#[derive(Debug, Clone)]
pub struct TsConfig {
    /// Path the config was loaded from
    pub path: PathBuf,
    data: Map<String, Value>,
}

impl TsConfig {
    /// Load a config from file
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content =
            std::fs::read_to_string(&path).map_err(|e| PackageError::io(&path, e))?;
        let data: Map<String, Value> = serde_json::from_str(&content)?;
        Ok(Self { path, data })
    }

    /// Inline the full `extends` chain into this config.
    ///
    /// Relative references resolve against the extending file; package
    /// references resolve through `dep_paths` (dependency name to installed
    /// package directory). After this call no `extends` key remains.
    pub fn inline_extend(&mut self, dep_paths: &BTreeMap<String, PathBuf>) -> Result<()> {
        while let Some(reference) = self.data.remove(EXTENDS_KEY) {
            let reference = reference.as_str().map(str::to_string).ok_or_else(|| {
                PackageError::InvalidField {
                    path: self.path.display().to_string(),
                    reason: "`extends` is not a string".to_string(),
                }
            })?;

            let base_path = self.resolve_extends(&reference, dep_paths)?;
            let base = TsConfig::load(&base_path)?;
            merge_configs(&mut self.data, base.data, &base_path, dep_paths)?;
        }
        Ok(())
    }

    fn resolve_extends(
        &self,
        reference: &str,
        dep_paths: &BTreeMap<String, PathBuf>,
    ) -> Result<PathBuf> {
        let config_dir = self.path.parent().unwrap_or_else(|| Path::new("."));

        let resolved = if reference.starts_with('.') {
            config_dir.join(reference)
        } else {
            // "@scope/pkg/file.json" or "pkg/file.json"
            let (name, rest) = if reference.starts_with('@') {
                let mut parts = reference.splitn(3, '/');
                let scope = parts.next().unwrap_or_default();
                let pkg = parts.next().unwrap_or_default();
                (format!("{scope}/{pkg}"), parts.next().unwrap_or(""))
            } else {
                let mut parts = reference.splitn(2, '/');
                let pkg = parts.next().unwrap_or_default().to_string();
                (pkg, parts.next().unwrap_or(""))
            };

            let package_dir = dep_paths.get(&name).cloned().unwrap_or_else(|| {
                config_dir.join(NODE_MODULES_DIRNAME).join(&name)
            });
            if !package_dir.exists() {
                return Err(PackageError::UnresolvedExtends {
                    reference: reference.to_string(),
                    config: self.path.display().to_string(),
                });
            }
            if rest.is_empty() {
                package_dir.join("tsconfig.json")
            } else {
                package_dir.join(rest)
            }
        };

        if resolved.extension().is_none() {
            Ok(resolved.with_extension("json"))
        } else {
            Ok(resolved)
        }
    }

    /// Compiler options object, created on demand. A non-object
    /// `compilerOptions` value is a malformed config, not a crash.
    pub fn compiler_options_mut(&mut self) -> Result<&mut Map<String, Value>> {
        let path = &self.path;
        self.data
            .entry(COMPILER_OPTIONS_KEY)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| PackageError::InvalidField {
                path: path.display().to_string(),
                reason: "`compilerOptions` is not an object".to_string(),
            })
    }

    /// Declared output directory names (`outDir`, `declarationDir`), normalized
    pub fn get_out_dirs(&self) -> BTreeSet<String> {
        let mut dirs = BTreeSet::new();
        if let Some(options) = self.data.get(COMPILER_OPTIONS_KEY).and_then(Value::as_object) {
            for key in ["outDir", "declarationDir"] {
                if let Some(dir) = options.get(key).and_then(Value::as_str) {
                    dirs.insert(normalize_out_dir(dir));
                }
            }
        }
        dirs
    }

    /// Write the config to `path` (pretty-printed, trailing newline)
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut content = serde_json::to_string_pretty(&Value::Object(self.data.clone()))?;
        content.push('\n');
        std::fs::write(path, content).map_err(|e| PackageError::io(path, e))
    }
}

// Merge `base` under `child` in place: child keys win, `compilerOptions`
// merges one level deep. A base-level `extends` continues the chain,
// resolved relative to the base file's own location.
fn merge_configs(
    child: &mut Map<String, Value>,
    mut base: Map<String, Value>,
    base_path: &Path,
    dep_paths: &BTreeMap<String, PathBuf>,
) -> Result<()> {
    if let Some(grand) = base.remove(EXTENDS_KEY) {
        let mut chained = TsConfig {
            path: base_path.to_path_buf(),
            data: base.clone(),
        };
        chained.data.insert(EXTENDS_KEY.to_string(), grand);
        chained.inline_extend(dep_paths)?;
        base = chained.data;
    }

    for (key, base_value) in base {
        match child.get_mut(&key) {
            None => {
                child.insert(key, base_value);
            }
            Some(child_value) if key == COMPILER_OPTIONS_KEY => {
                if let (Some(child_opts), Some(base_opts)) =
                    (child_value.as_object_mut(), base_value.as_object())
                {
                    for (opt, value) in base_opts {
                        child_opts.entry(opt.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
            Some(_) => {} // child wins
        }
    }
    Ok(())
}
