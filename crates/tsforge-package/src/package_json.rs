//! Package descriptor (`package.json`) loading and mutation
//!
//! Descriptors are kept as raw JSON objects so unknown fields survive a
//! load/mutate/write round trip. Only the build-directory copy of a
//! descriptor is ever written back; source-tree copies stay untouched.

use crate::{PackageError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const PACKAGE_JSON_FILENAME: &str = "package.json";
pub const NODE_MODULES_DIRNAME: &str = "node_modules";

/// Path to the `package.json` inside a package directory
pub fn package_json_path(dir: &Path) -> PathBuf {
    dir.join(PACKAGE_JSON_FILENAME)
}

/// A `package.json` descriptor bound to its on-disk location
#[derive(Debug, Clone)]
pub struct PackageJson {
    /// Absolute path of the descriptor file
    pub path: PathBuf,
    /// Raw document; mutated in place by generators
    pub data: Map<String, Value>,
}

impl PackageJson {
    /// Create an empty descriptor to be written at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: Map::new(),
        }
    }

    /// Load a descriptor from file
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content =
            std::fs::read_to_string(&path).map_err(|e| PackageError::io(&path, e))?;
        let data: Map<String, Value> = serde_json::from_str(&content)?;
        Ok(Self { path, data })
    }

    /// Write the descriptor back to its path (pretty-printed, trailing newline)
    pub fn write(&self) -> Result<()> {
        let mut content = serde_json::to_string_pretty(&Value::Object(self.data.clone()))?;
        content.push('\n');
        std::fs::write(&self.path, content).map_err(|e| PackageError::io(&self.path, e))
    }

    /// Package name, if declared
    pub fn name(&self) -> Option<&str> {
        self.data.get("name").and_then(Value::as_str)
    }

    fn string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.data
            .get(key)
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `dependencies` as a name -> version-spec map
    pub fn dependencies(&self) -> BTreeMap<String, String> {
        self.string_map("dependencies")
    }

    /// `devDependencies` as a name -> version-spec map
    pub fn dev_dependencies(&self) -> BTreeMap<String, String> {
        self.string_map("devDependencies")
    }

    /// Declared executable entries, as paths relative to the package directory.
    ///
    /// `bin` is either a single relative path or a name -> path object.
    pub fn bins_iter(&self) -> Result<Vec<String>> {
        match self.data.get("bin") {
            None => Ok(Vec::new()),
            Some(Value::String(path)) => Ok(vec![path.clone()]),
            Some(Value::Object(map)) => {
                let mut bins = Vec::new();
                for (name, value) in map {
                    let path = value.as_str().ok_or_else(|| PackageError::InvalidField {
                        path: self.path.display().to_string(),
                        reason: format!("bin entry `{name}` is not a string"),
                    })?;
                    bins.push(path.to_string());
                }
                Ok(bins)
            }
            Some(other) => Err(PackageError::InvalidField {
                path: self.path.display().to_string(),
                reason: format!("unexpected `bin` value: {other}"),
            }),
        }
    }

    /// Map each dependency name to its installed location under `node_modules`
    pub fn dep_paths_by_names(&self) -> BTreeMap<String, PathBuf> {
        let base = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
            .join(NODE_MODULES_DIRNAME);

        let mut paths = BTreeMap::new();
        for name in self
            .dependencies()
            .into_keys()
            .chain(self.dev_dependencies().into_keys())
        {
            let path = base.join(&name);
            paths.insert(name, path);
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_pj(dir: &Path, content: &str) -> PathBuf {
        let path = package_json_path(dir);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_and_name() {
        let tmp = TempDir::new().unwrap();
        let path = write_pj(tmp.path(), r#"{"name": "@scope/pkg", "version": "1.0.0"}"#);
        let pj = PackageJson::load(path).unwrap();
        assert_eq!(pj.name(), Some("@scope/pkg"));
    }

    #[test]
    fn test_bins_iter_string() {
        let tmp = TempDir::new().unwrap();
        let path = write_pj(tmp.path(), r#"{"bin": "cli.js"}"#);
        let pj = PackageJson::load(path).unwrap();
        assert_eq!(pj.bins_iter().unwrap(), vec!["cli.js".to_string()]);
    }

    #[test]
    fn test_bins_iter_object() {
        let tmp = TempDir::new().unwrap();
        let path = write_pj(
            tmp.path(),
            r#"{"bin": {"tsc": "bin/tsc", "tsserver": "bin/tsserver"}}"#,
        );
        let pj = PackageJson::load(path).unwrap();
        let mut bins = pj.bins_iter().unwrap();
        bins.sort();
        assert_eq!(bins, vec!["bin/tsc".to_string(), "bin/tsserver".to_string()]);
    }

    #[test]
    fn test_bins_iter_missing() {
        let tmp = TempDir::new().unwrap();
        let path = write_pj(tmp.path(), r#"{"name": "x"}"#);
        let pj = PackageJson::load(path).unwrap();
        assert!(pj.bins_iter().unwrap().is_empty());
    }

    #[test]
    fn test_dep_paths_by_names() {
        let tmp = TempDir::new().unwrap();
        let path = write_pj(
            tmp.path(),
            r#"{"dependencies": {"left-pad": "1.0.0"}, "devDependencies": {"typescript": "5.0.0"}}"#,
        );
        let pj = PackageJson::load(path).unwrap();
        let paths = pj.dep_paths_by_names();
        assert_eq!(
            paths.get("left-pad"),
            Some(&tmp.path().join("node_modules/left-pad"))
        );
        assert_eq!(
            paths.get("typescript"),
            Some(&tmp.path().join("node_modules/typescript"))
        );
    }

    #[test]
    fn test_write_preserves_unknown_fields() {
        let tmp = TempDir::new().unwrap();
        let path = write_pj(tmp.path(), r#"{"name": "x", "customField": {"a": 1}}"#);
        let mut pj = PackageJson::load(&path).unwrap();
        pj.data
            .insert("version".into(), Value::String("0.0.0".into()));
        pj.write().unwrap();

        let reloaded = PackageJson::load(&path).unwrap();
        assert_eq!(reloaded.data.get("customField").unwrap()["a"], 1);
        assert_eq!(reloaded.data.get("version").unwrap(), "0.0.0");
    }
}
