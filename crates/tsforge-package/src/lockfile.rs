//! Lockfile model and parsers
//!
//! The pipeline only needs each resolved package's tarball identity: a
//! store-relative tarball path plus a content URI that resolves to a location
//! in the shared resource root. Several lockfile keys may point at the same
//! tarball; callers deduplicate by `tarball_path` before materializing.

use crate::{PackageError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const PNPM_LOCKFILE_FILENAME: &str = "pnpm-lock.yaml";
pub const NPM_LOCKFILE_FILENAME: &str = "package-lock.json";

/// Resolved dependency set of one module
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lockfile {
    pub packages: Vec<LockedPackage>,
}

impl Lockfile {
    /// Packages keyed by tarball path, later duplicates discarded
    pub fn packages_by_tarball_path(&self) -> BTreeMap<&str, &LockedPackage> {
        let mut map = BTreeMap::new();
        for pkg in &self.packages {
            map.entry(pkg.tarball_path.as_str()).or_insert(pkg);
        }
        map
    }
}

/// One resolved package's tarball identity
#[derive(Debug, Clone, PartialEq)]
pub struct LockedPackage {
    /// Path of the tarball relative to the tarball store
    pub tarball_path: String,
    /// Content URI the tarball was resolved from
    pub uri: String,
}

impl LockedPackage {
    /// Content-addressed resource id extracted from the URI.
    ///
    /// `sbr:<id>` URIs yield `<id>`; URL-shaped URIs fall back to their last
    /// path segment.
    pub fn resource_id(&self) -> &str {
        if let Some(id) = self.uri.strip_prefix("sbr:") {
            return id;
        }
        self.uri
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.uri)
    }
}

// pnpm-lock.yaml, reduced to the fields the builder consumes

#[derive(Debug, Deserialize)]
struct PnpmLockfile {
    #[serde(default)]
    packages: BTreeMap<String, PnpmPackage>,
}

#[derive(Debug, Deserialize)]
struct PnpmPackage {
    #[serde(default)]
    resolution: Option<PnpmResolution>,
}

#[derive(Debug, Deserialize)]
struct PnpmResolution {
    #[serde(default)]
    tarball: Option<String>,
}

/// Parse a `pnpm-lock.yaml`.
///
/// Entries without a tarball resolution (workspace links) are skipped. The
/// store-relative path is derived from the package key with `/` replaced by
/// `+`, e.g. `@scope/name@1.0.0` becomes `@scope+name@1.0.0.tgz`.
pub fn load_pnpm_lockfile(path: &Path) -> Result<Lockfile> {
    let content = std::fs::read_to_string(path).map_err(|e| PackageError::io(path, e))?;
    let raw: PnpmLockfile = serde_yaml::from_str(&content)?;

    let mut packages = Vec::new();
    for (key, pkg) in raw.packages {
        let Some(tarball) = pkg.resolution.and_then(|r| r.tarball) else {
            continue;
        };
        let key = key.trim_start_matches('/');
        packages.push(LockedPackage {
            tarball_path: format!("{}.tgz", key.replace('/', "+")),
            uri: tarball,
        });
    }
    Ok(Lockfile { packages })
}

// package-lock.json, same reduction

#[derive(Debug, Deserialize)]
struct NpmLockfile {
    #[serde(default)]
    packages: BTreeMap<String, NpmPackage>,
}

#[derive(Debug, Deserialize)]
struct NpmPackage {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    resolved: Option<String>,
}

/// Parse a `package-lock.json`
pub fn load_npm_lockfile(path: &Path) -> Result<Lockfile> {
    let content = std::fs::read_to_string(path).map_err(|e| PackageError::io(path, e))?;
    let raw: NpmLockfile = serde_json::from_str(&content)?;

    let mut packages = Vec::new();
    for (key, pkg) in raw.packages {
        let (Some(version), Some(resolved)) = (pkg.version, pkg.resolved) else {
            continue;
        };
        // Keys look like "node_modules/@scope/name", possibly nested
        let Some(name) = key.rsplit("node_modules/").next().filter(|n| !n.is_empty())
        else {
            continue;
        };
        packages.push(LockedPackage {
            tarball_path: format!("{}@{}.tgz", name.replace('/', "+"), version),
            uri: resolved,
        });
    }
    Ok(Lockfile { packages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("sbr:123456", "123456")]
    #[case(
        "https://registry.example.com/left-pad/-/left-pad-1.3.0.tgz",
        "left-pad-1.3.0.tgz"
    )]
    #[case("https://registry.example.com/left-pad/", "left-pad")]
    fn test_resource_id(#[case] uri: &str, #[case] expected: &str) {
        let pkg = LockedPackage {
            tarball_path: "a.tgz".into(),
            uri: uri.into(),
        };
        assert_eq!(pkg.resource_id(), expected);
    }

    #[test]
    fn test_load_pnpm_lockfile() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(PNPM_LOCKFILE_FILENAME);
        std::fs::write(
            &path,
            r#"
lockfileVersion: "9.0"
packages:
  "@scope/name@1.0.0":
    resolution:
      integrity: sha512-abc
      tarball: "sbr:111"
  "left-pad@1.3.0":
    resolution:
      tarball: "sbr:222"
  "linked-pkg@0.0.1":
    resolution:
      integrity: sha512-def
"#,
        )
        .unwrap();

        let lf = load_pnpm_lockfile(&path).unwrap();
        assert_eq!(lf.packages.len(), 2);
        let by_path = lf.packages_by_tarball_path();
        assert_eq!(by_path["@scope+name@1.0.0.tgz"].uri, "sbr:111");
        assert_eq!(by_path["left-pad@1.3.0.tgz"].uri, "sbr:222");
    }

    #[test]
    fn test_packages_by_tarball_path_dedup() {
        let lf = Lockfile {
            packages: vec![
                LockedPackage {
                    tarball_path: "a.tgz".into(),
                    uri: "sbr:1".into(),
                },
                LockedPackage {
                    tarball_path: "a.tgz".into(),
                    uri: "sbr:1".into(),
                },
                LockedPackage {
                    tarball_path: "b.tgz".into(),
                    uri: "sbr:2".into(),
                },
            ],
        };
        assert_eq!(lf.packages_by_tarball_path().len(), 2);
    }

    #[test]
    fn test_load_npm_lockfile() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(NPM_LOCKFILE_FILENAME);
        std::fs::write(
            &path,
            r#"{
  "packages": {
    "": {"name": "root"},
    "node_modules/@scope/name": {
      "version": "1.0.0",
      "resolved": "https://registry.example.com/@scope/name/-/name-1.0.0.tgz"
    }
  }
}"#,
        )
        .unwrap();

        let lf = load_npm_lockfile(&path).unwrap();
        assert_eq!(lf.packages.len(), 1);
        assert_eq!(lf.packages[0].tarball_path, "@scope+name@1.0.0.tgz");
    }
}
