//! Dependency workspace preparation
//!
//! Two mutually exclusive modes:
//! - proto-auto: reuse another module's already-prepared dependency tree;
//! - default: materialize the module's own workspace from its lockfile, then
//!   (outside local mode) populate the local tarball store from the shared
//!   resource root.
//!
//! Tarball materialization is idempotent: existing store entries are kept
//! as-is and the lockfile is deduplicated by tarball path first.

use crate::builder::WorkspaceInstaller;
use crate::error::{BuildError, BuildResult};
use crate::fsutil::hardlink_or_copy;
use std::path::{Path, PathBuf};
use tsforge_package::{Lockfile, PackageManager};

/// Workspace-preparation parameters
#[derive(Debug, Clone)]
pub struct DepsConfig {
    /// Tarball store location, relative to the build directory
    pub tarballs_store: String,
    /// Root of the shared content-addressed resource tree
    pub resource_root: Option<PathBuf>,
    /// Build-root-relative path of a proto-auto dependency module
    pub ts_proto_auto_deps_dir: Option<String>,
    /// Fetch tarballs on demand instead of reading the store
    pub local_mode: bool,
}

/// Prepare the dependency workspace for one module
pub fn prepare_workspace(
    pm: &dyn PackageManager,
    source_dir: &Path,
    build_dir: &Path,
    config: &DepsConfig,
) -> BuildResult<()> {
    if let Some(deps_dir) = &config.ts_proto_auto_deps_dir {
        return Ok(pm.build_ts_proto_auto_workspace(deps_dir)?);
    }

    pm.build_workspace(&config.tarballs_store, config.local_mode)?;
    if !config.local_mode {
        let resource_root = config.resource_root.as_deref().ok_or_else(|| {
            BuildError::config("resource root is required outside local mode")
        })?;
        let lockfile = pm.load_lockfile_from_dir(source_dir)?;
        copy_tarballs(
            &lockfile,
            resource_root,
            &build_dir.join(&config.tarballs_store),
        )?;
    }
    Ok(())
}

/// Hard-link (or copy) every distinct tarball the lockfile references from
/// the resource root into the local store
pub fn copy_tarballs(
    lockfile: &Lockfile,
    resource_root: &Path,
    store_dir: &Path,
) -> BuildResult<()> {
    for (tarball_path, pkg) in lockfile.packages_by_tarball_path() {
        let local = store_dir.join(tarball_path);
        if local.exists() {
            continue;
        }
        let resource = resource_root
            .join("http")
            .join(pkg.resource_id())
            .join("resource");
        hardlink_or_copy(&resource, &local)?;
    }
    Ok(())
}

/// `WorkspaceInstaller` backed by a package-manager driver; this is what the
/// staging phase runs in production flows
pub struct WorkspacePreparation<'a> {
    pub pm: &'a dyn PackageManager,
    pub source_dir: PathBuf,
    pub config: DepsConfig,
}

impl WorkspaceInstaller for WorkspacePreparation<'_> {
    fn install(&self, build_dir: &Path) -> BuildResult<()> {
        prepare_workspace(self.pm, &self.source_dir, build_dir, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tsforge_package::LockedPackage;

    fn lockfile_with_duplicate() -> Lockfile {
        Lockfile {
            packages: vec![
                LockedPackage {
                    tarball_path: "left-pad@1.3.0.tgz".into(),
                    uri: "sbr:111".into(),
                },
                LockedPackage {
                    tarball_path: "left-pad@1.3.0.tgz".into(),
                    uri: "sbr:111".into(),
                },
                LockedPackage {
                    tarball_path: "@scope+name@1.0.0.tgz".into(),
                    uri: "sbr:222".into(),
                },
            ],
        }
    }

    fn seed_resources(root: &Path) {
        for id in ["111", "222"] {
            let dir = root.join("http").join(id);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("resource"), id).unwrap();
        }
    }

    #[test]
    fn test_copy_tarballs_dedups_and_places_by_path() {
        let tmp = TempDir::new().unwrap();
        let resource_root = tmp.path().join("resources");
        seed_resources(&resource_root);
        let store = tmp.path().join("build/module/store");

        copy_tarballs(&lockfile_with_duplicate(), &resource_root, &store).unwrap();

        assert_eq!(
            fs::read_to_string(store.join("left-pad@1.3.0.tgz")).unwrap(),
            "111"
        );
        assert_eq!(
            fs::read_to_string(store.join("@scope+name@1.0.0.tgz")).unwrap(),
            "222"
        );
        assert_eq!(fs::read_dir(&store).unwrap().count(), 2);
    }

    #[test]
    fn test_copy_tarballs_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let resource_root = tmp.path().join("resources");
        seed_resources(&resource_root);
        let store = tmp.path().join("store");

        let lockfile = lockfile_with_duplicate();
        copy_tarballs(&lockfile, &resource_root, &store).unwrap();
        copy_tarballs(&lockfile, &resource_root, &store).unwrap();

        assert_eq!(fs::read_dir(&store).unwrap().count(), 2);
    }

    #[test]
    fn test_copy_tarballs_keeps_existing_entries() {
        let tmp = TempDir::new().unwrap();
        let resource_root = tmp.path().join("resources");
        seed_resources(&resource_root);
        let store = tmp.path().join("store");
        fs::create_dir_all(&store).unwrap();
        fs::write(store.join("left-pad@1.3.0.tgz"), "already-there").unwrap();

        copy_tarballs(&lockfile_with_duplicate(), &resource_root, &store).unwrap();
        assert_eq!(
            fs::read_to_string(store.join("left-pad@1.3.0.tgz")).unwrap(),
            "already-there"
        );
    }
}
