//! Filesystem helpers for staging and materialization
//!
//! Copies preserve file modes and overwrite existing destinations, so
//! re-staging an already-populated build directory is idempotent.

use crate::error::{BuildError, BuildResult};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Copy a file or directory tree from `src` to `dst`, preserving modes
pub fn recursive_copy(src: &Path, dst: &Path) -> BuildResult<()> {
    let metadata = fs::metadata(src).map_err(|e| BuildError::io(src, e))?;

    if metadata.is_file() {
        copy_file(src, dst)?;
        return Ok(());
    }

    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| BuildError::io(src, e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir yields paths under its root");
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| BuildError::io(&target, e))?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn copy_file(src: &Path, dst: &Path) -> BuildResult<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    // fs::copy carries permission bits over
    fs::copy(src, dst).map_err(|e| BuildError::io(src, e))?;
    Ok(())
}

/// Copy `src` to `dst` unless the destination already exists
pub fn copy_if_not_exists(src: &Path, dst: &Path) -> BuildResult<()> {
    if dst.exists() {
        return Ok(());
    }
    recursive_copy(src, dst)
}

/// Hard-link `src` at `dst`, falling back to a plain copy across devices
pub fn hardlink_or_copy(src: &Path, dst: &Path) -> BuildResult<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    if fs::hard_link(src, dst).is_err() {
        fs::copy(src, dst).map_err(|e| BuildError::io(src, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_recursive_copy_tree() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.txt"), "a").unwrap();
        fs::write(src.join("nested/b.txt"), "b").unwrap();

        let dst = tmp.path().join("dst");
        recursive_copy(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dst.join("nested/b.txt")).unwrap(), "b");
    }

    #[test]
    fn test_recursive_copy_preserves_mode() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("tool.sh");
        fs::write(&src, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o755)).unwrap();

        let dst = tmp.path().join("copy.sh");
        recursive_copy(&src, &dst).unwrap();

        let mode = fs::metadata(&dst).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_recursive_copy_overwrites() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        let dst = tmp.path().join("b.txt");
        fs::write(&src, "new").unwrap();
        fs::write(&dst, "old").unwrap();

        recursive_copy(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(&dst).unwrap(), "new");
    }

    #[test]
    fn test_copy_if_not_exists_skips_existing() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        let dst = tmp.path().join("b.txt");
        fs::write(&src, "new").unwrap();
        fs::write(&dst, "kept").unwrap();

        copy_if_not_exists(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(&dst).unwrap(), "kept");
    }

    #[test]
    fn test_hardlink_or_copy() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("pkg.tgz");
        fs::write(&src, "bytes").unwrap();

        let dst = tmp.path().join("store/deep/pkg.tgz");
        hardlink_or_copy(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(&dst).unwrap(), "bytes");
    }
}
