//! Deterministic artifact bundling
//!
//! Output directories are packed into a single uncompressed tar archive with
//! normalized relative entry names, a fixed modification timestamp and sorted
//! traversal order, so byte-identical inputs produce byte-identical archives.
//! The surrounding build system relies on this for content-hash caching.

use crate::error::{BuildError, BuildResult};
use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tar::{Builder as TarBuilder, EntryType, Header};
use tsforge_package::normalize_out_dir;
use walkdir::WalkDir;

/// Pack the listed build-directory subdirectories into one archive at
/// `bundle_path`. An empty `output_dirs` is a configuration error.
pub fn bundle_dirs(
    output_dirs: &[String],
    build_dir: &Path,
    bundle_path: &Path,
) -> BuildResult<()> {
    if output_dirs.is_empty() {
        return Err(BuildError::config(
            "no output directories declared for bundling",
        ));
    }

    if let Some(parent) = bundle_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    let file = File::create(bundle_path).map_err(|e| BuildError::io(bundle_path, e))?;
    let mut tar = TarBuilder::new(file);

    for output_dir in output_dirs {
        let arcname = normalize_out_dir(output_dir);
        let root = build_dir.join(&arcname);

        for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| BuildError::io(&root, e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&root)
                .expect("walkdir yields paths under its root");
            let name = Path::new(&arcname).join(relative);
            let metadata = entry
                .metadata()
                .map_err(|e| BuildError::io(entry.path(), e.into()))?;

            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(metadata.len());
            header.set_mode(metadata.permissions().mode() & 0o7777);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);

            let reader =
                File::open(entry.path()).map_err(|e| BuildError::io(entry.path(), e))?;
            tar.append_data(&mut header, &name, reader)
                .map_err(|e| BuildError::io(bundle_path, e))?;
        }
    }

    tar.finish().map_err(|e| BuildError::io(bundle_path, e))
}
