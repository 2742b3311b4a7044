//! Build invocation options
//!
//! `BuildOptions` is constructed once per invocation and read-only
//! thereafter. Derived locations (`source_dir`, `build_dir`) are computed at
//! construction time instead of mutated in later.

use crate::error::{BuildError, BuildResult};
use std::path::{Path, PathBuf};

/// Environment variable overriding the configured verbosity flag
pub const VERBOSE_ENV_VAR: &str = "TSFORGE_VERBOSE";

/// Delimiter separating pre-joined after-build script arguments
pub const AFTER_BUILD_ARGS_DELIMITER: &str = "<~~~>";

/// Optional post-build script invocation
#[derive(Debug, Clone)]
pub struct AfterBuild {
    /// Path of the script to run after the build
    pub script: PathBuf,
    /// Delimiter-joined argument string
    pub args: String,
}

impl AfterBuild {
    /// Split the joined argument string into an argument list
    pub fn args_list(&self) -> Vec<String> {
        if self.args.is_empty() {
            return Vec::new();
        }
        self.args
            .split(AFTER_BUILD_ARGS_DELIMITER)
            .map(str::to_string)
            .collect()
    }
}

/// Immutable configuration for one build invocation
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Module path relative to the monorepo root
    pub module_dir: String,
    /// Absolute path of the module's source directory
    pub source_dir: PathBuf,
    /// Absolute path of the module's isolated build directory
    pub build_dir: PathBuf,
    /// Root of the temporary build tree
    pub build_root: PathBuf,
    /// Path to the runtime executable (`node`)
    pub node_bin: PathBuf,
    /// Command name, used in error reports
    pub command: String,
    /// Echo executed commands and captured output
    pub verbose: bool,
    /// `KEY=VALUE` environment overrides, later entries win
    pub env: Vec<String>,
    /// VCS metadata file (relative to the build directory), re-exposed as
    /// `VCS_INFO_*` environment entries
    pub vcs_info: Option<String>,
    /// Absolute path of the produced artifact
    pub output_file: PathBuf,
    /// Optional post-build script
    pub after_build: Option<AfterBuild>,
    /// Output directory of the post-build script. Tracked independently of
    /// the script itself: a stale copy in the source tree must never be
    /// staged, even when the script is not configured for this run.
    pub after_build_output_dir: Option<String>,
}

impl BuildOptions {
    /// Derive the per-invocation directories from the root paths.
    ///
    /// The build directory and the source directory are always distinct;
    /// nothing is ever built in place.
    pub fn derive_dirs(
        source_root: &Path,
        build_root: &Path,
        module_dir: &str,
    ) -> BuildResult<(PathBuf, PathBuf)> {
        let source_dir = source_root.join(module_dir);
        let build_dir = build_root.join(module_dir);
        if source_dir == build_dir {
            return Err(BuildError::config(format!(
                "source and build directories must differ, both are {}",
                source_dir.display()
            )));
        }
        Ok((source_dir, build_dir))
    }

    /// Apply the environment verbosity override to a configured flag
    pub fn verbose_with_env_override(flag: bool) -> bool {
        match std::env::var(VERBOSE_ENV_VAR) {
            Ok(value) => {
                matches!(value.to_lowercase().as_str(), "1" | "yes" | "on" | "true")
            }
            Err(_) => flag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_derive_dirs() {
        let (source_dir, build_dir) =
            BuildOptions::derive_dirs(Path::new("/repo"), Path::new("/build"), "a/b").unwrap();
        assert_eq!(source_dir, PathBuf::from("/repo/a/b"));
        assert_eq!(build_dir, PathBuf::from("/build/a/b"));
    }

    #[test]
    fn test_derive_dirs_rejects_in_place_build() {
        let err = BuildOptions::derive_dirs(Path::new("/repo"), Path::new("/repo"), "a/b")
            .unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[rstest]
    #[case("--fast<~~~>--out dist", vec!["--fast", "--out dist"])]
    #[case("--single", vec!["--single"])]
    #[case("", vec![])]
    fn test_after_build_args_list(#[case] args: &str, #[case] expected: Vec<&str>) {
        let after = AfterBuild {
            script: PathBuf::from("post.js"),
            args: args.to_string(),
        };
        assert_eq!(after.args_list(), expected);
    }
}
