//! Package descriptors, TypeScript configs and lockfiles
//!
//! Capabilities consumed by the build pipeline:
//! - `package.json` descriptors (`PackageJson`)
//! - `tsconfig.json` files with `extends` inlining (`TsConfig`)
//! - package-manager lockfiles (`Lockfile`, `LockedPackage`)
//! - the package-manager driver seam (`PackageManager`)

pub mod lockfile;
pub mod manager;
pub mod package_json;
pub mod ts_config;

pub use lockfile::{Lockfile, LockedPackage};
pub use manager::{package_manager_for, PackageManager, PmContext, PmKind};
pub use package_json::{package_json_path, PackageJson};
pub use ts_config::{normalize_out_dir, TsConfig};

/// Package capability errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse lockfile: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error at {path}: {error}")]
    Io {
        path: std::path::PathBuf,
        error: std::io::Error,
    },

    #[error("Unknown package manager type: {0}")]
    UnknownManager(String),

    #[error("Package manager `{command}` failed with exit code {exit_code}: {stderr}")]
    InstallFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Cannot resolve `extends: {reference}` in {config}: package not found in dependencies")]
    UnresolvedExtends { reference: String, config: String },

    #[error("Invalid field in {path}: {reason}")]
    InvalidField { path: String, reason: String },
}

impl PackageError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<std::path::PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }
}

pub type Result<T> = std::result::Result<T, PackageError>;
