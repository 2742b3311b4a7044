//! Build orchestration for frontend modules
//!
//! Provides the isolated-build pipeline for TypeScript and protobuf modules:
//! - Staging sources into per-module build directories
//! - Dependency workspace preparation from lockfile and tarball store
//! - Builder variants (tsc, webpack, vite, rspack, package passthrough)
//! - Protobuf code generation with the ts-proto plugin
//! - Output validation and deterministic artifact bundling

pub mod builder;
pub mod bundle;
pub mod deps;
pub mod error;
pub mod fsutil;
pub mod options;
pub mod process;
pub mod ts_proto;

// Re-export main types
pub use builder::{
    resolve_bin, union_out_dirs, Builder, BundlerConfig, PhaseTimings, ScriptSource, Strategy,
    WorkspaceInstaller, WorkspaceReady,
};
pub use bundle::bundle_dirs;
pub use deps::{copy_tarballs, prepare_workspace, DepsConfig, WorkspacePreparation};
pub use error::{BuildError, BuildResult};
pub use options::{AfterBuild, BuildOptions, AFTER_BUILD_ARGS_DELIMITER, VERBOSE_ENV_VAR};
pub use process::{command_line, run_tool, ExecOutput};
pub use ts_proto::{TsProtoGenerator, TsProtoOptions};

// Re-export tsforge-package types for convenience
pub use tsforge_package::{PackageJson, TsConfig};
