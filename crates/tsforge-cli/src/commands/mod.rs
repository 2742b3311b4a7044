//! Command implementations and shared invocation plumbing

pub mod build_bundler;
pub mod build_package;
pub mod build_ts_proto;
pub mod build_tsc;
pub mod prepare_deps;

use crate::{BaseArgs, BuilderArgs};
use anyhow::Result;
use tsforge_build::{AfterBuild, BuildOptions, DepsConfig};
use tsforge_package::{package_manager_for, PackageManager, PmContext, PmKind};

/// Bundler selector for the shared bundler command body
#[derive(Debug, Clone, Copy)]
pub enum BundlerKind {
    Webpack,
    Vite,
    Rspack,
}

impl BundlerKind {
    pub fn command(&self) -> &'static str {
        match self {
            Self::Webpack => "build-webpack",
            Self::Vite => "build-vite",
            Self::Rspack => "build-rspack",
        }
    }
}

/// Resolve the full `BuildOptions` for one build command
pub fn build_options(
    base: &BaseArgs,
    builder: &BuilderArgs,
    command: &str,
    env: Vec<String>,
    vcs_info: Option<String>,
    verbose: bool,
) -> Result<BuildOptions> {
    let (source_dir, build_dir) =
        BuildOptions::derive_dirs(&base.source_root, &base.build_root, &base.module_dir)?;

    let after_build = match (&builder.after_build_js, builder.with_after_build) {
        (Some(script), true) => Some(AfterBuild {
            script: script.clone(),
            args: builder.after_build_args.clone().unwrap_or_default(),
        }),
        _ => None,
    };

    Ok(BuildOptions {
        module_dir: base.module_dir.clone(),
        source_dir,
        build_dir,
        build_root: base.build_root.clone(),
        node_bin: base.node_bin.clone(),
        command: command.to_string(),
        verbose,
        env,
        vcs_info,
        output_file: builder.output_file.clone(),
        after_build,
        // Staged-source exclusion applies even when the script is off
        after_build_output_dir: builder.after_build_outdir.clone(),
    })
}

/// Select the package-manager driver from the configured type tag
pub fn package_manager(
    base: &BaseArgs,
    options: &BuildOptions,
) -> Result<Box<dyn PackageManager>> {
    let kind: PmKind = base.pm_type.parse()?;
    Ok(package_manager_for(
        kind,
        PmContext {
            build_root: base.build_root.clone(),
            build_path: options.build_dir.clone(),
            sources_path: options.source_dir.clone(),
            node_bin: base.node_bin.clone(),
            script_path: base.pm_script.clone(),
        },
    ))
}

/// Workspace-preparation config for a build command
pub fn deps_config(
    base: &BaseArgs,
    builder: &BuilderArgs,
    ts_proto_auto_deps_dir: Option<String>,
) -> DepsConfig {
    DepsConfig {
        tarballs_store: builder.tarballs_store.clone(),
        resource_root: builder.resource_root.clone(),
        ts_proto_auto_deps_dir,
        local_mode: base.local_cli,
    }
}
