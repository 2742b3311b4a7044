use crate::commands::{build_options, deps_config, package_manager, BundlerKind};
use crate::{BaseArgs, BundlerArgs, TsBuilderArgs};
use anyhow::Result;
use tsforge_build::{Builder, BundlerConfig, WorkspacePreparation};

pub fn run(
    base: &BaseArgs,
    ts: &TsBuilderArgs,
    bundler: &BundlerArgs,
    kind: BundlerKind,
    verbose: bool,
) -> Result<()> {
    let options = build_options(
        base,
        &ts.builder,
        kind.command(),
        ts.env.clone(),
        ts.vcs_info.clone(),
        verbose,
    )?;
    let pm = package_manager(base, &options)?;
    let workspace = WorkspacePreparation {
        pm: pm.as_ref(),
        source_dir: options.source_dir.clone(),
        config: deps_config(base, &ts.builder, None),
    };

    // The bundler config is addressed relative to the module directory
    let config_filename = bundler
        .bundler_config_path
        .strip_prefix(&options.source_dir)
        .unwrap_or(&bundler.bundler_config_path)
        .display()
        .to_string();

    let config = BundlerConfig {
        output_dirs: bundler.output_dirs.clone(),
        config_filename,
        ts_config_path: ts.tsconfigs[0].clone(),
    };
    let builder = match kind {
        BundlerKind::Webpack => Builder::webpack(&options, config),
        BundlerKind::Vite => Builder::vite(&options, config),
        BundlerKind::Rspack => Builder::rspack(&options, config),
    };

    builder.build(&workspace)?;
    Ok(builder.bundle()?)
}
