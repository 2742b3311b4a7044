use crate::commands::{build_options, deps_config, package_manager};
use crate::{BaseArgs, TsBuilderArgs};
use anyhow::Result;
use tsforge_build::{
    bundle_dirs, union_out_dirs, Builder, WorkspaceInstaller, WorkspacePreparation,
    WorkspaceReady,
};

pub fn run(base: &BaseArgs, args: &TsBuilderArgs, verbose: bool) -> Result<()> {
    let options = build_options(
        base,
        &args.builder,
        "build-tsc",
        args.env.clone(),
        args.vcs_info.clone(),
        verbose,
    )?;
    let pm = package_manager(base, &options)?;
    let workspace = WorkspacePreparation {
        pm: pm.as_ref(),
        source_dir: options.source_dir.clone(),
        config: deps_config(base, &args.builder, None),
    };

    // Configs are inlined on load so inherited out dirs are visible
    let ts_configs = args
        .tsconfigs
        .iter()
        .map(|tc| Builder::load_ts_config(&options.source_dir, tc))
        .collect::<Result<Vec<_>, _>>()?;
    let mut output_dirs = union_out_dirs(&ts_configs)?;

    // The workspace is prepared once, by the first config's build
    for (index, ts_config) in ts_configs.iter().enumerate() {
        let builder = Builder::tsc(&options, ts_config, &args.tsconfigs);
        let installer: &dyn WorkspaceInstaller = if index == 0 {
            &workspace
        } else {
            &WorkspaceReady
        };
        builder.build(installer)?;
    }

    if options.after_build.is_some() {
        Builder::tsc(&options, &ts_configs[0], &args.tsconfigs).run_after_build()?;
        if let Some(dir) = &options.after_build_output_dir {
            output_dirs.push(dir.clone());
        }
    }

    Ok(bundle_dirs(
        &output_dirs,
        &options.build_dir,
        &options.output_file,
    )?)
}
