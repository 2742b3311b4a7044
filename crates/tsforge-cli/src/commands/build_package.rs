use crate::commands::{build_options, deps_config, package_manager};
use crate::{BaseArgs, BuilderArgs};
use anyhow::Result;
use tsforge_build::{Builder, WorkspacePreparation};

pub fn run(
    base: &BaseArgs,
    args: &BuilderArgs,
    output_dirs: &[String],
    verbose: bool,
) -> Result<()> {
    let options = build_options(base, args, "build-package", Vec::new(), None, verbose)?;
    let pm = package_manager(base, &options)?;
    let workspace = WorkspacePreparation {
        pm: pm.as_ref(),
        source_dir: options.source_dir.clone(),
        config: deps_config(base, args, None),
    };

    let builder = Builder::package_passthrough(&options, output_dirs.to_vec());
    builder.build(&workspace)?;

    // A passthrough module may have nothing to bundle at all
    let has_after_build_output =
        options.after_build.is_some() && options.after_build_output_dir.is_some();
    if !output_dirs.is_empty() || has_after_build_output {
        builder.bundle()?;
    }
    Ok(())
}
