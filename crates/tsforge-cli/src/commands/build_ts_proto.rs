use crate::commands::{build_options, deps_config, package_manager};
use crate::{BaseArgs, TsBuilderArgs, TsProtoArgs};
use anyhow::Result;
use std::fs;
use tsforge_build::{
    bundle_dirs, prepare_workspace, union_out_dirs, Builder, TsConfig, TsProtoGenerator,
    TsProtoOptions, WorkspaceReady,
};

/// TypeScript configs an auto package builds with
const AUTO_TS_CONFIG_NAMES: &[&str] = &["tsconfig.cjs.json", "tsconfig.esm.json"];

pub fn run(
    base: &BaseArgs,
    ts: &TsBuilderArgs,
    proto: &TsProtoArgs,
    verbose: bool,
) -> Result<()> {
    let options = build_options(
        base,
        &ts.builder,
        "build-ts-proto",
        ts.env.clone(),
        ts.vcs_info.clone(),
        verbose,
    )?;
    let proto_options = TsProtoOptions {
        protoc_bin: proto.protoc_bin.clone(),
        proto_paths: proto.proto_paths.clone(),
        proto_srcs: proto.proto_srcs.clone(),
        ts_proto_opt: proto.ts_proto_opt.clone(),
        auto_package_name: proto.auto_package_name.clone(),
        auto_deps_path: proto.auto_deps_path.clone(),
    };
    let generator = TsProtoGenerator::new(&options, &proto_options);

    // Step 0 - synthesize package.json and tsconfigs (auto mode only)
    fs::create_dir_all(&options.build_dir)?;
    generator.generate_auto_package()?;

    // Step 1 - prepare the dependency workspace; the generation step already
    // needs the ts-proto plugin installed
    let pm = package_manager(base, &options)?;
    let auto_deps_dir = if generator.is_auto_package() {
        proto.auto_deps_path.clone()
    } else {
        None
    };
    prepare_workspace(
        pm.as_ref(),
        &options.source_dir,
        &options.build_dir,
        &deps_config(base, &ts.builder, auto_deps_dir),
    )?;

    // Step 2 - generate TypeScript sources from the protos
    generator.generate()?;

    // Step 3 - compile the generated sources
    let ts_configs = if generator.is_auto_package() {
        let ts_configs = load_configs(&options.build_dir, AUTO_TS_CONFIG_NAMES.iter().copied())?;
        for ts_config in &ts_configs {
            Builder::ts_proto_auto_tsc(&options, ts_config).build(&WorkspaceReady)?;
        }
        generator.generate_cjs_package_json()?;
        ts_configs
    } else {
        let ts_configs =
            load_configs(&options.source_dir, ts.tsconfigs.iter().map(String::as_str))?;
        for ts_config in &ts_configs {
            Builder::tsc(&options, ts_config, &ts.tsconfigs).build(&WorkspaceReady)?;
        }
        ts_configs
    };

    // Step 4 - create the output archive
    let output_dirs = union_out_dirs(&ts_configs)?;
    Ok(bundle_dirs(
        &output_dirs,
        &options.build_dir,
        &options.output_file,
    )?)
}

// Inlined on load so inherited out dirs survive into the union
fn load_configs<'a>(
    dir: &std::path::Path,
    names: impl Iterator<Item = &'a str>,
) -> Result<Vec<TsConfig>> {
    names
        .map(|name| Ok(Builder::load_ts_config(dir, name)?))
        .collect()
}
