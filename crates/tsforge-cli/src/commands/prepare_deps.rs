use crate::BaseArgs;
use anyhow::Result;
use std::path::Path;
use tsforge_build::{prepare_workspace, BuildOptions, DepsConfig};
use tsforge_package::{package_manager_for, PmContext, PmKind};

pub fn run(
    base: &BaseArgs,
    tarballs_store: &str,
    resource_root: Option<&Path>,
    ts_proto_auto_deps_path: Option<&str>,
) -> Result<()> {
    let (source_dir, build_dir) =
        BuildOptions::derive_dirs(&base.source_root, &base.build_root, &base.module_dir)?;

    let kind: PmKind = base.pm_type.parse()?;
    let pm = package_manager_for(
        kind,
        PmContext {
            build_root: base.build_root.clone(),
            build_path: build_dir.clone(),
            sources_path: source_dir.clone(),
            node_bin: base.node_bin.clone(),
            script_path: base.pm_script.clone(),
        },
    );

    let config = DepsConfig {
        tarballs_store: tarballs_store.to_string(),
        resource_root: resource_root.map(Path::to_path_buf),
        ts_proto_auto_deps_dir: ts_proto_auto_deps_path.map(str::to_string),
        local_mode: base.local_cli,
    };
    Ok(prepare_workspace(pm.as_ref(), &source_dir, &build_dir, &config)?)
}
