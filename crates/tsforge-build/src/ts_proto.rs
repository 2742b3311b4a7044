//! Protobuf code generation via `protoc` with the `ts-proto` plugin
//!
//! The generator runs before the compiler builders: it copies `src/` into the
//! build directory up front (the generated output lands under `src/generated`
//! and would otherwise block the builder's own copy), pre-creates the output
//! directory (the plugin fails on a missing one), then invokes `protoc`.
//!
//! In auto mode the module has no hand-written package descriptor at all; the
//! generator synthesizes one, together with its TypeScript configs, from a
//! designated dependency-source module.

use crate::builder::resolve_bin;
use crate::error::{BuildError, BuildResult};
use crate::fsutil::copy_if_not_exists;
use crate::options::BuildOptions;
use crate::process::run_tool;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tsforge_package::lockfile::PNPM_LOCKFILE_FILENAME;
use tsforge_package::{package_json_path, PackageJson};

/// Options written out as `k=v` pairs; kept as literal pairs for the sake of
/// grepability, so it is easy to find where "oneof=unions" comes from.
const DEFAULT_TS_PROTO_OPT: &[&str] = &[
    "env=node",
    "exportCommonSymbols=false",
    "oneof=unions",
    "forceLong=long",
    "esModuleInterop=true",
];

/// Extra defaults applied only to synthesized (auto) packages
const DEFAULT_TS_PROTO_AUTO_OPT: &[&str] = &["importSuffix=.js"];

/// TypeScript configs an auto package borrows from its dependency source
const AUTO_TS_CONFIGS: &[&str] = &["tsconfig.json", "tsconfig.cjs.json", "tsconfig.esm.json"];

/// Generation parameters on top of the shared build options
#[derive(Debug, Clone)]
pub struct TsProtoOptions {
    /// Path to the protoc binary
    pub protoc_bin: PathBuf,
    /// Include paths passed as `-I`
    pub proto_paths: Vec<String>,
    /// `.proto` sources to generate from
    pub proto_srcs: Vec<String>,
    /// User-supplied `--ts_proto_opt` entries, each `k=v` or `k=v,k=v`
    pub ts_proto_opt: Vec<String>,
    /// Package-name pattern for auto packages, `*` replaced by the module name
    pub auto_package_name: Option<String>,
    /// Module-relative path of the auto-package dependency source
    pub auto_deps_path: Option<String>,
}

pub struct TsProtoGenerator<'a> {
    build: &'a BuildOptions,
    options: &'a TsProtoOptions,
}

impl<'a> TsProtoGenerator<'a> {
    pub fn new(build: &'a BuildOptions, options: &'a TsProtoOptions) -> Self {
        Self { build, options }
    }

    /// Both the name pattern and the dependency source must be set
    pub fn is_auto_package(&self) -> bool {
        self.options.auto_package_name.is_some() && self.options.auto_deps_path.is_some()
    }

    /// Lockfile of the auto-package dependency source, if in auto mode
    pub fn auto_deps_lockfile_path(&self) -> Option<PathBuf> {
        let deps_path = self.options.auto_deps_path.as_ref()?;
        Some(
            self.build
                .build_root
                .join(deps_path)
                .join(PNPM_LOCKFILE_FILENAME),
        )
    }

    /// Run the generation step: copy sources, create the output directory,
    /// invoke protoc
    pub fn generate(&self) -> BuildResult<()> {
        self.copy_src_dir()?;
        let out_dir = self.out_dir();
        fs::create_dir_all(&out_dir).map_err(|e| BuildError::io(&out_dir, e))?;
        self.exec_protoc()
    }

    /// Synthesize the auto package descriptor and its TypeScript configs
    pub fn generate_auto_package(&self) -> BuildResult<()> {
        if !self.is_auto_package() {
            return Ok(());
        }
        // is_auto_package() guarantees both fields
        let (Some(name_pattern), Some(deps_path)) = (
            self.options.auto_package_name.as_ref(),
            self.options.auto_deps_path.as_ref(),
        ) else {
            return Ok(());
        };

        let deps_build_dir = self.build.build_root.join(deps_path);
        let deps_pj = PackageJson::load(package_json_path(&deps_build_dir))?;

        let module_dir = &self.build.module_dir;
        let generated_name = module_dir.replace('/', "-");
        let mut pj = PackageJson::new(package_json_path(&self.build.build_dir));
        pj.data = auto_package_data(
            &name_pattern.replace('*', &generated_name),
            module_dir,
            &deps_pj,
        );
        pj.write()?;

        for ts_config in AUTO_TS_CONFIGS {
            copy_if_not_exists(
                &deps_build_dir.join(ts_config),
                &self.build.build_dir.join(ts_config),
            )?;
        }
        Ok(())
    }

    /// The CommonJS half of a dual build needs its own descriptor marking the
    /// directory as `commonjs`, or node treats the `.js` files as ESM
    pub fn generate_cjs_package_json(&self) -> BuildResult<()> {
        let cjs_out_dir = self.build.build_dir.join("build").join("cjs");
        if !cjs_out_dir.exists() {
            return Ok(());
        }
        let mut pj = PackageJson::new(package_json_path(&cjs_out_dir));
        pj.data = Map::from_iter([("type".to_string(), json!("commonjs"))]);
        Ok(pj.write()?)
    }

    fn copy_src_dir(&self) -> BuildResult<()> {
        let source_src = self.build.source_dir.join("src");
        if !source_src.exists() {
            return Ok(());
        }
        copy_if_not_exists(&source_src, &self.build.build_dir.join("src"))
    }

    fn out_dir(&self) -> PathBuf {
        self.build.build_dir.join("src").join("generated")
    }

    fn merged_opt(&self) -> BuildResult<String> {
        let mut merged = parse_opt_pairs(DEFAULT_TS_PROTO_OPT.iter().map(|s| s.to_string()))?;
        if self.is_auto_package() {
            merged.extend(parse_opt_pairs(
                DEFAULT_TS_PROTO_AUTO_OPT.iter().map(|s| s.to_string()),
            )?);
        }
        merged.extend(parse_opt_pairs(self.options.ts_proto_opt.iter().cloned())?);
        Ok(join_opt_pairs(&merged))
    }

    fn protoc_args(&self) -> BuildResult<Vec<String>> {
        let plugin = resolve_bin(
            &self.build.build_dir,
            "ts-proto",
            Some("protoc-gen-ts_proto"),
        )?;

        let mut args = vec![
            "--plugin".to_string(),
            plugin.display().to_string(),
            "--ts_proto_opt".to_string(),
            self.merged_opt()?,
            "--ts_proto_out".to_string(),
            self.out_dir().display().to_string(),
        ];
        args.extend(self.options.proto_paths.iter().map(|p| format!("-I={p}")));
        args.extend(self.options.proto_srcs.iter().cloned());
        Ok(args)
    }

    fn exec_protoc(&self) -> BuildResult<()> {
        // The plugin shells back out to node, so PATH is the one entry the
        // generator environment carries
        let mut env = BTreeMap::new();
        env.insert(
            "PATH".to_string(),
            self.build
                .node_bin
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .display()
                .to_string(),
        );

        let output = run_tool(
            &self.options.protoc_bin,
            &self.protoc_args()?,
            &env,
            &self.build.build_dir,
            self.build.verbose,
        )?;

        if !output.success() {
            return Err(BuildError::tool(
                &self.build.command,
                output.exit_code,
                output.stdout,
                output.stderr,
            ));
        }
        Ok(())
    }
}

fn auto_package_data(name: &str, module_dir: &str, deps_pj: &PackageJson) -> Map<String, Value> {
    let export_target = |flavor: &str, suffix: &str| {
        format!("./build/{flavor}/generated/{module_dir}/*.{suffix}")
    };
    let mut data = Map::new();
    data.insert("name".to_string(), json!(name));
    data.insert("version".to_string(), json!("0.0.0"));
    data.insert("type".to_string(), json!("module"));
    data.insert("files".to_string(), json!(["build/"]));
    data.insert(
        "dependencies".to_string(),
        json!(deps_pj.dependencies()),
    );
    data.insert(
        "devDependencies".to_string(),
        json!(deps_pj.dev_dependencies()),
    );
    data.insert(
        "exports".to_string(),
        json!({
            "./*": {
                "import": export_target("esm", "js"),
                "require": export_target("cjs", "js"),
                "types": export_target("types", "d.ts"),
                "default": export_target("esm", "js"),
            }
        }),
    );
    data
}

/// Parse `k=v` entries (or comma-joined `k=v,k=v` lists) into a map, later
/// entries winning
fn parse_opt_pairs(entries: impl Iterator<Item = String>) -> BuildResult<BTreeMap<String, String>> {
    let mut parsed = BTreeMap::new();
    for entry in entries {
        for pair in entry.split(',') {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                BuildError::config(format!("invalid ts_proto_opt entry `{pair}`, expected k=v"))
            })?;
            parsed.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(parsed)
}

fn join_opt_pairs(pairs: &BTreeMap<String, String>) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn build_options_in(tmp: &TempDir) -> BuildOptions {
        let source_dir = tmp.path().join("source/proto/api");
        let build_dir = tmp.path().join("build/proto/api");
        fs::create_dir_all(&source_dir).unwrap();
        fs::create_dir_all(&build_dir).unwrap();
        BuildOptions {
            module_dir: "proto/api".to_string(),
            source_dir,
            build_dir,
            build_root: tmp.path().join("build"),
            node_bin: PathBuf::from("/usr/bin/node"),
            command: "build-ts-proto".to_string(),
            verbose: false,
            env: Vec::new(),
            vcs_info: None,
            output_file: tmp.path().join("output.tar"),
            after_build: None,
            after_build_output_dir: None,
        }
    }

    fn auto_options() -> TsProtoOptions {
        TsProtoOptions {
            protoc_bin: PathBuf::from("/usr/bin/protoc"),
            proto_paths: vec![".".to_string()],
            proto_srcs: vec!["api.proto".to_string()],
            ts_proto_opt: Vec::new(),
            auto_package_name: Some("@scope/*".to_string()),
            auto_deps_path: Some("proto/deps".to_string()),
        }
    }

    #[test]
    fn test_merged_opt_defaults() {
        let tmp = TempDir::new().unwrap();
        let build = build_options_in(&tmp);
        let options = TsProtoOptions {
            auto_package_name: None,
            auto_deps_path: None,
            ..auto_options()
        };
        let generator = TsProtoGenerator::new(&build, &options);

        let opt = generator.merged_opt().unwrap();
        assert_eq!(
            opt,
            "env=node,esModuleInterop=true,exportCommonSymbols=false,forceLong=long,oneof=unions"
        );
    }

    #[test]
    fn test_merged_opt_user_overrides_and_auto_defaults() {
        let tmp = TempDir::new().unwrap();
        let build = build_options_in(&tmp);
        let mut options = auto_options();
        options.ts_proto_opt = vec!["forceLong=string,outputJsonMethods=false".to_string()];
        let generator = TsProtoGenerator::new(&build, &options);

        let opt = generator.merged_opt().unwrap();
        assert!(opt.contains("forceLong=string"));
        assert!(opt.contains("importSuffix=.js"));
        assert!(opt.contains("outputJsonMethods=false"));
        assert!(!opt.contains("forceLong=long"));
    }

    #[test]
    fn test_invalid_opt_entry() {
        let err = parse_opt_pairs(["no-equals-sign".to_string()].into_iter()).unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[test]
    fn test_auto_package_synthesis() {
        let tmp = TempDir::new().unwrap();
        let build = build_options_in(&tmp);
        let options = auto_options();

        let deps_dir = build.build_root.join("proto/deps");
        fs::create_dir_all(&deps_dir).unwrap();
        fs::write(
            package_json_path(&deps_dir),
            r#"{"name": "deps", "dependencies": {"long": "^5.0.0"}}"#,
        )
        .unwrap();
        for ts_config in AUTO_TS_CONFIGS {
            fs::write(deps_dir.join(ts_config), "{}").unwrap();
        }

        let generator = TsProtoGenerator::new(&build, &options);
        generator.generate_auto_package().unwrap();

        let pj = PackageJson::load(package_json_path(&build.build_dir)).unwrap();
        assert_eq!(pj.name().unwrap(), "@scope/proto-api");
        assert_eq!(pj.data["version"], json!("0.0.0"));
        assert_eq!(pj.data["type"], json!("module"));
        assert_eq!(pj.dependencies()["long"], "^5.0.0");
        assert_eq!(
            pj.data["exports"]["./*"]["require"],
            json!("./build/cjs/generated/proto/api/*.js")
        );
        assert_eq!(
            pj.data["exports"]["./*"]["types"],
            json!("./build/types/generated/proto/api/*.d.ts")
        );
        for ts_config in AUTO_TS_CONFIGS {
            assert!(build.build_dir.join(ts_config).exists());
        }
    }

    #[test]
    fn test_auto_package_keeps_existing_ts_configs() {
        let tmp = TempDir::new().unwrap();
        let build = build_options_in(&tmp);
        let options = auto_options();

        let deps_dir = build.build_root.join("proto/deps");
        fs::create_dir_all(&deps_dir).unwrap();
        fs::write(package_json_path(&deps_dir), r#"{"name": "deps"}"#).unwrap();
        for ts_config in AUTO_TS_CONFIGS {
            fs::write(deps_dir.join(ts_config), r#"{"from": "deps"}"#).unwrap();
        }
        fs::write(build.build_dir.join("tsconfig.json"), r#"{"from": "module"}"#).unwrap();

        let generator = TsProtoGenerator::new(&build, &options);
        generator.generate_auto_package().unwrap();

        let kept = fs::read_to_string(build.build_dir.join("tsconfig.json")).unwrap();
        assert_eq!(kept, r#"{"from": "module"}"#);
    }

    #[test]
    fn test_cjs_package_json_only_when_cjs_output_exists() {
        let tmp = TempDir::new().unwrap();
        let build = build_options_in(&tmp);
        let options = auto_options();
        let generator = TsProtoGenerator::new(&build, &options);

        generator.generate_cjs_package_json().unwrap();
        assert!(!build.build_dir.join("build/cjs/package.json").exists());

        fs::create_dir_all(build.build_dir.join("build/cjs")).unwrap();
        generator.generate_cjs_package_json().unwrap();
        let pj = PackageJson::load(build.build_dir.join("build/cjs/package.json")).unwrap();
        assert_eq!(pj.data["type"], json!("commonjs"));
    }

    #[test]
    fn test_auto_deps_lockfile_path() {
        let tmp = TempDir::new().unwrap();
        let build = build_options_in(&tmp);
        let options = auto_options();
        let generator = TsProtoGenerator::new(&build, &options);

        let lockfile = generator.auto_deps_lockfile_path().unwrap();
        assert_eq!(lockfile, build.build_root.join("proto/deps/pnpm-lock.yaml"));
    }
}
