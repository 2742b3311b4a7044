//! Builder pipeline and its variants
//!
//! One configuration-driven pipeline covers every builder variant; a variant
//! is just a strategy record (script source, argument list, diagnostic output
//! macro, whether the tsconfig rewrite is skipped). All variants share the
//! same phase ordering: stage, build, validate, fix bin permissions, optional
//! after-build script. Bundling runs last, only after validation passed.

use crate::bundle::bundle_dirs;
use crate::error::{BuildError, BuildResult};
use crate::fsutil::recursive_copy;
use crate::options::BuildOptions;
use crate::process::run_tool;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tsforge_package::package_json::NODE_MODULES_DIRNAME;
use tsforge_package::{normalize_out_dir, package_json_path, PackageJson, TsConfig};

/// Bookkeeping files of the surrounding build system, never staged
const WORKSPACE_BUNDLE_FILENAME: &str = "workspace_node_modules.tar";
const OUTPUT_TAR_UUID_FILENAME: &str = "output.tar.uuid";

/// Seam through which staging materializes the dependency workspace
pub trait WorkspaceInstaller {
    fn install(&self, build_dir: &Path) -> BuildResult<()>;
}

/// Installer for flows where the workspace was already materialized by an
/// earlier step of the same invocation
pub struct WorkspaceReady;

impl WorkspaceInstaller for WorkspaceReady {
    fn install(&self, _build_dir: &Path) -> BuildResult<()> {
        Ok(())
    }
}

/// Where a variant's build script comes from
#[derive(Debug, Clone)]
pub enum ScriptSource {
    /// A bin declared by an installed dependency
    PackageBin {
        package: &'static str,
        bin: Option<&'static str>,
    },
    /// No tool invocation (package passthrough)
    None,
}

/// Per-variant strategy record
#[derive(Debug, Clone)]
pub struct Strategy {
    pub script: ScriptSource,
    pub args: Vec<String>,
    /// Configuration macro named in the missing-output-directory diagnostic
    pub output_macro: Option<&'static str>,
    pub skip_config_rewrite: bool,
}

/// Bundler-variant parameters shared by webpack, vite and rspack
#[derive(Debug, Clone)]
pub struct BundlerConfig {
    /// Output directories the bundler is declared to produce
    pub output_dirs: Vec<String>,
    /// Bundler config filename, relative to the module directory
    pub config_filename: String,
    /// tsconfig rewritten into the build directory
    pub ts_config_path: String,
}

/// Wall-clock duration of each pipeline phase
#[derive(Debug, Default, Clone)]
pub struct PhaseTimings {
    pub stage: Duration,
    pub build: Duration,
    pub validate: Duration,
    pub post: Duration,
}

/// The builder pipeline for one variant
pub struct Builder<'a> {
    options: &'a BuildOptions,
    strategy: Strategy,
    output_dirs: Vec<String>,
    /// tsconfig path, relative to the directory it is rewritten from
    ts_config_path: Option<String>,
    /// Config file named in the missing-output-directory diagnostic
    config_filename: String,
    extra_ignores: Vec<String>,
    copy_package_json: bool,
    /// TS variants produce their output dirs themselves and never copy them;
    /// the passthrough variant ships pre-built dirs straight from the sources
    exclude_output_dirs_from_copy: bool,
    /// Variants whose after-build run is triggered separately by the command
    defer_after_build: bool,
}

impl<'a> Builder<'a> {
    /// Plain TypeScript compiler variant. Output directories come from the
    /// config; `all_configs` are excluded from the source copy.
    pub fn tsc(options: &'a BuildOptions, ts_config: &TsConfig, all_configs: &[String]) -> Self {
        let config_path = relative_to(&ts_config.path, &options.source_dir);
        Self {
            options,
            strategy: Strategy {
                script: ScriptSource::PackageBin {
                    package: "typescript",
                    bin: Some("tsc"),
                },
                args: tsc_args(&config_path),
                output_macro: None,
                skip_config_rewrite: false,
            },
            output_dirs: ts_config.get_out_dirs().into_iter().collect(),
            ts_config_path: Some(config_path.clone()),
            config_filename: config_path,
            extra_ignores: all_configs.to_vec(),
            copy_package_json: true,
            exclude_output_dirs_from_copy: true,
            defer_after_build: true,
        }
    }

    /// TypeScript compiler variant for generated protobuf packages: the
    /// configs were already prepared inside the build directory, so the
    /// rewrite is suppressed and no source descriptor is copied.
    pub fn ts_proto_auto_tsc(options: &'a BuildOptions, ts_config: &TsConfig) -> Self {
        let config_path = relative_to(&ts_config.path, &options.build_dir);
        let mut builder = Self::tsc(options, ts_config, &[]);
        builder.strategy.args = tsc_args(&config_path);
        builder.strategy.skip_config_rewrite = true;
        builder.ts_config_path = Some(config_path.clone());
        builder.config_filename = config_path;
        builder.copy_package_json = false;
        builder
    }

    pub fn webpack(options: &'a BuildOptions, config: BundlerConfig) -> Self {
        Self::bundler(
            options,
            config,
            ScriptSource::PackageBin {
                package: "webpack-cli",
                bin: Some("webpack"),
            },
            "TS_WEBPACK_OUTPUT",
        )
    }

    pub fn vite(options: &'a BuildOptions, config: BundlerConfig) -> Self {
        Self::bundler(
            options,
            config,
            ScriptSource::PackageBin {
                package: "vite",
                bin: None,
            },
            "TS_VITE_OUTPUT",
        )
    }

    pub fn rspack(options: &'a BuildOptions, config: BundlerConfig) -> Self {
        Self::bundler(
            options,
            config,
            ScriptSource::PackageBin {
                package: "@rspack/cli",
                bin: Some("rspack"),
            },
            "TS_RSPACK_OUTPUT",
        )
    }

    fn bundler(
        options: &'a BuildOptions,
        config: BundlerConfig,
        script: ScriptSource,
        output_macro: &'static str,
    ) -> Self {
        Self {
            options,
            strategy: Strategy {
                script,
                args: vec!["--config".to_string(), config.config_filename.clone()],
                output_macro: Some(output_macro),
                skip_config_rewrite: false,
            },
            output_dirs: config.output_dirs,
            ts_config_path: Some(config.ts_config_path),
            config_filename: config.config_filename,
            extra_ignores: Vec::new(),
            copy_package_json: true,
            exclude_output_dirs_from_copy: true,
            defer_after_build: false,
        }
    }

    /// Package passthrough: stage and bundle only, no tool invocation
    pub fn package_passthrough(options: &'a BuildOptions, output_dirs: Vec<String>) -> Self {
        Self {
            options,
            strategy: Strategy {
                script: ScriptSource::None,
                args: Vec::new(),
                output_macro: None,
                skip_config_rewrite: false,
            },
            output_dirs,
            ts_config_path: None,
            config_filename: package_json_path(Path::new("")).display().to_string(),
            extra_ignores: Vec::new(),
            copy_package_json: true,
            exclude_output_dirs_from_copy: false,
            defer_after_build: false,
        }
    }

    /// Load a tsconfig from `dir` and inline its full `extends` chain using
    /// the module's installed dependency locations. Out-dir discovery must
    /// run on the inlined config: an `outDir` declared only in an extended
    /// base is still this config's output.
    pub fn load_ts_config(dir: &Path, name: &str) -> BuildResult<TsConfig> {
        let mut ts_config = TsConfig::load(dir.join(name))?;
        let pj = PackageJson::load(package_json_path(dir))?;
        ts_config.inline_extend(&pj.dep_paths_by_names())?;
        Ok(ts_config)
    }

    /// Run the pipeline: stage, build, validate, fix permissions, after-build
    pub fn build(&self, workspace: &dyn WorkspaceInstaller) -> BuildResult<PhaseTimings> {
        let mut timings = PhaseTimings::default();

        let started = Instant::now();
        self.stage(workspace)?;
        timings.stage = started.elapsed();

        let started = Instant::now();
        self.run_build_script()?;
        timings.build = started.elapsed();

        let started = Instant::now();
        self.assert_output_dirs_exist()?;
        timings.validate = started.elapsed();

        let started = Instant::now();
        self.make_bins_executable()?;
        if !self.defer_after_build {
            self.run_after_build()?;
        }
        timings.post = started.elapsed();

        if self.options.verbose {
            eprintln!(
                "{}: stage {:.2}s, build {:.2}s, validate {:.2}s, post {:.2}s",
                self.options.command,
                timings.stage.as_secs_f64(),
                timings.build.as_secs_f64(),
                timings.validate.as_secs_f64(),
                timings.post.as_secs_f64(),
            );
        }
        Ok(timings)
    }

    /// Pack the declared output directories (plus the after-build output
    /// directory, when configured) into the artifact
    pub fn bundle(&self) -> BuildResult<()> {
        let mut output_dirs = self.output_dirs.clone();
        if self.options.after_build.is_some() {
            if let Some(dir) = &self.options.after_build_output_dir {
                output_dirs.push(dir.clone());
            }
        }
        bundle_dirs(&output_dirs, &self.options.build_dir, &self.options.output_file)
    }

    /// Declared output directories of this variant
    pub fn output_dirs(&self) -> &[String] {
        &self.output_dirs
    }

    fn stage(&self, workspace: &dyn WorkspaceInstaller) -> BuildResult<()> {
        let build_dir = &self.options.build_dir;
        fs::create_dir_all(build_dir).map_err(|e| BuildError::io(build_dir, e))?;

        if self.copy_package_json {
            recursive_copy(
                &package_json_path(&self.options.source_dir),
                &package_json_path(build_dir),
            )?;
        }

        workspace.install(build_dir)?;
        self.copy_source_entries()?;

        if !self.strategy.skip_config_rewrite {
            if let Some(config_path) = &self.ts_config_path {
                self.rewrite_ts_config(config_path)?;
            }
        }
        Ok(())
    }

    fn copy_ignore_list(&self) -> BTreeSet<String> {
        let mut ignored: BTreeSet<String> = [
            // IDEs
            ".idea",
            ".vscode",
            // Output dirs
            "dist",
            "build",
            "bundle",
            // Dependencies
            NODE_MODULES_DIRNAME,
            tsforge_package::lockfile::PNPM_LOCKFILE_FILENAME,
            // Build-system bookkeeping
            WORKSPACE_BUNDLE_FILENAME,
            "output.tar",
            OUTPUT_TAR_UUID_FILENAME,
            // Other
            ".traces",
            "a.yaml",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        if self.exclude_output_dirs_from_copy {
            ignored.extend(self.output_dirs.iter().map(|d| normalize_out_dir(d)));
        }
        ignored.extend(self.extra_ignores.iter().cloned());
        if let Some(config_path) = &self.ts_config_path {
            ignored.insert(config_path.clone());
        }
        // Ignored even when the after-build script is off for this run
        if let Some(dir) = &self.options.after_build_output_dir {
            ignored.insert(dir.clone());
        }
        ignored
    }

    fn copy_source_entries(&self) -> BuildResult<()> {
        let ignored = self.copy_ignore_list();
        let entries =
            fs::read_dir(&self.options.source_dir).map_err(|e| BuildError::io(&self.options.source_dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| BuildError::io(&self.options.source_dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if ignored.contains(&name) {
                continue;
            }
            recursive_copy(&entry.path(), &self.options.build_dir.join(&name))?;
        }
        Ok(())
    }

    fn rewrite_ts_config(&self, config_path: &str) -> BuildResult<()> {
        let mut ts_config = Self::load_ts_config(&self.options.source_dir, config_path)?;
        ts_config
            .compiler_options_mut()?
            .insert("skipLibCheck".to_string(), Value::Bool(true));

        let target = self.options.build_dir.join(config_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        Ok(ts_config.write(&target)?)
    }

    fn environment(&self) -> BuildResult<BTreeMap<String, String>> {
        let mut env = BTreeMap::new();

        // MODDIR is the persistent contract with user scripts; the other
        // entries are internal and may change.
        env.insert("MODDIR".to_string(), self.options.module_dir.clone());
        env.insert(
            "PATH".to_string(),
            self.options
                .node_bin
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .display()
                .to_string(),
        );
        env.insert(
            "NODE_PATH".to_string(),
            self.options
                .build_dir
                .join(NODE_MODULES_DIRNAME)
                .display()
                .to_string(),
        );

        if let Some(vcs_info) = &self.options.vcs_info {
            for (key, value) in vcs_info_env(&self.options.build_dir.join(vcs_info))? {
                env.insert(key, value);
            }
        }

        // User overrides come last, later entries win on collision
        for pair in &self.options.env {
            if let Some((key, value)) = pair.split_once('=') {
                env.insert(key.to_string(), value.to_string());
            }
        }
        Ok(env)
    }

    fn run_build_script(&self) -> BuildResult<()> {
        match &self.strategy.script {
            ScriptSource::None => Ok(()),
            ScriptSource::PackageBin { package, bin } => {
                let script = resolve_bin(&self.options.build_dir, package, *bin)?;
                self.exec_node_script(&script, &self.strategy.args)
            }
        }
    }

    fn exec_node_script(&self, script: &Path, args: &[String]) -> BuildResult<()> {
        let mut full_args = vec![script.display().to_string()];
        full_args.extend(args.iter().cloned());

        let output = run_tool(
            &self.options.node_bin,
            &full_args,
            &self.environment()?,
            &self.options.build_dir,
            self.options.verbose,
        )?;

        if !output.success() {
            return Err(BuildError::tool(
                &self.options.command,
                output.exit_code,
                output.stdout,
                output.stderr,
            ));
        }
        Ok(())
    }

    fn assert_output_dirs_exist(&self) -> BuildResult<()> {
        for output_dir in &self.output_dirs {
            let normalized = normalize_out_dir(output_dir);
            if self.options.build_dir.join(&normalized).exists() {
                continue;
            }

            let mut message = format!(
                "We expected to get output directory '{normalized}' but it is missing.\n\
                 Probably, you set another output directory in {}.\n",
                self.config_filename
            );
            if let Some(output_macro) = self.strategy.output_macro {
                message.push_str(&format!(
                    "Add macro {output_macro}(output_dir) to the module's build config \
                     to configure your output directory.\n"
                ));
            }

            return Err(BuildError::tool(&self.options.command, 1, "", message));
        }
        Ok(())
    }

    fn make_bins_executable(&self) -> BuildResult<()> {
        let pj_path = package_json_path(&self.options.build_dir);
        if !pj_path.exists() {
            return Ok(());
        }

        let pj = PackageJson::load(pj_path)?;
        for bin in pj.bins_iter()? {
            let bin_path = self.options.build_dir.join(&bin);
            let metadata = fs::metadata(&bin_path).map_err(|e| BuildError::io(&bin_path, e))?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(permissions.mode() | 0o111);
            fs::set_permissions(&bin_path, permissions)
                .map_err(|e| BuildError::io(&bin_path, e))?;
        }
        Ok(())
    }

    /// Run the configured after-build script, if any
    pub fn run_after_build(&self) -> BuildResult<()> {
        let Some(after) = &self.options.after_build else {
            return Ok(());
        };
        self.exec_node_script(&after.script, &after.args_list())
    }
}

/// Flatten a VCS metadata JSON file into `VCS_INFO_<KEY>` entries. Keys are
/// upper-cased with `-` mapped to `_`; non-string values keep their JSON
/// rendering.
fn vcs_info_env(path: &Path) -> BuildResult<Vec<(String, String)>> {
    let raw = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
    let data: BTreeMap<String, Value> =
        serde_json::from_str(&raw).map_err(tsforge_package::PackageError::from)?;

    let mut entries = Vec::with_capacity(data.len());
    for (key, value) in data {
        let env_key = format!("VCS_INFO_{}", key.to_uppercase().replace('-', "_"));
        let env_value = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        entries.push((env_key, env_value));
    }
    Ok(entries)
}

fn tsc_args(config_path: &str) -> Vec<String> {
    vec![
        "--project".to_string(),
        config_path.to_string(),
        "--incremental".to_string(),
        "false".to_string(),
        "--composite".to_string(),
        "false".to_string(),
        "--pretty".to_string(),
    ]
}

fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Look up the script a package declares for `bin_name` (or its only bin)
/// inside the installed dependency tree.
pub fn resolve_bin(build_dir: &Path, package: &str, bin_name: Option<&str>) -> BuildResult<PathBuf> {
    let package_dir = build_dir.join(NODE_MODULES_DIRNAME).join(package);
    let pj = PackageJson::load(package_json_path(&package_dir))?;

    let bin_path = match pj.data.get("bin") {
        Some(Value::String(path)) => Some(path.clone()),
        Some(Value::Object(map)) => match bin_name {
            Some(name) => map.get(name).and_then(Value::as_str).map(str::to_string),
            // An object with a single entry is unambiguous
            None => map.values().next().and_then(Value::as_str).map(str::to_string),
        },
        _ => None,
    };

    let bin_path = bin_path.ok_or_else(|| {
        BuildError::config(format!(
            "package `{package}` does not declare bin `{}`",
            bin_name.unwrap_or(package)
        ))
    })?;
    Ok(package_dir.join(bin_path))
}

/// Union the output directories of several configs; a directory declared by
/// more than one config is a validation error listing the duplicates.
pub fn union_out_dirs(ts_configs: &[TsConfig]) -> BuildResult<Vec<String>> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut result = Vec::new();

    for ts_config in ts_configs {
        let out_dirs = ts_config.get_out_dirs();
        let duplicates: Vec<&String> = out_dirs.iter().filter(|d| seen.contains(*d)).collect();
        if !duplicates.is_empty() {
            return Err(BuildError::config(format!(
                "{}: other config file already declares outdir {duplicates:?}",
                ts_config.path.display()
            )));
        }
        for dir in out_dirs {
            seen.insert(dir.clone());
            result.push(dir);
        }
    }
    Ok(result)
}
