use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tsforge_build::{BuildError, BuildOptions};

mod commands;

/// Frontend module builder for monorepo build graphs.
///
/// Stages a module's sources into an isolated build directory, prepares its
/// dependency workspace from a lockfile and a tarball store, runs exactly one
/// external toolchain invocation, validates the declared outputs and bundles
/// them into a deterministic tar archive.
///
/// EXAMPLES:
///     tsforge --source-root /repo --build-root /tmp/build \
///         --module-dir libs/ui --node-bin /opt/node/bin/node \
///         --pm-script /opt/pm/install.js --pm-type pnpm \
///         build-tsc --tsconfigs tsconfig.json --output-file ui.output.tar
///
/// ENVIRONMENT VARIABLES:
///     TSFORGE_VERBOSE   Set to 1/yes/on/true to override --verbose
#[derive(Parser)]
#[command(name = "tsforge")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    base: BaseArgs,

    #[command(subcommand)]
    command: Command,
}

/// Arguments shared by every command
#[derive(Args)]
struct BaseArgs {
    /// Absolute path to the monorepo root
    #[arg(long)]
    source_root: PathBuf,

    /// Absolute path to the temporary build tree root
    #[arg(long)]
    build_root: PathBuf,

    /// Module path, relative to the monorepo root
    #[arg(long)]
    module_dir: String,

    /// Path to the `node` executable
    #[arg(long)]
    node_bin: PathBuf,

    /// Path to the package-manager script running `install`/`ci`
    #[arg(long)]
    pm_script: PathBuf,

    /// Package manager type (pnpm or npm)
    #[arg(long)]
    pm_type: String,

    /// Running locally instead of on a build agent; tarballs are fetched on
    /// demand instead of being read from the store
    #[arg(long)]
    local_cli: bool,

    /// Echo executed commands and captured output; TSFORGE_VERBOSE overrides
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build with the TypeScript compiler (tsc)
    BuildTsc {
        #[command(flatten)]
        ts: TsBuilderArgs,
    },

    /// Bundle with webpack
    BuildWebpack {
        #[command(flatten)]
        ts: TsBuilderArgs,
        #[command(flatten)]
        bundler: BundlerArgs,
    },

    /// Bundle with vite
    BuildVite {
        #[command(flatten)]
        ts: TsBuilderArgs,
        #[command(flatten)]
        bundler: BundlerArgs,
    },

    /// Bundle with rspack
    BuildRspack {
        #[command(flatten)]
        ts: TsBuilderArgs,
        #[command(flatten)]
        bundler: BundlerArgs,
    },

    /// Stage and bundle a package without running a build tool
    BuildPackage {
        #[command(flatten)]
        builder: BuilderArgs,
        /// Pre-built directories to include in the artifact
        #[arg(long, num_args = 1..)]
        output_dirs: Vec<String>,
    },

    /// Build .js and .d.ts from .proto with protoc and the ts-proto plugin
    BuildTsProto {
        #[command(flatten)]
        ts: TsBuilderArgs,
        #[command(flatten)]
        proto: TsProtoArgs,
    },

    /// Prepare the lockfile, workspace files and tarball store for a module
    PrepareDeps {
        /// Tarball store location, relative to the build directory
        #[arg(long)]
        tarballs_store: String,
        /// Root of the content-addressed resource tree
        #[arg(long)]
        resource_root: Option<PathBuf>,
        /// Build-root-relative path of a proto-auto dependency module
        #[arg(long)]
        ts_proto_auto_deps_path: Option<String>,
    },
}

/// Arguments shared by all build commands
#[derive(Args)]
struct BuilderArgs {
    /// Absolute path of the artifact to produce
    #[arg(long)]
    output_file: PathBuf,

    /// Run the after-build script once the build finishes
    #[arg(long)]
    with_after_build: bool,

    /// Script to run after the build
    #[arg(long)]
    after_build_js: Option<PathBuf>,

    /// Delimiter-joined arguments for the after-build script
    #[arg(long)]
    after_build_args: Option<String>,

    /// Output directory produced by the after-build script
    #[arg(long)]
    after_build_outdir: Option<String>,

    /// Tarball store location, relative to the build directory
    #[arg(long, default_value = "tarballs_store")]
    tarballs_store: String,

    /// Root of the content-addressed resource tree
    #[arg(long)]
    resource_root: Option<PathBuf>,
}

/// Arguments shared by the TypeScript-aware build commands
#[derive(Args)]
struct TsBuilderArgs {
    #[command(flatten)]
    builder: BuilderArgs,

    /// VCS metadata file, relative to the build directory, re-exposed to the
    /// tool as VCS_INFO_* environment entries
    #[arg(long)]
    vcs_info: Option<String>,

    /// tsconfig files to build (multiple configs only for build-tsc)
    #[arg(long, num_args = 1.., required = true)]
    tsconfigs: Vec<String>,

    /// KEY=VALUE environment override, can be set many times; later wins
    #[arg(long = "env", action = ArgAction::Append)]
    env: Vec<String>,
}

/// Arguments of the bundler commands
#[derive(Args)]
struct BundlerArgs {
    /// Output directories the bundler produces
    #[arg(long, num_args = 1.., required = true)]
    output_dirs: Vec<String>,

    /// Path to the bundler config (webpack.config.js, vite.config.ts, ...)
    #[arg(long)]
    bundler_config_path: PathBuf,
}

/// Arguments of the protobuf generation command
#[derive(Args)]
struct TsProtoArgs {
    /// Path to the protoc binary
    #[arg(long)]
    protoc_bin: PathBuf,

    /// Include paths passed to protoc as -I
    #[arg(long, num_args = 1.., required = true)]
    proto_paths: Vec<String>,

    /// .proto sources to generate from
    #[arg(long, num_args = 1.., required = true)]
    proto_srcs: Vec<String>,

    /// Extra ts_proto option (k=v or k=v,k=v), can be set many times
    #[arg(long, action = ArgAction::Append)]
    ts_proto_opt: Vec<String>,

    /// Name pattern for the synthesized auto package, `*` replaced by the
    /// module name
    #[arg(long)]
    auto_package_name: Option<String>,

    /// Build-root-relative path of the auto-package dependency module
    #[arg(long)]
    auto_deps_path: Option<String>,
}

fn run(cli: &Cli) -> Result<()> {
    let verbose = BuildOptions::verbose_with_env_override(cli.base.verbose);

    match &cli.command {
        Command::BuildTsc { ts } => commands::build_tsc::run(&cli.base, ts, verbose),
        Command::BuildWebpack { ts, bundler } => {
            commands::build_bundler::run(&cli.base, ts, bundler, commands::BundlerKind::Webpack, verbose)
        }
        Command::BuildVite { ts, bundler } => {
            commands::build_bundler::run(&cli.base, ts, bundler, commands::BundlerKind::Vite, verbose)
        }
        Command::BuildRspack { ts, bundler } => {
            commands::build_bundler::run(&cli.base, ts, bundler, commands::BundlerKind::Rspack, verbose)
        }
        Command::BuildPackage {
            builder,
            output_dirs,
        } => commands::build_package::run(&cli.base, builder, output_dirs, verbose),
        Command::BuildTsProto { ts, proto } => {
            commands::build_ts_proto::run(&cli.base, ts, proto, verbose)
        }
        Command::PrepareDeps {
            tarballs_store,
            resource_root,
            ts_proto_auto_deps_path,
        } => commands::prepare_deps::run(
            &cli.base,
            tarballs_store,
            resource_root.as_deref(),
            ts_proto_auto_deps_path.as_deref(),
        ),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Tool failures are rendered verbatim, including the captured
            // child output, and the child's exit code is propagated
            if let Some(build_err) = err.downcast_ref::<BuildError>() {
                if let Some(exit_code) = build_err.exit_code() {
                    eprintln!("{build_err}");
                    return ExitCode::from(exit_code.clamp(1, 255) as u8);
                }
            }
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
