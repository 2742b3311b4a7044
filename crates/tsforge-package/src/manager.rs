//! Package-manager driver seam
//!
//! The actual dependency resolution and installation live in an external
//! package-manager script executed through the configured runtime. Drivers
//! only stage the files the script expects and invoke it; they never
//! reimplement its algorithm.

use crate::lockfile::{
    load_npm_lockfile, load_pnpm_lockfile, Lockfile, NPM_LOCKFILE_FILENAME,
    PNPM_LOCKFILE_FILENAME,
};
use crate::{PackageError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

/// Supported package-manager type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmKind {
    Pnpm,
    Npm,
}

impl FromStr for PmKind {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pnpm" => Ok(Self::Pnpm),
            "npm" => Ok(Self::Npm),
            other => Err(PackageError::UnknownManager(other.to_string())),
        }
    }
}

/// Paths a driver needs to run the external package-manager script
#[derive(Debug, Clone)]
pub struct PmContext {
    /// Root of the temporary build tree
    pub build_root: PathBuf,
    /// Module's isolated build directory
    pub build_path: PathBuf,
    /// Module's source directory
    pub sources_path: PathBuf,
    /// Path to the runtime executable (`node`)
    pub node_bin: PathBuf,
    /// Path to the package-manager script
    pub script_path: PathBuf,
}

/// Dependency-manager capability consumed by the build pipeline
pub trait PackageManager {
    /// Materialize an installable workspace for the module from its own
    /// lockfile. In `local_mode` tarballs are fetched on demand instead of
    /// being read from `tarballs_store`.
    fn build_workspace(&self, tarballs_store: &str, local_mode: bool) -> Result<()>;

    /// Materialize a workspace by reusing the prepared dependency tree of
    /// another module (`deps_module_dir`, relative to the build root).
    fn build_ts_proto_auto_workspace(&self, deps_module_dir: &str) -> Result<()>;

    /// Load the module lockfile located in `dir`
    fn load_lockfile_from_dir(&self, dir: &Path) -> Result<Lockfile>;

    /// The lockfile filename this manager produces
    fn lockfile_name(&self) -> &'static str;
}

/// Select a driver by type tag
pub fn package_manager_for(kind: PmKind, ctx: PmContext) -> Box<dyn PackageManager> {
    match kind {
        PmKind::Pnpm => Box::new(PnpmManager { ctx }),
        PmKind::Npm => Box::new(NpmManager { ctx }),
    }
}

fn run_pm_script(ctx: &PmContext, args: &[&str]) -> Result<()> {
    let output = Command::new(&ctx.node_bin)
        .arg(&ctx.script_path)
        .args(args)
        .current_dir(&ctx.build_path)
        .output()
        .map_err(|e| PackageError::io(&ctx.script_path, e))?;

    if !output.status.success() {
        return Err(PackageError::InstallFailed {
            command: format!("{} {}", ctx.script_path.display(), args.join(" ")),
            exit_code: output.status.code().unwrap_or(1),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(())
}

fn copy_lockfile_into_build_dir(ctx: &PmContext, from_dir: &Path, name: &str) -> Result<()> {
    let src = from_dir.join(name);
    let dst = ctx.build_path.join(name);
    std::fs::create_dir_all(&ctx.build_path).map_err(|e| PackageError::io(&ctx.build_path, e))?;
    std::fs::copy(&src, &dst).map_err(|e| PackageError::io(&src, e))?;
    Ok(())
}

struct PnpmManager {
    ctx: PmContext,
}

impl PackageManager for PnpmManager {
    fn build_workspace(&self, tarballs_store: &str, local_mode: bool) -> Result<()> {
        copy_lockfile_into_build_dir(&self.ctx, &self.ctx.sources_path, self.lockfile_name())?;
        if local_mode {
            run_pm_script(&self.ctx, &["install", "--frozen-lockfile"])
        } else {
            run_pm_script(
                &self.ctx,
                &[
                    "install",
                    "--frozen-lockfile",
                    "--offline",
                    "--store-dir",
                    tarballs_store,
                ],
            )
        }
    }

    fn build_ts_proto_auto_workspace(&self, deps_module_dir: &str) -> Result<()> {
        let deps_build_path = self.ctx.build_root.join(deps_module_dir);
        copy_lockfile_into_build_dir(&self.ctx, &deps_build_path, self.lockfile_name())?;
        run_pm_script(&self.ctx, &["install", "--frozen-lockfile", "--offline"])
    }

    fn load_lockfile_from_dir(&self, dir: &Path) -> Result<Lockfile> {
        load_pnpm_lockfile(&dir.join(self.lockfile_name()))
    }

    fn lockfile_name(&self) -> &'static str {
        PNPM_LOCKFILE_FILENAME
    }
}

struct NpmManager {
    ctx: PmContext,
}

impl PackageManager for NpmManager {
    fn build_workspace(&self, _tarballs_store: &str, local_mode: bool) -> Result<()> {
        copy_lockfile_into_build_dir(&self.ctx, &self.ctx.sources_path, self.lockfile_name())?;
        if local_mode {
            run_pm_script(&self.ctx, &["ci"])
        } else {
            run_pm_script(&self.ctx, &["ci", "--offline"])
        }
    }

    fn build_ts_proto_auto_workspace(&self, deps_module_dir: &str) -> Result<()> {
        let deps_build_path = self.ctx.build_root.join(deps_module_dir);
        copy_lockfile_into_build_dir(&self.ctx, &deps_build_path, self.lockfile_name())?;
        run_pm_script(&self.ctx, &["ci", "--offline"])
    }

    fn load_lockfile_from_dir(&self, dir: &Path) -> Result<Lockfile> {
        load_npm_lockfile(&dir.join(self.lockfile_name()))
    }

    fn lockfile_name(&self) -> &'static str {
        NPM_LOCKFILE_FILENAME
    }
}
