//! Rails asset precompilation during the image build

use anyhow::Result;
use dockprep_core::{CommandRunner, CommandSpec, EnvSnapshot, FileSystem};
use std::path::Path;
use tracing::{debug, info};

const RAILS_BIN: &str = "bin/rails";
const ASSET_DIRS: [&str; 2] = ["app/assets", "app/javascript"];
const SECRET_VARS: [&str; 2] = ["SECRET_KEY_BASE", "RAILS_MASTER_KEY"];
const MASTER_KEY: &str = "config/master.key";
const DUMMY_SECRET_VAR: &str = "SECRET_KEY_BASE_DUMMY";

/// Whether the application in `dir` has assets to precompile.
pub fn applicable(dir: &Path, fs: &dyn FileSystem) -> bool {
    fs.is_file(&dir.join(RAILS_BIN)) && ASSET_DIRS.iter().any(|d| fs.is_dir(&dir.join(d)))
}

/// Whether a real secret is configured through the environment or a key file.
pub fn has_secret(dir: &Path, env: &EnvSnapshot, fs: &dyn FileSystem) -> bool {
    SECRET_VARS.iter().any(|var| env.contains(var)) || fs.exists(&dir.join(MASTER_KEY))
}

pub fn precompile_command(dir: &Path, env: &EnvSnapshot, fs: &dyn FileSystem) -> CommandSpec {
    let mut cmd = CommandSpec::new(RAILS_BIN)
        .arg("assets:precompile")
        .current_dir(dir);
    if !has_secret(dir, env, fs) {
        debug!("No secret configured, using a dummy secret_key_base");
        cmd = cmd.env(DUMMY_SECRET_VAR, "1");
    }
    cmd
}

/// Runs `bin/rails assets:precompile` when there is anything to compile.
/// Returns whether the step ran.
pub fn precompile_assets(
    dir: &Path,
    env: &EnvSnapshot,
    fs: &dyn FileSystem,
    runner: &dyn CommandRunner,
) -> Result<bool> {
    if !applicable(dir, fs) {
        info!("No Rails assets in {}, skipping precompile", dir.display());
        return Ok(false);
    }

    runner.run(&precompile_command(dir, env, fs))?;
    Ok(true)
}
