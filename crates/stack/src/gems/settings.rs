//! Bundler's local configuration store and the frozen `bundle install` step

use super::groups::{declared_groups, reconcile, split_groups, BundleGroups};
use super::lockfile::{load_graph, GEMFILE};
use anyhow::{Context, Result};
use dockprep_core::{CommandRunner, CommandSpec, EnvSnapshot, FileSystem};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const BUNDLE_WITH: &str = "BUNDLE_WITH";
pub const BUNDLE_WITHOUT: &str = "BUNDLE_WITHOUT";
pub const BUNDLE_ONLY: &str = "BUNDLE_ONLY";
const BUNDLE_APP_CONFIG: &str = "BUNDLE_APP_CONFIG";
const BUNDLE_FROZEN: &str = "BUNDLE_FROZEN";

/// Contents of `.bundle/config` (or `$BUNDLE_APP_CONFIG/config`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSettings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl BundleSettings {
    pub fn config_path(dir: &Path, env: &EnvSnapshot) -> PathBuf {
        match env.get_non_empty(BUNDLE_APP_CONFIG) {
            Some(app_config) => dir.join(app_config).join("config"),
            None => dir.join(".bundle").join("config"),
        }
    }

    pub fn load(dir: &Path, env: &EnvSnapshot, fs: &dyn FileSystem) -> Result<Self> {
        let path = Self::config_path(dir, env);
        if !fs.exists(&path) {
            debug!("No Bundler config at {}", path.display());
            return Ok(Self {
                path,
                values: BTreeMap::new(),
            });
        }

        let content = fs
            .read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(path, &content)
    }

    fn parse(path: PathBuf, content: &str) -> Result<Self> {
        let raw: Option<BTreeMap<String, Value>> = serde_yaml::from_str(content)
            .with_context(|| format!("Invalid Bundler config {}", path.display()))?;

        let values = raw
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s,
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((key, value))
            })
            .collect();

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Sets `key`, or removes it when `value` is empty.
    pub fn set(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.values.remove(key);
        } else {
            self.values.insert(key.to_string(), value.to_string());
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    /// Effective list for `key`: the environment wins over the file, as in Bundler.
    pub fn list(&self, key: &str, env: &EnvSnapshot) -> Vec<String> {
        env.get(key)
            .or_else(|| self.get(key))
            .map(split_groups)
            .unwrap_or_default()
    }

    pub fn save(&self, fs: &dyn FileSystem) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs.create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(&self.values).context("Failed to serialize Bundler config")?;
        let content = format!("---\n{}", yaml.trim_start_matches("---\n"));
        fs.write_atomic(&self.path, content.as_bytes())
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BundleInstallOptions {
    /// Precompile the bootsnap cache for gems when bootsnap is bundled
    pub bootsnap: bool,
}

/// Resolves the group selection for the application in `dir`.
///
/// A non-empty `BUNDLE_ONLY` is folded into `BUNDLE_WITH`/`BUNDLE_WITHOUT`
/// and the result written back to the config store.
pub fn reconcile_settings(
    dir: &Path,
    env: &EnvSnapshot,
    fs: &dyn FileSystem,
) -> Result<BundleGroups> {
    let mut settings = BundleSettings::load(dir, env, fs)?;
    let with = settings.list(BUNDLE_WITH, env);
    let without = settings.list(BUNDLE_WITHOUT, env);
    let only = settings.list(BUNDLE_ONLY, env);

    if only.is_empty() {
        return Ok(BundleGroups::new(with, without));
    }

    let gemfile = dir.join(GEMFILE);
    let declared = if fs.exists(&gemfile) {
        declared_groups(&fs.read_to_string(&gemfile)?)
    } else {
        Vec::new()
    };
    debug!("Declared groups: {:?}, only: {:?}", declared, only);

    let groups = reconcile(&with, &without, &declared, &only);
    info!(
        "Translated BUNDLE_ONLY={} into with=[{}] without=[{}]",
        only.join(":"),
        groups.with_joined(),
        groups.without_joined()
    );

    settings.set(BUNDLE_WITH, &groups.with_joined());
    settings.set(BUNDLE_WITHOUT, &groups.without_joined());
    settings.remove(BUNDLE_ONLY);
    settings.save(fs)?;

    Ok(groups)
}

/// The frozen install invocation for `groups`.
///
/// The reconciled lists are passed explicitly so ambient `BUNDLE_*`
/// variables cannot widen the selection, and `BUNDLE_FROZEN` is always on.
pub fn install_command(dir: &Path, groups: &BundleGroups) -> CommandSpec {
    let mut spec = CommandSpec::new("bundle")
        .arg("install")
        .current_dir(dir)
        .env(BUNDLE_FROZEN, "true")
        .env_remove(BUNDLE_ONLY);

    for (key, value) in [
        (BUNDLE_WITH, groups.with_joined()),
        (BUNDLE_WITHOUT, groups.without_joined()),
    ] {
        spec = if value.is_empty() {
            spec.env_remove(key)
        } else {
            spec.env(key, value)
        };
    }
    spec
}

pub fn bundle_install(
    dir: &Path,
    env: &EnvSnapshot,
    fs: &dyn FileSystem,
    runner: &dyn CommandRunner,
    options: BundleInstallOptions,
) -> Result<BundleGroups> {
    let groups = reconcile_settings(dir, env, fs)?;
    runner.run(&install_command(dir, &groups))?;

    if options.bootsnap {
        let graph = load_graph(dir, fs, runner)?;
        if graph.contains("bootsnap") {
            runner.run(
                &CommandSpec::new("bundle")
                    .args(["exec", "bootsnap", "precompile", "--gemfile"])
                    .current_dir(dir),
            )?;
        } else {
            debug!("bootsnap not bundled, skipping precompile");
        }
    }

    Ok(groups)
}
