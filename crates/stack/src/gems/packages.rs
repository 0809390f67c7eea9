//! System packages required by a gem set
//!
//! Native extensions link against OS libraries: the build stage needs the
//! development headers, the final image only the shared libraries or client
//! tools. The tables below map gem names to Debian package names for both.

use super::lockfile::DependencyGraph;
use anyhow::Result;
use dockprep_core::fs::FileType;
use dockprep_core::{CommandRunner, CommandSpec, FileSystem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// General build tooling, independent of the gem graph.
pub const BUILD_TOOLS: &[&str] = &[
    "build-essential",
    "pkg-config",
    "git",
    "python-is-python3",
    "curl",
];

const GEM_RUNTIME_PACKAGES: &[(&str, &[&str])] = &[
    ("charlock_holmes", &["libicu72"]),
    ("curb", &["libcurl4"]),
    ("ffi", &["libffi8"]),
    ("gpgme", &["libgpgme11"]),
    ("idn-ruby", &["libidn12"]),
    ("image_processing", &["libvips42"]),
    ("mini_magick", &["imagemagick"]),
    ("mysql2", &["default-mysql-client"]),
    ("pg", &["postgresql-client"]),
    ("psych", &["libyaml-0-2"]),
    ("rmagick", &["imagemagick"]),
    ("ruby-filemagic", &["libmagic1"]),
    ("ruby-vips", &["libvips42"]),
    ("sqlite3", &["libsqlite3-0"]),
    ("tiny_tds", &["freetds-bin"]),
    ("trilogy", &["default-mysql-client"]),
];

/// Buildtime overrides; any runtime key missing here inherits its runtime entry.
const GEM_BUILDTIME_OVERRIDES: &[(&str, &[&str])] = &[
    ("charlock_holmes", &["libicu-dev"]),
    ("curb", &["libcurl4-openssl-dev"]),
    ("ffi", &["libffi-dev"]),
    ("gpgme", &["libgpgme-dev"]),
    ("idn-ruby", &["libidn-dev"]),
    ("mysql2", &["default-libmysqlclient-dev"]),
    ("pg", &["libpq-dev"]),
    ("psych", &["libyaml-dev"]),
    ("rmagick", &["libmagickwand-dev"]),
    ("ruby-filemagic", &["libmagic-dev"]),
    ("sqlite3", &["libsqlite3-dev"]),
    ("tiny_tds", &["freetds-dev"]),
];

const APT_LISTS_DIR: &str = "/var/lib/apt/lists";

/// Which package groups to install, and whether to drop the apt caches afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallPolicy {
    pub buildtime: bool,
    pub gem_buildtime: bool,
    pub gem_runtime: bool,
    pub clean: bool,
}

impl InstallPolicy {
    pub fn needs_graph(&self) -> bool {
        self.gem_buildtime || self.gem_runtime
    }
}

/// Gem name to ordered package names, iterated in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl PackageTable {
    fn from_pairs(pairs: &[(&str, &[&str])]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(gem, pkgs)| {
                    (
                        gem.to_string(),
                        pkgs.iter().map(|p| p.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Packages needed at runtime.
    pub fn runtime() -> Self {
        Self::from_pairs(GEM_RUNTIME_PACKAGES)
    }

    /// Packages needed to compile native extensions.
    pub fn buildtime() -> Self {
        let mut table = Self::runtime();
        for (gem, pkgs) in GEM_BUILDTIME_OVERRIDES {
            table.entries.insert(
                gem.to_string(),
                pkgs.iter().map(|p| p.to_string()).collect(),
            );
        }
        table
    }

    pub fn get(&self, gem: &str) -> Option<&[String]> {
        self.entries.get(gem).map(Vec::as_slice)
    }

    /// Packages for every gem in `graph`, in table key order.
    pub fn lookup(&self, graph: &DependencyGraph) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(gem, _)| graph.contains(gem))
            .flat_map(|(_, pkgs)| pkgs.iter().cloned())
            .collect()
    }
}

/// OS packages to install for `graph` under `policy`.
///
/// Duplicates across groups are kept; the order depends only on the inputs.
pub fn compute_packages(graph: &DependencyGraph, policy: &InstallPolicy) -> Vec<String> {
    let mut packages = Vec::new();

    if policy.buildtime {
        packages.extend(BUILD_TOOLS.iter().map(|p| p.to_string()));
    }

    if policy.gem_buildtime {
        packages.extend(PackageTable::buildtime().lookup(graph));
    }

    if policy.gem_runtime {
        packages.extend(PackageTable::runtime().lookup(graph));
    }

    packages
}

/// apt invocations for `packages`. Empty when there is nothing to install.
pub fn install_commands(packages: &[String]) -> Vec<CommandSpec> {
    if packages.is_empty() {
        return Vec::new();
    }

    vec![
        CommandSpec::new("apt-get")
            .args(["update", "-qq"])
            .env("DEBIAN_FRONTEND", "noninteractive"),
        CommandSpec::new("apt-get")
            .args(["install", "--no-install-recommends", "-y"])
            .args(packages.iter().cloned())
            .env("DEBIAN_FRONTEND", "noninteractive"),
    ]
}

/// Installs `packages`, then drops the apt caches when `policy.clean` is set.
pub fn install_packages(
    packages: &[String],
    policy: &InstallPolicy,
    runner: &dyn CommandRunner,
    fs: &dyn FileSystem,
) -> Result<()> {
    if packages.is_empty() {
        info!("No system packages required");
        return Ok(());
    }

    info!("Installing {} system packages: {}", packages.len(), packages.join(" "));
    runner.run_all(&install_commands(packages))?;

    if policy.clean {
        runner.run(&CommandSpec::new("apt-get").arg("clean"))?;
        clear_dir(fs, Path::new(APT_LISTS_DIR))?;
    }

    Ok(())
}

fn clear_dir(fs: &dyn FileSystem, dir: &Path) -> Result<()> {
    if !fs.is_dir(dir) {
        return Ok(());
    }
    for entry in fs.read_dir(dir)? {
        debug!("Removing {}", entry.path().display());
        if entry.file_type() == FileType::Directory {
            fs.remove_dir_all(entry.path())?;
        } else {
            fs.remove_file(entry.path())?;
        }
    }
    Ok(())
}
