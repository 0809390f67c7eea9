//! Resolved gem graph read from `Gemfile.lock`

use anyhow::{bail, Context, Result};
use dockprep_core::{CommandRunner, CommandSpec, FileSystem};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

pub const GEMFILE: &str = "Gemfile";
pub const GEMFILE_LOCK: &str = "Gemfile.lock";

const SPEC_SECTIONS: &[&str] = &["GEM", "GIT", "PATH"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GemSpec {
    pub name: String,
    pub version: String,
    pub platform: Option<String>,
}

/// Resolved dependencies in lockfile order. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    specs: Vec<GemSpec>,
}

impl DependencyGraph {
    pub fn new(specs: Vec<GemSpec>) -> Self {
        let mut seen = HashSet::new();
        let specs = specs
            .into_iter()
            .filter(|spec| seen.insert(spec.name.clone()))
            .collect();
        Self { specs }
    }

    /// Graph of the given names, version unknown. Handy for tests and dry runs.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| GemSpec {
                    name: name.into(),
                    version: String::new(),
                    platform: None,
                })
                .collect(),
        )
    }

    pub fn specs(&self) -> &[GemSpec] {
        &self.specs
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.iter().any(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn spec_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ {4}([^\s(]+) \(([^)]+)\)\s*$").unwrap())
}

/// Parses the `specs:` blocks of a lockfile.
///
/// Only four-space entries are resolved gems; deeper lines list their
/// requirements. Platform variants of the same gem keep the first entry.
pub fn parse_lockfile(content: &str) -> DependencyGraph {
    let mut specs = Vec::new();
    let mut in_spec_section = false;
    let mut in_specs = false;

    for line in content.lines() {
        let line = line.trim_end_matches('\r');

        if !line.starts_with(' ') {
            in_spec_section = SPEC_SECTIONS.contains(&line.trim());
            in_specs = false;
            continue;
        }

        if !in_spec_section {
            continue;
        }

        if line.trim() == "specs:" {
            in_specs = true;
            continue;
        }

        if !in_specs {
            continue;
        }

        if let Some(caps) = spec_line().captures(line) {
            let (version, platform) = match caps[2].split_once('-') {
                Some((version, platform)) => (version.to_string(), Some(platform.to_string())),
                None => (caps[2].to_string(), None),
            };
            specs.push(GemSpec {
                name: caps[1].to_string(),
                version,
                platform,
            });
        }
    }

    DependencyGraph::new(specs)
}

/// Loads the resolved graph for the application in `dir`.
///
/// Without a lockfile but with a `Gemfile`, `bundle lock` resolves one first.
/// Without either the graph is empty.
pub fn load_graph(
    dir: &Path,
    fs: &dyn FileSystem,
    runner: &dyn CommandRunner,
) -> Result<DependencyGraph> {
    let lock_path = dir.join(GEMFILE_LOCK);

    if !fs.exists(&lock_path) {
        if !fs.exists(&dir.join(GEMFILE)) {
            debug!("No {} or {} in {}", GEMFILE, GEMFILE_LOCK, dir.display());
            return Ok(DependencyGraph::default());
        }

        info!("{} missing, resolving dependencies", GEMFILE_LOCK);
        runner.run(&CommandSpec::new("bundle").arg("lock").current_dir(dir))?;

        if !fs.exists(&lock_path) {
            bail!(
                "`bundle lock` succeeded but {} was not written",
                lock_path.display()
            );
        }
    }

    let content = fs
        .read_to_string(&lock_path)
        .with_context(|| format!("Failed to read {}", lock_path.display()))?;
    let graph = parse_lockfile(&content);
    debug!("Resolved {} gems from {}", graph.len(), lock_path.display());
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockprep_core::{MockFileSystem, RecordingRunner};

    const LOCKFILE: &str = "\
GIT
  remote: https://github.com/rails/solid_queue.git
  revision: 1a2b3c
  specs:
    solid_queue (0.3.0)
      activejob (>= 7.1)

PATH
  remote: engines/billing
  specs:
    billing (0.1.0)

GEM
  remote: https://rubygems.org/
  specs:
    activejob (7.1.3)
      globalid (>= 0.3.6)
    nokogiri (1.16.0-aarch64-linux)
      racc (~> 1.4)
    nokogiri (1.16.0-x86_64-linux)
      racc (~> 1.4)
    pg (1.5.4)
    racc (1.7.3)

PLATFORMS
  aarch64-linux
  x86_64-linux

DEPENDENCIES
  pg (~> 1.1)
  solid_queue!

BUNDLED WITH
   2.5.3
";

    #[test]
    fn test_parse_lockfile_collects_all_spec_sections() {
        let graph = parse_lockfile(LOCKFILE);
        let names: Vec<&str> = graph.names().collect();

        assert_eq!(
            names,
            vec!["solid_queue", "billing", "activejob", "nokogiri", "pg", "racc"]
        );
    }

    #[test]
    fn test_parse_lockfile_splits_platform() {
        let graph = parse_lockfile(LOCKFILE);
        let nokogiri = graph
            .specs()
            .iter()
            .find(|s| s.name == "nokogiri")
            .unwrap();

        assert_eq!(nokogiri.version, "1.16.0");
        assert_eq!(nokogiri.platform.as_deref(), Some("aarch64-linux"));
    }

    #[test]
    fn test_parse_lockfile_ignores_requirement_lines_and_dependencies() {
        let graph = parse_lockfile(LOCKFILE);
        assert!(!graph.contains("globalid"));
        assert_eq!(graph.len(), 6);
    }

    #[test]
    fn test_parse_lockfile_handles_crlf() {
        let graph = parse_lockfile("GEM\r\n  specs:\r\n    pg (1.5.4)\r\n");
        assert!(graph.contains("pg"));
    }

    #[test]
    fn test_load_graph_without_gemfile_is_empty() {
        let fs = MockFileSystem::new();
        let runner = RecordingRunner::new();

        let graph = load_graph(Path::new("/mock"), &fs, &runner).unwrap();

        assert!(graph.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_load_graph_reads_existing_lockfile() {
        let fs = MockFileSystem::new();
        fs.add_file("Gemfile", "gem 'pg'");
        fs.add_file("Gemfile.lock", LOCKFILE);
        let runner = RecordingRunner::new();

        let graph = load_graph(Path::new("/mock"), &fs, &runner).unwrap();

        assert!(graph.contains("pg"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_load_graph_runs_resolver_when_lockfile_missing() {
        let fs = MockFileSystem::new();
        fs.add_file("Gemfile", "gem 'pg'");
        let runner = RecordingRunner::new();

        let err = load_graph(Path::new("/mock"), &fs, &runner).unwrap_err();

        assert_eq!(runner.command_lines(), vec!["bundle lock"]);
        assert!(err.to_string().contains("was not written"));
    }

    #[test]
    fn test_load_graph_propagates_resolver_failure() {
        let fs = MockFileSystem::new();
        fs.add_file("Gemfile", "gem 'pg'");
        let runner = RecordingRunner::new().with_exit_code("bundle", 6);

        let err = load_graph(Path::new("/mock"), &fs, &runner).unwrap_err();
        let failed = err.downcast_ref::<dockprep_core::CommandError>().unwrap();
        assert_eq!(failed.exit_code(), 6);
    }
}
