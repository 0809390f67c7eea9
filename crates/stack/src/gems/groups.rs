//! Bundler group selection
//!
//! Older Bundler releases only understand exclusion lists, so a legacy
//! `only` selection is rewritten into the equivalent `with`/`without` pair
//! before `bundle install` runs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Group inclusion and exclusion lists as Bundler stores them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleGroups {
    pub with: Vec<String>,
    pub without: Vec<String>,
}

impl BundleGroups {
    pub fn new(with: Vec<String>, without: Vec<String>) -> Self {
        Self { with, without }
    }

    /// `with` joined the way Bundler persists lists, e.g. `development:test`.
    pub fn with_joined(&self) -> String {
        self.with.join(":")
    }

    pub fn without_joined(&self) -> String {
        self.without.join(":")
    }
}

/// Folds a legacy `only` selection into `with`/`without`.
///
/// With an empty `only` the current lists are returned untouched. Otherwise
/// every declared group outside `only` is appended to `without`, and `with`
/// keeps only the groups `only` names. Unknown names in `only` are ignored.
pub fn reconcile(
    current_with: &[String],
    current_without: &[String],
    declared: &[String],
    only: &[String],
) -> BundleGroups {
    if only.is_empty() {
        return BundleGroups::new(current_with.to_vec(), current_without.to_vec());
    }

    let mut without: Vec<String> = Vec::new();
    let excluded = current_without
        .iter()
        .chain(declared.iter().filter(|group| !only.contains(group)));
    for group in excluded {
        if !without.contains(group) {
            without.push(group.clone());
        }
    }

    let with = current_with
        .iter()
        .filter(|group| only.contains(group))
        .cloned()
        .collect();

    BundleGroups::new(with, without)
}

/// Splits a stored list. Bundler writes colons; older configs used spaces.
pub fn split_groups(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

fn group_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*group\s*\(?\s*(.+?)\s*\)?\s+do\b").unwrap())
}

fn block_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bdo\s*(\|[^|]*\|)?\s*$").unwrap())
}

fn group_option() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\bgroup:|:group\s*=>)\s*(\[[^\]]*\]|:\w+|'[^']*'|\x22[^\x22]*\x22)").unwrap()
    })
}

fn groups_option() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\bgroups:|:groups\s*=>)\s*(\[[^\]]*\]|%i\[[^\]]*\])").unwrap())
}

fn group_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#":(\w+)|'([^']*)'|"([^"]*)"|%i\[([^\]]*)\]"#).unwrap())
}

fn names_in(fragment: &str, out: &mut Vec<String>) {
    for caps in group_name().captures_iter(fragment) {
        let names: Vec<&str> = match (caps.get(1), caps.get(2), caps.get(3), caps.get(4)) {
            (Some(m), _, _, _) | (_, Some(m), _, _) | (_, _, Some(m), _) => vec![m.as_str()],
            (_, _, _, Some(m)) => m.as_str().split_whitespace().collect(),
            _ => Vec::new(),
        };
        for name in names {
            if !name.is_empty() && !out.iter().any(|g| g == name) {
                out.push(name.to_string());
            }
        }
    }
}

/// Bundler's implicit group for gems declared outside any group.
pub const DEFAULT_GROUP: &str = "default";

/// Groups declared in a `Gemfile`, in order of first appearance.
///
/// Recognises `group :a, :b do` blocks and `group:`/`groups:` options on
/// `gem` lines. A gem outside both counts towards `default`. Comments are
/// skipped.
pub fn declared_groups(gemfile: &str) -> Vec<String> {
    let mut groups = Vec::new();
    // One entry per open `do` block, true for `group` blocks.
    let mut blocks: Vec<bool> = Vec::new();

    for line in gemfile.lines() {
        let code = line.split('#').next().unwrap_or("");
        let trimmed = code.trim();

        if let Some(caps) = group_block().captures(code) {
            names_in(&caps[1], &mut groups);
            blocks.push(true);
            continue;
        }

        if trimmed == "end" {
            blocks.pop();
            continue;
        }

        if block_open().is_match(code) {
            blocks.push(false);
        }

        if !trimmed.starts_with("gem") {
            continue;
        }

        let grouped = blocks.contains(&true)
            || group_option().is_match(code)
            || groups_option().is_match(code);
        if !grouped && !groups.iter().any(|g| g == DEFAULT_GROUP) {
            groups.push(DEFAULT_GROUP.to_string());
        }

        for caps in group_option()
            .captures_iter(code)
            .chain(groups_option().captures_iter(code))
        {
            names_in(&caps[1], &mut groups);
        }
    }

    groups
}
