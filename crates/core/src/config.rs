use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ARTIFACTS_ROOT: &str = "/artifacts";
const DEFAULT_NODE_INSTALLER: &str = "n";
const DEFAULT_RUBY_INSTALL_NAME: &str = "ruby";
const DEFAULT_BINSTUBS_DIR: &str = "bin";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

#[derive(Debug, Clone)]
pub struct DockprepConfig {
    pub log_level: String,
    /// Shadow tree that relocated build outputs are moved into
    pub artifacts_root: PathBuf,
    /// Node.js version manager invoked as `<installer> lts|auto`
    pub node_installer: String,
    /// Interpreter name written into normalized binstubs
    pub ruby_install_name: String,
    pub binstubs_dir: PathBuf,
}

impl Default for DockprepConfig {
    fn default() -> Self {
        let log_level = env::var("DOCKPREP_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        let artifacts_root = env::var("DOCKPREP_ARTIFACTS_ROOT")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_ROOT));

        let node_installer = env::var("DOCKPREP_NODE_INSTALLER")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_NODE_INSTALLER.to_string());

        let ruby_install_name = env::var("DOCKPREP_RUBY_INSTALL_NAME")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_RUBY_INSTALL_NAME.to_string());

        let binstubs_dir = env::var("DOCKPREP_BINSTUBS_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BINSTUBS_DIR));

        Self {
            log_level,
            artifacts_root,
            node_installer,
            ruby_install_name,
            binstubs_dir,
        }
    }
}

impl DockprepConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if !self.artifacts_root.is_absolute() {
            return Err(ConfigError::ValidationFailed(format!(
                "Artifacts root must be an absolute path, got {}",
                self.artifacts_root.display()
            )));
        }

        if self.ruby_install_name.contains(char::is_whitespace)
            || self.ruby_install_name.contains('/')
        {
            return Err(ConfigError::ParseError {
                field: "DOCKPREP_RUBY_INSTALL_NAME".to_string(),
                error: format!(
                    "'{}' must be a bare executable name",
                    self.ruby_install_name
                ),
            });
        }

        if self.node_installer.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Node installer command cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for DockprepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dockprep Configuration:")?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        writeln!(f, "  Artifacts Root: {}", self.artifacts_root.display())?;
        writeln!(f, "  Node Installer: {}", self.node_installer)?;
        writeln!(f, "  Ruby Install Name: {}", self.ruby_install_name)?;
        writeln!(f, "  Binstubs Dir: {}", self.binstubs_dir.display())?;
        Ok(())
    }
}
