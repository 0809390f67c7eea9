use thiserror::Error;

/// Failure of an external process invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {code}")]
    Failed { command: String, code: i32 },
}

impl CommandError {
    /// Exit status the invoking command should terminate with.
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Spawn { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => 127,
                std::io::ErrorKind::PermissionDenied => 126,
                _ => 1,
            },
            CommandError::Failed { code, .. } => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_display_and_code() {
        let err = CommandError::Failed {
            command: "npm ci".to_string(),
            code: 3,
        };
        assert_eq!(err.to_string(), "`npm ci` exited with status 3");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_spawn_not_found_maps_to_127() {
        let err = CommandError::Spawn {
            command: "yarn install".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(err.exit_code(), 127);
        assert!(err.to_string().contains("yarn install"));
    }
}
