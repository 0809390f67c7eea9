pub mod cli;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Log targets of the workspace crates, for `EnvFilter` directives.
pub const LOG_TARGETS: [&str; 4] = ["dockprep", "dockprep_cli", "dockprep_core", "dockprep_stack"];
