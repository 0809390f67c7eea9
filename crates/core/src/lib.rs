pub mod config;
pub mod env;
pub mod error;
pub mod fs;
pub mod process;

pub use config::{ConfigError, DockprepConfig};
pub use env::EnvSnapshot;
pub use error::CommandError;
pub use fs::{FileSystem, MockFileSystem, RealFileSystem};
pub use process::{CommandRunner, CommandSpec, RecordingRunner, SystemRunner};
