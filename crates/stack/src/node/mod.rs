//! Node.js toolchain and JavaScript dependency installs

pub mod lockfile;
pub mod version;

pub use lockfile::{detect, js_install, LockfileError, PackageManager};
pub use version::{install_plan, node_install, select_version_source, ToolchainError, VersionSource};
