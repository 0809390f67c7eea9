//! Build steps for preparing Ruby and Node.js application images.
//!
//! Every step takes its working directory, environment snapshot, filesystem
//! and process runner as parameters so it can run against in-memory fakes.

pub mod artifacts;
pub mod assets;
pub mod binstubs;
pub mod gems;
pub mod node;

pub use artifacts::{relocate, RelocateError};
pub use assets::precompile_assets;
pub use binstubs::{normalize_binstubs, NormalizeReport};
pub use gems::{bundle_install, compute_packages, install_packages, InstallPolicy};
pub use node::{js_install, node_install, LockfileError, PackageManager, ToolchainError};
