//! Ruby gem build steps: system packages for native extensions and the
//! frozen `bundle install`.

pub mod groups;
pub mod lockfile;
pub mod packages;
pub mod settings;

pub use groups::{declared_groups, reconcile, BundleGroups};
pub use lockfile::{load_graph, parse_lockfile, DependencyGraph, GemSpec};
pub use packages::{compute_packages, install_packages, InstallPolicy, PackageTable};
pub use settings::{bundle_install, BundleInstallOptions, BundleSettings};
