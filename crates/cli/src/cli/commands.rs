use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Build-step helpers for Ruby and Node.js container images
#[derive(Parser, Debug)]
#[command(
    name = "dockprep",
    about = "Build-step helpers for Ruby and Node.js container images",
    version,
    author,
    long_about = "dockprep runs inside `RUN` steps of an image build. Each subcommand is one \
                  step: installing the system packages native gems need, frozen dependency \
                  installs, Node.js toolchain setup, binstub normalization and moving build \
                  outputs into an artifacts tree for later stages."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Install the OS packages the bundle needs",
        long_about = "Maps the gems resolved in Gemfile.lock to Debian packages and installs them \
                      with apt-get. Runs `bundle lock` first when the lockfile is missing.\n\n\
                      Examples:\n  \
                      dockprep packages --buildtime --gem-buildtime\n  \
                      dockprep packages --gem-runtime --clean\n  \
                      dockprep packages --gem-runtime --dry-run"
    )]
    Packages(PackagesArgs),

    #[command(
        about = "Run a frozen bundle install",
        long_about = "Folds a legacy BUNDLE_ONLY selection into BUNDLE_WITH/BUNDLE_WITHOUT, \
                      writes it back to the Bundler config and runs `bundle install` with \
                      BUNDLE_FROZEN=true.\n\n\
                      Examples:\n  \
                      dockprep bundle-install\n  \
                      dockprep bundle-install --bootsnap"
    )]
    BundleInstall(BundleInstallArgs),

    #[command(
        about = "Install the Node.js version the project asks for",
        long_about = "Reads .node-version, .nvmrc or package.json engines.node and installs that \
                      version with the configured installer (default `n`).\n\n\
                      Examples:\n  \
                      dockprep node-install\n  \
                      dockprep node-install --optional"
    )]
    NodeInstall(NodeInstallArgs),

    #[command(
        about = "Install JavaScript dependencies from the lockfile",
        long_about = "Picks yarn, npm or pnpm from the lockfile present and runs its frozen \
                      install, enabling corepack first when needed.\n\n\
                      Examples:\n  \
                      dockprep js-install\n  \
                      dockprep js-install --optional"
    )]
    JsInstall(JsInstallArgs),

    #[command(
        about = "Make generated scripts portable",
        long_about = "Rewrites Ruby interpreter lines to `#!/usr/bin/env <ruby>`, strips carriage \
                      returns and makes the scripts executable.\n\n\
                      Examples:\n  \
                      dockprep fix-binstubs\n  \
                      dockprep fix-binstubs vendor/bin --ruby-install-name ruby3.3"
    )]
    FixBinstubs(FixBinstubsArgs),

    #[command(
        about = "Move paths into the artifacts tree",
        long_about = "Moves each path to <root>/<absolute path> and leaves a symlink behind, so \
                      a later stage can copy the whole artifacts tree at once.\n\n\
                      Examples:\n  \
                      dockprep relocate /usr/local/bundle\n  \
                      dockprep relocate --root /out node_modules public/assets"
    )]
    Relocate(RelocateArgs),

    #[command(
        about = "Precompile Rails assets",
        long_about = "Runs `bin/rails assets:precompile` when the app has assets, with a dummy \
                      secret key base unless a real secret is configured."
    )]
    PrecompileAssets(DirArgs),

    #[command(
        about = "Replace this process with a command",
        long_about = "Entrypoint helper: executes the command in place of dockprep, keeping the \
                      process id so signals reach it directly.\n\n\
                      Examples:\n  \
                      dockprep exec -- bin/rails server"
    )]
    Exec(ExecArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DirArgs {
    #[arg(
        long,
        value_name = "DIR",
        default_value = ".",
        help = "Application directory"
    )]
    pub dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct PackagesArgs {
    #[command(flatten)]
    pub app: DirArgs,

    #[arg(long, help = "Include compilers and general build tools")]
    pub buildtime: bool,

    #[arg(long, help = "Include headers needed to compile native gems")]
    pub gem_buildtime: bool,

    #[arg(long, help = "Include libraries native gems load at runtime")]
    pub gem_runtime: bool,

    #[arg(long, help = "Remove apt caches after installing")]
    pub clean: bool,

    #[arg(long, help = "Print the package list instead of installing")]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BundleInstallArgs {
    #[command(flatten)]
    pub app: DirArgs,

    #[arg(long, help = "Precompile the bootsnap cache for installed gems")]
    pub bootsnap: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NodeInstallArgs {
    #[command(flatten)]
    pub app: DirArgs,

    #[arg(long, help = "Skip silently when there is no JavaScript project")]
    pub optional: bool,

    #[arg(
        long,
        value_name = "PROGRAM",
        help = "Version manager to invoke (overrides DOCKPREP_NODE_INSTALLER)"
    )]
    pub installer: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct JsInstallArgs {
    #[command(flatten)]
    pub app: DirArgs,

    #[arg(long, help = "Skip silently when there is no JavaScript project")]
    pub optional: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FixBinstubsArgs {
    #[arg(
        value_name = "DIR",
        help = "Scripts directory (defaults to DOCKPREP_BINSTUBS_DIR or bin)"
    )]
    pub dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "NAME",
        help = "Interpreter name to write (overrides DOCKPREP_RUBY_INSTALL_NAME)"
    )]
    pub ruby_install_name: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RelocateArgs {
    #[arg(value_name = "PATH", required = true, help = "Paths to move")]
    pub paths: Vec<PathBuf>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Artifacts root (overrides DOCKPREP_ARTIFACTS_ROOT)"
    )]
    pub root: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help = "Command and arguments to run"
    )]
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_packages_flags() {
        let args = CliArgs::try_parse_from([
            "dockprep",
            "packages",
            "--gem-runtime",
            "--clean",
            "--dir",
            "/app",
        ])
        .unwrap();

        match args.command {
            Commands::Packages(p) => {
                assert!(p.gem_runtime && p.clean);
                assert!(!p.buildtime && !p.gem_buildtime && !p.dry_run);
                assert_eq!(p.app.dir, PathBuf::from("/app"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_exec_keeps_hyphen_args() {
        let args =
            CliArgs::try_parse_from(["dockprep", "exec", "--", "bin/rails", "server", "-b", "0.0.0.0"])
                .unwrap();

        match args.command {
            Commands::Exec(e) => assert_eq!(e.command, vec!["bin/rails", "server", "-b", "0.0.0.0"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_relocate_requires_paths() {
        assert!(CliArgs::try_parse_from(["dockprep", "relocate"]).is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(CliArgs::try_parse_from(["dockprep", "-v", "-q", "js-install"]).is_err());
    }

    #[test]
    fn test_dir_defaults_to_current() {
        let args = CliArgs::try_parse_from(["dockprep", "node-install", "--optional"]).unwrap();
        match args.command {
            Commands::NodeInstall(n) => {
                assert_eq!(n.app.dir, PathBuf::from("."));
                assert!(n.optional);
                assert!(n.installer.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
