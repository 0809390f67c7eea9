use dockprep_cli::cli::commands::{
    BundleInstallArgs, CliArgs, Commands, DirArgs, ExecArgs, FixBinstubsArgs, JsInstallArgs,
    NodeInstallArgs, PackagesArgs, RelocateArgs,
};
use dockprep_cli::{LOG_TARGETS, NAME, VERSION};
use dockprep_core::config::DockprepConfig;
use dockprep_core::fs::current_umask;
use dockprep_core::{CommandError, CommandSpec, EnvSnapshot, RealFileSystem, SystemRunner};
use dockprep_stack::gems::{self, BundleInstallOptions, DependencyGraph, InstallPolicy};
use dockprep_stack::{artifacts, assets, binstubs, node};

use anyhow::Result;
use clap::Parser;
use std::env;
use std::process;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let args = CliArgs::parse();
    let config = DockprepConfig::default();
    init_logging_from_args(&args, &config);

    debug!("{} v{} starting", NAME, VERSION);
    debug!("Arguments: {:?}", args);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        eprintln!("\nPlease check the DOCKPREP_* environment variables.");
        process::exit(1);
    }
    debug!("{}", config);

    let env = EnvSnapshot::from_process();
    let fs = RealFileSystem::new();
    let cwd = match env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            error!("Cannot determine working directory: {}", e);
            process::exit(1);
        }
    };
    let runner = SystemRunner::new(&env, cwd);

    let result = match &args.command {
        Commands::Packages(a) => handle_packages(a, &fs, &runner),
        Commands::BundleInstall(a) => handle_bundle_install(a, &env, &fs, &runner),
        Commands::NodeInstall(a) => handle_node_install(a, &config, &fs, &runner),
        Commands::JsInstall(a) => handle_js_install(a, &fs, &runner),
        Commands::FixBinstubs(a) => handle_fix_binstubs(a, &config, &fs),
        Commands::Relocate(a) => handle_relocate(a, &config, &fs),
        Commands::PrecompileAssets(a) => handle_precompile_assets(a, &env, &fs, &runner),
        Commands::Exec(a) => handle_exec(a, &runner),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            exit_code_for(&e)
        }
    };

    process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs, config: &DockprepConfig) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = if let Some(level_str) = &args.log_level {
            parse_level(level_str)
        } else if args.verbose {
            Level::DEBUG
        } else if args.quiet {
            Level::ERROR
        } else {
            parse_level(&config.log_level)
        };

        let mut filter = EnvFilter::from_default_env();

        if env::var("RUST_LOG").is_err() {
            for target in LOG_TARGETS {
                if let Ok(directive) = format!("{}={}", target, level).parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }

        let json = env::var("DOCKPREP_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init();
        }
    });
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// A failed child process passes its status through; anything else is 1.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CommandError>())
        .map(CommandError::exit_code)
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

fn handle_packages(args: &PackagesArgs, fs: &RealFileSystem, runner: &SystemRunner) -> Result<i32> {
    let policy = InstallPolicy {
        buildtime: args.buildtime,
        gem_buildtime: args.gem_buildtime,
        gem_runtime: args.gem_runtime,
        clean: args.clean,
    };

    let graph = if policy.needs_graph() {
        gems::load_graph(&args.app.dir, fs, runner)?
    } else {
        DependencyGraph::default()
    };
    debug!("{} gems in dependency graph", graph.len());

    let packages = gems::compute_packages(&graph, &policy);

    if args.dry_run {
        println!("{}", packages.join(" "));
        return Ok(0);
    }

    gems::install_packages(&packages, &policy, runner, fs)?;
    Ok(0)
}

fn handle_bundle_install(
    args: &BundleInstallArgs,
    env: &EnvSnapshot,
    fs: &RealFileSystem,
    runner: &SystemRunner,
) -> Result<i32> {
    let options = BundleInstallOptions {
        bootsnap: args.bootsnap,
    };
    let groups = gems::bundle_install(&args.app.dir, env, fs, runner, options)?;
    info!(
        "Bundle installed (with: [{}], without: [{}])",
        groups.with_joined(),
        groups.without_joined()
    );
    Ok(0)
}

fn handle_node_install(
    args: &NodeInstallArgs,
    config: &DockprepConfig,
    fs: &RealFileSystem,
    runner: &SystemRunner,
) -> Result<i32> {
    let installer = args.installer.as_deref().unwrap_or(&config.node_installer);
    node::node_install(&args.app.dir, fs, runner, installer, args.optional)?;
    Ok(0)
}

fn handle_js_install(args: &JsInstallArgs, fs: &RealFileSystem, runner: &SystemRunner) -> Result<i32> {
    node::js_install(&args.app.dir, fs, runner, args.optional)?;
    Ok(0)
}

fn handle_fix_binstubs(
    args: &FixBinstubsArgs,
    config: &DockprepConfig,
    fs: &RealFileSystem,
) -> Result<i32> {
    let dir = args.dir.as_ref().unwrap_or(&config.binstubs_dir);
    let install_name = args
        .ruby_install_name
        .as_deref()
        .unwrap_or(&config.ruby_install_name);

    binstubs::normalize_binstubs(dir, install_name, current_umask(), fs)?;
    Ok(0)
}

fn handle_relocate(args: &RelocateArgs, config: &DockprepConfig, fs: &RealFileSystem) -> Result<i32> {
    let root = args.root.as_ref().unwrap_or(&config.artifacts_root);
    artifacts::relocate(&args.paths, root, fs)?;
    Ok(0)
}

fn handle_precompile_assets(
    args: &DirArgs,
    env: &EnvSnapshot,
    fs: &RealFileSystem,
    runner: &SystemRunner,
) -> Result<i32> {
    assets::precompile_assets(&args.dir, env, fs, runner)?;
    Ok(0)
}

/// Hands the process over to the command so signals reach it directly.
fn handle_exec(args: &ExecArgs, runner: &SystemRunner) -> Result<i32> {
    let Some((program, rest)) = args.command.split_first() else {
        anyhow::bail!("No command given");
    };
    let spec = CommandSpec::new(program.as_str()).args(rest.iter().cloned());
    Err(runner.exec(&spec).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_forwards_child_status() {
        let err: anyhow::Error = CommandError::Failed {
            command: "bundle install".to_string(),
            code: 5,
        }
        .into();
        assert_eq!(exit_code_for(&err.context("bundle-install failed")), 5);
    }

    #[test]
    fn test_exit_code_defaults_to_one() {
        assert_eq!(exit_code_for(&anyhow::anyhow!("no lockfile")), 1);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }
}
