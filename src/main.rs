use std::collections::HashMap;
use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use addrctl::cli::{
    format_validation, reconcile_snapshot, render_view, resolve_options, run_snapshot,
    validate_snapshot, Cli, Commands, TenantView,
};
use addrctl::config::{
    default_options_path, expand_path, load_options_file, load_snapshot_file, ControllerOptions,
    Snapshot,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    let options_path = cli
        .config
        .as_ref()
        .map(|p| expand_path(&p.to_string_lossy()))
        .unwrap_or_else(default_options_path);
    let options_file = match load_options_file(&options_path) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to load options {}: {}", options_path.display(), e);
            process::exit(1);
        }
    };

    let snapshot_path = match &cli.command {
        Commands::Reconcile(args) => &args.snapshot,
        Commands::Run(args) => &args.snapshot,
        Commands::Validate(args) => &args.snapshot,
    };
    let snapshot = match load_snapshot_file(snapshot_path) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Failed to load snapshot {}: {}", snapshot_path.display(), e);
            process::exit(1);
        }
    };

    let env: HashMap<String, String> = std::env::vars().collect();
    let options = match resolve_options(&snapshot, &options_file, &env) {
        Ok(options) => options,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    info!(
        "Address space {} with plan {}",
        options.address_space, options.address_space_plan
    );

    match cli.command {
        Commands::Reconcile(args) => {
            let result = reconcile_snapshot(&snapshot, &options, args.passes, args.ready).await;
            print_view(result, args.output);
        }
        Commands::Run(args) => {
            info!(
                "Running controller (check every {}s, resync every {}s)",
                options.check_interval.as_secs(),
                options.resync_interval.as_secs()
            );
            let result = run_snapshot(&snapshot, &options, args.duration).await;
            print_view(result, args.output);
        }
        Commands::Validate(_) => validate(&snapshot, &options),
    }
}

fn print_view(
    result: addrctl::cli::CommandResult<TenantView>,
    format: addrctl::cli::OutputFormat,
) {
    match result.and_then(|view| render_view(&view, format)) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn validate(snapshot: &Snapshot, options: &ControllerOptions) {
    match validate_snapshot(snapshot, options) {
        Ok(results) => {
            print!("{}", format_validation(&results));
            if results.iter().any(|r| !r.is_valid()) {
                process::exit(2);
            }
        }
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
