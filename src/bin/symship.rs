//! # symship CLI
//!
//! Invoked by the build system after a build finishes.
//!
//! ## Usage
//! ```bash
//! symship --engine-dir "C:/UE_4.27/Engine" --project-dir "C:/Work/MyGame" \
//!     --realm acme --token <project token> --symbols-token <symbols token> \
//!     --target-type Game --send-debug false
//! ```
//!
//! The exit status is non-zero only for configuration errors. Failed uploads
//! are reported but never fail the build.

use clap::{ArgAction, Parser, ValueEnum};
use colored::*;
use humantime::format_duration;
use std::path::PathBuf;
use std::time::Duration;
use symship::{
    normalize_separators, PostBuild, PostBuildConfig, PostBuildOutcome, PostBuildReport, RunReport,
    TargetKind,
};
use tracing_subscriber::EnvFilter;

/// Package build symbols, skip already-delivered content and upload the rest
#[derive(Parser)]
#[command(name = "symship")]
#[command(version)]
#[command(about = "Post-build symbol upload and crash reporter endpoint patching")]
#[command(long_about = None)]
struct Cli {
    /// Project token used in the crash reporter endpoint
    #[arg(long = "token")]
    token: Option<String>,

    /// Token passed to the symbol uploader
    #[arg(long = "symbols-token", alias = "symbols_token")]
    symbols_token: Option<String>,

    /// Account realm on the ingestion service
    #[arg(long)]
    realm: Option<String>,

    /// Engine directory
    #[arg(long = "engine-dir", alias = "engine_dir")]
    engine_dir: Option<String>,

    /// Project directory
    #[arg(long = "project-dir", alias = "project_dir")]
    project_dir: Option<String>,

    /// Ship symbols for non-release builds
    #[arg(long = "send-debug", alias = "send_debug", action = ArgAction::Set, value_parser = parse_flag, default_value = "false")]
    send_debug: bool,

    /// Ship symbols for release builds
    #[arg(long = "send-release", alias = "send_release", action = ArgAction::Set, value_parser = parse_flag, default_value = "true")]
    send_release: bool,

    /// Upload shared engine plugin symbols
    #[arg(long = "upload-editor", alias = "upload_editor", action = ArgAction::Set, value_parser = parse_flag, default_value = "true")]
    upload_editor: bool,

    /// Build target name
    #[arg(long = "target-name", alias = "target_name")]
    target_name: Option<String>,

    /// Build configuration (Development, Shipping, ...)
    #[arg(long = "target-configuration", alias = "target_configuration")]
    target_configuration: Option<String>,

    /// Build target type (Game, Editor, Client, Server, Program)
    #[arg(long = "target-type", alias = "target_type", default_value = "Editor")]
    target_type: String,

    /// Project file that was built
    #[arg(long = "project-file", alias = "project_file")]
    project_file: Option<PathBuf>,

    /// Keep the project archive after uploading
    #[arg(long = "keep-archive")]
    keep_archive: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn parse_flag(raw: &str) -> std::result::Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("expected true or false, got '{}'", other)),
    }
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(cli: Cli) -> symship::Result<()> {
    let config = build_config(cli)?;

    match PostBuild::new(config).run()? {
        PostBuildOutcome::Skipped { reason } => {
            println!("{} {}", "Skipped:".yellow().bold(), reason);
        }
        PostBuildOutcome::Completed(report) => print_summary(&report),
    }
    Ok(())
}

fn build_config(cli: Cli) -> symship::Result<PostBuildConfig> {
    let mut builder = PostBuildConfig::builder()
        .send_debug_symbols(cli.send_debug)
        .send_release_symbols(cli.send_release)
        .upload_editor_symbols(cli.upload_editor)
        .keep_project_archive(cli.keep_archive)
        .target_kind(cli.target_type.parse().unwrap_or(TargetKind::Editor));

    if let Some(dir) = cli.engine_dir {
        builder = builder.engine_root(normalize_separators(&dir));
    }
    if let Some(dir) = cli.project_dir {
        builder = builder.project_root(normalize_separators(&dir));
    }
    if let Some(realm) = cli.realm {
        builder = builder.realm(realm);
    }
    if let Some(token) = cli.token {
        builder = builder.project_token(token);
    }
    if let Some(token) = cli.symbols_token {
        builder = builder.symbols_token(token);
    }
    if let Some(name) = cli.target_name {
        builder = builder.target_name(name);
    }
    if let Some(configuration) = cli.target_configuration {
        builder = builder.target_configuration(configuration);
    }
    if let Some(file) = cli.project_file {
        builder = builder.project_file(file);
    }

    builder.build()
}

fn print_summary(report: &PostBuildReport) {
    println!("{}", "Post-build summary".blue().bold());

    match &report.staging.skipped_reason {
        Some(reason) => println!("  {} staging skipped: {}", "!".yellow().bold(), reason),
        None => {
            for dir in &report.staging.dirs {
                let mark = if dir.error.is_none() && dir.failed() == 0 {
                    "✓".green().bold()
                } else {
                    "✗".red().bold()
                };
                println!(
                    "  {} staged {}: {} patched, {} already current, {} failed",
                    mark,
                    dir.name.cyan(),
                    dir.applied(),
                    dir.skipped(),
                    dir.failed()
                );
            }
        }
    }

    match &report.engine {
        Some(run) => print_run(run),
        None => println!("  {} engine: editor symbol upload disabled", "-".dimmed()),
    }
    print_run(&report.project);
}

fn print_run(run: &RunReport) {
    let elapsed = format_duration(Duration::from_millis(run.duration.as_millis() as u64));
    if let Some(err) = &run.error {
        println!(
            "  {} {}: failed while {}: {}",
            "✗".red().bold(),
            run.target.cyan(),
            run.failed_in.map(|s| s.to_string()).unwrap_or_default(),
            err.user_message()
        );
    } else if run.is_noop() {
        println!(
            "  {} {}: nothing new ({} candidates, {} already uploaded) in {}",
            "✓".green().bold(),
            run.target.cyan(),
            run.candidates,
            run.known_files,
            elapsed
        );
    } else {
        println!(
            "  {} {}: uploaded {} files ({}), {} already uploaded, in {}",
            "✓".green().bold(),
            run.target.cyan(),
            run.new_files,
            symship::format_bytes(run.archived_bytes),
            run.known_files,
            elapsed
        );
    }
}
