//! CLI entry point for `mailharvest`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailharvest::archive::files::ConflictPolicy;
use mailharvest::config::Config;
use mailharvest::error::HarvestError;
use mailharvest::ingest::Settings;
use mailharvest::mail::local::EmlDirSource;
use mailharvest::model::summary::RunSummary;

#[derive(Parser)]
#[command(
    name = "mailharvest",
    version,
    about = "Fetch mailed build artifacts and distribute them into a working directory"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to $MAILHARVEST_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Destination root (defaults to the current directory)
    #[arg(short, long, global = true, env = "DEST_ROOT", value_name = "DIR")]
    dest: Option<PathBuf>,

    /// Fail instead of overwriting files that already exist
    #[arg(long, global = true)]
    no_overwrite: bool,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(flatten)]
    imap: ImapArgs,
}

#[derive(Args)]
struct ImapArgs {
    /// IMAP server host
    #[arg(long, global = true, env = "EMAIL_SERVER")]
    server: Option<String>,

    /// IMAP port (implicit TLS)
    #[arg(long, global = true, env = "EMAIL_PORT")]
    port: Option<u16>,

    /// Login name
    #[arg(long, global = true, env = "EMAIL_USER")]
    user: Option<String>,

    /// Folder to read
    #[arg(long, global = true)]
    mailbox: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every message from the IMAP folder and route its attachments (default)
    Fetch,
    /// Process a directory of .eml files instead of a server
    Local { dir: PathBuf },
    /// Distribute a local zip archive into the destination root
    Unpack { archive: PathBuf },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    }
}

/// Configuration errors and connection errors get their own exit codes.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<HarvestError>() {
        Some(e) if e.is_config() => ExitCode::from(2),
        Some(e) if e.is_connection() => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = mailharvest::config::load_config(cli.config.as_deref());

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
    .to_string();
    setup_logging(&log_level, &config);

    apply_cli_overrides(&mut config, &cli);

    match cli.command.unwrap_or(Commands::Fetch) {
        Commands::Fetch => cmd_fetch(&config, cli.json),
        Commands::Local { dir } => cmd_local(&config, &dir, cli.json),
        Commands::Unpack { archive } => cmd_unpack(&config, &archive, cli.json),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Flags (and their environment variables) win over the config file.
fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    let imap = &cli.imap;
    if imap.server.is_some() {
        config.imap.server = imap.server.clone();
    }
    if let Some(port) = imap.port {
        config.imap.port = port;
    }
    if imap.user.is_some() {
        config.imap.username = imap.user.clone();
    }
    // No flag for the password: it would show up in the process list.
    config.set_password(std::env::var("EMAIL_PASSWORD").ok());
    if let Some(ref mailbox) = imap.mailbox {
        config.imap.mailbox = mailbox.clone();
    }
    if cli.dest.is_some() {
        config.general.dest_root = cli.dest.clone();
    }
    if cli.no_overwrite {
        config.general.on_conflict = ConflictPolicy::Fail;
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailharvest::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailharvest.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn settings(config: &Config) -> anyhow::Result<Settings> {
    let cwd = std::env::current_dir()?;
    Ok(config.settings(&cwd))
}

/// Fetch from the IMAP server.
fn cmd_fetch(config: &Config, json: bool) -> anyhow::Result<()> {
    // Credentials are checked before anything touches the network.
    let params = config.imap_params()?;
    let settings = settings(config)?;

    let pb = progress_bar("Fetching");
    let summary = mailharvest::ingest::run_imap(&params, &settings, &|current, total| {
        pb.set_length(total as u64);
        pb.set_position(current as u64);
    })?;
    pb.finish_and_clear();

    print_summary(&summary, &settings.dest_root, json)
}

/// Ingest a directory of `.eml` files.
fn cmd_local(config: &Config, dir: &Path, json: bool) -> anyhow::Result<()> {
    let settings = settings(config)?;
    let source = EmlDirSource::open(dir)?;

    let pb = progress_bar("Processing");
    let summary = mailharvest::ingest::ingest_session(source, &settings, &|current, total| {
        pb.set_length(total as u64);
        pb.set_position(current as u64);
    })?;
    pb.finish_and_clear();

    print_summary(&summary, &settings.dest_root, json)
}

/// Distribute one local archive.
fn cmd_unpack(config: &Config, archive: &Path, json: bool) -> anyhow::Result<()> {
    if !archive.is_file() {
        anyhow::bail!("Archive not found: {}", archive.display());
    }
    let settings = settings(config)?;

    let stats = mailharvest::archive::distribute(
        archive,
        &settings.dest_root,
        &settings.layout,
        settings.conflict,
    )?;

    let mut summary = RunSummary::default();
    summary.record_distribution(&stats);
    print_summary(&summary, &settings.dest_root, json)
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailharvest", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

fn progress_bar(label: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {label} [{{bar:40.cyan/blue}}] {{pos}}/{{len}}"
            ))
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb
}

/// Print the run summary as a table or JSON.
fn print_summary(summary: &RunSummary, dest: &Path, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<25} {}", "Destination", dest.display());
    println!("  {:<25} {}", "Messages found", summary.messages_found);
    if summary.messages_failed > 0 {
        println!("  {:<25} {}", "Messages failed", summary.messages_failed);
    }
    println!("  {:<25} {}", "Attachments seen", summary.attachments_seen);
    println!("  {:<25} {}", "Attachments ignored", summary.attachments_ignored);
    println!(
        "  {:<25} {} ({})",
        "Scripts saved",
        summary.scripts_saved,
        format_size(summary.bytes_written, BINARY)
    );
    println!("  {:<25} {}", "Archives extracted", summary.archives_extracted);
    if summary.archives_failed > 0 {
        println!("  {:<25} {}", "Archives failed", summary.archives_failed);
    }
    println!("  {:<25} {}", "Audio files moved", summary.audio_moved);
    println!("  {:<25} {}", "Scripts moved", summary.scripts_moved);
    println!("  {:<25} {}", "Boilerplate removed", summary.boilerplate_removed);
    if summary.had_errors() {
        println!();
        println!("  Some items failed; see the log for details.");
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_password_is_not_a_flag() {
        assert!(Cli::try_parse_from(["mailharvest", "--password", "hunter2", "fetch"]).is_err());
        assert!(Cli::try_parse_from(["mailharvest", "--user", "builds", "fetch"]).is_ok());
    }
}
