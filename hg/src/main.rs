//! Hallucigenia - Bitbucket branch watcher
//!
//! CLI entry point for the watch loop and repository management.

use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use tracing::{debug, info, warn};

use hallucigenia::cache::{CacheManager, GitCloner};
use hallucigenia::cli::{Cli, Command, RepoCommand, ScriptCommand};
use hallucigenia::config::Config;
use hallucigenia::manager::{RepoManager, ScriptChange, ScriptTarget};
use hallucigenia::remote::{BitbucketProvider, BranchProvider};
use hallucigenia::scripts::ScriptExecutor;
use hallucigenia::watcher::{BranchWatcher, CycleReport, WatchCycle};
use repostore::{ConnectionStatus, NewRepository, RepoStore};

fn setup_logging(log_dir: &Path, cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("hallucigenia.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Store, provider and cache wired from the configuration
struct Components {
    store: RepoStore,
    provider: Arc<dyn BranchProvider>,
    cache: CacheManager,
}

impl Components {
    fn new(config: &Config) -> Result<Self> {
        let store = RepoStore::open(config.repositories_dir()).context("Failed to open repository store")?;
        let provider = BitbucketProvider::new(&config.remote).context("Failed to build Bitbucket client")?;
        let cache = CacheManager::new(Arc::new(GitCloner::new(&config.git.program)));
        Ok(Self {
            store,
            provider: Arc::new(provider),
            cache,
        })
    }

    fn manager(self, config: &Config) -> RepoManager {
        RepoManager::new(self.store, self.provider, self.cache)
            .with_clear_on_sync_failure(config.remote.clear_branches_on_sync_failure)
    }

    fn cycle(self, config: &Config) -> WatchCycle {
        WatchCycle::new(
            self.store,
            self.provider,
            self.cache,
            ScriptExecutor::new(&config.scripts.branch_path_env),
            config.watch.fetch_concurrency(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }

    setup_logging(&config.log_dir(), cli.log_level.as_deref(), config.log_level.as_deref())
        .context("Failed to setup logging")?;
    info!(data_dir = %config.data_dir.display(), "Hallucigenia loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Watch => cmd_watch(&config).await,
        Command::Check => cmd_check(&config).await,
        Command::Clean => cmd_clean(&config).await,
        Command::Repo { command } => cmd_repo(&config, command).await,
        Command::Script { command } => cmd_script(&config, command),
    }
}

async fn cmd_watch(config: &Config) -> Result<()> {
    let cycle = Components::new(config)?.cycle(config);
    let mut watcher = BranchWatcher::new(cycle, config.watch.cooldown());

    println!(
        "{} Watching {} (cooldown {}s). Press Ctrl+C to stop.",
        "●".green(),
        config.repositories_dir().display(),
        config.watch.cooldown_secs
    );
    watcher.run(shutdown_signal(), print_report).await;
    println!("Stopped after {} cycle(s)", watcher.cycles_run());
    Ok(())
}

async fn cmd_check(config: &Config) -> Result<()> {
    let cycle = Components::new(config)?.cycle(config);
    let report = cycle.run_cycle().await.context("Failed to list repositories")?;
    print_report(&report);

    // Exiting would drop the tasks that write the log trailers
    for outcome in report.results {
        if let Some(handle) = outcome.script.and_then(|s| s.handle) {
            let name = handle.script_name().to_string();
            match handle.wait().await {
                Some(0) => println!("  {} script {} finished", "✓".green(), name),
                Some(code) => println!("  {} script {} exited with code {}", "✗".red(), name, code),
                None => println!("  {} script {} ended without exit code", "✗".red(), name),
            }
        }
    }
    Ok(())
}

async fn cmd_clean(config: &Config) -> Result<()> {
    let manager = Components::new(config)?.manager(config);
    let evicted = manager.clean().await?;
    println!("{} Evicted {} cached branch(es)", "✓".green(), evicted);
    Ok(())
}

fn print_report(report: &CycleReport) {
    for failure in &report.fetch_failures {
        println!("{} {}: fetch failed: {}", "✗".red(), failure.slug.cyan(), failure.error);
    }

    for outcome in &report.results {
        let target = format!("{}/{}", outcome.slug, outcome.branch_name);
        let short_hash = short(&outcome.new_hash);
        if !outcome.materialized {
            println!("{} {} clone failed ({})", "✗".red(), target.cyan(), short_hash);
            continue;
        }
        if let Some(error) = &outcome.error {
            println!("{} {} could not record {}: {}", "✗".red(), target.cyan(), short_hash, error);
            continue;
        }
        match &outcome.script {
            Some(script) if script.launched() => println!(
                "{} {} -> {} ({} script {} launched, log {})",
                "✓".green(),
                target.cyan(),
                short_hash,
                script.kind,
                script.script_name,
                script.log_path().map(|p| p.display().to_string()).unwrap_or_default()
            ),
            Some(script) => println!(
                "{} {} -> {} ({} script {} failed to start)",
                "!".yellow(),
                target.cyan(),
                short_hash,
                script.kind,
                script.script_name
            ),
            None => println!("{} {} -> {} (no script)", "✓".green(), target.cyan(), short_hash),
        }
    }

    println!(
        "{} changed, {} updated, {} fetch failure(s), {} evicted",
        report.changed_count,
        report.succeeded_count(),
        report.fetch_failures.len(),
        report.evicted
    );
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (Ok(mut sigint), Ok(mut sigterm)) = (signal(SignalKind::interrupt()), signal(SignalKind::terminate()))
        else {
            warn!("Could not install signal handlers, waiting for ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        warn!("Ctrl-C received");
    }
}

fn status_label(status: ConnectionStatus) -> ColoredString {
    match status {
        ConnectionStatus::Ok => "ok".green(),
        ConnectionStatus::Ko => "ko".red(),
    }
}

fn set_label(set: bool) -> ColoredString {
    if set { "set".green() } else { "not set".red() }
}

async fn cmd_repo(config: &Config, command: RepoCommand) -> Result<()> {
    let manager = Components::new(config)?.manager(config);

    match command {
        RepoCommand::Add {
            workspace,
            name,
            slug,
            token,
        } => {
            debug!(%workspace, %name, ?slug, "main: matched RepoCommand::Add");
            let repo = manager
                .add_repository(slug.as_deref(), NewRepository::new(workspace, name, token))
                .await?;
            let record = repo.record()?;
            println!(
                "{} Added {} [{}] with {} branch(es)",
                "✓".green(),
                repo.slug().cyan(),
                status_label(record.remote_connection_status),
                record.branches.len()
            );
        }
        RepoCommand::List => {
            let summaries = manager.summaries()?;
            if summaries.is_empty() {
                println!("No repositories. Add one with `hg repo add <workspace> <name>`.");
            }
            for s in summaries {
                println!(
                    "{} ({}/{}) [{}] observed {}/{} cached {} default script [{}] branch scripts {}/{}",
                    s.slug.cyan(),
                    s.workspace_name,
                    s.name,
                    status_label(s.status),
                    s.observed_count,
                    s.branch_count,
                    s.cached_count,
                    set_label(s.has_default_script),
                    s.scripted_observed_count,
                    s.observed_count
                );
            }
        }
        RepoCommand::Remove { slug, yes } => {
            if !yes && !confirm(&format!("Delete repository {} with its branches, scripts and logs?", slug))? {
                println!("Aborted");
                return Ok(());
            }
            manager.remove_repository(&slug)?;
            println!("{} Removed {}", "✓".green(), slug);
        }
        RepoCommand::Rename { slug, new_slug } => {
            let repo = manager.rename_repository(&slug, &new_slug)?;
            println!("{} Renamed {} to {}", "✓".green(), slug, repo.slug().cyan());
        }
        RepoCommand::Check => {
            for check in manager.check_connections().await? {
                match check.error {
                    Some(error) => println!("{} [{}] {}", check.slug.cyan(), status_label(check.status), error),
                    None => println!("{} [{}]", check.slug.cyan(), status_label(check.status)),
                }
            }
        }
        RepoCommand::Sync { slug } => {
            let count = manager.sync_branches(&slug).await?;
            println!("{} {} has {} branch(es)", "✓".green(), slug.cyan(), count);
        }
        RepoCommand::Branches { slug } => {
            for b in manager.branches(&slug)? {
                let marker = if b.observed { "●".green() } else { "○".normal() };
                let remote = b.remote_hash.as_deref().map(short).unwrap_or_else(|| "gone".red().to_string());
                let materialized = b.materialized_hash.as_deref().map(short).unwrap_or_else(|| "-".to_string());
                println!(
                    "{} {} remote {} materialized {}{}{}",
                    marker,
                    b.name,
                    remote,
                    materialized,
                    if b.cached { " cached" } else { "" },
                    if b.has_script { " scripted" } else { "" }
                );
            }
        }
        RepoCommand::Observe { slug, branches, clear } => {
            let names = if clear { Vec::new() } else { branches };
            let evicted = manager.set_observed(&slug, &names).await?;
            println!(
                "{} {} observes {} branch(es), evicted {}",
                "✓".green(),
                slug.cyan(),
                names.len(),
                evicted
            );
        }
    }
    Ok(())
}

fn cmd_script(config: &Config, command: ScriptCommand) -> Result<()> {
    let manager = Components::new(config)?.manager(config);

    match command {
        ScriptCommand::List { slug } => {
            for name in manager.list_scripts(&slug)? {
                println!("{}", name);
            }
        }
        ScriptCommand::Set { slug, branch, file } => {
            let body = if file.as_os_str() == "-" {
                let mut body = String::new();
                io::stdin().read_to_string(&mut body).context("Failed to read script from stdin")?;
                body
            } else {
                fs::read_to_string(&file).context(format!("Failed to read {}", file.display()))?
            };
            match manager.set_script(&slug, &ScriptTarget::from_branch(branch), &body)? {
                ScriptChange::Written(path) => println!("{} Saved {}", "✓".green(), path.display()),
                ScriptChange::Removed(true) => println!("{} Empty body, script deleted", "✓".green()),
                ScriptChange::Removed(false) => println!("Empty body, nothing to delete"),
            }
        }
        ScriptCommand::Show { slug, branch } => match manager.show_script(&slug, &ScriptTarget::from_branch(branch))? {
            Some(body) => print!("{}", body),
            None => bail!("No such script for {}", slug),
        },
        ScriptCommand::Remove { slug, branch } => {
            if manager.remove_script(&slug, &ScriptTarget::from_branch(branch))? {
                println!("{} Script deleted", "✓".green());
            } else {
                println!("No such script");
            }
        }
    }
    Ok(())
}

fn short(hash: &str) -> String {
    hash.chars().take(12).collect()
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
