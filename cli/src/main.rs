//! Syntest CLI - binary entry point and terminal session management.
//!
//! ```text
//! main() -> load config -> TerminalSession::new() -> run_{consistency,speed}()
//!                                                         |
//!                                                         v
//!                                        persist pending queue, print results
//! ```
//!
//! `battery` runs a consistency session and then a speed test built from the
//! participant's own associations. `resync` sends queued submissions without
//! opening the terminal UI.

mod assets;
mod session;
mod setup;

use std::fs::{self, OpenOptions};
use std::io::{Stdout, stdout};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::prelude::CrosstermBackend;
use syntest_config::{SyntestConfig, data_dir};
use syntest_engine::{
    AssociationPool, EffectRunner, HueLightnessPlane, MonotonicClock, PendingQueue, SpeedSession,
    TrialController, resync_pending,
};
use syntest_tui::{ScreenState, UiOptions, summary_lines};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::session::{ConsistencyOutcome, run_consistency, run_speed};

#[derive(Parser, Debug)]
#[command(name = "syntest", version, about = "Synesthesia consistency and speed tests")]
struct Cli {
    /// Config file (defaults to $SYNTEST_CONFIG or ~/.syntest/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seed for deck shuffling and choice generation
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Draw with ASCII glyphs only
    #[arg(long, global = true)]
    ascii: bool,

    /// Use the high-contrast palette
    #[arg(long, global = true)]
    high_contrast: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Color-picking consistency test (the default)
    Consistency {
        /// Catalog to test instead of `session.catalog`
        #[arg(long)]
        catalog: Option<String>,
    },
    /// Consistency test followed by a speed test over its associations
    Battery {
        #[arg(long)]
        catalog: Option<String>,
    },
    /// Speed test against a remote trial source
    Speed {
        /// Trial source URL instead of `submission.trial_source`
        #[arg(long)]
        source: Option<String>,
    },
    /// Send submissions queued by earlier sessions
    Resync,
    /// Print the bundled default configuration
    DefaultConfig,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Writing logs to stdout/stderr would corrupt the TUI.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    vec![
        data_dir().join("logs").join("syntest.log"),
        PathBuf::from(".syntest").join("logs").join("syntest.log"),
    ]
}

/// RAII wrapper for terminal state with guaranteed cleanup on drop.
///
/// Enables raw mode, the alternate screen, and mouse capture (the color plane
/// needs press, drag, and release events). Drop restores all three, so the
/// terminal stays usable after panics or early returns.
struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSession {
    fn new() -> Result<Self> {
        enable_raw_mode()?;

        let mut out = stdout();
        if let Err(err) = execute!(out, EnterAlternateScreen, EnableMouseCapture) {
            let _ = disable_raw_mode();
            let _ = execute!(out, DisableMouseCapture, LeaveAlternateScreen);
            return Err(err.into());
        }

        let terminal = match Terminal::new(CrosstermBackend::new(out)) {
            Ok(t) => t,
            Err(err) => {
                let _ = disable_raw_mode();
                let _ = execute!(stdout(), DisableMouseCapture, LeaveAlternateScreen);
                return Err(err.into());
            }
        };

        Ok(Self { terminal })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            DisableMouseCapture,
            LeaveAlternateScreen
        );
        let _ = self.terminal.show_cursor();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if matches!(cli.command, Some(Command::DefaultConfig)) {
        print!("{}", assets::default_config_text());
        return Ok(());
    }
    init_tracing();

    let config = setup::load_config(cli.config.as_deref())?;
    let options = UiOptions {
        ascii_only: cli.ascii,
        high_contrast: cli.high_contrast,
    };

    match cli.command.unwrap_or(Command::Consistency { catalog: None }) {
        Command::Consistency { catalog } => {
            consistency(&config, catalog.as_deref(), cli.seed, options).await
        }
        Command::Battery { catalog } => {
            battery(&config, catalog.as_deref(), cli.seed, options).await
        }
        Command::Speed { source } => speed(&config, source.as_deref(), options).await,
        Command::Resync => resync(&config).await,
        Command::DefaultConfig => Ok(()),
    }
}

fn new_controller(
    config: &SyntestConfig,
    catalog: Option<&str>,
    seed: Option<u64>,
) -> Result<TrialController> {
    let plan = setup::session_plan(config, catalog)?;
    let settings = setup::controller_settings(config, seed)?;
    let surface = HueLightnessPlane::new(config.capture.saturation)?;
    Ok(TrialController::new(
        plan,
        settings,
        Box::new(surface),
        Arc::new(MonotonicClock),
    )?)
}

async fn consistency(
    config: &SyntestConfig,
    catalog: Option<&str>,
    seed: Option<u64>,
    options: UiOptions,
) -> Result<()> {
    let controller = new_controller(config, catalog, seed)?;
    let (mut runner, mut events) = EffectRunner::new(setup::submitter(config)?, None);
    let mut state = ScreenState::new(options);

    let outcome = {
        let mut session = TerminalSession::new()?;
        run_consistency(
            &mut session.terminal,
            controller,
            &mut runner,
            &mut events,
            &mut state,
        )
        .await?
    };

    persist_pending(config, outcome.pending.clone())?;
    report_consistency(&outcome, options);
    Ok(())
}

async fn battery(
    config: &SyntestConfig,
    catalog: Option<&str>,
    seed: Option<u64>,
    options: UiOptions,
) -> Result<()> {
    let controller = new_controller(config, catalog, seed)?;
    let (mut runner, mut events) = EffectRunner::new(setup::submitter(config)?, None);
    let mut state = ScreenState::new(options);
    let mut session = TerminalSession::new()?;

    let outcome = run_consistency(
        &mut session.terminal,
        controller,
        &mut runner,
        &mut events,
        &mut state,
    )
    .await?;
    persist_pending(config, outcome.pending.clone())?;

    let summary = match (&outcome.summary, outcome.completed) {
        (Some(summary), true) => summary,
        _ => {
            drop(session);
            report_consistency(&outcome, options);
            return Ok(());
        }
    };

    let pool = AssociationPool::from_summary(
        summary,
        setup::choice_generator(config)?,
        seed.or(config.session.seed),
    );
    if pool.is_empty() {
        drop(session);
        report_consistency(&outcome, options);
        println!("No consistent associations to build a speed test from.");
        return Ok(());
    }
    tracing::info!(trials = pool.len(), "Starting speed test from associations");
    runner.set_source(Arc::new(pool));

    let speed = SpeedSession::new(
        Some(outcome.session_id.clone()),
        config.forced_choice.countdown_seconds,
        Arc::new(MonotonicClock),
    )
    .with_min_distance(config.forced_choice.min_distance);
    state.notice = None;
    let speed_outcome = run_speed(
        &mut session.terminal,
        speed,
        &mut runner,
        &mut events,
        &mut state,
    )
    .await?;
    drop(session);

    persist_pending(config, speed_outcome.pending)?;
    report_consistency(&outcome, options);
    Ok(())
}

async fn speed(config: &SyntestConfig, source: Option<&str>, options: UiOptions) -> Result<()> {
    let source = setup::remote_source(config, source)?;
    let (mut runner, mut events) = EffectRunner::new(setup::submitter(config)?, Some(source));
    let mut state = ScreenState::new(options);
    let session = SpeedSession::new(
        None,
        config.forced_choice.countdown_seconds,
        Arc::new(MonotonicClock),
    )
    .with_min_distance(config.forced_choice.min_distance);

    let outcome = {
        let mut terminal = TerminalSession::new()?;
        run_speed(
            &mut terminal.terminal,
            session,
            &mut runner,
            &mut events,
            &mut state,
        )
        .await?
    };

    let queued = outcome.pending.len();
    persist_pending(config, outcome.pending)?;
    if !outcome.completed {
        println!("Speed test ended early.");
    }
    if queued > 0 {
        println!("{queued} submission(s) queued; run `syntest resync` to send them.");
    }
    Ok(())
}

async fn resync(config: &SyntestConfig) -> Result<()> {
    let path = config.submission.pending_path();
    let mut queue = PendingQueue::load(&path)
        .with_context(|| format!("failed to read pending queue {}", path.display()))?;
    if queue.is_empty() {
        println!("Nothing to resync.");
        return Ok(());
    }
    let submitter = setup::submitter(config)?;
    let total = queue.len();
    match resync_pending(&mut queue, submitter.as_ref()).await {
        Ok(sent) => {
            queue.save(&path)?;
            println!("Sent {sent} of {total} queued submission(s).");
            Ok(())
        }
        Err(err) => {
            tracing::warn!(error = %err, "Resync failed");
            anyhow::bail!("resync failed, {total} submission(s) remain queued: {err}")
        }
    }
}

/// Merge a session's leftovers into the on-disk pending queue.
fn persist_pending(config: &SyntestConfig, pending: PendingQueue) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let path = config.submission.pending_path();
    let mut queue = PendingQueue::load(&path)
        .with_context(|| format!("failed to read pending queue {}", path.display()))?;
    queue.extend(pending);
    queue.save(&path)?;
    tracing::info!(queued = queue.len(), path = %path.display(), "Pending submissions saved");
    Ok(())
}

fn report_consistency(outcome: &ConsistencyOutcome, options: UiOptions) {
    if !outcome.completed {
        println!("Session {} ended early.", outcome.session_id);
    }
    let Some(summary) = &outcome.summary else {
        return;
    };
    let palette = syntest_tui::palette(options);
    let glyphs = syntest_tui::glyphs(options);
    for line in summary_lines(summary, &palette, &glyphs) {
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        println!("{}", text.trim_end());
    }
    if !outcome.pending.is_empty() {
        println!(
            "{} submission(s) queued; run `syntest resync` to send them.",
            outcome.pending.len()
        );
    }
}
