use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    cursor::Show,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};

use sensorbee_iotop::{
    logging, CliOverrides, DecodePolicy, Feed, IotopError, KeyEvents, MonitoringState, Session,
    Settings, StatusRequester, Theme,
};

#[derive(Parser, Debug)]
#[command(name = "sensorbee-iotop")]
#[command(about = "Live I/O dashboard for SensorBee topologies")]
struct Args {
    /// Base URI of the SensorBee server [env: SENSORBEE_URI] [default: http://localhost:15601/]
    #[arg(long)]
    uri: Option<String>,

    /// API version of the server [default: v1]
    #[arg(long)]
    api_version: Option<String>,

    /// Name of the topology to monitor
    #[arg(short, long)]
    topology: Option<String>,

    /// Refresh interval in seconds, at least 1.0 [default: 5]
    #[arg(short = 'd', long)]
    interval: Option<f64>,

    /// Node categories to show, e.g. "src,box" (edge, source/src, box, sink)
    #[arg(short, long)]
    filter: Option<String>,

    /// Read newline-delimited records from a TCP endpoint (host:port) instead
    #[arg(long, conflicts_with = "topology")]
    connect: Option<String>,

    /// Config file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Stop on the first malformed record instead of skipping it
    #[arg(long)]
    strict: bool,
}

impl Args {
    fn overrides(self) -> CliOverrides {
        CliOverrides {
            uri: self.uri,
            api_version: self.api_version,
            topology: self.topology,
            interval: self.interval,
            filter: self.filter,
            connect: self.connect,
            strict: self.strict,
            log_file: self.log_file,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_file = args.config.clone();
    let settings = Settings::load(config_file.as_deref(), args.overrides())?;
    logging::init(settings.log_file.as_deref())?;
    let state = settings.initial_state()?;

    let (feed, requester) = open_feed(&settings).await?;
    info!(feed = feed.description(), "feed opened");

    let result = run_tui(feed, state, settings.decode_policy()).await;

    if let Some(requester) = requester {
        if let Err(e) = requester.teardown().await {
            warn!(error = %e, "cannot drop the status source");
        }
    }
    result
}

/// Open the monitoring feed before taking over the terminal, so connection
/// errors print normally.
async fn open_feed(settings: &Settings) -> Result<(Feed, Option<StatusRequester>)> {
    if let Some(addr) = &settings.connect {
        let feed = Feed::connect(addr).await?;
        return Ok((feed, None));
    }

    let topology = settings.topology.as_deref().unwrap_or_default();
    let requester = StatusRequester::new(&settings.uri, &settings.api_version, topology);
    requester
        .setup(settings.interval)
        .await
        .context("cannot create the status source")?;

    match requester.select().await {
        Ok(feed) => Ok((feed, Some(requester))),
        Err(e) => {
            if let Err(teardown) = requester.teardown().await {
                warn!(error = %teardown, "cannot drop the status source");
            }
            Err(e).context("cannot subscribe to node statuses")
        }
    }
}

/// Run the dashboard on the real terminal
async fn run_tui(feed: Feed, state: MonitoringState, policy: DecodePolicy) -> Result<()> {
    let theme = Theme::auto_detect();

    // Setup terminal
    enable_raw_mode()?;
    let terminal = match enter_alternate_screen() {
        Ok(terminal) => terminal,
        Err(e) => {
            let _ = restore_terminal();
            return Err(e).context("cannot set up the terminal");
        }
    };

    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = restore_terminal();
        original_hook(panic);
    }));

    let session = Session::new(terminal, state, theme);
    let result = session.run(feed, KeyEvents::spawn(), policy).await;

    finish(result, restore_terminal())
}

fn enter_alternate_screen() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

/// Leave raw mode and the alternate screen, attempting every step.
fn restore_terminal() -> io::Result<()> {
    let raw = disable_raw_mode();
    let screen = execute!(io::stdout(), LeaveAlternateScreen, Show);
    raw.and(screen)
}

/// The session's own error wins over a failed restore.
fn finish(session: Result<(), IotopError>, restored: io::Result<()>) -> Result<()> {
    match (session, restored) {
        (Err(e), Err(restore)) => {
            warn!(error = %restore, "cannot restore the terminal");
            Err(e.into())
        }
        (Err(e), Ok(())) => Err(e.into()),
        (Ok(()), restored) => restored.context("cannot restore the terminal"),
    }
}
