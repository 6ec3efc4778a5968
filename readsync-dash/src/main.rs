//! Teacher dashboard (readsync-dash) - Main entry point
//!
//! Terminal roster view for one reading session: subscribes to the hub
//! feed, reconciles events into a local roster, and redraws on a fixed
//! refresh tick so idle/stuck labels drift even without new events.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use readsync_common::config::Thresholds;
use readsync_dash::{FeedClient, FeedUpdate, Reconciler, SessionPhase};

/// Command-line arguments for the dashboard
#[derive(Parser, Debug)]
#[command(name = "readsync-dash")]
#[command(about = "Teacher dashboard for ReadSync reading sessions")]
#[command(version)]
struct Args {
    /// Session to watch
    session_id: String,

    /// Base URL of the Session Hub
    #[arg(long, default_value = "http://127.0.0.1:5727", env = "READSYNC_HUB_URL")]
    hub_url: String,

    /// Roster redraw interval in milliseconds
    #[arg(long, default_value = "1000")]
    refresh_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, the roster owns stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "readsync_dash=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    info!(
        "Starting ReadSync dashboard v{} for session {}",
        env!("CARGO_PKG_VERSION"),
        args.session_id
    );

    let feed = FeedClient::new(&args.hub_url).context("Failed to build feed client")?;
    let (tx, mut rx) = mpsc::channel(64);

    let session_id = args.session_id.clone();
    let mut feed_task = tokio::spawn(async move { feed.run(&session_id, tx).await });

    let mut reconciler = Reconciler::new(&args.session_id, Thresholds::default());
    let mut connected = false;
    let mut ticker = tokio::time::interval(Duration::from_millis(args.refresh_ms));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Some(FeedUpdate::Event(event)) => {
                    connected = true;
                    if reconciler.apply(&event) {
                        render(&reconciler, connected);
                    }
                    if reconciler.phase() == SessionPhase::Ended {
                        info!("session ended");
                        break;
                    }
                }
                Some(FeedUpdate::ConnectionLost { error }) => {
                    connected = false;
                    warn!("feed connection lost: {}", error);
                    render(&reconciler, connected);
                }
                None => {
                    match (&mut feed_task).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            error!("feed terminated: {}", e);
                            return Err(e.into());
                        }
                        Err(e) => {
                            error!("feed task failed: {}", e);
                        }
                    }
                    break;
                }
            },
            _ = ticker.tick() => {
                render(&reconciler, connected);
            }
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    feed_task.abort();
    render(&reconciler, connected);
    Ok(())
}

/// Redraw the roster
fn render(reconciler: &Reconciler, connected: bool) {
    use std::fmt::Write as _;
    use std::io::Write as _;

    let now = Utc::now();
    let stats = reconciler.stats(now);

    let mut out = String::new();
    // Clear screen, cursor to home
    out.push_str("\x1b[2J\x1b[H");

    let connection = if !connected {
        "disconnected, resubscribing"
    } else {
        match reconciler.phase() {
            SessionPhase::Connecting => "connecting",
            SessionPhase::Live => "live",
            SessionPhase::Ended => "ended",
        }
    };
    let _ = writeln!(
        out,
        "ReadSync session {} [{}]",
        reconciler.session_id(),
        connection
    );
    let _ = writeln!(
        out,
        "{} students | {} reading, {} idle, {} stuck, {} completed | mean {}%",
        stats.total, stats.reading, stats.idle, stats.stuck, stats.completed, stats.mean_progress
    );
    let _ = writeln!(out);

    for student in reconciler.students() {
        let status = reconciler.display_status(student, now);
        let name = student
            .student_name
            .as_deref()
            .unwrap_or(&student.student_id);
        let filled = usize::from(student.progress) / 5;
        let bar = format!("{}{}", "#".repeat(filled), "-".repeat(20 - filled));
        let _ = writeln!(
            out,
            "{:<20} [{}] {:>3}%  p{:>3}/{}  {}",
            name,
            bar,
            student.progress,
            student.current_paragraph + 1,
            student.total_paragraphs,
            status
        );
    }

    print!("{}", out);
    let _ = std::io::stdout().flush();
}
