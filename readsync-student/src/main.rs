//! Student simulator (readsync-student) - Main entry point
//!
//! Drives synthetic readers against a running hub: creates (or joins) a
//! session, starts one tracker per reader, paces them through the story,
//! and optionally ends the session once every reader completes.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use readsync_common::api::CreateSessionRequest;
use readsync_student::{HubClient, Tracker};

/// Command-line arguments for the simulator
#[derive(Parser, Debug)]
#[command(name = "readsync-student")]
#[command(about = "Synthetic student readers for ReadSync")]
#[command(version)]
struct Args {
    /// Base URL of the Session Hub
    #[arg(long, default_value = "http://127.0.0.1:5727", env = "READSYNC_HUB_URL")]
    hub_url: String,

    /// Session to join; a fresh one is created when omitted
    #[arg(short, long)]
    session_id: Option<String>,

    /// Classroom id used when creating a session
    #[arg(long, default_value = "classroom-1")]
    classroom_id: String,

    /// Teacher id used when creating a session
    #[arg(long, default_value = "sim-teacher")]
    teacher_id: String,

    /// Story id used when creating a session
    #[arg(long, default_value = "sim-story")]
    story_id: String,

    /// Number of simulated readers
    #[arg(short = 'n', long, default_value = "3")]
    students: u32,

    /// Paragraph count of the simulated story
    #[arg(long, default_value = "14")]
    paragraphs: u32,

    /// Base milliseconds a reader spends per paragraph
    #[arg(long, default_value = "2000")]
    pace_ms: u64,

    /// End the session after every reader completes
    #[arg(long)]
    end_session: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "readsync_student=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting ReadSync student simulator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = HubClient::new(&args.hub_url).context("Failed to build hub client")?;

    let session_id = match &args.session_id {
        Some(id) => id.clone(),
        None => {
            let created = client
                .create_session(CreateSessionRequest {
                    session_id: None,
                    classroom_id: args.classroom_id.clone(),
                    teacher_id: args.teacher_id.clone(),
                    story_id: args.story_id.clone(),
                    mode: "guided".to_string(),
                })
                .await
                .context("Failed to create session")?;
            info!(session_id = %created.session_id, "created session");
            created.session_id
        }
    };

    let mut readers = Vec::new();
    for i in 0..args.students {
        let client = client.clone();
        let session_id = session_id.clone();
        let paragraphs = args.paragraphs;
        // Deterministic stagger so readers spread out
        let pace = Duration::from_millis(args.pace_ms + (i as u64 * 137) % 900);
        readers.push(tokio::spawn(async move {
            run_reader(client, &session_id, i, paragraphs, pace).await
        }));
    }

    for reader in readers {
        reader.await.context("Reader task panicked")??;
    }

    if args.end_session {
        client
            .end_session(&session_id)
            .await
            .context("Failed to end session")?;
        info!(session_id = %session_id, "session ended");
    }

    info!("All readers finished");
    Ok(())
}

/// Pace one synthetic reader through the story
async fn run_reader(
    client: HubClient,
    session_id: &str,
    index: u32,
    paragraphs: u32,
    pace: Duration,
) -> Result<()> {
    let tracker = Tracker::with_defaults(client);
    let student_id = tracker
        .start(session_id, Some(format!("reader-{}", index + 1)), paragraphs)
        .await
        .context("Failed to join session")?;
    info!(student_id = %student_id, "reader joined");

    for paragraph in 1..paragraphs {
        tokio::time::sleep(pace).await;
        tracker.observe_paragraph(paragraph, 1.0).await;
    }

    tracker.stop().await;
    info!(student_id = %student_id, "reader finished");
    Ok(())
}
