//! Tutor Console (tmatch-tc) - Main entry point
//!
//! Command-line client for the matching server: watch a subject's pending
//! pool live, file a request, claim one, or drive a claimed session.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use tmatch_tc::watch::{Backend, WatchSession};
use tmatch_tc::ApiClient;

/// Command-line arguments for tmatch-tc
#[derive(Parser, Debug)]
#[command(name = "tmatch-tc")]
#[command(about = "Tutor console for TutorMatch instant sessions")]
#[command(version)]
struct Args {
    /// Matching server base URL
    #[arg(
        short,
        long,
        default_value = "http://localhost:5760",
        env = "TMATCH_SERVER"
    )]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the pending pool live
    Watch {
        /// Only show requests for this subject
        #[arg(long)]
        subject_id: Option<Uuid>,

        /// Disable the push channel and rely on polling alone
        #[arg(long)]
        poll_only: bool,

        /// Poll fallback interval in seconds
        #[arg(long, default_value = "5")]
        poll_interval: u64,
    },

    /// File a new instant session request (student side)
    Request {
        #[arg(long)]
        student_id: Uuid,
        #[arg(long)]
        subject_id: Uuid,
    },

    /// Claim a pending request
    Accept {
        id: Uuid,
        #[arg(long)]
        tutor_id: Uuid,
    },

    /// Cancel a pending or accepted request
    Cancel {
        id: Uuid,
        #[arg(long)]
        caller_id: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Record that the assigned tutor joined the meeting
    TutorJoined {
        id: Uuid,
        #[arg(long)]
        tutor_id: Uuid,
    },

    /// Record that the requesting student joined the meeting
    StudentJoined {
        id: Uuid,
        #[arg(long)]
        student_id: Uuid,
    },

    /// Mark the session started
    Start {
        id: Uuid,
        #[arg(long)]
        caller_id: Uuid,
    },

    /// Mark the session completed
    Complete {
        id: Uuid,
        #[arg(long)]
        caller_id: Uuid,
    },

    /// Show one request's current snapshot
    Show { id: Uuid },

    /// List past requests for a student or a tutor
    History {
        #[arg(long, conflicts_with = "tutor_id")]
        student_id: Option<Uuid>,
        #[arg(long)]
        tutor_id: Option<Uuid>,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tmatch_tc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let client = ApiClient::new(args.server.clone()).context("Failed to build API client")?;

    match args.command {
        Command::Watch {
            subject_id,
            poll_only,
            poll_interval,
        } => {
            let backend = if poll_only { Backend::PollOnly } else { Backend::Push };
            info!(server = %args.server, ?subject_id, ?backend, "Watching pending pool");

            let session = WatchSession::new(
                client,
                subject_id,
                backend,
                Duration::from_secs(poll_interval.max(1)),
            );
            session.run().await?;
        }

        Command::Request {
            student_id,
            subject_id,
        } => {
            let request = client.create(student_id, subject_id).await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }

        Command::Accept { id, tutor_id } => {
            let request = client.accept(id, tutor_id).await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
            if let Some(url) = &request.meeting_url {
                println!("meeting: {}", url);
            }
        }

        Command::Cancel {
            id,
            caller_id,
            reason,
        } => {
            let request = client.cancel(id, caller_id, reason).await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }

        Command::TutorJoined { id, tutor_id } => {
            let request = client.tutor_joined(id, tutor_id).await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }

        Command::StudentJoined { id, student_id } => {
            let request = client.student_joined(id, student_id).await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }

        Command::Start { id, caller_id } => {
            let request = client.start(id, caller_id).await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }

        Command::Complete { id, caller_id } => {
            let request = client.complete(id, caller_id).await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }

        Command::Show { id } => {
            let snapshot = client.get(id).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        Command::History {
            student_id,
            tutor_id,
            limit,
        } => {
            let requests = match (student_id, tutor_id) {
                (Some(student), None) => client.student_history(student, limit).await?,
                (None, Some(tutor)) => client.tutor_history(tutor, limit).await?,
                _ => anyhow::bail!("pass exactly one of --student-id or --tutor-id"),
            };
            println!("{}", serde_json::to_string_pretty(&requests)?);
        }
    }

    Ok(())
}
