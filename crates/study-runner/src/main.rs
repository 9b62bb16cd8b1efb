//! Command-line driver for the orchestration core.
//!
//! Stands in for the page layer: enrolls participants, records T0 opinions,
//! runs chat cycles and prints session progress. Doubles as an operational
//! smoke tool against a real backend (or the canned test-mode backend).

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use orchestration::condition::{Condition, CycleIndex, OpinionScore, SessionKey, TaskOrder};
use orchestration::gateway::GenerationGateway;
use orchestration::rate_limit::CycleRateLimiter;
use orchestration::store::StudyStore;
use orchestration::turn::{SessionPhase, TurnOrchestrator};
use orchestration::StudyConfig;

#[derive(Parser)]
#[command(name = "study-runner", about = "Drive the chat-experiment core from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll a new participant and print their id
    Enroll {
        /// Experimental condition: majority, minority or minority_diffusion
        #[arg(long)]
        condition: String,
        /// Session counterbalancing: standard or reversed
        #[arg(long, default_value = "standard")]
        task_order: String,
    },
    /// Record the pre-chat opinion for a session
    Opinion {
        #[arg(long)]
        participant: String,
        /// Session key: test, normative or informative (main1/main2 accepted)
        #[arg(long)]
        session: String,
        /// Opinion score, -50 to +50
        #[arg(long, allow_hyphen_values = true)]
        score: i32,
    },
    /// Run one conversational cycle and print the agent replies
    Cycle {
        #[arg(long)]
        participant: String,
        #[arg(long)]
        session: String,
        #[arg(long)]
        cycle: u8,
        /// The participant's chat message for this cycle
        message: String,
    },
    /// Show where each session of a participant stands
    Status {
        #[arg(long)]
        participant: String,
    },
    /// Mark a participant as finished with the experiment
    Finish {
        #[arg(long)]
        participant: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = StudyConfig::default();
    let store = Arc::new(
        StudyStore::open(&config.database_path)
            .with_context(|| format!("opening store at {}", config.database_path.display()))?,
    );

    match cli.command {
        Command::Enroll {
            condition,
            task_order,
        } => {
            let condition = Condition::from_str(&condition)?;
            let task_order = TaskOrder::from_str(&task_order)?;
            let participant = store.create_participant(condition, task_order)?;
            info!(id = %participant.id, condition = %condition, "participant enrolled");
            println!("{}", participant.id);
        }
        Command::Opinion {
            participant,
            session,
            score,
        } => {
            let key = SessionKey::from_str(&session)?;
            let score = OpinionScore::new(score)?;
            let loaded = store
                .get_participant(&participant)?
                .context("participant not found")?;
            store.get_or_create_session(&loaded, key)?;
            store.record_initial_opinion(&participant, key, score)?;
            info!(participant, session = %key, score = score.value(), "initial opinion recorded");
        }
        Command::Cycle {
            participant,
            session,
            cycle,
            message,
        } => {
            config.validate()?;
            let key = SessionKey::from_str(&session)?;
            let cycle = CycleIndex::new(cycle)?;
            let backend = config.build_backend()?;
            let gateway = GenerationGateway::new(
                backend,
                config.model.clone(),
                config.gateway_timeout,
                config.max_tokens,
            );
            let orchestrator = TurnOrchestrator::new(
                store.clone(),
                gateway,
                CycleRateLimiter::new(config.cycle_spacing),
            );

            let outcome = orchestrator
                .run_cycle(&participant, key, cycle, &message)
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Status { participant } => {
            let loaded = store
                .get_participant(&participant)?
                .context("participant not found")?;
            println!(
                "participant {} | condition {} | order {} | finished: {}",
                loaded.id,
                loaded.condition,
                loaded.task_order,
                loaded.finished_at.as_deref().unwrap_or("no"),
            );
            for key in SessionKey::all() {
                match store.get_session(&participant, *key)? {
                    None => println!("  {key}: not started"),
                    Some(session) => {
                        let last = store.last_response_index(&participant, *key)?;
                        let phase = SessionPhase::derive(session.initial_opinion, last);
                        println!(
                            "  {key}: phase {phase} | cycle counter {} | topic: {}",
                            session.cycle, session.topic,
                        );
                    }
                }
            }
        }
        Command::Finish { participant } => {
            store.mark_finished(&participant)?;
            info!(participant, "participant marked finished");
        }
    }

    Ok(())
}
