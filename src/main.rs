#![allow(missing_docs)]

//! Colloquy CLI — drive the orchestration engine from a terminal.
//!
//! Sessions, turns, and personas live in external stores; this binary is
//! just one caller of the engine's orchestration API.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use base64::Engine as _;
use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;
use tracing::warn;

use colloquy::config::ColloquyConfig;
use colloquy::engine::orchestrator::{AdvanceError, AdvanceEvent};
use colloquy::engine::template::Template;
use colloquy::engine::Engine;
use colloquy::logging;
use colloquy::providers::Attachment;
use colloquy::types::{Session, Speaker, Turn};

#[derive(Parser)]
#[command(name = "colloquy", version, about = "Persona conversation and simulation engine")]
struct Cli {
    /// Write JSON logs to this directory (daily rotation) in addition to stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new session with the given agents and make it active.
    New {
        /// Session display name; defaults to "Chat with {agents}".
        #[arg(long)]
        name: Option<String>,
        /// Participant agent ids, in speaking order.
        #[arg(required = true)]
        agents: Vec<String>,
    },
    /// Send a message to a session and print each agent's reply as it lands.
    Chat {
        /// Session id; defaults to the active session.
        #[arg(long)]
        session: Option<String>,
        /// The message to send.
        message: String,
    },
    /// Resume the last active session and print its transcript.
    Resume,
    /// Run a one-shot simulation from a template file.
    Simulate {
        /// Path to a template TOML file.
        template: PathBuf,
        /// Agent id to react as.
        #[arg(long)]
        agent: String,
        /// Field values, repeatable: -f NAME=value.
        #[arg(short = 'f', long = "field", value_parser = parse_key_val)]
        fields: Vec<(String, String)>,
        /// Path to a stimulus file sent inline with the prompt.
        #[arg(long)]
        stimulus: Option<PathBuf>,
        /// MIME type of the stimulus file (required with --stimulus).
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Continue a simulation as an ad-hoc chat.
    FollowUp {
        /// Simulation session id (printed by `simulate`).
        session: String,
        /// Agent id to keep reacting as.
        #[arg(long)]
        agent: String,
        /// The message to send.
        message: String,
    },
}

/// Parse a `NAME=value` argument.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected NAME=value, got {s:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _guard = match &cli.log_dir {
        Some(dir) => Some(logging::init_serve(dir)?),
        None => {
            logging::init_cli();
            None
        }
    };

    let config = ColloquyConfig::load().context("failed to load configuration")?;
    let engine = Engine::from_config(&config)?;

    match cli.command {
        Command::New { name, agents } => {
            let session = engine.start_session(name.as_deref(), &agents).await?;
            println!("session {} ({})", session.id, session.name);
        }
        Command::Chat { session, message } => {
            let session = resolve_session(&engine, session).await?;
            run_chat(&engine, session, message).await?;
        }
        Command::Resume => {
            let resumed = engine.resume().await?;
            println!(
                "session {} ({})",
                resumed.session.id, resumed.session.name
            );
            for turn in &resumed.cached_turns {
                print_turn(turn);
            }
            // Authoritative refresh; the cache above renders instantly even
            // when the store is slow.
            match engine.refresh_turns(&resumed.session.id).await {
                Ok(turns) if turns.len() > resumed.cached_turns.len() => {
                    println!("--- refreshed ---");
                    for turn in turns.iter().skip(resumed.cached_turns.len()) {
                        print_turn(turn);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "authoritative refresh failed"),
            }
        }
        Command::Simulate {
            template,
            agent,
            fields,
            stimulus,
            mime_type,
        } => {
            let template = Template::load(&template)
                .with_context(|| format!("failed to load template {}", template.display()))?;
            let agent = engine
                .get_agent(&agent)
                .await?
                .with_context(|| format!("agent {agent} not found"))?;
            let fields: HashMap<String, String> = fields.into_iter().collect();

            let stimulus = match stimulus {
                Some(path) => {
                    let mime_type =
                        mime_type.context("--mime-type is required with --stimulus")?;
                    let bytes = std::fs::read(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    Some(Attachment {
                        data: base64::engine::general_purpose::STANDARD.encode(bytes),
                        mime_type,
                    })
                }
                None => None,
            };

            let turn = engine
                .run_simulation(&template, &fields, &agent, stimulus.as_ref())
                .await?;
            println!("simulation session {}", turn.session_id);
            print_turn(&turn);
        }
        Command::FollowUp {
            session,
            agent,
            message,
        } => {
            let agent = engine
                .get_agent(&agent)
                .await?
                .with_context(|| format!("agent {agent} not found"))?;
            let turn = engine.follow_up(&session, &agent, &message).await?;
            print_turn(&turn);
        }
    }

    Ok(())
}

/// Resolve the target session: an explicit id, else the active one.
async fn resolve_session(engine: &Engine, session_id: Option<String>) -> Result<Session> {
    match session_id {
        Some(id) => engine
            .get_session(&id)
            .await?
            .with_context(|| format!("session {id} not found")),
        None => match engine.resume().await {
            Ok(resumed) => Ok(resumed.session),
            Err(e) => bail!("no usable session ({e}); start one with `colloquy new`"),
        },
    }
}

/// Drive one advance over the streaming API, printing turns as they land.
async fn run_chat(engine: &Engine, session: Session, message: String) -> Result<()> {
    let session_id = session.id.clone();
    let mut stream = engine.advance_stream(session, message);
    while let Some(event) = stream.next().await {
        match event {
            AdvanceEvent::Turn(turn) => print_turn(&turn),
            AdvanceEvent::Aborted(e) => {
                report_abort(&e);
                bail!("advance aborted for session {session_id}");
            }
        }
    }
    if let Err(e) = engine.refresh_turns(&session_id).await {
        warn!(error = %e, "failed to refresh turn cache after chat");
    }
    Ok(())
}

/// Tell the user which agents answered and which did not.
fn report_abort(error: &AdvanceError) {
    eprintln!("error: {error}");
    let answered: Vec<&str> = error
        .completed_turns()
        .iter()
        .filter_map(|t| t.agent_id.as_deref())
        .collect();
    if !answered.is_empty() {
        eprintln!("answered: {}", answered.join(", "));
    }
    if let AdvanceError::Completion { unanswered, .. } = error {
        eprintln!("did not answer: {}", unanswered.join(", "));
    }
}

fn print_turn(turn: &Turn) {
    let speaker = match turn.speaker {
        Speaker::User => "you",
        Speaker::Agent => turn.agent_id.as_deref().unwrap_or("agent"),
    };
    println!("[{speaker}] {}", turn.content);
}
