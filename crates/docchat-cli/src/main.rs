//! DocChat CLI - Command-line interface
//!
//! Usage:
//!   docchat ingest <path>...
//!   docchat ask <question> [--strict] [--persona eli5] [--file doc.pdf]
//!   docchat chat [--session id] [--file doc.pdf]
//!   docchat explain [topic]
//!   docchat forget <source>
//!   docchat clear
//!   docchat sessions [--show id]

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use docchat_core::{AppConfig, Persona, SessionBackend, VectorBackend};
use docchat_rag::{upload_message, Pipeline, QueryRequest};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "docchat")]
#[command(about = "Chat with your PDF and text documents")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Keep vectors and sessions in process memory
    #[arg(long, global = true)]
    memory: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by single and interactive questions
#[derive(Args, Debug, Clone, Default)]
struct TurnArgs {
    /// Refuse instead of answering from general knowledge
    #[arg(long)]
    strict: bool,

    /// Persona: assistant, eli5, tutor, concise
    #[arg(short, long)]
    persona: Option<Persona>,

    /// Conversation to continue
    #[arg(short, long)]
    session: Option<String>,

    /// Files to ingest before answering
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents into the index
    Ingest {
        /// Files to load (PDF or plain text)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Ask a single question
    Ask {
        /// Question to ask
        question: String,

        #[command(flatten)]
        turn: TurnArgs,
    },
    /// Interactive chat with conversation memory
    Chat {
        #[command(flatten)]
        turn: TurnArgs,
    },
    /// Explain a topic like I am 5
    Explain {
        /// Topic; prompted for when omitted
        topic: Option<String>,
    },
    /// Remove every chunk of one source file
    Forget {
        /// Source path as printed at ingest
        source: String,
    },
    /// Drop the whole index
    Clear,
    /// List recent chat sessions
    Sessions {
        /// Maximum sessions to list
        #[arg(long, default_value_t = 20)]
        limit: i64,

        /// Print the messages of one session
        #[arg(long)]
        show: Option<String>,
    },
}

fn init_tracing(verbose: bool, level: &str) {
    let default = if verbose {
        "docchat=debug,docchat_rag=debug,docchat_vector=debug".to_string()
    } else {
        format!("docchat_rag={level},docchat_vector={level}")
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    if cli.memory {
        config.database.vector_backend = VectorBackend::Memory;
        config.database.session_backend = SessionBackend::Memory;
    }
    config.validate()?;
    Ok(config)
}

async fn ingest_all(pipeline: &Pipeline, paths: &[PathBuf]) -> usize {
    let mut failures = 0;
    for path in paths {
        let outcome = pipeline.ingest.ingest(path).await;
        if outcome.is_err() {
            failures += 1;
        }
        println!("{}", upload_message(&outcome));
    }
    failures
}

fn query_for(question: &str, turn: &TurnArgs, session_id: &str) -> QueryRequest {
    let mut request = QueryRequest::new(question).session(session_id);
    if turn.strict {
        request = request.strict(true);
    }
    if let Some(persona) = turn.persona {
        request = request.persona(persona);
    }
    request
}

fn prompt(label: &str) -> anyhow::Result<()> {
    print!("{label}");
    std::io::stdout().flush().context("failed to flush stdout")
}

async fn run_chat(pipeline: &Pipeline, turn: &TurnArgs) -> anyhow::Result<()> {
    ingest_all(pipeline, &turn.files).await;

    let session_id = turn
        .session
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    println!("Session {session_id} (type 'exit' to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt("\nYou: ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        match pipeline
            .engine
            .answer(&query_for(question, turn, &session_id))
            .await
        {
            Ok(answer) => println!("\nAI: {}", answer.text),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(())
}

async fn read_topic() -> anyhow::Result<String> {
    prompt("What topic do you want explained? ")?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    Ok(lines.next_line().await?.unwrap_or_default())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(cli.verbose, &config.logging.level);

    let pipeline = Pipeline::from_config(&config)
        .await
        .context("failed to initialize backends")?;
    tracing::debug!(
        collection = pipeline.index.collection(),
        model = pipeline.engine.model(),
        "Backends ready"
    );

    match cli.command {
        Commands::Ingest { paths } => {
            let failures = ingest_all(&pipeline, &paths).await;
            if failures > 0 {
                anyhow::bail!("{failures} of {} files failed", paths.len());
            }
        }
        Commands::Ask { question, turn } => {
            ingest_all(&pipeline, &turn.files).await;
            let session_id = turn
                .session
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let answer = pipeline
                .engine
                .answer(&query_for(&question, &turn, &session_id))
                .await?;
            println!("{}", answer.text);
        }
        Commands::Chat { turn } => run_chat(&pipeline, &turn).await?,
        Commands::Explain { topic } => {
            let topic = match topic {
                Some(topic) => topic,
                None => read_topic().await?,
            };
            println!("\n--- Explaining {} ---\n", topic.trim());
            println!("{}", pipeline.engine.explain(&topic).await?);
        }
        Commands::Forget { source } => {
            let removed = pipeline.index.delete_by_source(&source).await?;
            println!("Removed {removed} chunks from {source}");
        }
        Commands::Clear => {
            pipeline.index.clear().await?;
            println!("Cleared collection {}", pipeline.index.collection());
        }
        Commands::Sessions { limit, show } => match show {
            Some(session_id) => {
                let records = pipeline.sessions.records(&session_id).await?;
                if records.is_empty() {
                    anyhow::bail!("session {session_id} not found");
                }
                for record in records {
                    println!(
                        "[{}] {}: {}",
                        record.created_at.format("%Y-%m-%d %H:%M:%S"),
                        record.message.role,
                        record.message.content
                    );
                }
            }
            None => {
                for summary in pipeline.sessions.list_sessions(limit).await? {
                    println!(
                        "{}  {:>3} msgs  {}  {}",
                        summary.session_id,
                        summary.message_count,
                        summary.last_activity.format("%Y-%m-%d %H:%M"),
                        summary.subject.unwrap_or_default()
                    );
                }
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask_with_options() {
        let cli = Cli::try_parse_from([
            "docchat", "ask", "what is covered?", "--strict", "--persona", "eli5", "-f", "a.pdf",
            "-f", "b.txt", "--memory",
        ])
        .unwrap();

        assert!(cli.memory);
        match cli.command {
            Commands::Ask { question, turn } => {
                assert_eq!(question, "what is covered?");
                assert!(turn.strict);
                assert_eq!(turn.persona, Some(Persona::Eli5));
                assert_eq!(turn.files.len(), 2);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_unknown_persona_rejected() {
        assert!(Cli::try_parse_from(["docchat", "ask", "q", "--persona", "pirate"]).is_err());
    }

    #[test]
    fn test_ingest_requires_path() {
        assert!(Cli::try_parse_from(["docchat", "ingest"]).is_err());
    }

    #[test]
    fn test_query_for_keeps_defaults_unset() {
        let request = query_for("hi", &TurnArgs::default(), "s");
        assert_eq!(request.strict, None);
        assert_eq!(request.persona, None);
        assert_eq!(request.session_id.as_deref(), Some("s"));
    }
}
