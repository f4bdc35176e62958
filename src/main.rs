mod demo;

use std::io::{self, BufRead};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use agentflow_core::config::AppConfig;
use agentflow_core::types::{Payload, TypeTag};

#[derive(Parser)]
#[command(name = "agentflow", version, about = "Type-routed multi-agent workflow runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "agentflow.toml", env = "AGENTFLOW_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo text pipeline on the given text (stdin when empty)
    Run {
        #[arg(trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Print the demo pipeline's type graph as a Mermaid flowchart
    Graph,
    /// Find a chain of agents turning one type into another
    Path {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "5")]
        max_length: usize,
    },
    /// Check an explicit agent sequence against the type graph
    Validate {
        /// Type of the workflow input
        #[arg(long, default_value = "string")]
        input: String,
        /// Type the last agent must produce
        #[arg(long)]
        output: Option<String>,
        /// Agent instance ids, in order
        #[arg(required = true)]
        agents: Vec<String>,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("agentflow=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config)?;
    debug!(path = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Commands::Run { text } => {
            let text = if text.is_empty() {
                io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                text.join(" ")
            };

            let engine = demo::pipeline(&config);
            if let Some(mut rx) = engine.subscribe() {
                tokio::spawn(async move {
                    while let Ok(envelope) = rx.recv().await {
                        info!(topic = %envelope.topic, event = ?envelope.event, "Workflow event");
                    }
                });
            }

            let result = engine.run(Payload::text(text)).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Graph => {
            println!("{}", demo::pipeline(&config).router().to_mermaid());
        }
        Commands::Path {
            from,
            to,
            max_length,
        } => {
            let router = demo::pipeline(&config).router();
            let path = router.plan_workflow(
                &TypeTag::from(from.as_str()),
                &TypeTag::from(to.as_str()),
                max_length,
            )?;
            if path.is_empty() {
                eprintln!("No path from {} to {} within {} agents", from, to, max_length);
                std::process::exit(1);
            }
            println!("{}", path.join(" -> "));
        }
        Commands::Validate {
            input,
            output,
            agents,
        } => {
            let router = demo::pipeline(&config).router();
            let sequence: Vec<&str> = agents.iter().map(String::as_str).collect();
            let expected = output.map(TypeTag::from);
            let report = router.validate_workflow_completeness(
                &sequence,
                &TypeTag::from(input),
                expected.as_ref(),
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                std::process::exit(1);
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
