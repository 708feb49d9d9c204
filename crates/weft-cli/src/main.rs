//! Weft CLI — command-line entry point for the workflow engine.
//!
//! `weft serve` boots the HTTP backend; `weft validate` checks a YAML
//! template file against the creation-time rules without touching a server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use weft_core::agent::{AgentRegistry, HttpAgentInvoker};
use weft_core::models::WorkflowTemplate;
use weft_server::{start_server, ServerConfig};

/// Weft — multi-step AI-agent workflow orchestration
#[derive(Parser)]
#[command(name = "weft", version, about = "Weft — multi-step AI-agent workflow orchestration")]
struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "WEFT_DB_PATH")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Weft HTTP backend server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3720)]
        port: u16,
        /// Base URL of the agent service that handles invocations
        #[arg(long, env = "WEFT_AGENT_ENDPOINT")]
        agent_endpoint: Option<String>,
        /// Bearer token for the agent service
        #[arg(long, env = "WEFT_AGENT_TOKEN")]
        agent_token: Option<String>,
        /// Agent refs to expose from the endpoint (comma-separated)
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,
    },

    /// Validate a YAML template file
    Validate {
        /// Path to the template file
        file: String,
    },
}

fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("weft")
        .join("weft.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            agent_endpoint,
            agent_token,
            agents,
        } => {
            let db_path = cli.db.unwrap_or_else(default_db_path);
            let mut registry = AgentRegistry::new();
            if let Some(endpoint) = agent_endpoint {
                let invoker = Arc::new(HttpAgentInvoker::new(&endpoint, agent_token));
                for agent_ref in &agents {
                    registry.register(agent_ref, invoker.clone());
                }
                println!("Registered {} agent(s) against {}", agents.len(), endpoint);
            } else {
                eprintln!("Warning: no agent endpoint configured; executions will fail at dispatch");
            }

            let config = ServerConfig {
                host,
                port,
                db_path,
            };
            let addr = start_server(config, Arc::new(registry))
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("Weft server listening on http://{}", addr);

            tokio::signal::ctrl_c().await?;
            println!("Shutting down");
            Ok(())
        }

        Commands::Validate { file } => {
            let template = WorkflowTemplate::from_file(&file)
                .map_err(|e| anyhow::anyhow!("{}: {}", file, e))?;
            println!(
                "OK: '{}' — {} step(s), {} requiring user input",
                template.name,
                template.steps.len(),
                template
                    .steps
                    .iter()
                    .filter(|s| s.requires_user_input)
                    .count()
            );
            Ok(())
        }
    }
}
