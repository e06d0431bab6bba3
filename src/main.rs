use anyhow::Result;
use clap::{Parser, Subcommand};

use agentdbg::web::{run_server, ServerConfig, WebAppState};
use agentdbg::{RunStore, Settings};

#[derive(Parser)]
#[command(name = "agentdbg", version, about = "Local-first tracing for agent programs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the local viewer server.
    Serve {
        /// Host address to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on.
        #[arg(long, default_value_t = 8787)]
        port: u16,
        /// Allow any origin (development only).
        #[arg(long)]
        cors: bool,
    },
    /// List recorded runs, most recent first.
    Runs {
        /// Maximum number of runs to list.
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Print one run's events as JSON lines.
    Events {
        /// Run identifier.
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load();
    let store = RunStore::new(settings.data_dir.clone());

    match cli.command {
        Command::Serve { host, port, cors } => {
            let state = WebAppState::new(store);
            let config = ServerConfig {
                host,
                port,
                cors_permissive: cors,
            };
            run_server(state, config).await?;
        }
        Command::Runs { limit } => {
            for run in store.list_runs(limit)? {
                println!(
                    "{}  {:<8}  {}  {}",
                    run.run_id,
                    format!("{:?}", run.status).to_lowercase(),
                    run.started_at.to_rfc3339(),
                    run.run_name
                );
            }
        }
        Command::Events { run_id } => {
            for event in store.load_events(&run_id)? {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
    }

    Ok(())
}
