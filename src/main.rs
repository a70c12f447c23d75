use clap::{Parser, Subcommand};
use newsletter_pipeline::{api, Orchestrator, PipelineConfig, RunStatus, Store};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "newsletter-pipeline", version, about = "Personalized newsletter pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve {
        /// Address to bind the API to
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: String,
    },
    /// Generate and deliver a newsletter for one user
    Generate {
        /// User id to generate for
        #[arg(long)]
        user_id: String,
        /// Delivery channel (email, whatsapp, telegram)
        #[arg(long, default_value = "email")]
        channel: String,
        /// News language (defaults to DEFAULT_LANGUAGE)
        #[arg(long)]
        language: Option<String>,
        /// Use canned data instead of live capabilities
        #[arg(long)]
        mock: bool,
    },
    /// Apply migrations and insert the demo topics and user
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = PipelineConfig::from_env();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => {
            config.validate()?;
            let store = Arc::new(Store::connect(&config.database_url).await?);
            store.run_migrations().await?;

            let orchestrator = Arc::new(Orchestrator::new(config, Some(store))?);
            let state = Arc::new(api::AppState::new(orchestrator));
            api::serve(state, &bind).await?;
        }
        Command::Generate {
            user_id,
            channel,
            language,
            mock,
        } => {
            let language = language.unwrap_or_else(|| config.default_language.clone());

            let orchestrator = if mock {
                Orchestrator::new(config, None)?
            } else {
                config.validate()?;
                let store = Arc::new(Store::connect(&config.database_url).await?);
                Orchestrator::new(config, Some(store))?
            };

            let result = orchestrator.run(&user_id, &channel, &language, mock).await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if result.status == RunStatus::Failed {
                std::process::exit(1);
            }
        }
        Command::Seed => {
            let store = Store::connect(&config.database_url).await?;
            store.run_migrations().await?;
            let user = store.seed_demo_data().await?;
            info!("demo data ready");
            println!("seeded demo user: {}", user.id);
        }
    }

    Ok(())
}
