use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tubescript::api::{self, FetchRequest, HealthStatus, SearchRequest};
use tubescript::output::{self, Message};
use tubescript::{utils, Cli, Commands, Config, StrategyRegistry, TranscriptService, TranscriptStore};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let success = run(cli).await?;
    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_tracing(cli: &Cli) {
    let default_filter = if cli.verbose {
        "tubescript=debug"
    } else if cli.quiet {
        "tubescript=warn"
    } else {
        "tubescript=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let json_layer = cli.log_json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!cli.log_json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Load configuration and apply command-line overrides
fn load_config(cli: &Cli, languages: &[String]) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(path) = &cli.database {
        config.database.path = Some(path.clone());
    }
    if let Some(key) = &cli.api_key {
        config.data_api.api_key = Some(key.clone());
    }
    if !languages.is_empty() {
        config.process.languages = languages.to_vec();
    }

    Ok(config)
}

fn open_store(config: &Config) -> Result<Arc<TranscriptStore>> {
    let path = config.database_path()?;
    let store = TranscriptStore::open(&path)
        .with_context(|| format!("Failed to open transcript database at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Returns whether the command succeeded
async fn run(cli: Cli) -> Result<bool> {
    let format = cli.format;
    let progress = !cli.quiet;

    match &cli.command {
        Commands::Fetch { input, languages } => {
            let config = load_config(&cli, languages)?;
            // Nothing is persisted here, so skip the on-disk database
            let store = Arc::new(TranscriptStore::in_memory()?);
            let service = TranscriptService::from_config(&config, store)?;

            let spinner = utils::spinner(format!("Fetching transcript for {}", input), progress);
            let response = api::fetch_transcript(&service, &FetchRequest::new(input.clone())).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }

            output::emit(&response, format)?;
            Ok(response.success)
        }

        Commands::Store { input, languages } => {
            let config = load_config(&cli, languages)?;
            let service = TranscriptService::from_config(&config, open_store(&config)?)?;

            let spinner = utils::spinner(format!("Fetching and storing {}", input), progress);
            let response = api::store_transcript(&service, input).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }

            output::emit(&response, format)?;
            Ok(response.success)
        }

        Commands::Search { query } => {
            let config = load_config(&cli, &[])?;
            let store = open_store(&config)?;

            let response = api::search_transcripts(&store, &SearchRequest { query: query.clone() });
            output::emit(&response, format)?;
            Ok(response.success)
        }

        Commands::List => {
            let config = load_config(&cli, &[])?;
            let records = open_store(&config)?.list()?;
            output::emit(&records, format)?;
            Ok(true)
        }

        Commands::Show { id } => {
            let config = load_config(&cli, &[])?;
            match open_store(&config)?.get(*id)? {
                Some(record) => {
                    output::emit(&record, format)?;
                    Ok(true)
                }
                None => {
                    output::emit(&Message::failed(format!("no transcript with id {}", id)), format)?;
                    Ok(false)
                }
            }
        }

        Commands::Delete { id } => {
            let config = load_config(&cli, &[])?;
            let message = if open_store(&config)?.delete(*id)? {
                tracing::info!("Deleted transcript {}", id);
                Message::ok(format!("Deleted transcript {}", id))
            } else {
                Message::failed(format!("no transcript with id {}", id))
            };
            output::emit(&message, format)?;
            Ok(message.success)
        }

        Commands::Health => {
            let config = load_config(&cli, &[])?;
            let service = TranscriptService::from_config(&config, Arc::new(TranscriptStore::in_memory()?))?;
            let registry: &StrategyRegistry = service.resolver().registry();

            let spinner = utils::spinner(format!("Probing {} strategies", registry.len()), progress);
            let report = api::health_check(registry.strategies()).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }

            output::emit(&report, format)?;
            Ok(report.status != HealthStatus::Unhealthy)
        }

        Commands::Reindex => {
            let config = load_config(&cli, &[])?;
            let store = open_store(&config)?;
            store.rebuild_search_index()?;
            output::emit(
                &Message::ok(format!("Search index rebuilt for {} transcripts", store.count()?)),
                format,
            )?;
            Ok(true)
        }

        Commands::Config { show } => {
            let config = load_config(&cli, &[])?;
            if *show {
                config.display();
            } else {
                config.save()?;
                println!("Configuration written to {}", Config::config_path()?.display());
            }
            Ok(true)
        }
    }
}
