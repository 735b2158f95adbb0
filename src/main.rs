use anyhow::Context;
use deepbench::{
    AppState, DeepbenchConfigManager, LLMClientFactory,
    cli::{
        Cli, Commands,
        init::{self, InitConfig, InitResult},
        output::Output,
    },
    llm::client::{default_api_base, default_model_name},
    types::ModelKind,
    utils::toml_config::DeepbenchConfig,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match cli.command {
        Some(Commands::Init {
            ref path,
            force,
            ref host,
            port,
        }) => {
            let config = InitConfig {
                path: path.clone(),
                force,
                host: host.clone(),
                port,
            };
            match init::run(config, &output) {
                InitResult::Success | InitResult::AlreadyExists => Ok(()),
                InitResult::Error(e) => anyhow::bail!("init failed: {}", e),
            }
        }
        Some(Commands::Config { full, validate }) => show_config(&cli, &output, full, validate),
        Some(Commands::Models) => list_models(&cli, &output),
        Some(Commands::Serve) | None => serve(&cli, &output).await,
    }
}

fn init_logging(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

async fn serve(cli: &Cli, output: &Output) -> anyhow::Result<()> {
    let config_manager = Arc::new(
        DeepbenchConfigManager::new(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?,
    );
    let config = config_manager.config();

    let level = if cli.verbose {
        "debug"
    } else {
        config.server.log_level.as_str()
    };
    init_logging(level, cli.json_logs);
    if !cli.json_logs {
        output.banner();
    }

    for warning in config.validate_with_warnings()? {
        warn!("{}", warning);
    }
    if let Err(e) = config_manager.start_watching() {
        warn!("Config hot reload disabled: {}", e);
    }

    let store = config
        .database_provider()?
        .create_store()
        .await
        .context("opening research database")?;
    info!("Research database ready ({})", config.database.url);

    let state = AppState::new(config_manager.clone(), store, Arc::new(LLMClientFactory));
    let shutdown = state.research.shutdown_token();
    let app = deepbench::app(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("deepbench listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("server error")?;

    config_manager.stop_watching();
    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C (or SIGTERM), then cancel in-flight runs so their
/// streams close and their results are recorded as cancelled.
async fn shutdown_signal(runs: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown requested, cancelling in-flight research runs");
    runs.cancel();
}

fn show_config(cli: &Cli, output: &Output, full: bool, validate: bool) -> anyhow::Result<()> {
    let config = match DeepbenchConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            output.error(&e.to_string());
            anyhow::bail!("invalid configuration");
        }
    };

    output.header(&format!("Configuration ({})", cli.config.display()));
    output.kv(
        "server",
        &format!("{}:{}", config.server.host, config.server.port),
    );
    output.kv("database", &config.database.url);
    output.kv(
        "auth",
        if config.api_key().is_some() {
            "bearer key required"
        } else {
            "open"
        },
    );
    output.kv(
        "clarification",
        &config.pipeline.allow_clarification.to_string(),
    );
    output.kv(
        "run budget",
        &format!("{}s", config.pipeline.run_budget_secs),
    );

    if validate {
        let warnings = config.validate_with_warnings()?;
        if warnings.is_empty() {
            output.success("Configuration is valid");
        } else {
            for warning in &warnings {
                output.warning(&warning.message);
            }
            output.success("Configuration is valid (with warnings)");
        }
    }

    if full {
        output.header("Resolved configuration");
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

fn list_models(cli: &Cli, output: &Output) -> anyhow::Result<()> {
    let config = if cli.config.exists() {
        DeepbenchConfig::load(&cli.config)?
    } else {
        DeepbenchConfig::default()
    };

    let rows: Vec<Vec<String>> = ModelKind::ALL
        .iter()
        .map(|&model| {
            let settings = config.provider_settings(model);
            vec![
                model.as_str().to_string(),
                model.provider_name().to_string(),
                settings
                    .model
                    .unwrap_or_else(|| default_model_name(model).to_string()),
                settings
                    .api_base
                    .unwrap_or_else(|| default_api_base(model).to_string()),
            ]
        })
        .collect();

    output.header("Supported models");
    output.table(&["Model", "Provider", "Model name", "API base"], &rows);
    Ok(())
}
