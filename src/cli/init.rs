//! Init command implementation
//!
//! Writes a starter `deepbench.toml` and `.env.example`.

use super::output::Output;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of the init operation
#[derive(Debug, PartialEq)]
pub enum InitResult {
    Success,
    /// deepbench.toml exists and `--force` was not given
    AlreadyExists,
    Error(String),
}

pub struct InitConfig {
    pub path: PathBuf,
    pub force: bool,
    pub host: String,
    pub port: u16,
}

/// Run the init command
pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing deepbench");

    let base_path = &config.path;
    if let Err(e) = fs::create_dir_all(base_path.join("data")) {
        output.error(&format!("Failed to create data directory: {}", e));
        return InitResult::Error(e.to_string());
    }

    let config_path = base_path.join("deepbench.toml");
    if config_path.exists() && !config.force {
        output.warning("deepbench.toml already exists!");
        output.hint("Use --force to overwrite existing files");
        return InitResult::AlreadyExists;
    }

    if let Err(e) = write_file(&config_path, &generate_deepbench_toml(&config), config.force) {
        output.error(&format!("Failed to create deepbench.toml: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("config", "deepbench.toml");

    let env_path = base_path.join(".env.example");
    if env_path.exists() && !config.force {
        output.skipped(".env.example", "already exists");
    } else if let Err(e) = write_file(&env_path, generate_env_example(), config.force) {
        output.error(&format!("Failed to create .env.example: {}", e));
        return InitResult::Error(e.to_string());
    } else {
        output.created("env", ".env.example");
    }

    output.header("Next Steps");
    output.info("Optionally protect the API:");
    output.command("cp .env.example .env  # then set DEEPBENCH_API_KEY");
    output.info("Start the server:");
    output.command("deepbench-server");
    output.hint(&format!(
        "Server will be available at http://{}:{}",
        config.host, config.port
    ));

    InitResult::Success
}

fn write_file(path: &Path, content: &str, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Ok(());
    }
    fs::write(path, content)
}

fn generate_deepbench_toml(config: &InitConfig) -> String {
    format!(
        r#"# deepbench configuration
# Provider API keys are supplied per request, never stored here.

[server]
host = "{host}"
port = {port}
log_level = "info"

[auth]
# Bearer key for /research routes; unset variable means open access
api_key_env = "DEEPBENCH_API_KEY"

[database]
url = "./data/deepbench.db"
# turso_url_env = "TURSO_URL"
# turso_token_env = "TURSO_AUTH_TOKEN"

[pipeline]
allow_clarification = false
max_research_iterations = 5
max_findings = 10
run_budget_secs = 900
keepalive_secs = 15
event_buffer = 64

[pipeline.retry]
max_attempts = 3
base_delay_ms = 500
max_delay_ms = 8000

# [providers.openai]
# model = "gpt-5"
# max_tokens = 8000
# request_timeout_secs = 120

# [providers.kimi]
# api_base = "https://api.moonshot.ai/anthropic/v1"
"#,
        host = config.host,
        port = config.port,
    )
}

fn generate_env_example() -> &'static str {
    r#"# deepbench environment variables
# Copy this file to .env and fill in the values.

# Optional: bearer key required on /research routes
DEEPBENCH_API_KEY=change-me

# Optional: logging level (trace, debug, info, warn, error)
RUST_LOG=info,deepbench=debug

# Optional: remote Turso database (build with --features turso)
# TURSO_URL=libsql://your-db.turso.io
# TURSO_AUTH_TOKEN=your-token
"#
}
