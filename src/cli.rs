//! Command-line interface for Tailgate
//!
//! Provides argument parsing and subcommand handling for the Tailgate binary.

use clap::{Parser, Subcommand};

/// AI request gateway with ordered multi-provider failover
#[derive(Parser)]
#[command(name = "tailgate")]
#[command(version)]
#[command(about = "AI request gateway with ordered multi-provider failover")]
#[command(
    long_about = "Tailgate screens prompts, forwards them to an ordered chain of LLM \
    providers (local and cloud) with automatic failover, and tracks provider health \
    in a shared cache."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# Tailgate Configuration
# =======================
#
# This file configures the HTTP server, the provider fallback chain, health
# tracking, the security pipeline and observability settings for Tailgate.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 3000

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING
# ─────────────────────────────────────────────────────────────────────────────
#
# models           Named model definitions, referenced by id
# instance_groups  Ordered lists of model ids (e.g. one model on several hosts)
# fallback_chain   Tried in order for every request until one provider answers
#
# Chain entries are either a reference:
#   { ref = "<id>", type = "model" | "instance_group" }   (type defaults to model)
# or a literal candidate with provider + model.
#
# Providers: ollama, mistral (local), openai, azure, gemini (cloud, need a key),
# or any other name backed by a [templates.<name>] section.
#
# Candidate fields: provider, model, api_url, api_key, timeout (seconds),
# max_tokens, temperature, top_p, api_version, deployment_name, instance_id,
# health_check_url

[[routing.models]]
id = "local-llama-a"
provider = "ollama"
model = "llama3.1:8b"
api_url = "http://localhost:11434/api/generate"
instance_id = "gpu-a"
timeout = 60

[[routing.models]]
id = "local-llama-b"
provider = "ollama"
model = "llama3.1:8b"
api_url = "http://localhost:11435/api/generate"
instance_id = "gpu-b"
timeout = 60

[[routing.models]]
id = "openai-gpt"
provider = "openai"
model = "gpt-4o-mini"
max_tokens = 1024
temperature = 0.7

[[routing.instance_groups]]
id = "local-llama"
models = ["local-llama-a", "local-llama-b"]

[[routing.fallback_chain]]
ref = "local-llama"
type = "instance_group"

[[routing.fallback_chain]]
ref = "openai-gpt"
type = "model"

# Literal candidates are accepted as well:
# [[routing.fallback_chain]]
# provider = "gemini"
# model = "gemini-1.5-flash"

# ─────────────────────────────────────────────────────────────────────────────
# PROVIDER-LEVEL SETTINGS (Optional)
# ─────────────────────────────────────────────────────────────────────────────
#
# Used when a candidate does not set api_url / api_key itself. Keys can also
# come from environment variables: OPENAI_API_KEY, AZURE_OPENAI_API_KEY,
# GEMINI_API_KEY, MISTRAL_API_KEY.

[providers.openai]
api_url = "https://api.openai.com/v1"
# api_key = "sk-..."

# [providers.azure]
# api_url = "https://your-resource.openai.azure.com"

# Global fallback for every provider
[defaults]
# api_url = "http://localhost:11434/api/generate"

# ─────────────────────────────────────────────────────────────────────────────
# GENERIC PROVIDER TEMPLATES (Optional)
# ─────────────────────────────────────────────────────────────────────────────
#
# Any provider name with a template here is served by the generic adapter.
# {model}, {prompt} and {api_key} are substituted in payload and headers.

# [templates.claude]
# api_url = "https://api.anthropic.com/v1/messages"
# timeout = 30
# headers = { "x-api-key" = "{api_key}", "anthropic-version" = "2023-06-01" }
# payload = { model = "{model}", max_tokens = 1024, messages = [{ role = "user", content = "{prompt}" }] }

# ─────────────────────────────────────────────────────────────────────────────
# HEALTH TRACKING
# ─────────────────────────────────────────────────────────────────────────────

[health]
# Run the background health monitor
enabled = true

# Cached health records older than this are treated as unknown
ttl_seconds = 300

# Seconds between background probe cycles
interval_seconds = 60

# Per-URL probe timeout
probe_timeout_seconds = 5

# Raw TCP reachability check used when a key is missing
connect_timeout_seconds = 2

# Shared store so every gateway instance sees the same health state.
# Without it (or while it is unreachable) health is tracked in-process.
# redis_url = "redis://127.0.0.1:6379"

# ─────────────────────────────────────────────────────────────────────────────
# SECURITY PIPELINE
# ─────────────────────────────────────────────────────────────────────────────

[security]
# Case-insensitive phrases rejected in prompts and responses
blocked_phrases = []

# Prompts longer than this are rejected (0 disables the check)
max_prompt_chars = 32000

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
# For production, consider using a reverse proxy to restrict access
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // Clap's built-in verification for the CLI structure
        Cli::command().debug_assert();
    }

    #[test]
    fn default_config_path() {
        let cli = Cli::parse_from(["tailgate"]);
        assert_eq!(cli.config, "config.toml");
        assert!(cli.command.is_none());
    }

    #[test]
    fn custom_config_path() {
        let cli = Cli::parse_from(["tailgate", "--config", "custom.toml"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn config_subcommand() {
        let cli = Cli::parse_from(["tailgate", "config"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config { output: None })
        ));
    }

    #[test]
    fn config_subcommand_with_output() {
        let cli = Cli::parse_from(["tailgate", "config", "-o", "my-config.toml"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config { output: Some(ref path) }) if path == "my-config.toml"
        ));
    }

    #[test]
    fn template_is_valid_toml() {
        let template = generate_config_template();
        let result: Result<toml::Value, _> = toml::from_str(template);
        assert!(
            result.is_ok(),
            "Template should be valid TOML: {:?}",
            result.err()
        );
    }

    #[test]
    fn template_is_a_valid_config() {
        let config: Result<crate::config::Config, _> = generate_config_template().parse();
        assert!(
            config.is_ok(),
            "Template should pass validation: {:?}",
            config.err()
        );
    }

    #[test]
    fn template_has_all_sections() {
        let template = generate_config_template();
        assert!(template.contains("[server]"));
        assert!(template.contains("[[routing.models]]"));
        assert!(template.contains("[[routing.instance_groups]]"));
        assert!(template.contains("[[routing.fallback_chain]]"));
        assert!(template.contains("[providers.openai]"));
        assert!(template.contains("[defaults]"));
        assert!(template.contains("[health]"));
        assert!(template.contains("[security]"));
        assert!(template.contains("[observability]"));
    }
}
