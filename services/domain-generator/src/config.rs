//! Configuration loader for the domain generator.
//!
//! Loads a single YAML file with sections for the forecasting API, the
//! queue, the severity watch-set, the extraction program, logging, and the
//! status server. Supports environment variable substitution using
//! `${VAR}` and `${VAR:-default}` syntax.
//!
//! The configuration is loaded once at startup and passed by reference to
//! every component; nothing reads it from global state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use forecast_client::ClientConfig;
use storage::QueueConfig;

// ============================================================================
// Configuration Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ClientConfig,
    pub queue: ConsumerConfig,
    pub watch: WatchConfig,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(flatten)]
    pub connection: QueueConfig,
    /// Interval between claim refreshes while a message is in flight
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Consecutive broker failures tolerated before the consumer stops
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Forecast flood categories that qualify a site for extraction
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Hydrofabric dataset the extraction program reads from
    pub source_dataset: PathBuf,
    /// Directory the extraction program writes artifacts into
    pub output_dir: PathBuf,
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
    /// External program performing the extraction
    pub program: String,
    /// Argument templates; see `dispatch::CommandDispatcher`
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8083,
        }
    }
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_max_consecutive_errors() -> u32 {
    5
}

fn default_artifact_extension() -> String {
    storage::DEFAULT_EXTENSION.to_string()
}

// ============================================================================
// Loading Functions
// ============================================================================

impl AppConfig {
    /// Load and parse a YAML configuration file with environment variable substitution.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config from {:?}", path.as_ref()))?;

        let mut config = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config in {:?}", path.as_ref()))?;

        // The extraction program runs inside output_dir, so relative paths
        // are pinned to the directory the service was started from.
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        config.extraction.source_dataset = cwd.join(&config.extraction.source_dataset);
        config.extraction.output_dir = cwd.join(&config.extraction.output_dir);

        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;

        let config: AppConfig =
            serde_yaml::from_str(&expanded).context("Failed to parse config YAML")?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.api.base_url.trim().is_empty(),
            "API base URL cannot be empty"
        );

        anyhow::ensure!(
            !self.queue.connection.stream.is_empty(),
            "Queue stream cannot be empty"
        );
        anyhow::ensure!(
            !self.queue.connection.group.is_empty(),
            "Queue consumer group cannot be empty"
        );
        anyhow::ensure!(
            self.queue.keep_alive_secs > 0,
            "Queue keep_alive_secs must be greater than 0"
        );
        // A claim that lapses between refreshes lets another consumer take
        // over a message still being processed.
        anyhow::ensure!(
            self.queue.connection.claim_idle_ms >= 2 * 1000 * self.queue.keep_alive_secs,
            "Queue claim_idle_ms ({}) must be at least twice keep_alive_secs ({}s)",
            self.queue.connection.claim_idle_ms,
            self.queue.keep_alive_secs
        );

        anyhow::ensure!(
            !self.extraction.program.trim().is_empty(),
            "Extraction program cannot be empty"
        );

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        anyhow::ensure!(
            valid_levels.contains(&self.logging.level.as_str()),
            "Invalid log level: {}. Must be one of: {:?}",
            self.logging.level,
            valid_levels
        );

        let valid_formats = ["json", "pretty"];
        anyhow::ensure!(
            valid_formats.contains(&self.logging.format.as_str()),
            "Invalid log format: {}. Must be one of: {:?}",
            self.logging.format,
            valid_formats
        );

        Ok(())
    }
}

/// Expand environment variables in format ${VAR} or ${VAR:-default}
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::new();
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            let mut brace_count = 1;

            while brace_count > 0 {
                match chars.next() {
                    Some('{') => {
                        brace_count += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        brace_count -= 1;
                        if brace_count > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            let value = resolve_var_expr(&var_expr)?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve variable expression (supports VAR and VAR:-default syntax)
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
api:
  base_url: https://api.water.noaa.gov/nwps/v1
  accept: application/json
  user_agent: "(domain-generator, ops@example.com)"
queue:
  redis_url: ${DG_TEST_REDIS_URL:-redis://localhost:6379}
  stream: flooded_data
  group: domain-generator
  consumer: worker-1
watch:
  categories: [minor, moderate, major]
extraction:
  source_dataset: data/conus_nextgen.gpkg
  output_dir: domains
  program: Rscript
  args: ["-e", "hfsubsetR::get_shortest_path({start_id}, {end_id})"]
"#;

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("DG_TEST_VAR", "test_value");
        let result = expand_env_vars("prefix_${DG_TEST_VAR}_suffix").unwrap();
        assert_eq!(result, "prefix_test_value_suffix");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("DG_NONEXISTENT_VAR");
        let result = expand_env_vars("value_${DG_NONEXISTENT_VAR:-default}_end").unwrap();
        assert_eq!(result, "value_default_end");
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("DG_REQUIRED_VAR");
        assert!(expand_env_vars("${DG_REQUIRED_VAR}").is_err());
    }

    #[test]
    fn test_expand_env_vars_unclosed() {
        assert!(expand_env_vars("${DG_UNCLOSED").is_err());
    }

    #[test]
    fn test_template_braces_survive_expansion() {
        // Only "${" starts a substitution; argument placeholders pass through.
        let result = expand_env_vars("get({start_id}, {end_id})").unwrap();
        assert_eq!(result, "get({start_id}, {end_id})");
    }

    #[test]
    fn test_load_sample_config() {
        std::env::remove_var("DG_TEST_REDIS_URL");
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(config.queue.connection.redis_url, "redis://localhost:6379");
        assert_eq!(config.queue.connection.block_ms, 5000);
        assert_eq!(config.queue.keep_alive_secs, 30);
        assert_eq!(config.queue.connection.claim_idle_ms, 120_000);
        assert_eq!(config.watch.categories, vec!["minor", "moderate", "major"]);
        assert_eq!(config.extraction.artifact_extension, "gpkg");
        assert_eq!(config.logging.format, "json");
        assert!(config.status.enabled);
        assert!(config.api.request_timeout_secs.is_none());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let yaml = format!("{}logging:\n  level: loud\n  format: json\n", SAMPLE);
        assert!(AppConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_claim_timeout_shorter_than_keep_alive_rejected() {
        let yaml = SAMPLE.replace(
            "consumer: worker-1",
            "consumer: worker-1\n  claim_idle_ms: 45000",
        );
        assert!(AppConfig::from_yaml_str(&yaml).is_err());

        let yaml = SAMPLE.replace(
            "consumer: worker-1",
            "consumer: worker-1\n  claim_idle_ms: 60000",
        );
        assert!(AppConfig::from_yaml_str(&yaml).is_ok());
    }

    #[test]
    fn test_empty_program_rejected() {
        let yaml = SAMPLE.replace("program: Rscript", "program: \"\"");
        assert!(AppConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_load_repository_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/domain-generator.yaml");
        let config = AppConfig::load(path).unwrap();

        assert!(!config.watch.categories.is_empty());
        assert!(config.extraction.output_dir.is_absolute());
        assert!(config.extraction.source_dataset.is_absolute());
    }
}
