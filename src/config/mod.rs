use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::OutputFormat;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Simulated extraction settings
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Application settings
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Shortest simulated extraction, in milliseconds
    pub min_delay_ms: u64,

    /// Longest simulated extraction, in milliseconds
    pub max_delay_ms: u64,

    /// Probability that one extraction succeeds (0.0 to 1.0)
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default output format
    pub default_format: String,

    /// Directory for exported transcripts (current directory if unset)
    pub export_dir: Option<PathBuf>,

    /// File backing the clipboard (temp directory if unset)
    pub clipboard_file: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 3000,
            max_delay_ms: 5000,
            success_rate: 0.9,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_format: OutputFormat::Markdown.to_string(),
            export_dir: None,
            clipboard_file: None,
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs_err::read_to_string(config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            tracing::debug!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(config_path).await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("lianwen").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.simulation.min_delay_ms > self.simulation.max_delay_ms {
            anyhow::bail!(
                "simulation.min_delay_ms ({}) must not exceed simulation.max_delay_ms ({})",
                self.simulation.min_delay_ms,
                self.simulation.max_delay_ms
            );
        }

        if !(0.0..=1.0).contains(&self.simulation.success_rate) {
            anyhow::bail!("simulation.success_rate must be between 0.0 and 1.0");
        }

        if OutputFormat::parse(&self.app.default_format).is_none() {
            anyhow::bail!(
                "Unknown default format '{}' (expected markdown, timestamp or plain)",
                self.app.default_format
            );
        }

        Ok(())
    }

    /// Output format used when the command line does not choose one
    pub fn default_format(&self) -> OutputFormat {
        OutputFormat::parse(&self.app.default_format).unwrap_or_default()
    }

    /// Directory exported transcripts are written to
    pub fn export_dir(&self) -> PathBuf {
        self.app
            .export_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// File the clipboard reads from and writes to
    pub fn clipboard_file(&self) -> PathBuf {
        self.app
            .clipboard_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("lianwen-clipboard.txt"))
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!(
            "  Simulated Delay: {}-{} ms",
            self.simulation.min_delay_ms, self.simulation.max_delay_ms
        );
        println!("  Success Rate: {:.0}%", self.simulation.success_rate * 100.0);
        println!("  Default Format: {}", self.app.default_format);
        println!("  Export Directory: {}", self.export_dir().display());
        println!("  Clipboard File: {}", self.clipboard_file().display());
    }

    /// Update one setting from a `section.key` name and validate the result
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let invalid = || format!("Invalid value for {}: '{}'", key, value);
        let mut next = self.clone();

        match key {
            "simulation.min_delay_ms" => {
                next.simulation.min_delay_ms = value.parse().with_context(invalid)?
            }
            "simulation.max_delay_ms" => {
                next.simulation.max_delay_ms = value.parse().with_context(invalid)?
            }
            "simulation.success_rate" => {
                next.simulation.success_rate = value.parse().with_context(invalid)?
            }
            "app.default_format" => next.app.default_format = value.to_string(),
            "app.export_dir" => next.app.export_dir = optional_path(value),
            "app.clipboard_file" => next.app.clipboard_file = optional_path(value),
            _ => anyhow::bail!(
                "Unknown configuration key '{}' (expected simulation.min_delay_ms, simulation.max_delay_ms, simulation.success_rate, app.default_format, app.export_dir or app.clipboard_file)",
                key
            ),
        }

        next.validate()?;
        *self = next;
        Ok(())
    }
}

// empty clears the setting
fn optional_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}
