//! Configuration loading and schema definitions.
//!
//! The harness works with no configuration at all; an optional `cordon.toml`
//! next to the test binary supplies run-wide defaults that the engine flags
//! can still override (flag > file > built-in default).
//!
//! ```toml
//! [run]
//! default_timeout_ms = 3000
//!
//! [report]
//! ci = false          # force the CI summary block even without $CI
//! color = "auto"      # auto | always | never
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Built-in default per-test timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "cordon.toml";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub report: ReportSection,
}

/// `[run]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    /// Per-test timeout applied when a descriptor does not override it.
    pub default_timeout_ms: u64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// `[report]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportSection {
    /// Emit the machine-readable CI block even when `$CI` is absent.
    pub ci: bool,
    /// Color negotiation mode.
    pub color: ColorChoice,
}

/// How console color is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    /// TTY detection plus the `NO_COLOR` override.
    #[default]
    Auto,
    Always,
    Never,
}

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, contains invalid TOML, or
/// does not match the schema.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    load_config_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Loads configuration from a TOML string.
///
/// Useful for testing or for embedding configuration programmatically.
///
/// # Example
///
/// ```
/// let config = cordon::config::load_config_str(r#"
///     [run]
///     default_timeout_ms = 750
/// "#)?;
/// assert_eq!(config.run.default_timeout_ms, 750);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    Ok(config)
}

/// Loads `cordon.toml` from the working directory when present, the
/// built-in defaults otherwise.
pub fn load_default() -> Result<Config> {
    let path = Path::new(DEFAULT_CONFIG_FILE);
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_the_built_in_defaults() -> Result<()> {
        let config = load_config_str("")?;
        assert_eq!(config.run.default_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(!config.report.ci);
        assert_eq!(config.report.color, ColorChoice::Auto);
        Ok(())
    }

    #[test]
    fn sections_are_individually_optional() -> Result<()> {
        let config = load_config_str(
            r#"
            [report]
            ci = true
            "#,
        )?;
        assert_eq!(config.run.default_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(config.report.ci);
        Ok(())
    }

    #[test]
    fn full_config_round_trips_all_fields() -> Result<()> {
        let config = load_config_str(
            r#"
            [run]
            default_timeout_ms = 500

            [report]
            ci = true
            color = "never"
            "#,
        )?;
        assert_eq!(config.run.default_timeout_ms, 500);
        assert!(config.report.ci);
        assert_eq!(config.report.color, ColorChoice::Never);
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_str(
            r#"
            [run]
            default_timeout = 500
            "#,
        );
        assert!(result.is_err(), "typo'd key should not parse: {result:?}");
    }

    #[test]
    fn invalid_color_choice_is_rejected() {
        let result = load_config_str(
            r#"
            [report]
            color = "sometimes"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn load_config_reads_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cordon.toml");
        std::fs::write(&path, "[run]\ndefault_timeout_ms = 1234\n")?;
        let config = load_config(&path)?;
        assert_eq!(config.run.default_timeout_ms, 1234);
        Ok(())
    }

    #[test]
    fn load_config_reports_missing_files() {
        let result = load_config(Path::new("/nonexistent/cordon.toml"));
        assert!(result.is_err());
    }
}
