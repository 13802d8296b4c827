use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde_json::Value as JsonValue;
use soulflow::Config;

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Get one configuration value (dotted key, e.g. `retry.max_attempts`)
    Get {
        /// Configuration key
        key: String,
    },

    /// Check the effective configuration for unusable values
    Validate,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext, output: &OutputFormat) -> Result<()> {
    let config = ctx.config();
    match args.action {
        ConfigAction::Show => {
            let source = if ctx.config_from_file() {
                ctx.config_path().display().to_string()
            } else {
                "defaults".to_string()
            };
            emit(config, output, || {
                let body = config.to_yaml().unwrap_or_default();
                format!("# effective configuration ({})\n{}", source, body.trim_end())
            })?;
        }
        ConfigAction::Get { key } => {
            let json = serde_json::to_value(config)?;
            let segments = split_key(&key)?;
            let Some(value) = get_json_value(&json, &segments) else {
                bail!("{} not found in configuration", key);
            };
            emit(value, output, || match value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })?;
        }
        ConfigAction::Validate => {
            let problems = problems(config);
            emit(&problems, output, || {
                if problems.is_empty() {
                    "configuration is valid".to_string()
                } else {
                    problems
                        .iter()
                        .map(|p| format!("  ! {}", p))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            })?;
            if !problems.is_empty() {
                bail!("{} configuration problem(s)", problems.len());
            }
        }
    }

    Ok(())
}

fn problems(config: &Config) -> Vec<String> {
    let mut out = Vec::new();
    let retry = &config.retry;
    if retry.max_attempts == 0 {
        out.push("retry.max_attempts must be at least 1".to_string());
    }
    if retry.multiplier < 1.0 || retry.network_multiplier < 1.0 {
        out.push("retry multipliers must be >= 1.0".to_string());
    }
    if retry.timeout_growth < 1.0 {
        out.push("retry.timeout_growth must be >= 1.0".to_string());
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        out.push("retry.base_delay_ms exceeds retry.max_delay_ms".to_string());
    }
    if config.wait.poll_interval_ms == 0 {
        out.push("wait.poll_interval_ms must be positive".to_string());
    }
    if config.wait.timeout_ms == 0 {
        out.push("wait.timeout_ms must be positive".to_string());
    }
    if config.engine.max_concurrent == 0 {
        out.push("engine.max_concurrent must be at least 1".to_string());
    }
    if config.logging.level.parse::<tracing::Level>().is_err() {
        out.push(format!("logging.level `{}` is not a level", config.logging.level));
    }
    out
}

fn split_key(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key
        .split('.')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        bail!("configuration key cannot be empty");
    }
    Ok(segments)
}

fn get_json_value<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut current = value;
    for segment in path {
        match current {
            JsonValue::Object(map) => {
                current = map.get(*segment)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_keys_reach_nested_sections() {
        let json = serde_json::to_value(Config::default()).unwrap();
        let segments = split_key("retry.max_attempts").unwrap();
        assert_eq!(get_json_value(&json, &segments), Some(&JsonValue::from(3)));
        assert!(get_json_value(&json, &["retry", "nope"]).is_none());
        assert!(split_key("..").is_err());
    }

    #[test]
    fn defaults_have_no_problems() {
        assert!(problems(&Config::default()).is_empty());

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        config.engine.max_concurrent = 0;
        config.logging.level = "chatty".into();
        assert_eq!(problems(&config).len(), 3);
    }
}
