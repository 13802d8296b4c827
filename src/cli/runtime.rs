use anyhow::{bail, Context, Result};
use serde_json::Value;
use soulflow::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment filter that takes precedence over every other level source.
pub const LOG_ENV: &str = "SOULFLOW_LOG";

/// Install the global subscriber. Logs go to stderr so stdout stays
/// machine-readable; a daily rolling file is added when configured.
///
/// The returned guard flushes the file writer and must be held until exit.
pub fn init_logging(
    level: Option<&str>,
    debug: bool,
    logging: &LoggingConfig,
) -> Result<Option<WorkerGuard>> {
    let level: tracing::Level = if debug {
        tracing::Level::DEBUG
    } else {
        level
            .unwrap_or(&logging.level)
            .parse()
            .context("Invalid log level")?
    };

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let (file_layer, guard) = match &logging.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)
                .with_context(|| format!("creating log directory {}", directory.display()))?;
            let appender = tracing_appender::rolling::daily(directory, "soulflow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    let installed = if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    installed.context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Parse a `key=value` pair; the value is JSON when it parses as JSON,
/// otherwise a plain string.
pub fn parse_var(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected KEY=VALUE, got `{}`", raw);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("variable name is empty in `{}`", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vars_parse_json_first() {
        assert_eq!(parse_var("n=3").unwrap(), ("n".to_string(), json!(3)));
        assert_eq!(
            parse_var("q=rust lang").unwrap(),
            ("q".to_string(), json!("rust lang"))
        );
        assert_eq!(
            parse_var("tags=[\"a\"]").unwrap(),
            ("tags".to_string(), json!(["a"]))
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }
}
