use std::{env, fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use zrak_core::config::ZrakConfig;

const DEFAULT_CONFIG_PATH: &str = "zrak.toml";

/// Load configuration from `ZRAK_CONFIG` (or `zrak.toml`), falling back to defaults.
///
/// A `.env` file is honoured; `WAQI_TOKEN` overrides the configured token.
pub(crate) fn load() -> Result<ZrakConfig> {
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        return Err(err).context("failed to read .env");
    }

    let path = env::var("ZRAK_CONFIG").map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);

    let mut config = if path.exists() {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        parse(&raw).with_context(|| format!("invalid config in {}", path.display()))?
    } else {
        ZrakConfig::default()
    };

    if let Ok(token) = env::var("WAQI_TOKEN") {
        config.upstream.token = token;
    }

    validate(&config)?;
    Ok(config)
}

fn parse(raw: &str) -> Result<ZrakConfig> {
    Ok(toml::from_str(raw)?)
}

fn validate(config: &ZrakConfig) -> Result<()> {
    if config.upstream.token.trim().is_empty() {
        bail!("no upstream token: set WAQI_TOKEN or upstream.token");
    }
    if config.cities.is_empty() {
        bail!("no cities configured");
    }
    Ok(())
}
