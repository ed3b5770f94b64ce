use std::time::Duration;

use anyhow::{Context, anyhow, bail};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub ollama_url: String,
    pub ollama_model: String,
    pub rate_limit: usize,
    pub rate_limit_window: Duration,
    pub cache_ttl: Duration,
    pub close_grace: Duration,
    pub translate_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            ollama_url: "http://localhost:11434".to_owned(),
            ollama_model: "llama3.2".to_owned(),
            rate_limit: 10,
            rate_limit_window: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(10 * 60),
            close_grace: Duration::from_secs(5 * 60),
            translate_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Reads the process environment, `.env` included.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let duration = |key: &str, fallback: Duration| -> anyhow::Result<Duration> {
            match var(key) {
                Some(v) => parse_duration(&v).with_context(|| format!("invalid {key}")),
                None => Ok(fallback),
            }
        };

        Ok(Config {
            port: match var("PORT") {
                Some(v) => v
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("invalid PORT {v:?}"))?,
                None => defaults.port,
            },
            ollama_url: var("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            ollama_model: var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            rate_limit: match var("RATE_LIMIT") {
                Some(v) => v
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("invalid RATE_LIMIT {v:?}"))?,
                None => defaults.rate_limit,
            },
            rate_limit_window: duration("RATE_LIMIT_WINDOW", defaults.rate_limit_window)?,
            cache_ttl: duration("CACHE_TTL", defaults.cache_ttl)?,
            close_grace: duration("CLOSE_GRACE", defaults.close_grace)?,
            translate_timeout: duration("TRANSLATE_TIMEOUT", defaults.translate_timeout)?,
        })
    }
}

/// Parses `500ms`, `30s`, `10m` or `2h`.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("missing unit in duration {s:?}"))?;
    let (amount, unit) = s.split_at(split);
    let amount: u64 = amount
        .parse()
        .with_context(|| format!("missing amount in duration {s:?}"))?;

    let scale = match unit {
        "ms" => return Ok(Duration::from_millis(amount)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => bail!("unknown unit {unit:?} in duration {s:?}"),
    };
    let secs = amount
        .checked_mul(scale)
        .ok_or_else(|| anyhow!("duration {s:?} is out of range"))?;
    Ok(Duration::from_secs(secs))
}
