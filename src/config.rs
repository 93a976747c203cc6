use std::{env, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use chrono::FixedOffset;
use reqwest::Url;

const DEFAULT_API_BASE: &str = "https://api.wescctech.com.br/core/v2/api";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: Url,
    pub channel: Channel,
    pub sector: Sector,
    pub type_chat: u8,
    pub utc_offset: FixedOffset,
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub slug: String,
    pub name: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct Sector {
    pub id: String,
    pub name: String,
}

/// Per-call upstream timeouts. Date-filtered counts are the slowest upstream
/// queries, list pages come next.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub count: Duration,
    pub list: Duration,
    pub finished: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            count: Duration::from_secs(10),
            list: Duration::from_secs(20),
            finished: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let base_url =
            env::var("DASH_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let token = env::var("DASH_CHANNEL_TOKEN").context("DASH_CHANNEL_TOKEN is not set")?;
        let sector_id = env::var("DASH_SECTOR_ID").context("DASH_SECTOR_ID is not set")?;

        let offset_hours: i32 = parse_var("DASH_UTC_OFFSET_HOURS", -3)?;
        let utc_offset = FixedOffset::east_opt(offset_hours * 3600)
            .with_context(|| format!("DASH_UTC_OFFSET_HOURS out of range: {offset_hours}"))?;

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            count: secs_var("DASH_COUNT_TIMEOUT_SECS", defaults.count)?,
            list: secs_var("DASH_LIST_TIMEOUT_SECS", defaults.list)?,
            finished: secs_var("DASH_FINISHED_TIMEOUT_SECS", defaults.finished)?,
        };

        Ok(Self {
            base_url: normalize_base_url(&base_url)?,
            channel: Channel {
                slug: env::var("DASH_CHANNEL_SLUG").unwrap_or_else(|_| "pmpa_156".to_string()),
                name: env::var("DASH_CHANNEL_NAME").unwrap_or_else(|_| "PMPA 156".to_string()),
                token,
            },
            sector: Sector {
                id: sector_id,
                name: env::var("DASH_SECTOR_NAME").unwrap_or_else(|_| "PRINCIPAL".to_string()),
            },
            type_chat: parse_var("DASH_TYPE_CHAT", 2)?,
            utc_offset,
            timeouts,
        })
    }

    pub fn endpoint_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("failed to join {path} onto base URL"))
    }
}

/// `Url::join` drops the last path segment unless the base ends with a slash.
pub fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).context("invalid DASH_API_BASE_URL")?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid {name}: {value}")),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &str, default: Duration) -> Result<Duration> {
    parse_var(name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url).unwrap(),
            channel: Channel {
                slug: "pmpa_156".to_string(),
                name: "PMPA 156".to_string(),
                token: "test-token".to_string(),
            },
            sector: Sector {
                id: "S1".to_string(),
                name: "PRINCIPAL".to_string(),
            },
            type_chat: 2,
            utc_offset: FixedOffset::west_opt(3 * 3600).unwrap(),
            timeouts: Timeouts {
                count: Duration::from_secs(2),
                list: Duration::from_secs(2),
                finished: Duration::from_secs(2),
            },
        }
    }
}
