use std::{env::var, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow, ensure};
use chrono_tz::{America::New_York, Tz};

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub tick_interval: Duration,
    pub check_cooldown: Duration,
    pub display_tz: Tz,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let tick_minutes: u64 = parse_or("TICK_MINUTES", 15)?;
        ensure!(tick_minutes > 0, "TICK_MINUTES must be at least 1");

        let display_tz = match var("DISPLAY_TZ") {
            Ok(raw) => raw
                .parse::<Tz>()
                .map_err(|e| anyhow!("invalid DISPLAY_TZ {raw:?}: {e}"))?,
            Err(_) => New_York,
        };

        Ok(Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN not set")?,
            tick_interval: Duration::from_secs(tick_minutes * 60),
            check_cooldown: Duration::from_secs(parse_or("CHECK_COOLDOWN_SECS", 3)?),
            display_tz,
        })
    }
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}
