use std::{ops::RangeInclusive, str::FromStr, time::Duration};

use crate::auth::HashCost;

// bcrypt accepts work factors in this range
const HASH_COSTS: RangeInclusive<u32> = 4..=31;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var} has an invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{0} must be longer than zero")]
    ZeroDuration(&'static str),
    #[error("ping period {ping:?} must be shorter than the read timeout {pong:?}")]
    KeepaliveTooSlow { ping: Duration, pong: Duration },
    #[error("the outbound queue needs room for at least one message")]
    NoSendBuffer,
}

/// Websocket timing and sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsConfig {
    /// Deadline for a single frame write.
    pub write_wait: Duration,
    /// Read deadline, refreshed by every inbound frame.
    pub pong_wait: Duration,
    /// Keepalive ping interval. Must stay below `pong_wait`.
    pub ping_period: Duration,
    pub max_message_size: usize,
    /// Outbound queue capacity per connection.
    pub send_buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size: 512,
            send_buffer: 256,
        }
    }
}

impl WsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, wait) in [
            ("write_wait", self.write_wait),
            ("pong_wait", self.pong_wait),
            ("ping_period", self.ping_period),
        ] {
            if wait.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        if self.ping_period >= self.pong_wait {
            return Err(ConfigError::KeepaliveTooSlow {
                ping: self.ping_period,
                pong: self.pong_wait,
            });
        }
        if self.send_buffer == 0 {
            return Err(ConfigError::NoSendBuffer);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub token_secret: String,
    pub token_ttl: Duration,
    pub hash_cost: HashCost,
    pub ws: WsConfig,
}

impl Config {
    /// Reads the process environment (after loading `.env`). A `secret` given
    /// on the command line wins over `TOKEN_SECRET`.
    pub fn from_env(secret: Option<String>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| match (var, &secret) {
            ("TOKEN_SECRET", Some(secret)) => Some(secret.clone()),
            _ => dotenv::var(var).ok(),
        })
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = WsConfig::default();
        let pong_wait = secs(&lookup, "WS_PONG_WAIT_SECS")?.unwrap_or(defaults.pong_wait);
        let ws = WsConfig {
            write_wait: secs(&lookup, "WS_WRITE_WAIT_SECS")?.unwrap_or(defaults.write_wait),
            pong_wait,
            ping_period: secs(&lookup, "WS_PING_PERIOD_SECS")?.unwrap_or(pong_wait * 9 / 10),
            max_message_size: parse(&lookup, "WS_MAX_MESSAGE_SIZE")?.unwrap_or(defaults.max_message_size),
            send_buffer: parse(&lookup, "WS_SEND_BUFFER")?.unwrap_or(defaults.send_buffer),
        };
        ws.validate()?;

        let hash_cost = match lookup("PASSWORD_HASH_COST") {
            None => HashCost::default(),
            Some(value) => match value.trim().parse() {
                Ok(cost) if HASH_COSTS.contains(&cost) => HashCost(cost),
                _ => return Err(ConfigError::Invalid { var: "PASSWORD_HASH_COST", value }),
            },
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:42069".to_owned()),
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://bubblechat.db?mode=rwc".to_owned()),
            token_secret: lookup("TOKEN_SECRET")
                .filter(|s| !s.is_empty())
                .ok_or(ConfigError::Missing("TOKEN_SECRET"))?,
            token_ttl: secs(&lookup, "TOKEN_TTL_SECS")?.unwrap_or(Duration::from_secs(24 * 60 * 60)),
            hash_cost,
            ws,
        })
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError> {
    lookup(var)
        .map(|value| value.trim().parse().map_err(|_| ConfigError::Invalid { var, value }))
        .transpose()
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse::<u64>(lookup, var)?.map(Duration::from_secs))
}
