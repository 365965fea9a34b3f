use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use crate::constants::{MATCH_DURATION_MS, MAX_PLAYERS_PER_ROOM};
use crate::types::Element;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("port cannot be 0")]
    ZeroPort,
    #[error("match duration must be at least 1 ms")]
    ZeroMatchDuration,
    #[error("max_players_per_room must be at least 1")]
    NoPlayerSlots,
    #[error("max_players_per_room is {0}, but only {1} elements exist")]
    MoreSlotsThanElements(usize, usize),
}

/// Room server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    /// Directory served for every path that is not an API route.
    pub static_dir: PathBuf,
    pub match_duration_ms: u64,
    /// One slot per element.
    pub max_players_per_room: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            static_dir: PathBuf::from("public"),
            match_duration_ms: MATCH_DURATION_MS,
            max_players_per_room: MAX_PLAYERS_PER_ROOM,
        }
    }
}

impl ServerConfig {
    /// `.env` first, then the process environment. Bad values fall back to
    /// their defaults with a warning.
    pub fn load_or_default() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDRESS") {
            match addr.parse() {
                Ok(parsed) => config.bind_address = parsed,
                Err(_) => warn!("invalid BIND_ADDRESS '{}', using default", addr),
            }
        }

        if let Some(port) = lookup("PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.port = parsed,
                Ok(_) => warn!("PORT must be > 0, using default"),
                Err(_) => warn!("invalid PORT '{}', using default", port),
            }
        }

        if let Some(dir) = lookup("STATIC_DIR") {
            if dir.trim().is_empty() {
                warn!("empty STATIC_DIR, using default");
            } else {
                config.static_dir = PathBuf::from(dir);
            }
        }

        if let Some(duration) = lookup("MATCH_DURATION_MS") {
            match duration.parse::<u64>() {
                Ok(parsed) if parsed > 0 => config.match_duration_ms = parsed,
                Ok(_) => warn!("MATCH_DURATION_MS must be > 0, using default"),
                Err(_) => warn!("invalid MATCH_DURATION_MS '{}', using default", duration),
            }
        }

        if let Some(max_players) = lookup("MAX_PLAYERS_PER_ROOM") {
            match max_players.parse::<usize>() {
                Ok(parsed) if (1..=Element::ALL.len()).contains(&parsed) => {
                    config.max_players_per_room = parsed;
                }
                Ok(_) => warn!(
                    "MAX_PLAYERS_PER_ROOM must be 1-{}, using default",
                    Element::ALL.len()
                ),
                Err(_) => warn!(
                    "invalid MAX_PLAYERS_PER_ROOM '{}', using default",
                    max_players
                ),
            }
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.match_duration_ms == 0 {
            return Err(ConfigError::ZeroMatchDuration);
        }
        if self.max_players_per_room == 0 {
            return Err(ConfigError::NoPlayerSlots);
        }
        if self.max_players_per_room > Element::ALL.len() {
            return Err(ConfigError::MoreSlotsThanElements(
                self.max_players_per_room,
                Element::ALL.len(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_players_per_room, 4);
        assert_eq!(config.match_duration_ms, 10_000);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn env_values_override_defaults() {
        let config = load(&[
            ("PORT", "3000"),
            ("STATIC_DIR", "dist"),
            ("MATCH_DURATION_MS", "90000"),
            ("MAX_PLAYERS_PER_ROOM", "2"),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.static_dir, PathBuf::from("dist"));
        assert_eq!(config.match_duration_ms, 90_000);
        assert_eq!(config.max_players_per_room, 2);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = load(&[
            ("PORT", "0"),
            ("BIND_ADDRESS", "not-an-ip"),
            ("MATCH_DURATION_MS", "soon"),
            ("MAX_PLAYERS_PER_ROOM", "9"),
        ]);
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn validate_rejects_impossible_settings() {
        let config = ServerConfig {
            max_players_per_room: 5,
            ..ServerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::MoreSlotsThanElements(5, 4))
        );

        let config = ServerConfig {
            match_duration_ms: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroMatchDuration));
    }
}
