//! Configuration loaded from environment variables.
//!
//! Every setting has a default suitable for local use; values that parse
//! but fall outside their allowed range are rejected at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use thiserror::Error;

/// Default HTTP bind port.
pub const DEFAULT_PORT: u16 = 3190;

/// Default database path relative to the working directory.
pub const DEFAULT_DATABASE_PATH: &str = "./data/epiwatch.db";

/// Default CSV cache directory.
pub const DEFAULT_CSV_CACHE_PATH: &str = "./data/csv_cache";

/// Configuration error raised during startup validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Host to bind the HTTP server to.
    pub host: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Deployment environment name (development, production, test).
    pub environment: String,
    /// SQLite database file path.
    pub database_path: PathBuf,
    /// Directory for cached CSV downloads.
    pub csv_cache_path: PathBuf,
    /// Wall-clock time of the daily sync (HH:MM).
    pub sync_schedule_time: NaiveTime,
    /// IANA time zone the schedule time is interpreted in.
    pub timezone: Tz,
    /// Timeout applied to every outbound fetch.
    pub request_timeout: Duration,
    /// Maximum immediately-accepted manual refreshes per IP per hour.
    pub manual_refresh_max_per_hour: u32,
    /// Rate limit window size in minutes.
    pub rate_limit_window_minutes: u32,
    /// Whether admin requests bypass the rate limit entirely.
    pub admin_bypass_rate_limit: bool,
    /// Whether the first request of an hour is always accepted.
    pub buffer_immediate_first_request: bool,
    /// Dataset cache TTL in hours.
    pub cache_ttl_hours: u32,
    /// Maximum CSV cache size in megabytes.
    pub csv_cache_max_size_mb: u32,
    /// WebSocket heartbeat interval.
    pub ws_heartbeat_interval: Duration,
    /// Maximum concurrent WebSocket connections.
    pub ws_max_connections: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            environment: "production".to_string(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            csv_cache_path: PathBuf::from(DEFAULT_CSV_CACHE_PATH),
            sync_schedule_time: NaiveTime::from_hms_opt(10, 0, 0)
                .unwrap_or(NaiveTime::MIN),
            timezone: chrono_tz::America::New_York,
            request_timeout: Duration::from_secs(30),
            manual_refresh_max_per_hour: 3,
            rate_limit_window_minutes: 60,
            admin_bypass_rate_limit: true,
            buffer_immediate_first_request: true,
            cache_ttl_hours: 24,
            csv_cache_max_size_mb: 500,
            ws_heartbeat_interval: Duration::from_secs(30),
            ws_max_connections: 100,
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup (for testing).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_range(&lookup, "PORT", defaults.port as u64, 1, 65535)? as u16;

        let environment = match lookup("EPIWATCH_ENV") {
            Some(env) if ["development", "production", "test"].contains(&env.as_str()) => env,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "EPIWATCH_ENV".to_string(),
                    reason: format!("unknown environment '{}'", other),
                })
            }
            None => defaults.environment,
        };

        let sync_schedule_time = match lookup("SYNC_SCHEDULE_TIME") {
            Some(raw) => NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|e| {
                ConfigError::Invalid {
                    key: "SYNC_SCHEDULE_TIME".to_string(),
                    reason: format!("expected HH:MM: {}", e),
                }
            })?,
            None => defaults.sync_schedule_time,
        };

        let timezone = match lookup("TZ") {
            Some(raw) => Tz::from_str(&raw).map_err(|_| ConfigError::Invalid {
                key: "TZ".to_string(),
                reason: format!("unknown time zone '{}'", raw),
            })?,
            None => defaults.timezone,
        };

        let request_timeout_secs = parse_range(&lookup, "REQUEST_TIMEOUT_SECS", 30, 5, 300)?;
        let ws_heartbeat_secs = parse_range(&lookup, "WS_HEARTBEAT_SECS", 30, 5, 300)?;

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            environment,
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            csv_cache_path: lookup("CSV_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.csv_cache_path),
            sync_schedule_time,
            timezone,
            request_timeout: Duration::from_secs(request_timeout_secs),
            manual_refresh_max_per_hour: parse_range(
                &lookup,
                "MANUAL_REFRESH_MAX_PER_HOUR",
                defaults.manual_refresh_max_per_hour as u64,
                1,
                20,
            )? as u32,
            rate_limit_window_minutes: parse_range(
                &lookup,
                "RATE_LIMIT_WINDOW_MINUTES",
                defaults.rate_limit_window_minutes as u64,
                30,
                1440,
            )? as u32,
            admin_bypass_rate_limit: parse_bool(
                &lookup,
                "ADMIN_BYPASS_RATE_LIMIT",
                defaults.admin_bypass_rate_limit,
            ),
            buffer_immediate_first_request: parse_bool(
                &lookup,
                "BUFFER_IMMEDIATE_FIRST_REQUEST",
                defaults.buffer_immediate_first_request,
            ),
            cache_ttl_hours: parse_range(
                &lookup,
                "CACHE_TTL_HOURS",
                defaults.cache_ttl_hours as u64,
                1,
                168,
            )? as u32,
            csv_cache_max_size_mb: parse_range(
                &lookup,
                "CSV_CACHE_MAX_SIZE_MB",
                defaults.csv_cache_max_size_mb as u64,
                10,
                5000,
            )? as u32,
            ws_heartbeat_interval: Duration::from_secs(ws_heartbeat_secs),
            ws_max_connections: parse_range(
                &lookup,
                "WS_MAX_CONNECTIONS",
                defaults.ws_max_connections as u64,
                10,
                1000,
            )? as usize,
        })
    }

    /// Ensure the data and cache directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        if let Some(parent) = self.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&self.csv_cache_path)?;
        Ok(())
    }

    /// Database path as a string for connection establishment.
    pub fn database_url(&self) -> String {
        self.database_path.display().to_string()
    }

    /// Socket address string for the HTTP server.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_range(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let value = match lookup(key) {
        Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("'{}' is not a number", raw),
        })?,
        None => default,
    };

    if value < min || value > max {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("{} is outside the allowed range {}..={}", value, min, max),
        });
    }

    Ok(value)
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|raw| raw.eq_ignore_ascii_case("true") || raw == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.manual_refresh_max_per_hour, 3);
        assert!(settings.admin_bypass_rate_limit);
        assert!(settings.buffer_immediate_first_request);
        assert_eq!(settings.timezone, chrono_tz::America::New_York);
        assert_eq!(
            settings.sync_schedule_time,
            NaiveTime::from_hms_opt(10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_overrides() {
        let lookup = lookup_from(&[
            ("PORT", "8080"),
            ("SYNC_SCHEDULE_TIME", "00:30"),
            ("TZ", "UTC"),
            ("MANUAL_REFRESH_MAX_PER_HOUR", "5"),
            ("ADMIN_BYPASS_RATE_LIMIT", "false"),
        ]);
        let settings = Settings::from_lookup(lookup).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(
            settings.sync_schedule_time,
            NaiveTime::from_hms_opt(0, 30, 0).unwrap()
        );
        assert_eq!(settings.timezone, chrono_tz::UTC);
        assert_eq!(settings.manual_refresh_max_per_hour, 5);
        assert!(!settings.admin_bypass_rate_limit);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let lookup = lookup_from(&[("MANUAL_REFRESH_MAX_PER_HOUR", "100")]);
        assert!(Settings::from_lookup(lookup).is_err());

        let lookup = lookup_from(&[("PORT", "0")]);
        assert!(Settings::from_lookup(lookup).is_err());
    }

    #[test]
    fn test_rejects_malformed_schedule() {
        let lookup = lookup_from(&[("SYNC_SCHEDULE_TIME", "25:99")]);
        assert!(Settings::from_lookup(lookup).is_err());

        let lookup = lookup_from(&[("SYNC_SCHEDULE_TIME", "morning")]);
        assert!(Settings::from_lookup(lookup).is_err());
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let lookup = lookup_from(&[("TZ", "Mars/Olympus_Mons")]);
        assert!(Settings::from_lookup(lookup).is_err());
    }

    #[test]
    fn test_rejects_unknown_environment() {
        let lookup = lookup_from(&[("EPIWATCH_ENV", "staging-ish")]);
        assert!(Settings::from_lookup(lookup).is_err());
    }
}
