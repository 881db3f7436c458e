//! Environment-sourced configuration
//!
//! Every knob resolves to a safe default when unset or invalid; validation
//! failures are logged as warnings and never abort startup.
//!
//! Timing invariant, documented rather than enforced: the transaction TTL
//! must dominate the retry budget, `transaction_ttl >= max_retries *
//! max(backoff_delays) + fallback duration + margin`, or healthy requests
//! can expire mid-retry.

use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::validation::ResponseValidator;

/// Feature flag selecting the transactional flow
pub const ENV_ENABLED: &str = "METER_ENABLED";
/// Ordinary attempts before the fallback, valid range 1–10
pub const ENV_MAX_RETRIES: &str = "METER_MAX_RETRIES";
/// Comma-separated backoff delays in milliseconds
pub const ENV_BACKOFF_DELAYS_MS: &str = "METER_BACKOFF_DELAYS_MS";
/// Whether the reduced-capability fallback attempt runs
pub const ENV_ENABLE_FALLBACK: &str = "METER_ENABLE_FALLBACK";
/// Transaction TTL in milliseconds, minimum 60000
pub const ENV_TRANSACTION_TTL_MS: &str = "METER_TRANSACTION_TTL_MS";
/// Sweep interval in milliseconds, minimum 1000 and less than the TTL
pub const ENV_SWEEP_INTERVAL_MS: &str = "METER_SWEEP_INTERVAL_MS";
/// Minimum acceptable text length for the validator
pub const ENV_MIN_TEXT_LENGTH: &str = "METER_MIN_TEXT_LENGTH";

const MIN_TRANSACTION_TTL_MS: u64 = 60_000;
const MIN_SWEEP_INTERVAL_MS: u64 = 1_000;
const DEFAULT_TRANSACTION_TTL_MS: u64 = 300_000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;
const MAX_RETRIES_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// Resolved configuration for the metering core
#[derive(Clone, Debug)]
pub struct MeterConfig {
    /// Whether the transactional flow is enabled; off selects the legacy
    /// direct-charge path
    pub enabled: bool,
    /// Retry and fallback configuration
    pub retry: RetryPolicy,
    /// Transaction TTL
    pub transaction_ttl: Duration,
    /// Period of the background sweep
    pub sweep_interval: Duration,
    /// Validator text-length threshold
    pub min_text_length: usize,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry: RetryPolicy::default(),
            transaction_ttl: Duration::from_millis(DEFAULT_TRANSACTION_TTL_MS),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            min_text_length: ResponseValidator::DEFAULT_MIN_TEXT_LENGTH,
        }
    }
}

impl MeterConfig {
    /// Read every knob from the environment, resolving invalid values to
    /// defaults with a warning
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let enabled = parse_flag(ENV_ENABLED, env_var(ENV_ENABLED), defaults.enabled);
        let max_retries = parse_max_retries(env_var(ENV_MAX_RETRIES), defaults.retry.max_retries);
        let backoff_delays = parse_backoff_delays(
            env_var(ENV_BACKOFF_DELAYS_MS),
            defaults.retry.backoff_delays.clone(),
        );
        let enable_fallback = parse_flag(
            ENV_ENABLE_FALLBACK,
            env_var(ENV_ENABLE_FALLBACK),
            defaults.retry.enable_fallback,
        );
        let transaction_ttl_ms = parse_transaction_ttl(
            env_var(ENV_TRANSACTION_TTL_MS),
            DEFAULT_TRANSACTION_TTL_MS,
        );
        let sweep_interval_ms = parse_sweep_interval(
            env_var(ENV_SWEEP_INTERVAL_MS),
            DEFAULT_SWEEP_INTERVAL_MS,
            transaction_ttl_ms,
        );
        let min_text_length =
            parse_min_text_length(env_var(ENV_MIN_TEXT_LENGTH), defaults.min_text_length);

        Self {
            enabled,
            retry: RetryPolicy {
                max_retries,
                backoff_delays,
                enable_fallback,
                fallback_profile: defaults.retry.fallback_profile,
            },
            transaction_ttl: Duration::from_millis(transaction_ttl_ms),
            sweep_interval: Duration::from_millis(sweep_interval_ms),
            min_text_length,
        }
    }

    /// Validator carrying this config's threshold
    pub fn validator(&self) -> ResponseValidator {
        ResponseValidator::new(self.min_text_length)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_flag(name: &str, raw: Option<String>, default: bool) -> bool {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        other => {
            tracing::warn!(name, value = other, default, "unrecognized flag value, using default");
            default
        }
    }
}

fn parse_max_retries(raw: Option<String>, default: u32) -> u32 {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<u32>() {
        Ok(value) if MAX_RETRIES_RANGE.contains(&value) => value,
        _ => {
            tracing::warn!(
                value = %raw,
                default,
                "max retries outside 1-10, using default"
            );
            default
        }
    }
}

fn parse_backoff_delays(raw: Option<String>, default: Vec<Duration>) -> Vec<Duration> {
    let Some(raw) = raw else {
        return default;
    };
    let parsed: Result<Vec<Duration>, _> = raw
        .split(',')
        .map(|part| part.trim().parse::<u64>().map(Duration::from_millis))
        .collect();
    match parsed {
        Ok(delays) if !delays.is_empty() => delays,
        _ => {
            tracing::warn!(value = %raw, "unparseable backoff delay list, using default");
            default
        }
    }
}

fn parse_transaction_ttl(raw: Option<String>, default_ms: u64) -> u64 {
    let Some(raw) = raw else {
        return default_ms;
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value >= MIN_TRANSACTION_TTL_MS => value,
        Ok(value) => {
            tracing::warn!(
                value,
                minimum = MIN_TRANSACTION_TTL_MS,
                "transaction TTL below minimum, clamping"
            );
            MIN_TRANSACTION_TTL_MS
        }
        Err(_) => {
            tracing::warn!(value = %raw, default_ms, "unparseable transaction TTL, using default");
            default_ms
        }
    }
}

fn parse_sweep_interval(raw: Option<String>, default_ms: u64, ttl_ms: u64) -> u64 {
    let mut interval = match raw {
        None => default_ms,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value >= MIN_SWEEP_INTERVAL_MS => value,
            Ok(value) => {
                tracing::warn!(
                    value,
                    minimum = MIN_SWEEP_INTERVAL_MS,
                    "sweep interval below minimum, clamping"
                );
                MIN_SWEEP_INTERVAL_MS
            }
            Err(_) => {
                tracing::warn!(value = %raw, default_ms, "unparseable sweep interval, using default");
                default_ms
            }
        },
    };
    // The sweep must run strictly more often than transactions expire.
    if interval >= ttl_ms {
        tracing::warn!(interval, ttl_ms, "sweep interval not below TTL, using TTL/2");
        interval = ttl_ms / 2;
    }
    interval
}

fn parse_min_text_length(raw: Option<String>, default: usize) -> usize {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<usize>() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(value = %raw, default, "unparseable minimum text length, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn test_flag_parsing() {
        assert!(parse_flag("F", raw("true"), false));
        assert!(parse_flag("F", raw("ON"), false));
        assert!(!parse_flag("F", raw("0"), true));
        assert!(parse_flag("F", raw("definitely"), true));
        assert!(!parse_flag("F", None, false));
    }

    #[test]
    fn test_max_retries_clamps_to_default() {
        assert_eq!(parse_max_retries(raw("5"), 3), 5);
        assert_eq!(parse_max_retries(raw("0"), 3), 3);
        assert_eq!(parse_max_retries(raw("11"), 3), 3);
        assert_eq!(parse_max_retries(raw("many"), 3), 3);
        assert_eq!(parse_max_retries(None, 3), 3);
    }

    #[test]
    fn test_backoff_list_parsing() {
        let default = vec![Duration::from_millis(1000)];
        assert_eq!(
            parse_backoff_delays(raw("500, 1500,2500"), default.clone()),
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1500),
                Duration::from_millis(2500)
            ]
        );
        assert_eq!(
            parse_backoff_delays(raw("500,fast"), default.clone()),
            default
        );
        assert_eq!(parse_backoff_delays(raw(""), default.clone()), default);
    }

    #[test]
    fn test_ttl_minimum_enforced() {
        assert_eq!(parse_transaction_ttl(raw("120000"), 300_000), 120_000);
        assert_eq!(parse_transaction_ttl(raw("5000"), 300_000), 60_000);
        assert_eq!(parse_transaction_ttl(raw("soon"), 300_000), 300_000);
    }

    #[test]
    fn test_sweep_interval_stays_below_ttl() {
        assert_eq!(parse_sweep_interval(raw("30000"), 60_000, 300_000), 30_000);
        assert_eq!(parse_sweep_interval(raw("10"), 60_000, 300_000), 1_000);
        // An interval at or past the TTL resolves to TTL/2.
        assert_eq!(
            parse_sweep_interval(raw("300000"), 60_000, 300_000),
            150_000
        );
        assert_eq!(parse_sweep_interval(None, 120_000, 120_000), 60_000);
    }

    #[test]
    fn test_defaults() {
        let config = MeterConfig::default();
        assert!(config.enabled);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.transaction_ttl, Duration::from_millis(300_000));
        assert_eq!(config.sweep_interval, Duration::from_millis(60_000));
        assert_eq!(config.min_text_length, 10);
        assert_eq!(config.validator().min_text_length(), 10);
    }
}
