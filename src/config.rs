// Environment-driven configuration
//
// Every tunable has a default good enough for local development; production
// overrides come from the environment (or a .env file loaded by the binary).

use std::env;
use std::path::PathBuf;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the durable session store
    pub data_dir: PathBuf,
    /// Balance granted to newly opened accounts
    pub starting_balance: Decimal,
    /// Resolution oracle endpoint
    pub oracle_url: String,
    pub oracle_api_key: Option<String>,
    /// Per-call oracle timeout
    pub oracle_timeout_secs: u64,
    /// Verdicts below this confidence are retried on a later sweep
    pub min_oracle_confidence: u8,
    /// Questions unresolved this long past their deadline are cancelled
    pub max_unresolved_age_hours: i64,
    /// Wager sessions idle longer than this are settled by the sweep
    pub session_idle_secs: i64,
    /// Interval between expiry sweeps
    pub mines_sweep_interval_secs: u64,
    /// Interval between resolution sweeps
    pub resolution_sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var("MOONBAG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            starting_balance: env_parse("MOONBAG_STARTING_BALANCE", dec!(100)),
            oracle_url: env::var("ORACLE_URL")
                .unwrap_or_else(|_| "http://localhost:8091/resolve".to_string()),
            oracle_api_key: env::var("ORACLE_API_KEY").ok(),
            oracle_timeout_secs: env_parse("ORACLE_TIMEOUT_SECS", 30),
            min_oracle_confidence: env_parse("ORACLE_MIN_CONFIDENCE", 50),
            max_unresolved_age_hours: env_parse("MAX_UNRESOLVED_AGE_HOURS", 24 * 7),
            session_idle_secs: env_parse("SESSION_IDLE_SECS", 300),
            mines_sweep_interval_secs: env_parse("MINES_SWEEP_INTERVAL_SECS", 60),
            resolution_sweep_interval_secs: env_parse("RESOLUTION_SWEEP_INTERVAL_SECS", 60),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::from_env();
        assert!(config.starting_balance > Decimal::ZERO);
        assert!(config.session_idle_secs > 0);
        assert!(config.min_oracle_confidence <= 100);
    }
}
