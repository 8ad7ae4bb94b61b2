use std::str::FromStr;

use tracing::warn;

use crate::ExpireTime;

/// What to do when the backing store fails during a fragment lookup or write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreErrorPolicy {
    /// Treat the failure as a miss (or a skipped write) and keep rendering.
    #[default]
    Degrade,
    /// Fail the fragment with `Error::Store`.
    Propagate,
}

impl FromStr for StoreErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "degrade" => Ok(StoreErrorPolicy::Degrade),
            "propagate" => Ok(StoreErrorPolicy::Propagate),
            other => Err(format!("unknown store error policy '{other}'")),
        }
    }
}

pub struct Config {
    pub max_entries: Option<u64>,
    pub store_error_policy: StoreErrorPolicy,
    pub single_flight: bool,
    pub default_ttl: ExpireTime,
    pub bench_concurrency: usize,
    pub bench_distinct_keys: usize,
}

impl Config {
    const DEFAULT_TTL_SECS: u64 = 300;
    const DEFAULT_BENCH_CONCURRENCY: usize = 100;
    const DEFAULT_BENCH_DISTINCT_KEYS: usize = 10;

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source. `from_env` is the
    /// process-environment case.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let max_entries = lookup("FRAGMENT_CACHE_MAX_ENTRIES").and_then(|raw| {
            raw.parse::<u64>()
                .inspect_err(|_| {
                    warn!("FRAGMENT_CACHE_MAX_ENTRIES='{raw}' is not a number, cache is unbounded")
                })
                .ok()
        });

        let store_error_policy = lookup("FRAGMENT_CACHE_STORE_ERROR_POLICY")
            .map(|raw| {
                raw.parse::<StoreErrorPolicy>().unwrap_or_else(|e| {
                    warn!("{e}, falling back to 'degrade'");
                    StoreErrorPolicy::Degrade
                })
            })
            .unwrap_or_default();

        let single_flight = lookup("FRAGMENT_CACHE_SINGLE_FLIGHT")
            .map(|raw| {
                !matches!(
                    raw.trim().to_ascii_lowercase().as_str(),
                    "0" | "false" | "no" | "off"
                )
            })
            .unwrap_or(true);

        let default_ttl = lookup("FRAGMENT_CACHE_DEFAULT_TTL_SECS")
            .and_then(|raw| {
                ExpireTime::parse(&raw)
                    .inspect_err(|e| warn!("FRAGMENT_CACHE_DEFAULT_TTL_SECS ignored: {e}"))
                    .ok()
            })
            .unwrap_or(ExpireTime::Seconds(Self::DEFAULT_TTL_SECS));

        Self {
            max_entries,
            store_error_policy,
            single_flight,
            default_ttl,
            bench_concurrency: lookup("FRAGMENT_BENCH_CONCURRENCY")
                .and_then(|raw| raw.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(Self::DEFAULT_BENCH_CONCURRENCY),
            bench_distinct_keys: lookup("FRAGMENT_BENCH_DISTINCT_KEYS")
                .and_then(|raw| raw.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(Self::DEFAULT_BENCH_DISTINCT_KEYS),
        }
    }
}
