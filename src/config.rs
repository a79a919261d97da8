//! Pool configuration: an immutable, validated parameter block parsed from
//! a flat `pool.*` property bag (see spec.md §6).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::PoolError;

/// Opaque connection properties forwarded verbatim to the session factory.
pub type ConnectionProperties = Arc<BTreeMap<String, String>>;

/// Idle-set removal/insertion policy.
///
/// `Lifo` takes the most-recently inserted entry (best cache locality,
/// most likely still valid). `Fifo` takes the oldest (more even rotation,
/// better eviction). Waiter delivery is always FIFO by enqueue time,
/// independent of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    Lifo,
    Fifo,
}

/// Immutable, validated pool configuration.
///
/// Built only through [`PoolConfig::builder`] or
/// [`PoolConfig::from_properties`] — both route through
/// [`PoolConfig::validate`], so a live `PoolConfig` always satisfies its
/// invariants.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub initial_size: usize,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub validation_timeout: Duration,
    pub eviction_interval: Duration,
    pub max_wait: Duration,
    pub test_on_borrow: bool,
    pub test_on_return: bool,
    pub test_while_idle: bool,
    pub num_tests_per_eviction_run: usize,
    pub block_when_exhausted: bool,
    pub ordering: Ordering,
    pub connection_properties: ConnectionProperties,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            min_size: 5,
            max_size: 20,
            initial_size: 5,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(10 * 60),
            max_lifetime: Duration::from_secs(30 * 60),
            validation_timeout: Duration::from_secs(5),
            eviction_interval: Duration::from_secs(60),
            max_wait: Duration::from_secs(30),
            test_on_borrow: true,
            test_on_return: false,
            test_while_idle: true,
            num_tests_per_eviction_run: 3,
            block_when_exhausted: true,
            ordering: Ordering::Lifo,
            connection_properties: Arc::new(BTreeMap::new()),
        }
    }
}

impl PoolConfig {
    /// Starts from [`PoolConfig::default`] and validates immediately
    /// (the builder is cosmetic; the validated value is the
    /// invariant-bearing type).
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder {
            config: PoolConfig::default(),
        }
    }

    fn validate(self) -> Result<Self, PoolError> {
        if self.max_size == 0 {
            return Err(PoolError::ConfigurationInvalid(
                "maxSize must be >= 1".into(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(PoolError::ConfigurationInvalid(
                "minSize must be <= maxSize".into(),
            ));
        }
        if self.initial_size < self.min_size || self.initial_size > self.max_size {
            return Err(PoolError::ConfigurationInvalid(
                "initialSize must be within [minSize, maxSize]".into(),
            ));
        }
        if self.num_tests_per_eviction_run == 0 {
            return Err(PoolError::ConfigurationInvalid(
                "numTestsPerEvictionRun must be >= 1".into(),
            ));
        }
        for (name, dur) in [
            ("connectTimeout", self.connect_timeout),
            ("idleTimeout", self.idle_timeout),
            ("maxLifetime", self.max_lifetime),
            ("validationTimeout", self.validation_timeout),
            ("evictionInterval", self.eviction_interval),
            ("maxWaitTime", self.max_wait),
        ] {
            if dur.is_zero() {
                return Err(PoolError::ConfigurationInvalid(format!(
                    "{name} must be a positive duration"
                )));
            }
        }
        Ok(self)
    }

    /// Parses `pool.*` keys out of a flat property bag, applying defaults
    /// for anything missing or unrecognized, and validates the result.
    /// Keys not starting with `pool.` are carried into
    /// [`PoolConfig::connection_properties`] unchanged.
    pub fn from_properties(props: &BTreeMap<String, String>) -> Result<Self, PoolError> {
        let mut config = PoolConfig::default();
        let mut forwarded = BTreeMap::new();

        for (key, value) in props {
            let Some(pool_key) = key.strip_prefix("pool.") else {
                forwarded.insert(key.clone(), value.clone());
                continue;
            };

            match pool_key {
                "minSize" => assign_usize(&mut config.min_size, value),
                "maxSize" => assign_usize(&mut config.max_size, value),
                "initialSize" => assign_usize(&mut config.initial_size, value),
                "connectionTimeout" => assign_duration(&mut config.connect_timeout, value),
                "idleTimeout" => assign_duration(&mut config.idle_timeout, value),
                "maxLifetime" => assign_duration(&mut config.max_lifetime, value),
                "validationTimeout" => assign_duration(&mut config.validation_timeout, value),
                "timeBetweenEvictionRuns" => {
                    assign_duration(&mut config.eviction_interval, value)
                }
                "maxWaitTime" => assign_duration(&mut config.max_wait, value),
                "numTestsPerEvictionRun" => {
                    assign_usize(&mut config.num_tests_per_eviction_run, value)
                }
                "testOnBorrow" => assign_bool(&mut config.test_on_borrow, value),
                "testOnReturn" => assign_bool(&mut config.test_on_return, value),
                "testWhileIdle" => assign_bool(&mut config.test_while_idle, value),
                "blockWhenExhausted" => assign_bool(&mut config.block_when_exhausted, value),
                "lifo" => {
                    if let Some(b) = parse_bool(value) {
                        config.ordering = if b { Ordering::Lifo } else { Ordering::Fifo };
                    } else {
                        tracing::debug!(key = %key, value = %value, "unrecognized pool.lifo value, keeping default");
                    }
                }
                _ => {
                    tracing::debug!(key = %key, "unrecognized pool.* key, ignoring");
                }
            }
        }

        config.connection_properties = Arc::new(forwarded);
        config.validate()
    }
}

/// Cosmetic builder over [`PoolConfig::default`]; every setter is infallible,
/// validation happens once in [`PoolConfigBuilder::build`].
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

macro_rules! setter {
    ($name:ident: $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.config.$name = value;
            self
        }
    };
}

impl PoolConfigBuilder {
    setter!(min_size: usize);
    setter!(max_size: usize);
    setter!(initial_size: usize);
    setter!(connect_timeout: Duration);
    setter!(idle_timeout: Duration);
    setter!(max_lifetime: Duration);
    setter!(validation_timeout: Duration);
    setter!(eviction_interval: Duration);
    setter!(max_wait: Duration);
    setter!(test_on_borrow: bool);
    setter!(test_on_return: bool);
    setter!(test_while_idle: bool);
    setter!(num_tests_per_eviction_run: usize);
    setter!(block_when_exhausted: bool);
    setter!(ordering: Ordering);

    pub fn connection_properties(mut self, props: BTreeMap<String, String>) -> Self {
        self.config.connection_properties = Arc::new(props);
        self
    }

    pub fn build(self) -> Result<PoolConfig, PoolError> {
        self.config.validate()
    }
}

fn assign_usize(slot: &mut usize, value: &str) {
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::debug!(value = %value, "unrecognized integer value, keeping default"),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "TRUE" | "True" => Some(true),
        "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn assign_bool(slot: &mut bool, value: &str) {
    match parse_bool(value) {
        Some(parsed) => *slot = parsed,
        None => tracing::debug!(value = %value, "unrecognized boolean value, keeping default"),
    }
}

fn assign_duration(slot: &mut Duration, value: &str) {
    match parse_duration(value) {
        Some(parsed) => *slot = parsed,
        None => tracing::debug!(value = %value, "unrecognized duration value, keeping default"),
    }
}

/// Parses a duration value per spec.md §6: a bare integer is seconds,
/// otherwise the value is parsed as an ISO-8601 duration (`PnDTnHnMnS`).
/// Returns `None` on anything unrecognized so the caller can retain the
/// current default.
fn parse_duration(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    parse_iso8601_duration(value)
}

fn parse_iso8601_duration(value: &str) -> Option<Duration> {
    let rest = value.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut total_secs: f64 = 0.0;
    let mut consumed_anything = false;

    let mut consume = |part: &str, units: &[(char, f64)]| -> Option<()> {
        let mut number = String::new();
        for ch in part.chars() {
            if ch.is_ascii_digit() || ch == '.' {
                number.push(ch);
                continue;
            }
            let Some(&(_, factor)) = units.iter().find(|(u, _)| *u == ch) else {
                return None;
            };
            let n: f64 = number.parse().ok()?;
            total_secs += n * factor;
            number.clear();
            consumed_anything = true;
        }
        if !number.is_empty() {
            return None;
        }
        Some(())
    };

    consume(date_part, &[('Y', 365.0 * 86400.0), ('M', 30.0 * 86400.0), ('D', 86400.0)])?;
    if let Some(time_part) = time_part {
        consume(time_part, &[('H', 3600.0), ('M', 60.0), ('S', 1.0)])?;
    }

    if !consumed_anything {
        return None;
    }
    Some(Duration::from_secs_f64(total_secs))
}
