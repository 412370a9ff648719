use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings, read from `TABLEBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub grid_path: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    /// Token that grants the admin role on `hello`. `None`: nobody is admin.
    pub admin_token: Option<String>,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    /// Days of empty schedule written when the grid file is first created.
    pub grid_days: u32,
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => write!(f, "invalid value for {key}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their defaults; set but
    /// unparseable numeric keys are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(lookup("TABLEBOOK_DATA_DIR").unwrap_or_else(|| "./data".into()));
        let grid_path = lookup("TABLEBOOK_GRID_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("grid.json"));

        Ok(Self {
            port: parsed(&lookup, "TABLEBOOK_PORT")?.unwrap_or(7433),
            bind: lookup("TABLEBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir,
            grid_path,
            max_connections: nonzero(&lookup, "TABLEBOOK_MAX_CONNECTIONS")?.unwrap_or(256),
            compact_threshold: parsed(&lookup, "TABLEBOOK_COMPACT_THRESHOLD")?.unwrap_or(1000),
            metrics_port: parsed(&lookup, "TABLEBOOK_METRICS_PORT")?,
            admin_token: lookup("TABLEBOOK_ADMIN_TOKEN").filter(|t| !t.is_empty()),
            session_ttl: Duration::from_secs(
                nonzero(&lookup, "TABLEBOOK_SESSION_TTL_SECS")?.unwrap_or(1800),
            ),
            sweep_interval: Duration::from_secs(
                nonzero(&lookup, "TABLEBOOK_SWEEP_INTERVAL_SECS")?.unwrap_or(86_400),
            ),
            grid_days: parsed(&lookup, "TABLEBOOK_GRID_DAYS")?.unwrap_or(14),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("ledger.wal")
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// Like [`parsed`], but zero is rejected: these values size intervals and
/// connection permits.
fn nonzero<T: std::str::FromStr + Default + PartialEq>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match parsed::<T>(lookup, key)? {
        Some(v) if v == T::default() => Err(ConfigError::Invalid {
            key,
            value: lookup(key).unwrap_or_default(),
        }),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.port, 7433);
        assert_eq!(c.bind, "0.0.0.0");
        assert_eq!(c.grid_path, PathBuf::from("./data/grid.json"));
        assert_eq!(c.wal_path(), PathBuf::from("./data/ledger.wal"));
        assert_eq!(c.metrics_port, None);
        assert_eq!(c.admin_token, None);
        assert_eq!(c.session_ttl, Duration::from_secs(1800));
        assert_eq!(c.sweep_interval, Duration::from_secs(86_400));
        assert_eq!(c.grid_days, 14);
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("TABLEBOOK_DATA_DIR", "/var/lib/tb"),
            ("TABLEBOOK_METRICS_PORT", "9100"),
            ("TABLEBOOK_ADMIN_TOKEN", "s3cret"),
            ("TABLEBOOK_MAX_CONNECTIONS", " 8 "),
        ])
        .unwrap();
        assert_eq!(c.grid_path, PathBuf::from("/var/lib/tb/grid.json"));
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(c.max_connections, 8);
    }

    #[test]
    fn bad_number_is_reported() {
        let err = config(&[("TABLEBOOK_PORT", "seventy")]).unwrap_err();
        assert_eq!(err.to_string(), "invalid value for TABLEBOOK_PORT: \"seventy\"");
    }

    #[test]
    fn zero_intervals_rejected() {
        for key in [
            "TABLEBOOK_SWEEP_INTERVAL_SECS",
            "TABLEBOOK_SESSION_TTL_SECS",
            "TABLEBOOK_MAX_CONNECTIONS",
        ] {
            let err = config(&[(key, "0")]).unwrap_err();
            assert!(err.to_string().contains(key), "{key}: {err}");
        }
        assert_eq!(config(&[("TABLEBOOK_SWEEP_INTERVAL_SECS", "60")]).unwrap().sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn empty_admin_token_disables_admin() {
        assert_eq!(config(&[("TABLEBOOK_ADMIN_TOKEN", "")]).unwrap().admin_token, None);
    }
}
