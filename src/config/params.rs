//! The structured connection descriptor consumed by the client layer. Two
//! front doors: serde (for TOML-shaped host configs) and `FromStr` for the
//! classic `key=value;key=value` descriptor strings. Both funnel through the
//! same validation, so invalid bounds fail before any socket is opened.

use std::{collections::HashMap, str::FromStr, time::Duration};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::errors::Error;
use crate::wire::TextEncoding;

// -----------------------------------------------------------------------------
// ----- Defaults --------------------------------------------------------------

const DEFAULT_PORT: u16 = 5001;
const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;
const DEFAULT_MAX_POOL_SIZE: u32 = 100;

// -----------------------------------------------------------------------------
// ----- ConnectionParams ------------------------------------------------------

/// Everything needed to reach one endpoint plus the pool policy for it.
/// Zero-valued timeouts mean "disabled".
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub buffer_size: usize,
    pub pooling: bool,
    pub min_pool_size: u32,
    pub max_pool_size: u32,
    pub load_balance_timeout: Duration,
    pub inactivity_timeout: Duration,
    pub send_timeout: Duration,
    pub receive_timeout: Duration,
    pub encoding: TextEncoding,
}

// -----------------------------------------------------------------------------
// ----- ConnectionParams: Static ----------------------------------------------

impl ConnectionParams {
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            user: String::new(),
            password: SecretString::new(String::new().into_boxed_str()),
            buffer_size: DEFAULT_BUFFER_SIZE,
            pooling: true,
            min_pool_size: 0,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            load_balance_timeout: Duration::ZERO,
            inactivity_timeout: Duration::ZERO,
            send_timeout: Duration::ZERO,
            receive_timeout: Duration::ZERO,
            encoding: TextEncoding::default(),
        }
    }

    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.user = user.into();
        self.password = SecretString::new(password.into().into_boxed_str());
        self
    }

}

// -----------------------------------------------------------------------------
// ----- ConnectionParams: Public ----------------------------------------------

impl ConnectionParams {
    pub fn password_exposed(&self) -> &str {
        self.password.expose_secret()
    }

    /// Pool-bound checks, run before the first socket opens.
    pub fn validate(&self) -> Result<(), Error> {
        if self.server.trim().is_empty() {
            return Err(Error::Config("server must not be empty".into()));
        }
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer size must be greater than zero".into()));
        }
        if self.max_pool_size == 0 {
            return Err(Error::Config("max pool size must be greater than zero".into()));
        }
        if self.max_pool_size < self.min_pool_size {
            return Err(Error::Config(format!(
                "max pool size {} is below min pool size {}",
                self.max_pool_size, self.min_pool_size
            )));
        }
        Ok(())
    }

    /// Normalized identity for pool sharing: one pool per distinct key
    /// process-wide.
    pub fn pool_key(&self) -> PoolKey {
        PoolKey {
            server: self.server.to_ascii_lowercase(),
            port: self.port,
            user: self.user.clone(),
            password: self.password_exposed().to_owned(),
            buffer_size: self.buffer_size,
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size,
            load_balance_timeout: self.load_balance_timeout,
            inactivity_timeout: self.inactivity_timeout,
            send_timeout: self.send_timeout,
            receive_timeout: self.receive_timeout,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PoolKey ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    server: String,
    port: u16,
    user: String,
    password: String,
    buffer_size: usize,
    min_pool_size: u32,
    max_pool_size: u32,
    load_balance_timeout: Duration,
    inactivity_timeout: Duration,
    send_timeout: Duration,
    receive_timeout: Duration,
}

// -----------------------------------------------------------------------------
// ----- Descriptor strings ----------------------------------------------------

impl FromStr for ConnectionParams {
    type Err = Error;

    /// `server=host;port=5001;user id=u;password=p;max pool size=25;...`
    /// Keys are case-insensitive; unknown keys are a configuration fault.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut options: HashMap<String, &str> = HashMap::new();
        for pair in s.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("option `{pair}` is not key=value")))?;
            let key = key.trim().to_ascii_lowercase();
            if options.insert(key.clone(), value.trim()).is_some() {
                return Err(Error::Config(format!("duplicate option `{key}`")));
            }
        }

        let mut params = ConnectionParams::new(String::new(), DEFAULT_PORT);
        for (key, value) in options {
            match key.as_str() {
                "server" => params.server = value.to_owned(),
                "port" => params.port = parse_num(&key, value)?,
                "user id" | "user" => params.user = value.to_owned(),
                "password" => {
                    params.password = SecretString::new(value.to_owned().into_boxed_str());
                }
                "buffer size" => params.buffer_size = parse_num(&key, value)?,
                "pooling" => params.pooling = parse_bool(&key, value)?,
                "min pool size" => params.min_pool_size = parse_num(&key, value)?,
                "max pool size" => params.max_pool_size = parse_num(&key, value)?,
                "load balance timeout" => {
                    params.load_balance_timeout = parse_secs(&key, value)?;
                }
                "inactivity timeout" => params.inactivity_timeout = parse_secs(&key, value)?,
                "send timeout" => params.send_timeout = parse_secs(&key, value)?,
                "receive timeout" => params.receive_timeout = parse_secs(&key, value)?,
                "encoding" => {
                    params.encoding = match value.to_ascii_lowercase().as_str() {
                        "utf8" | "utf-8" => TextEncoding::Utf8,
                        "latin1" | "latin-1" => TextEncoding::Latin1,
                        other => {
                            return Err(Error::Config(format!("unknown encoding `{other}`")));
                        }
                    };
                }
                other => return Err(Error::Config(format!("unrecognized option `{other}`"))),
            }
        }

        params.validate()?;
        Ok(params)
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("option `{key}` has invalid value `{value}`")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::Config(format!(
            "option `{key}` has invalid value `{value}`"
        ))),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, Error> {
    let secs: u64 = parse_num(key, value)?;
    Ok(Duration::from_secs(secs))
}

// -----------------------------------------------------------------------------
// ----- Serde front door ------------------------------------------------------

/// On-disk shape of one descriptor; seconds for the timeout fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamsEntry {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_true")]
    pub pooling: bool,
    #[serde(default)]
    pub min_pool_size: u32,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
    #[serde(default)]
    pub load_balance_timeout_secs: u64,
    #[serde(default)]
    pub inactivity_timeout_secs: u64,
    #[serde(default)]
    pub send_timeout_secs: u64,
    #[serde(default)]
    pub receive_timeout_secs: u64,
    #[serde(default)]
    pub encoding: TextEncoding,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_max_pool_size() -> u32 {
    DEFAULT_MAX_POOL_SIZE
}

fn default_true() -> bool {
    true
}

impl TryFrom<ParamsEntry> for ConnectionParams {
    type Error = Error;

    fn try_from(entry: ParamsEntry) -> Result<Self, Error> {
        let params = ConnectionParams {
            server: entry.server,
            port: entry.port,
            user: entry.user,
            password: SecretString::new(entry.password.into_boxed_str()),
            buffer_size: entry.buffer_size,
            pooling: entry.pooling,
            min_pool_size: entry.min_pool_size,
            max_pool_size: entry.max_pool_size,
            load_balance_timeout: Duration::from_secs(entry.load_balance_timeout_secs),
            inactivity_timeout: Duration::from_secs(entry.inactivity_timeout_secs),
            send_timeout: Duration::from_secs(entry.send_timeout_secs),
            receive_timeout: Duration::from_secs(entry.receive_timeout_secs),
            encoding: entry.encoding,
        };
        params.validate()?;
        Ok(params)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_string_parses() {
        let params: ConnectionParams =
            "server=TickHost;port=5010;user id=dev;password=secret;max pool size=25;\
             load balance timeout=30;receive timeout=5"
                .parse()
                .unwrap();
        assert_eq!(params.server, "TickHost");
        assert_eq!(params.port, 5010);
        assert_eq!(params.user, "dev");
        assert_eq!(params.password_exposed(), "secret");
        assert_eq!(params.max_pool_size, 25);
        assert_eq!(params.load_balance_timeout, Duration::from_secs(30));
        assert_eq!(params.receive_timeout, Duration::from_secs(5));
        assert!(params.pooling);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = "server=x;flavour=mild".parse::<ConnectionParams>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let err = "server=x;receive timeout=-1"
            .parse::<ConnectionParams>()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_buffer_size_is_rejected() {
        let err = "server=x;buffer size=0".parse::<ConnectionParams>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_max_pool_is_rejected() {
        let err = "server=x;max pool size=0".parse::<ConnectionParams>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn max_below_min_is_rejected() {
        let err = "server=x;min pool size=5;max pool size=2"
            .parse::<ConnectionParams>()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn pool_key_normalizes_server_case() {
        let a: ConnectionParams = "server=TickHost;port=5010".parse().unwrap();
        let b: ConnectionParams = "server=tickhost;port=5010".parse().unwrap();
        assert_eq!(a.pool_key(), b.pool_key());
        let c: ConnectionParams = "server=tickhost;port=5011".parse().unwrap();
        assert_ne!(a.pool_key(), c.pool_key());
    }
}
