use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const PREFIX: &str = "HEC_EXPORTER_";

/// Splunk's default `max_content_length_logs`.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 2 * 1024 * 1024;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HEC_EXPORTER_ENDPOINT is required but not set")]
    EndpointMissing,

    #[error("HEC_EXPORTER_ENDPOINT is not a valid URL: {0}")]
    EndpointInvalidUrl(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("{0} has invalid value: {1} (expected \"true\" or \"false\")")]
    InvalidBool(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Url,
    pub token: Option<String>,
    pub headers: Vec<(String, String)>,
    pub disable_compression: bool,
    /// Upper bound for one uncompressed log body; 0 disables chunking.
    pub max_content_length: usize,
    pub timeout: Duration,
    pub host: Option<String>,
    pub source: Option<String>,
    pub sourcetype: Option<String>,
    pub index: Option<String>,
}

impl Config {
    /// Defaults for everything but the endpoint.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            token: None,
            headers: Vec::new(),
            disable_compression: false,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            host: None,
            source: None,
            sourcetype: None,
            index: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(PREFIX))
            .collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(parse_endpoint(vars)?);
        config.token = parse_string(vars, "HEC_EXPORTER_TOKEN");
        config.headers = parse_headers(vars);
        config.disable_compression = parse_bool(vars, "HEC_EXPORTER_DISABLE_COMPRESSION", false)?;
        config.max_content_length = parse_usize(
            vars,
            "HEC_EXPORTER_MAX_CONTENT_LENGTH",
            DEFAULT_MAX_CONTENT_LENGTH,
        )?;
        config.timeout = parse_duration_ms(vars, "HEC_EXPORTER_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?;
        config.host = parse_string(vars, "HEC_EXPORTER_HOST");
        config.source = parse_string(vars, "HEC_EXPORTER_SOURCE");
        config.sourcetype = parse_string(vars, "HEC_EXPORTER_SOURCETYPE");
        config.index = parse_string(vars, "HEC_EXPORTER_INDEX");
        Ok(config)
    }

    /// Every static header sent with a HEC request, in application order.
    /// Later entries win, so configured headers override the defaults.
    pub fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_owned(), "application/json".to_owned()),
            (
                "User-Agent".to_owned(),
                concat!("hec-exporter/", env!("CARGO_PKG_VERSION")).to_owned(),
            ),
        ];
        if let Some(token) = &self.token {
            headers.push(("Authorization".to_owned(), format!("Splunk {token}")));
        }
        headers.extend(self.headers.iter().cloned());
        headers
    }
}

fn parse_endpoint(vars: &HashMap<String, String>) -> Result<Url, ConfigError> {
    let raw = vars
        .get("HEC_EXPORTER_ENDPOINT")
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::EndpointMissing)?;

    Url::parse(raw).map_err(|_| ConfigError::EndpointInvalidUrl(raw.clone()))
}

fn parse_string(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name).filter(|s| !s.is_empty()).cloned()
}

fn parse_bool(
    vars: &HashMap<String, String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(name).map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(default),
        Some("true" | "1") => Ok(true),
        Some("false" | "0") => Ok(false),
        Some(_) => Err(ConfigError::InvalidBool(
            name.to_owned(),
            vars[name].clone(),
        )),
    }
}

fn parse_usize(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default_ms)),
    }
}

fn parse_headers(vars: &HashMap<String, String>) -> Vec<(String, String)> {
    vars.get("HEC_EXPORTER_HEADERS")
        .filter(|s| !s.is_empty())
        .map(|raw| {
            raw.split(',')
                .filter_map(|pair| {
                    let (k, v) = pair.split_once('=')?;
                    let k = k.trim();
                    if k.is_empty() {
                        return None;
                    }
                    Some((k.to_owned(), v.trim().to_owned()))
                })
                .collect()
        })
        .unwrap_or_default()
}
