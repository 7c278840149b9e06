//! Environment loader
//!
//! Assembles the immutable [`Config`] record from the process environment.
//! This is the only place in the crate that reads ambient process state;
//! every other component receives the `Config` by reference.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use reqwest::Url;

use crate::error::BootstrapError;
use crate::poller::PollPolicy;
use crate::Result;

/// Environment variable names.
pub mod vars {
    pub const DCX_URL: &str = "DCX_URL";
    pub const DCX_TAG: &str = "DCX_TAG";
    pub const REPO_PATH: &str = "REPO_PATH";
    pub const SCANNER_DIR: &str = "SCANNER_DIR";
    pub const MAX_CHECKS: &str = "MAX_CHECKS";
    pub const DELAY: &str = "DELAY";
    pub const AI_ENDPOINT: &str = "AI_ENDPOINT";
    pub const AI_API_KEY: &str = "AI_API_KEY";
    pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
    pub const DCX_ASSET_PATTERN: &str = "DCX_ASSET_PATTERN";
    pub const DCX_HTTP_TIMEOUT: &str = "DCX_HTTP_TIMEOUT";
}

/// Sentinel tag selecting the most recent release.
pub const DEFAULT_TAG: &str = "latest";
pub const DEFAULT_MAX_CHECKS: u32 = 30;
pub const DEFAULT_DELAY_SECS: f64 = 1.0;
pub const DEFAULT_SCANNER_DIR: &str = ".";
pub const DEFAULT_ASSET_PATTERN: &str = r"dcx(-|_)\d+\.\d+\.\d+.*\.(whl|tar\.gz)";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Bootstrap configuration, built once per process.
#[derive(Clone)]
pub struct Config {
    /// Release service base URL override (`None` = built-in endpoint)
    pub base_url: Option<String>,
    /// Release tag, or [`DEFAULT_TAG`]
    pub tag: String,
    /// Absolute path of the repository to scan
    pub repo_path: PathBuf,
    /// Absolute path of the directory the scanner runs in
    pub scanner_dir: PathBuf,
    /// Upper bound on AI status checks
    pub max_checks: u32,
    /// Fixed wait before each status check
    pub delay: Duration,
    /// AI status endpoint; polling is skipped when absent
    pub ai_endpoint: Option<String>,
    /// Bearer credential for the AI endpoint
    pub ai_api_key: Option<String>,
    /// Release service bearer token (never empty)
    pub token: String,
    /// Selector for assets in release-listing envelopes
    pub asset_pattern: String,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::from_lookup(&cwd, |name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset. Relative paths are resolved against `cwd`.
    pub fn from_lookup<F>(cwd: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        // The token is checked first so a bare environment names it.
        let token = get(vars::GITHUB_TOKEN).ok_or_else(|| BootstrapError::MissingConfig {
            name: vars::GITHUB_TOKEN.to_string(),
        })?;

        let max_checks = match get(vars::MAX_CHECKS) {
            Some(raw) => parse_max_checks(&raw)?,
            None => DEFAULT_MAX_CHECKS,
        };

        let delay = match get(vars::DELAY) {
            Some(raw) => parse_seconds(vars::DELAY, &raw)?,
            None => Duration::from_secs_f64(DEFAULT_DELAY_SECS),
        };

        let http_timeout = match get(vars::DCX_HTTP_TIMEOUT) {
            Some(raw) => {
                let timeout = parse_seconds(vars::DCX_HTTP_TIMEOUT, &raw)?;
                if timeout.is_zero() {
                    return Err(BootstrapError::invalid(
                        vars::DCX_HTTP_TIMEOUT,
                        &raw,
                        "must be greater than zero",
                    ));
                }
                timeout
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let asset_pattern =
            get(vars::DCX_ASSET_PATTERN).unwrap_or_else(|| DEFAULT_ASSET_PATTERN.to_string());
        if let Err(e) = Regex::new(&asset_pattern) {
            return Err(BootstrapError::invalid(
                vars::DCX_ASSET_PATTERN,
                &asset_pattern,
                e.to_string(),
            ));
        }

        let ai_endpoint = get(vars::AI_ENDPOINT);
        if let Some(endpoint) = &ai_endpoint {
            check_http_url(vars::AI_ENDPOINT, endpoint)?;
        }

        let repo_path = get(vars::REPO_PATH)
            .map(|raw| absolutize(cwd, &raw))
            .unwrap_or_else(|| cwd.to_path_buf());
        let scanner_dir = absolutize(
            cwd,
            &get(vars::SCANNER_DIR).unwrap_or_else(|| DEFAULT_SCANNER_DIR.to_string()),
        );

        Ok(Config {
            base_url: get(vars::DCX_URL),
            tag: get(vars::DCX_TAG).unwrap_or_else(|| DEFAULT_TAG.to_string()),
            repo_path,
            scanner_dir,
            max_checks,
            delay,
            ai_endpoint,
            ai_api_key: get(vars::AI_API_KEY),
            token,
            asset_pattern,
            http_timeout,
        })
    }

    /// Re-check the invariants `from_lookup` establishes.
    ///
    /// Fields are public, so a `Config` built by hand must pass this before
    /// anything touches the network or spawns a process.
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(BootstrapError::MissingConfig {
                name: vars::GITHUB_TOKEN.to_string(),
            });
        }
        if let Some(endpoint) = &self.ai_endpoint {
            check_http_url(vars::AI_ENDPOINT, endpoint)?;
        }
        if self.http_timeout.is_zero() {
            return Err(BootstrapError::invalid(
                vars::DCX_HTTP_TIMEOUT,
                "0",
                "must be greater than zero",
            ));
        }
        self.asset_regex().map(|_| ())
    }

    /// Whether the AI result poller should run.
    pub fn ai_enabled(&self) -> bool {
        self.ai_endpoint.is_some()
    }

    /// Root the scanner writes `dcx-scan-*` directories into.
    pub fn output_root(&self) -> PathBuf {
        self.scanner_dir.join("output")
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(self.max_checks, self.delay)
    }

    /// Compiled asset selector. The pattern is validated at load time.
    pub fn asset_regex(&self) -> Result<Regex> {
        Regex::new(&self.asset_pattern).map_err(|e| {
            BootstrapError::invalid(vars::DCX_ASSET_PATTERN, &self.asset_pattern, e.to_string())
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("tag", &self.tag)
            .field("repo_path", &self.repo_path)
            .field("scanner_dir", &self.scanner_dir)
            .field("max_checks", &self.max_checks)
            .field("delay", &self.delay)
            .field("ai_endpoint", &self.ai_endpoint)
            .field("ai_api_key", &self.ai_api_key.as_ref().map(|_| "<redacted>"))
            .field("token", &"<redacted>")
            .field("asset_pattern", &self.asset_pattern)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

/// Accepts `30` as well as `30.0`; fractional counts are truncated.
fn parse_max_checks(raw: &str) -> Result<u32> {
    if let Ok(n) = raw.parse::<u32>() {
        return Ok(n);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v.trunc().min(u32::MAX as f64) as u32),
        _ => Err(BootstrapError::invalid(
            vars::MAX_CHECKS,
            raw,
            "expected a non-negative integer",
        )),
    }
}

fn parse_seconds(name: &str, raw: &str) -> Result<Duration> {
    match raw.parse::<f64>().map(Duration::try_from_secs_f64) {
        Ok(Ok(d)) => Ok(d),
        _ => Err(BootstrapError::invalid(
            name,
            raw,
            "expected a non-negative number of seconds",
        )),
    }
}

fn check_http_url(name: &str, raw: &str) -> Result<()> {
    let url = Url::parse(raw).map_err(|e| BootstrapError::invalid(name, raw, e.to_string()))?;
    if matches!(url.scheme(), "http" | "https") {
        Ok(())
    } else {
        Err(BootstrapError::invalid(
            name,
            raw,
            "only http and https are supported",
        ))
    }
}

fn absolutize(cwd: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path == Path::new(".") {
        cwd.to_path_buf()
    } else if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(Path::new("/work"), |name| env.get(name).cloned())
    }

    #[test]
    fn test_defaults_applied_with_only_token() {
        let config = load(&[(vars::GITHUB_TOKEN, "ghs_abc")]).unwrap();
        assert_eq!(config.token, "ghs_abc");
        assert_eq!(config.tag, "latest");
        assert_eq!(config.max_checks, 30);
        assert_eq!(config.delay, Duration::from_secs(1));
        assert_eq!(config.repo_path, PathBuf::from("/work"));
        assert_eq!(config.scanner_dir, PathBuf::from("/work"));
        assert_eq!(config.http_timeout, Duration::from_secs(60));
        assert!(config.base_url.is_none());
        assert!(!config.ai_enabled());
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let err = load(&[(vars::DCX_TAG, "v1.2.3")]).unwrap_err();
        assert!(matches!(err, BootstrapError::MissingConfig { ref name } if name == "GITHUB_TOKEN"));
    }

    #[test]
    fn test_empty_token_counts_as_missing() {
        let err = load(&[(vars::GITHUB_TOKEN, "   ")]).unwrap_err();
        assert!(matches!(err, BootstrapError::MissingConfig { .. }));
    }

    #[test]
    fn test_missing_token_reported_before_other_errors() {
        let err = load(&[(vars::DELAY, "soon")]).unwrap_err();
        assert!(matches!(err, BootstrapError::MissingConfig { .. }));
    }

    #[test]
    fn test_overrides_are_read() {
        let config = load(&[
            (vars::GITHUB_TOKEN, "t"),
            (vars::DCX_URL, "https://mirror.example.com/dl"),
            (vars::DCX_TAG, "v2.0.0"),
            (vars::REPO_PATH, "/src/repo"),
            (vars::SCANNER_DIR, "scanner"),
            (vars::MAX_CHECKS, "5"),
            (vars::DELAY, "0.25"),
            (vars::AI_ENDPOINT, "https://ai.example.com/status"),
            (vars::AI_API_KEY, "sk-1"),
        ])
        .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://mirror.example.com/dl"));
        assert_eq!(config.tag, "v2.0.0");
        assert_eq!(config.repo_path, PathBuf::from("/src/repo"));
        assert_eq!(config.scanner_dir, PathBuf::from("/work/scanner"));
        assert_eq!(config.output_root(), PathBuf::from("/work/scanner/output"));
        assert_eq!(config.max_checks, 5);
        assert_eq!(config.delay, Duration::from_millis(250));
        assert!(config.ai_enabled());
        assert_eq!(config.ai_api_key.as_deref(), Some("sk-1"));
    }

    #[test]
    fn test_max_checks_accepts_float_form() {
        let config = load(&[(vars::GITHUB_TOKEN, "t"), (vars::MAX_CHECKS, "30.0")]).unwrap();
        assert_eq!(config.max_checks, 30);
    }

    #[test]
    fn test_invalid_max_checks_rejected() {
        let err = load(&[(vars::GITHUB_TOKEN, "t"), (vars::MAX_CHECKS, "-1")]).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidConfig { ref name, .. } if name == "MAX_CHECKS"));
    }

    #[test]
    fn test_invalid_delay_rejected() {
        let err = load(&[(vars::GITHUB_TOKEN, "t"), (vars::DELAY, "NaN")]).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidConfig { ref name, .. } if name == "DELAY"));
    }

    #[test]
    fn test_zero_http_timeout_rejected() {
        let err = load(&[(vars::GITHUB_TOKEN, "t"), (vars::DCX_HTTP_TIMEOUT, "0")]).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidConfig { .. }));
    }

    #[test]
    fn test_bad_asset_pattern_rejected() {
        let err = load(&[(vars::GITHUB_TOKEN, "t"), (vars::DCX_ASSET_PATTERN, "dcx(")]).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidConfig { .. }));
    }

    #[test]
    fn test_malformed_ai_endpoint_rejected_at_load() {
        let err = load(&[(vars::GITHUB_TOKEN, "t"), (vars::AI_ENDPOINT, "not a url")]).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidConfig { ref name, .. } if name == "AI_ENDPOINT"));

        let err = load(&[
            (vars::GITHUB_TOKEN, "t"),
            (vars::AI_ENDPOINT, "ftp://ai.example.com/status"),
        ])
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_validate_catches_hand_built_configs() {
        let config = load(&[(vars::GITHUB_TOKEN, "t")]).unwrap();
        assert!(config.validate().is_ok());

        let mut blank = config.clone();
        blank.token = String::new();
        assert!(matches!(blank.validate(), Err(BootstrapError::MissingConfig { .. })));

        let mut bad_endpoint = config;
        bad_endpoint.ai_endpoint = Some("not a url".to_string());
        assert!(matches!(
            bad_endpoint.validate(),
            Err(BootstrapError::InvalidConfig { ref name, .. }) if name == "AI_ENDPOINT"
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[(vars::GITHUB_TOKEN, "ghs_secret"), (vars::AI_API_KEY, "sk-secret")])
            .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("ghs_secret"));
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
