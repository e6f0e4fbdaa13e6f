//! Configuration: CLI flags (with env fallbacks) over `config.toml` over defaults.

use std::path::Path;
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::reconnect::ReconnectMode;
use crate::state::{ClaimPolicy, DisplayOrder, OperatorContext};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_LANG: &str = "es";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Connection flags shared by every subcommand
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// Base URL of the REST API
    #[arg(long, env = "GUIDEWATCH_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Base URL of the event streams (defaults to the API URL)
    #[arg(long, env = "GUIDEWATCH_SSE_URL", global = true)]
    pub sse_url: Option<String>,

    /// Web app URL used as the login return target
    #[arg(long, env = "GUIDEWATCH_WEB_URL", global = true)]
    pub web_url: Option<String>,

    #[arg(long, env = "GUIDEWATCH_OPERATOR_ID", global = true)]
    pub operator_id: Option<i64>,

    #[arg(long, env = "GUIDEWATCH_LANG", global = true)]
    pub lang: Option<String>,

    #[arg(long, env = "GUIDEWATCH_REQUEST_TIMEOUT_SECS", global = true)]
    pub request_timeout_secs: Option<u64>,

    /// Raw `Cookie` header carrying the session
    #[arg(
        long,
        env = "GUIDEWATCH_SESSION_COOKIE",
        hide_env_values = true,
        global = true
    )]
    pub session_cookie: Option<String>,

    #[arg(long, value_enum, env = "GUIDEWATCH_CLAIM_POLICY", global = true)]
    pub claim_policy: Option<ClaimPolicy>,

    #[arg(long, value_enum, env = "GUIDEWATCH_DISPLAY_ORDER", global = true)]
    pub display_order: Option<DisplayOrder>,

    #[arg(long, value_enum, env = "GUIDEWATCH_RECONNECT", global = true)]
    pub reconnect: Option<ReconnectMode>,
}

/// Shape of `<data_dir>/config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub sse_url: Option<String>,
    pub web_url: Option<String>,
    pub operator_id: Option<i64>,
    pub lang: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub session_cookie: Option<String>,
    pub claim_policy: Option<ClaimPolicy>,
    pub display_order: Option<DisplayOrder>,
    pub reconnect: Option<ReconnectMode>,
}

impl FileConfig {
    /// Missing file reads as empty.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved settings
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub api_url: String,
    pub sse_url: String,
    pub web_url: String,
    pub operator_id: Option<i64>,
    pub lang: String,
    pub request_timeout_secs: u64,
    #[serde(skip_serializing)]
    pub session_cookie: Option<String>,
    pub claim_policy: ClaimPolicy,
    pub display_order: DisplayOrder,
    pub reconnect: ReconnectMode,
}

impl Config {
    pub fn resolve(args: &ConnectionArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let api_url = normalize_url(
            "api_url",
            args.api_url
                .clone()
                .or(file.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        )?;
        let sse_url = match args.sse_url.clone().or(file.sse_url) {
            Some(url) => normalize_url("sse_url", url)?,
            None => api_url.clone(),
        };
        let web_url = match args.web_url.clone().or(file.web_url) {
            Some(url) => normalize_url("web_url", url)?,
            None => api_url.clone(),
        };

        Ok(Self {
            api_url,
            sse_url,
            web_url,
            operator_id: args.operator_id.or(file.operator_id),
            lang: args
                .lang
                .clone()
                .or(file.lang)
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LANG.to_string()),
            request_timeout_secs: args
                .request_timeout_secs
                .or(file.request_timeout_secs)
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            session_cookie: args
                .session_cookie
                .clone()
                .or(file.session_cookie)
                .filter(|c| !c.trim().is_empty()),
            claim_policy: args.claim_policy.or(file.claim_policy).unwrap_or_default(),
            display_order: args.display_order.or(file.display_order).unwrap_or_default(),
            reconnect: args.reconnect.or(file.reconnect).unwrap_or_default(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn operator_context(&self) -> Result<OperatorContext, ConfigError> {
        let operator_id = self.operator_id.ok_or(ConfigError::MissingOperatorId)?;
        Ok(OperatorContext {
            operator_id,
            claim_policy: self.claim_policy,
            display_order: self.display_order,
        })
    }

    #[cfg(test)]
    pub fn for_tests(base_url: &str) -> Self {
        Self {
            api_url: base_url.to_string(),
            sse_url: base_url.to_string(),
            web_url: base_url.to_string(),
            operator_id: Some(crate::fixtures::OPERATOR),
            lang: DEFAULT_LANG.to_string(),
            request_timeout_secs: 5,
            session_cookie: None,
            claim_policy: ClaimPolicy::default(),
            display_order: DisplayOrder::default(),
            reconnect: ReconnectMode::default(),
        }
    }
}

fn normalize_url(field: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://"))
        || trimmed.ends_with("://")
    {
        return Err(ConfigError::InvalidUrl { field, value });
    }
    Ok(trimmed.to_string())
}
