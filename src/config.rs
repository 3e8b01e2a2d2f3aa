// ⚙️ Configuration - environment driven, one database per tenant
//
// Binaries call `dotenvy::dotenv()` first, so a local .env file works the same
// as exported variables.

use std::env;
use std::path::{Path, PathBuf};

use crate::assignment::JobOptions;
use crate::error::{GlCodeError, Result};
use crate::rules::FallbackRules;

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub database_path: PathBuf,
    pub batch_size: usize,
    /// None = no hosted classifier, fallback rules only
    pub openai: Option<OpenAiConfig>,
    pub fallback_rules_path: Option<PathBuf>,
    pub server_addr: String,
}

impl JobConfig {
    /// Load from the process environment. `user_id` (CLI `userId=`) wins over
    /// `GLCODE_USER_ID`.
    pub fn from_env(user_id: Option<&str>) -> Result<Self> {
        Self::from_lookup(user_id, |key| env::var(key).ok())
    }

    /// Load from any key lookup
    pub fn from_lookup<F>(user_id: Option<&str>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tenant = user_id.map(str::to_string).or_else(|| get("GLCODE_USER_ID"));
        if let Some(tenant) = &tenant {
            validate_tenant(tenant)?;
        }

        let database_path = match get("GLCODE_DATABASE_PATH") {
            Some(path) => PathBuf::from(path),
            None => {
                let data_dir = get("GLCODE_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
                database_path_for(Path::new(&data_dir), tenant.as_deref())
            }
        };

        let batch_size = match get("GLCODE_BATCH_SIZE") {
            Some(raw) => parse_batch_size(&raw)?,
            None => DEFAULT_BATCH_SIZE,
        };

        let openai = match get("OPENAI_API_KEY") {
            Some(api_key) => Some(OpenAiConfig {
                api_key,
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                temperature: 0.1,
                timeout_secs: match get("OPENAI_TIMEOUT_SECS") {
                    Some(raw) => raw.trim().parse().map_err(|_| {
                        GlCodeError::Config(format!("OPENAI_TIMEOUT_SECS is not a number: {}", raw))
                    })?,
                    None => DEFAULT_TIMEOUT_SECS,
                },
            }),
            None => None,
        };

        Ok(JobConfig {
            database_path,
            batch_size,
            openai,
            fallback_rules_path: get("GLCODE_FALLBACK_RULES").map(PathBuf::from),
            server_addr: get("GLCODE_SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
        })
    }

    /// Fallback rules from GLCODE_FALLBACK_RULES, or the standard policy
    pub fn fallback_rules(&self) -> Result<FallbackRules> {
        match &self.fallback_rules_path {
            Some(path) => FallbackRules::from_file(path).map_err(|e| GlCodeError::Config(format!("{:#}", e))),
            None => Ok(FallbackRules::standard()),
        }
    }

    pub fn job_options(&self) -> Result<JobOptions> {
        Ok(JobOptions {
            batch_size: self.batch_size,
            fallback: self.fallback_rules()?,
        })
    }
}

/// `<data_dir>/user_<id>.db` for a tenant, `<data_dir>/glcode.db` otherwise
pub fn database_path_for(data_dir: &Path, user_id: Option<&str>) -> PathBuf {
    match user_id {
        Some(id) => data_dir.join(format!("user_{}.db", id)),
        None => data_dir.join("glcode.db"),
    }
}

fn validate_tenant(user_id: &str) -> Result<()> {
    let valid = !user_id.is_empty()
        && user_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(GlCodeError::Config(format!("invalid userId: {:?}", user_id)))
    }
}

fn parse_batch_size(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(GlCodeError::Config(format!(
            "GLCODE_BATCH_SIZE must be a positive integer, got {:?}",
            raw
        ))),
    }
}
