use std::net::SocketAddr;
use std::path::PathBuf;

use crate::pipeline::editing::DedupMode;

/// Application-level constants
pub const APP_NAME: &str = "Toxedit";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
const DB_FILE_NAME: &str = "toxicity_versions.db";

/// Get the application data directory
/// ~/Toxedit/ on all platforms; the working directory when no home is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the version log.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join(DB_FILE_NAME)
}

/// `EnvFilter` directive used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,toxedit_lib=debug"
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub ollama_url: String,
    pub model: String,
    pub llm_timeout_secs: u64,
    pub bind_addr: SocketAddr,
    pub strict_dedup: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            llm_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            strict_dedup: false,
        }
    }
}

impl AppConfig {
    /// Read `TOXEDIT_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset; values that
    /// do not parse keep the default and log a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Self {
            db_path: get("TOXEDIT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            ollama_url: get("TOXEDIT_OLLAMA_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.ollama_url),
            model: get("TOXEDIT_MODEL").unwrap_or(defaults.model),
            llm_timeout_secs: parsed(
                "TOXEDIT_LLM_TIMEOUT_SECS",
                get("TOXEDIT_LLM_TIMEOUT_SECS"),
                defaults.llm_timeout_secs,
            ),
            bind_addr: parsed("TOXEDIT_BIND_ADDR", get("TOXEDIT_BIND_ADDR"), defaults.bind_addr),
            strict_dedup: get("TOXEDIT_STRICT_DEDUP")
                .map(|raw| parse_flag("TOXEDIT_STRICT_DEDUP", &raw, defaults.strict_dedup))
                .unwrap_or(defaults.strict_dedup),
        }
    }

    pub fn dedup_mode(&self) -> DedupMode {
        DedupMode::from_strict_flag(self.strict_dedup)
    }
}

fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Unparseable setting, using default");
            default
        }),
    }
}

fn parse_flag(key: &str, raw: &str, default: bool) -> bool {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(key, value = %raw, "Unparseable flag, using default");
            default
        }
    }
}
