use std::collections::HashMap;

use crate::Credential;

/// Console environment configuration: where the credential comes from and
/// how chatty telemetry is. Values come from the process environment,
/// optionally seeded from a KEY=VALUE file named by `VANTAGE_CONFIG_PATH`
/// (environment wins over file on conflict).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub token: Option<String>,
    pub api_key: Option<String>,
    pub declared_roles: Vec<String>,
    pub telemetry_debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ConsoleConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("VANTAGE_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let token = optional(kv, "VANTAGE_TOKEN");
        let api_key = optional(kv, "VANTAGE_API_KEY");

        let declared_roles = kv
            .get("VANTAGE_ROLES")
            .map(|s| s.trim())
            .unwrap_or("")
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect::<Vec<_>>();

        let telemetry_debug = match kv.get("VANTAGE_TELEMETRY_DEBUG") {
            None => false,
            Some(raw) if raw.trim().is_empty() => false,
            Some(raw) => parse_bool(raw).ok_or_else(|| ConfigError {
                code: "ERR_INVALID_CONFIG",
                message: "VANTAGE_TELEMETRY_DEBUG must be a boolean".to_string(),
            })?,
        };

        Ok(Self {
            token,
            api_key,
            declared_roles,
            telemetry_debug,
        })
    }

    /// Token takes precedence over an API key when both are configured.
    pub fn credential(&self) -> Option<Credential<'_>> {
        if let Some(token) = self.token.as_deref() {
            return Some(Credential::Token(token));
        }
        self.api_key.as_deref().map(Credential::ApiKey)
    }
}

fn optional(kv: &HashMap<String, String>, key: &'static str) -> Option<String> {
    kv.get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|_| ConfigError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| ConfigError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}
