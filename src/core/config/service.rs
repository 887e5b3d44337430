use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::PipelineConfig;
use super::validation::validate_config;
use crate::core::errors::PipelineError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 9] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "client_id",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 2] = ["max_tokens", "tokens"];

/// Environment variables mapped onto config paths. Applied after the YAML
/// files so deployments can keep secrets out of disk config.
const ENV_OVERRIDES: [(&str, &[&str]); 5] = [
    ("NAVER_CLIENT_ID", &["external_search", "naver", "client_id"]),
    ("NAVER_CLIENT_SECRET", &["external_search", "naver", "client_secret"]),
    ("BRAVE_SEARCH_API_KEY", &["external_search", "brave", "api_key"]),
    ("LLM_API_KEY", &["llm", "api_key"]),
    ("ELASTICSEARCH_URL", &["internal_search", "elasticsearch", "url"]),
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("RAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Raw merged configuration: `config.yml`, then `secrets.yaml`, then
    /// environment overrides.
    pub fn load_config(&self) -> Result<Value, PipelineError> {
        let public_config = load_yaml_file(&self.config_path());
        let secrets_config = load_yaml_file(&self.secrets_path());
        let mut merged = deep_merge(&public_config, &secrets_config);
        apply_env_overrides(&mut merged, |key| env::var(key).ok());
        Ok(merged)
    }

    pub fn load_pipeline_config(&self) -> Result<PipelineConfig, PipelineError> {
        let raw = self.load_config()?;
        parse_pipeline_config(&raw)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

/// Validate a raw config tree and deserialise it into `PipelineConfig`.
pub fn parse_pipeline_config(raw: &Value) -> Result<PipelineConfig, PipelineError> {
    validate_config(raw)?;
    serde_json::from_value(raw.clone()).map_err(|e| PipelineError::Config(e.to_string()))
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => Value::Object(Map::new()),
            Err(err) => {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), err);
                Value::Object(Map::new())
            }
        },
        Err(_) => Value::Object(Map::new()),
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn apply_env_overrides<F>(config: &mut Value, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (var, path) in ENV_OVERRIDES {
        let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        set_path(config, path, Value::String(value));
    }
}

fn set_path(config: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut cursor = config;
    for key in parents {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let Value::Object(map) = cursor else {
            return;
        };
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if entry.is_null() {
            *entry = Value::Object(Map::new());
        }
        cursor = entry;
    }

    if let Value::Object(map) = cursor {
        map.insert(last.to_string(), value);
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    if SENSITIVE_WHITELIST.contains(&lowered.as_str()) {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
}
