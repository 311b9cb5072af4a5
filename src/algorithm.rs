//! Algorithm registry and DPS queues.

use reqwest::Method;
use serde_json::{Map, Value, json};
use std::path::Path;
use tracing::{debug, info};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::util::{require_non_empty, urljoin};

/// Older registration keys and their current names.
const LEGACY_KEYS: [(&str, &str); 8] = [
    ("algo_name", "algorithm_name"),
    ("version", "code_version"),
    ("environment", "environment_name"),
    ("description", "algorithm_description"),
    ("docker_url", "docker_container_url"),
    ("inputs", "algorithm_params"),
    ("run_command", "script_command"),
    ("repository_url", "repo_url"),
];

impl Client {
    /// Worker queues jobs may be submitted to.
    pub fn list_queues(&self) -> Result<Value> {
        let url = urljoin(&self.config().endpoints.algorithm_register, "resource");
        self.get_json(&url, &[])
    }

    /// Registers an algorithm from its JSON description.
    pub fn register_algorithm(&self, config: &Value) -> Result<Value> {
        if !config.is_object() {
            return Err(Error::validation("algorithm configuration must be an object"));
        }
        info!(
            algorithm = config["algorithm_name"].as_str().unwrap_or("?"),
            "registering algorithm"
        );
        self.send_json(Method::POST, &self.config().endpoints.mas_algo, config)
    }

    /// Registers an algorithm described by a YAML file.
    pub fn register_algorithm_from_yaml_file(&self, path: &Path) -> Result<Value> {
        let text = std::fs::read_to_string(path)?;
        let config: Value = serde_yaml::from_str(&text)?;
        self.register_algorithm(&config)
    }

    /// Registers an algorithm from a YAML file that uses the older key names
    /// (`algo_name`, `docker_url`, `inputs` with `name`/`download` entries, ...).
    pub fn register_algorithm_from_legacy_yaml_file(&self, path: &Path) -> Result<Value> {
        let text = std::fs::read_to_string(path)?;
        let config = legacy_algorithm_config(serde_yaml::from_str(&text)?)?;
        debug!(%config, "converted legacy algorithm configuration");
        self.register_algorithm(&config)
    }

    pub fn list_algorithms(&self) -> Result<Value> {
        self.get_json(&self.config().endpoints.mas_algo, &[])
    }

    /// `algo_id` is `name:version`.
    pub fn describe_algorithm(&self, algo_id: &str) -> Result<Value> {
        require_non_empty("algo_id", algo_id)?;
        self.get_json(&urljoin(&self.config().endpoints.mas_algo, algo_id), &[])
    }

    pub fn publish_algorithm(&self, algo_id: &str) -> Result<Value> {
        require_non_empty("algo_id", algo_id)?;
        let url = urljoin(&self.config().endpoints.mas_algo, "publish");
        self.send_json(Method::POST, &url, &json!({ "algo_id": algo_id }))
    }

    pub fn delete_algorithm(&self, algo_id: &str) -> Result<Value> {
        require_non_empty("algo_id", algo_id)?;
        let url = urljoin(&self.config().endpoints.mas_algo, algo_id);
        info!(algo_id, "deleting algorithm");
        let text = self.send(self.request(Method::DELETE, &url, crate::client::JSON), &url)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Renames legacy keys; each input becomes `{"field": name, "download": flag}`.
/// Unknown keys pass through unchanged.
fn legacy_algorithm_config(legacy: Value) -> Result<Value> {
    let Value::Object(fields) = legacy else {
        return Err(Error::validation("algorithm configuration must be a mapping"));
    };

    let mut config = Map::new();
    for (key, value) in fields {
        let renamed = LEGACY_KEYS
            .iter()
            .find(|(old, _)| *old == key)
            .map_or(key, |(_, new)| new.to_string());
        let value = if renamed == "algorithm_params" {
            legacy_inputs(value)?
        } else {
            value
        };
        config.insert(renamed, value);
    }
    Ok(Value::Object(config))
}

fn legacy_inputs(inputs: Value) -> Result<Value> {
    let inputs = match inputs {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        _ => return Err(Error::validation("inputs must be a list")),
    };
    Ok(Value::Array(
        inputs
            .iter()
            .map(|arg| {
                json!({
                    "field": arg.get("name").cloned().unwrap_or(Value::Null),
                    "download": arg.get("download").cloned().unwrap_or(Value::Null),
                })
            })
            .collect(),
    ))
}
