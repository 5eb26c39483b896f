//! Common helper functions for Vault operations.

use crate::vault::VaultError;
use reqwest::{Response, StatusCode};
use serde_json::{Map, Value};

/// Checks the HTTP response from Vault. Success yields the JSON body
/// (`None` for 204 or an empty body), 404 yields `Ok(None)` when
/// `missing_ok` is set, anything else is turned into [`VaultError::Api`]
/// with the messages from Vault's `errors` array.
pub async fn check_response(
    path: &str,
    resp: Response,
    missing_ok: bool,
) -> Result<Option<Value>, VaultError> {
    let status = resp.status();
    if status.is_success() {
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = resp.text().await.map_err(|e| VaultError::Network {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str::<Value>(&body).map_err(|e| VaultError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        return Ok(Some(value));
    }

    let body = resp.text().await.unwrap_or_default();
    let errors = parse_errors(&body);
    if status == StatusCode::NOT_FOUND && missing_ok && errors.is_empty() {
        return Ok(None);
    }
    Err(VaultError::Api {
        path: path.to_string(),
        status: status.as_u16(),
        errors: if errors.is_empty() && !body.is_empty() {
            vec![body]
        } else {
            errors
        },
    })
}

/// Extracts the `errors` array Vault puts on failed responses.
pub fn parse_errors(body: &str) -> Vec<String> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|val| {
            val.get("errors").and_then(|v| v.as_array()).map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.as_str().map(str::to_string))
                    .collect()
            })
        })
        .unwrap_or_default()
}

/// Returns the `data` object of a Vault response, if any.
pub fn response_data(resp: &Value) -> Option<&Map<String, Value>> {
    resp.get("data").and_then(Value::as_object)
}

/// Reads a string field, tolerating absence.
pub fn str_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Reads a boolean field, defaulting to `false`.
pub fn bool_field(data: &Map<String, Value>, key: &str) -> bool {
    data.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Reads an integer field. Vault reports durations either as integers or as
/// decimal strings depending on the endpoint, so both are accepted.
pub fn u64_field(data: &Map<String, Value>, key: &str) -> u64 {
    match data.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Reads a list of strings. A comma separated string is split, matching how
/// Vault echoes policies on older endpoints.
pub fn string_list(data: &Map<String, Value>, key: &str) -> Vec<String> {
    match data.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => {
            s.split(',').map(|p| p.trim().to_string()).collect()
        }
        _ => Vec::new(),
    }
}

/// Normalizes a mount path: no leading or trailing slashes.
pub fn trim_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}
