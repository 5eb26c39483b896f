//! Transit secrets engine operations for Vault.
//!
//! Besides the encrypt/decrypt/sign/verify calls, this module holds the
//! conversions between the string-only maps used for batch attributes and
//! the typed JSON Vault expects and returns.

use crate::vault::common::response_data;
use crate::vault::{VaultClient, VaultError};
use serde_json::{json, Map, Number, Value};
use std::collections::BTreeMap;

/// Batch fields Vault expects as integers.
const INT_FIELDS: &[&str] = &["key_version", "mac_length", "salt_length"];
/// Batch fields Vault expects as booleans.
const BOOL_FIELDS: &[&str] = &["prehashed"];

/// A batch item field could not be converted to the type Vault expects.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("batch_input[{index}]: field {field} has invalid value {value:?}, expected {expected}")]
pub struct BatchInputError {
    pub index: usize,
    pub field: String,
    pub value: String,
    pub expected: &'static str,
}

/// Converts string maps into Vault batch items, turning the known integer
/// and boolean fields into real JSON numbers and booleans.
pub fn convert_batch_input(
    input: &[BTreeMap<String, String>],
) -> Result<Vec<Map<String, Value>>, BatchInputError> {
    input
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.iter()
                .map(|(field, raw)| {
                    let value = if INT_FIELDS.contains(&field.as_str()) {
                        let n = raw.trim().parse::<i64>().map_err(|_| BatchInputError {
                            index,
                            field: field.clone(),
                            value: raw.clone(),
                            expected: "an integer",
                        })?;
                        Value::Number(Number::from(n))
                    } else if BOOL_FIELDS.contains(&field.as_str()) {
                        let b = raw.trim().parse::<bool>().map_err(|_| BatchInputError {
                            index,
                            field: field.clone(),
                            value: raw.clone(),
                            expected: "a boolean",
                        })?;
                        Value::Bool(b)
                    } else {
                        Value::String(raw.clone())
                    };
                    Ok((field.clone(), value))
                })
                .collect::<Result<Map<String, Value>, BatchInputError>>()
        })
        .collect()
}

/// Flattens Vault batch results into string maps. Booleans become
/// `"true"`/`"false"`, numbers their decimal form, nulls are dropped and
/// anything nested is kept as its JSON text.
pub fn convert_batch_results(results: &[Value]) -> Vec<BTreeMap<String, String>> {
    results
        .iter()
        .map(|item| {
            item.as_object()
                .map(|obj| {
                    obj.iter()
                        .filter_map(|(k, v)| {
                            let s = match v {
                                Value::Null => return None,
                                Value::Bool(b) => b.to_string(),
                                Value::Number(n) => n.to_string(),
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            Some((k.clone(), s))
                        })
                        .collect::<BTreeMap<String, String>>()
                })
                .unwrap_or_default()
        })
        .collect()
}

fn data_or_parse_error(path: &str, resp: Option<Value>) -> Result<Map<String, Value>, VaultError> {
    resp.as_ref()
        .and_then(response_data)
        .cloned()
        .ok_or_else(|| VaultError::Parse {
            path: path.to_string(),
            message: "response has no data".to_string(),
        })
}

/// Encrypts base64 plaintext with a named key. Returns the ciphertext.
pub async fn encrypt(
    client: &VaultClient,
    backend: &str,
    key: &str,
    plaintext_b64: &str,
    context: Option<&str>,
    key_version: Option<u64>,
) -> Result<String, VaultError> {
    let path = format!("{}/encrypt/{}", backend.trim_matches('/'), key);
    let mut body = json!({ "plaintext": plaintext_b64 });
    if let Some(ctx) = context {
        body["context"] = json!(ctx);
    }
    if let Some(version) = key_version {
        body["key_version"] = json!(version);
    }
    let data = data_or_parse_error(&path, client.write(&path, body).await?)?;
    data.get("ciphertext")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VaultError::Parse {
            path,
            message: "missing ciphertext".to_string(),
        })
}

/// Decrypts ciphertext with a named key. Returns the base64 plaintext.
pub async fn decrypt(
    client: &VaultClient,
    backend: &str,
    key: &str,
    ciphertext: &str,
    context: Option<&str>,
) -> Result<String, VaultError> {
    let path = format!("{}/decrypt/{}", backend.trim_matches('/'), key);
    let mut body = json!({ "ciphertext": ciphertext });
    if let Some(ctx) = context {
        body["context"] = json!(ctx);
    }
    let data = data_or_parse_error(&path, client.write(&path, body).await?)?;
    data.get("plaintext")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VaultError::Parse {
            path,
            message: "missing plaintext".to_string(),
        })
}

/// Calls `sign` or `verify` on a key and returns the response data. `op` is
/// the last path segment before the key name.
pub async fn sign_or_verify(
    client: &VaultClient,
    op: &str,
    backend: &str,
    key: &str,
    hash_algorithm: Option<&str>,
    body: Map<String, Value>,
) -> Result<Map<String, Value>, VaultError> {
    let mut path = format!("{}/{}/{}", backend.trim_matches('/'), op, key);
    if let Some(algo) = hash_algorithm {
        path = format!("{}/{}", path, algo);
    }
    data_or_parse_error(&path, client.write(&path, Value::Object(body)).await?)
}
