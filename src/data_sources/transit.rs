//! Transit data sources: encrypt, decrypt, sign and verify.
//!
//! Plaintext and context are taken and returned as text; the base64 framing
//! Vault expects is handled here.

use crate::diagnostics::Diagnostics;
use crate::interface::{DataSource, ProviderContext};
use crate::provider::ProviderError;
use crate::vault::common::str_field;
use crate::vault::transit::{self, convert_batch_input, convert_batch_results};
use crate::vault::VaultError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

fn default_backend() -> String {
    "transit".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    pub key: String,
    pub plaintext: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub key_version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ciphertext {
    pub ciphertext: String,
}

#[derive(Debug, Default)]
pub struct TransitEncrypt;

#[async_trait]
impl DataSource for TransitEncrypt {
    const TYPE_NAME: &'static str = "vault_transit_encrypt";

    type Config = EncryptConfig;
    type State = Ciphertext;

    fn validate(&self, config: &EncryptConfig, diags: &mut Diagnostics) {
        if config.key.trim().is_empty() {
            diags.error("key", "key must not be empty");
        }
    }

    async fn read(&self, ctx: &ProviderContext, config: &EncryptConfig) -> Result<Ciphertext, ProviderError> {
        let context = config.context.as_ref().map(|c| STANDARD.encode(c));
        let ciphertext = transit::encrypt(
            &ctx.client,
            &config.backend,
            &config.key,
            &STANDARD.encode(&config.plaintext),
            context.as_deref(),
            config.key_version,
        )
        .await?;
        Ok(Ciphertext { ciphertext })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecryptConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    pub key: String,
    pub ciphertext: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plaintext {
    pub plaintext: String,
}

#[derive(Debug, Default)]
pub struct TransitDecrypt;

#[async_trait]
impl DataSource for TransitDecrypt {
    const TYPE_NAME: &'static str = "vault_transit_decrypt";

    type Config = DecryptConfig;
    type State = Plaintext;

    fn validate(&self, config: &DecryptConfig, diags: &mut Diagnostics) {
        if config.key.trim().is_empty() {
            diags.error("key", "key must not be empty");
        }
        if !config.ciphertext.starts_with("vault:v") {
            diags.error("ciphertext", "ciphertext must start with vault:v");
        }
    }

    async fn read(&self, ctx: &ProviderContext, config: &DecryptConfig) -> Result<Plaintext, ProviderError> {
        let context = config.context.as_ref().map(|c| STANDARD.encode(c));
        let encoded = transit::decrypt(
            &ctx.client,
            &config.backend,
            &config.key,
            &config.ciphertext,
            context.as_deref(),
        )
        .await?;
        let path = format!("{}/decrypt/{}", config.backend, config.key);
        let bytes = STANDARD.decode(encoded.as_bytes()).map_err(|e| VaultError::Parse {
            path: path.clone(),
            message: format!("plaintext is not base64: {}", e),
        })?;
        let plaintext = String::from_utf8(bytes).map_err(|_| VaultError::Parse {
            path,
            message: "plaintext is not valid UTF-8".to_string(),
        })?;
        Ok(Plaintext { plaintext })
    }
}

/// Attributes shared by sign and verify.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureConfig {
    /// Transit mount.
    #[serde(default = "default_backend")]
    pub path: String,
    /// Key name.
    pub name: String,
    #[serde(default)]
    pub key_version: Option<u64>,
    #[serde(default)]
    pub hash_algorithm: Option<String>,
    #[serde(default)]
    pub signature_algorithm: Option<String>,
    #[serde(default)]
    pub marshaling_algorithm: Option<String>,
    #[serde(default)]
    pub prehashed: bool,
    /// Base64 input for a single operation.
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    /// Only used by verify.
    #[serde(default)]
    pub signature: Option<String>,
    /// Only used by verify.
    #[serde(default)]
    pub hmac: Option<String>,
    #[serde(default)]
    pub batch_input: Vec<BTreeMap<String, String>>,
}

impl SignatureConfig {
    fn validate_common(&self, diags: &mut Diagnostics) {
        if self.name.trim().is_empty() {
            diags.error("name", "name must not be empty");
        }
        diags.conflicts(&[
            ("input", self.input.is_some()),
            ("batch_input", !self.batch_input.is_empty()),
        ]);
        if self.input.is_none() && self.batch_input.is_empty() {
            diags.error("input", "one of input or batch_input is required");
        }
        if let Some(input) = &self.input {
            if STANDARD.decode(input.as_bytes()).is_err() {
                diags.error("input", "input must be base64 encoded");
            }
        }
    }

    /// Request body shared by both operations.
    fn body(&self) -> Result<Map<String, Value>, ProviderError> {
        let mut body = Map::new();
        if let Some(version) = self.key_version {
            body.insert("key_version".into(), json!(version));
        }
        for (key, value) in [
            ("signature_algorithm", &self.signature_algorithm),
            ("marshaling_algorithm", &self.marshaling_algorithm),
            ("input", &self.input),
            ("context", &self.context),
        ] {
            if let Some(v) = value {
                body.insert(key.into(), json!(v));
            }
        }
        if self.prehashed {
            body.insert("prehashed".into(), json!(true));
        }
        if !self.batch_input.is_empty() {
            let batch = convert_batch_input(&self.batch_input)?;
            body.insert(
                "batch_input".into(),
                Value::Array(batch.into_iter().map(Value::Object).collect()),
            );
        }
        Ok(body)
    }
}

fn batch_results(data: &Map<String, Value>) -> Vec<BTreeMap<String, String>> {
    data.get("batch_results")
        .and_then(Value::as_array)
        .map(|results| convert_batch_results(results))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignResult {
    pub signature: Option<String>,
    pub batch_results: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Default)]
pub struct TransitSign;

#[async_trait]
impl DataSource for TransitSign {
    const TYPE_NAME: &'static str = "vault_transit_sign";

    type Config = SignatureConfig;
    type State = SignResult;

    fn validate(&self, config: &SignatureConfig, diags: &mut Diagnostics) {
        config.validate_common(diags);
        if config.signature.is_some() || config.hmac.is_some() {
            diags.error("signature", "signature and hmac are only used by vault_transit_verify");
        }
    }

    async fn read(&self, ctx: &ProviderContext, config: &SignatureConfig) -> Result<SignResult, ProviderError> {
        let data = transit::sign_or_verify(
            &ctx.client,
            "sign",
            &config.path,
            &config.name,
            config.hash_algorithm.as_deref(),
            config.body()?,
        )
        .await?;
        Ok(SignResult {
            signature: str_field(&data, "signature"),
            batch_results: batch_results(&data),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyResult {
    pub valid: Option<bool>,
    pub batch_results: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Default)]
pub struct TransitVerify;

#[async_trait]
impl DataSource for TransitVerify {
    const TYPE_NAME: &'static str = "vault_transit_verify";

    type Config = SignatureConfig;
    type State = VerifyResult;

    fn validate(&self, config: &SignatureConfig, diags: &mut Diagnostics) {
        config.validate_common(diags);
        if config.input.is_some() {
            diags.conflicts(&[
                ("signature", config.signature.is_some()),
                ("hmac", config.hmac.is_some()),
            ]);
            if config.signature.is_none() && config.hmac.is_none() {
                diags.error("signature", "one of signature or hmac is required with input");
            }
        }
    }

    async fn read(&self, ctx: &ProviderContext, config: &SignatureConfig) -> Result<VerifyResult, ProviderError> {
        let mut body = config.body()?;
        for (key, value) in [("signature", &config.signature), ("hmac", &config.hmac)] {
            if let Some(v) = value {
                body.insert(key.into(), json!(v));
            }
        }
        let data = transit::sign_or_verify(
            &ctx.client,
            "verify",
            &config.path,
            &config.name,
            config.hash_algorithm.as_deref(),
            body,
        )
        .await?;
        Ok(VerifyResult {
            valid: data.get("valid").and_then(Value::as_bool),
            batch_results: batch_results(&data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: Value) -> SignatureConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_input_and_batch_conflict() {
        let cfg = config(json!({
            "name": "k",
            "input": "aGVsbG8=",
            "batch_input": [{"input": "aGVsbG8="}]
        }));
        let mut diags = Diagnostics::new();
        TransitSign.validate(&cfg, &mut diags);
        assert!(diags.to_string().contains("conflicting"));
    }

    #[test]
    fn test_verify_needs_signature_for_single_input() {
        let cfg = config(json!({"name": "k", "input": "aGVsbG8="}));
        let mut diags = Diagnostics::new();
        TransitVerify.validate(&cfg, &mut diags);
        assert!(diags.has_errors());

        let cfg = config(json!({"name": "k", "input": "aGVsbG8=", "signature": "vault:v1:abc"}));
        let mut diags = Diagnostics::new();
        TransitVerify.validate(&cfg, &mut diags);
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_body_converts_batch_fields() {
        let cfg = config(json!({
            "name": "k",
            "key_version": 2,
            "batch_input": [{"input": "aGVsbG8=", "key_version": "3", "salt_length": "32"}]
        }));
        let body = cfg.body().unwrap();
        assert_eq!(body["key_version"], json!(2));
        assert_eq!(
            body["batch_input"],
            json!([{"input": "aGVsbG8=", "key_version": 3, "salt_length": 32}])
        );
    }

    #[test]
    fn test_body_rejects_bad_batch_field() {
        let cfg = config(json!({
            "name": "k",
            "batch_input": [{"input": "aGVsbG8=", "mac_length": "long"}]
        }));
        let err = cfg.body().unwrap_err();
        assert!(err.to_string().contains("mac_length"));
    }
}
