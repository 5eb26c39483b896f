//! `vault_policy_document`: renders an ACL policy in HCL. No Vault call is
//! made.

use crate::diagnostics::Diagnostics;
use crate::interface::{DataSource, ProviderContext};
use crate::provider::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CAPABILITIES: &[&str] = &[
    "create", "read", "update", "patch", "delete", "list", "sudo", "deny", "subscribe",
];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRule {
    pub path: String,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required_parameters: Vec<String>,
    #[serde(default)]
    pub allowed_parameter: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub denied_parameter: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub min_wrapping_ttl: Option<String>,
    #[serde(default)]
    pub max_wrapping_ttl: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocumentConfig {
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyDocument {
    pub hcl: String,
}

fn quote(s: &str) -> String {
    // JSON string escaping is valid HCL string escaping.
    serde_json::Value::String(s.to_string()).to_string()
}

fn list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| quote(s)).collect();
    format!("[{}]", quoted.join(", "))
}

fn parameter_block(out: &mut String, name: &str, params: &BTreeMap<String, Vec<String>>) {
    if params.is_empty() {
        return;
    }
    out.push_str(&format!("  {} = {{\n", name));
    for (key, values) in params {
        out.push_str(&format!("    {} = {}\n", quote(key), list(values)));
    }
    out.push_str("  }\n");
}

/// Renders the rules as HCL, one `path` block per rule.
pub fn render(rules: &[PolicyRule]) -> String {
    rules
        .iter()
        .map(|rule| {
            let mut out = String::new();
            if let Some(description) = &rule.description {
                for line in description.lines() {
                    out.push_str(&format!("# {}\n", line));
                }
            }
            out.push_str(&format!("path {} {{\n", quote(&rule.path)));
            out.push_str(&format!("  capabilities = {}\n", list(&rule.capabilities)));
            if !rule.required_parameters.is_empty() {
                out.push_str(&format!(
                    "  required_parameters = {}\n",
                    list(&rule.required_parameters)
                ));
            }
            parameter_block(&mut out, "allowed_parameters", &rule.allowed_parameter);
            parameter_block(&mut out, "denied_parameters", &rule.denied_parameter);
            if let Some(ttl) = &rule.min_wrapping_ttl {
                out.push_str(&format!("  min_wrapping_ttl = {}\n", quote(ttl)));
            }
            if let Some(ttl) = &rule.max_wrapping_ttl {
                out.push_str(&format!("  max_wrapping_ttl = {}\n", quote(ttl)));
            }
            out.push_str("}\n");
            out
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Default)]
pub struct PolicyDocumentRenderer;

#[async_trait]
impl DataSource for PolicyDocumentRenderer {
    const TYPE_NAME: &'static str = "vault_policy_document";

    type Config = PolicyDocumentConfig;
    type State = PolicyDocument;

    fn validate(&self, config: &PolicyDocumentConfig, diags: &mut Diagnostics) {
        if config.rules.is_empty() {
            diags.error("rules", "at least one rule is required");
        }
        for (i, rule) in config.rules.iter().enumerate() {
            if rule.path.trim().is_empty() {
                diags.error(&format!("rules[{}].path", i), "path must not be empty");
            }
            if rule.capabilities.is_empty() {
                diags.error(
                    &format!("rules[{}].capabilities", i),
                    "at least one capability is required",
                );
            }
            for capability in &rule.capabilities {
                if !CAPABILITIES.contains(&capability.as_str()) {
                    diags.error_with_detail(
                        &format!("rules[{}].capabilities", i),
                        format!("unknown capability {:?}", capability),
                        format!("valid capabilities: {}", CAPABILITIES.join(", ")),
                    );
                }
            }
        }
    }

    async fn read(
        &self,
        _ctx: &ProviderContext,
        config: &PolicyDocumentConfig,
    ) -> Result<PolicyDocument, ProviderError> {
        Ok(PolicyDocument {
            hcl: render(&config.rules),
        })
    }
}
