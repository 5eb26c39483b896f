//! Client implementation for Vault API interactions.
//!
//! This module provides a client for making HTTP requests to the Vault API
//! with appropriate authentication and error handling. Paths passed to the
//! logical methods are relative to `/v1/`, the same way the Vault CLI
//! addresses them (`secret/data/foo`, `sys/mounts`).

use crate::vault::common::check_response;
use crate::vault::VaultError;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Certificate, Client, Identity, Method,
};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Client for interacting with the Vault HTTP API.
#[derive(Clone)]
pub struct VaultClient {
    /// Base URL of the Vault server
    pub addr: String,
    /// Auth token for Vault API requests
    token: Option<String>,
    /// Namespace sent with every request (enterprise)
    namespace: Option<String>,
    /// HTTP client for making requests
    client: Client,
    /// Custom headers to add to requests
    custom_headers: HeaderMap,
}

/// TLS and transport settings used to build a [`VaultClient`].
#[derive(Debug, Default, Clone)]
pub struct TlsSettings {
    pub skip_verify: bool,
    /// PEM encoded CA certificates to trust in addition to the system roots.
    pub ca_certs: Vec<Vec<u8>>,
    /// PEM encoded client certificate and PKCS#8 key for mTLS.
    pub client_identity: Option<(Vec<u8>, Vec<u8>)>,
}

impl VaultClient {
    /// Creates a new VaultClient with the specified address and token.
    pub fn new(addr: &str, token: Option<&str>) -> Result<Self, VaultError> {
        Self::with_tls(addr, token, &TlsSettings::default())
    }

    /// Creates a client that applies the given TLS settings.
    pub fn with_tls(
        addr: &str,
        token: Option<&str>,
        tls: &TlsSettings,
    ) -> Result<Self, VaultError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(tls.skip_verify);

        for pem in &tls.ca_certs {
            let cert = Certificate::from_pem(pem)
                .map_err(|e| VaultError::Client(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some((cert, key)) = &tls.client_identity {
            let identity = Identity::from_pkcs8_pem(cert, key)
                .map_err(|e| VaultError::Client(format!("invalid client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| VaultError::Client(e.to_string()))?;

        Ok(Self {
            addr: addr.trim_end_matches('/').to_string(),
            token: token.map(str::to_string),
            namespace: None,
            client,
            custom_headers: HeaderMap::new(),
        })
    }

    /// Returns the token this client authenticates with, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the namespace sent with each request, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns a copy of this client using `token`. The HTTP connection pool
    /// is shared.
    pub fn clone_with_token(&self, token: Option<&str>) -> Self {
        let mut other = self.clone();
        other.token = token.map(str::to_string);
        other
    }

    /// Sets the namespace header for every subsequent request.
    pub fn set_namespace(&mut self, namespace: Option<&str>) -> &mut Self {
        self.namespace = namespace
            .map(|ns| ns.trim_matches('/').to_string())
            .filter(|ns| !ns.is_empty());
        self
    }

    /// Adds a custom header to the client. Invalid names or values are
    /// rejected.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<&mut Self, VaultError> {
        let header_name = HeaderName::from_str(name)
            .map_err(|e| VaultError::Client(format!("invalid header name {}: {}", name, e)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| VaultError::Client(format!("invalid value for header {}: {}", name, e)))?;
        self.custom_headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Reads a logical path. Returns `None` when nothing exists there.
    pub async fn read(&self, path: &str) -> Result<Option<Value>, VaultError> {
        self.request(Method::GET, path, None, true).await
    }

    /// Writes a JSON body to a logical path. Returns the response body, if
    /// Vault sent one.
    pub async fn write(&self, path: &str, body: Value) -> Result<Option<Value>, VaultError> {
        self.request(Method::POST, path, Some(body), false).await
    }

    /// Deletes a logical path. Deleting something that is already gone is
    /// not an error.
    pub async fn delete(&self, path: &str) -> Result<(), VaultError> {
        self.request(Method::DELETE, path, None, true).await?;
        Ok(())
    }

    /// Lists keys under a logical path using Vault's `LIST` verb.
    pub async fn list(&self, path: &str) -> Result<Option<Value>, VaultError> {
        let method = Method::from_bytes(b"LIST").map_err(|e| VaultError::Client(e.to_string()))?;
        self.request(method, path, None, true).await
    }

    /// Makes a request to the Vault API with the specified method and
    /// optional body.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        missing_ok: bool,
    ) -> Result<Option<Value>, VaultError> {
        let path = path.trim_start_matches('/');
        let url = format!("{}/v1/{}", self.addr, path);
        debug!("{} {}", method, path);

        let mut request = self.client.request(method, &url);

        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(namespace) = &self.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        for (name, value) in self.custom_headers.iter() {
            request = request.header(name, value);
        }
        if let Some(json_body) = body {
            request = request.json(&json_body);
        }

        let response = request.send().await.map_err(|e| VaultError::Network {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        check_response(path, response, missing_ok).await
    }
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("addr", &self.addr)
            .field("namespace", &self.namespace)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}
