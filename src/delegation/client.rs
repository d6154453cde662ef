//! HTTP client side of the delegation protocol

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::server::{ErrorBody, BACKUP_PATH, RESTORE_PATH, UPDATE_PATH};
use super::{
    AdapterDialer, BackupRequest, BackupResponse, EngineAdapter, RestoreRequest, RestoreResponse,
    UpdateRequest, UpdateResponse,
};

/// Remote adapter reached over HTTP
#[derive(Clone, Debug)]
pub struct HttpAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAdapter {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Calling adapter");

        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| status.to_string());
            return Err(Error::delegation(format!(
                "adapter {} answered {}: {}",
                url, status, detail
            )));
        }

        Ok(response.json::<Resp>().await?)
    }
}

#[async_trait]
impl EngineAdapter for HttpAdapter {
    async fn backup(&self, request: &BackupRequest) -> Result<BackupResponse> {
        self.post(BACKUP_PATH, request).await
    }

    async fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse> {
        self.post(UPDATE_PATH, request).await
    }

    async fn restore(&self, request: &RestoreRequest) -> Result<RestoreResponse> {
        self.post(RESTORE_PATH, request).await
    }
}

/// Dials registry addresses into [`HttpAdapter`]s sharing one connection pool
#[derive(Clone, Debug)]
pub struct HttpDialer {
    http: reqwest::Client,
    tls: bool,
}

impl HttpDialer {
    pub fn new(timeout: Duration, tls: bool) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, tls })
    }

    /// Base URL for a registry value; bare `host:port` gets a scheme
    pub fn base_url(&self, address: &str) -> String {
        let address = address.trim().trim_end_matches('/');
        if address.contains("://") {
            address.to_string()
        } else if self.tls {
            format!("https://{}", address)
        } else {
            format!("http://{}", address)
        }
    }
}

impl AdapterDialer for HttpDialer {
    fn dial(&self, address: &str) -> Result<Arc<dyn EngineAdapter>> {
        if address.trim().is_empty() {
            return Err(Error::config("empty adapter address"));
        }
        Ok(Arc::new(HttpAdapter::new(self.http.clone(), self.base_url(address))))
    }
}
