use async_trait::async_trait;
use reqwest::StatusCode;
use spatial_protocol::ExtractionRequest;
use tracing::info;

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::error::Result;

/// Starts an asynchronous cell-type count extraction. The collaborator
/// answers immediately and reports results later through a callback.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn begin(&self, request: &ExtractionRequest) -> Result<()>;
}

#[derive(Clone)]
pub struct HttpExtractionClient {
    http: reqwest::Client,
    url: String,
    bearer_token: Option<String>,
}

impl HttpExtractionClient {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        config.validate().map_err(ExtractionError::Config)?;
        Ok(Self {
            http: reqwest::Client::new(),
            url: config.url.clone(),
            bearer_token: config.bearer_token.clone(),
        })
    }
}

#[async_trait]
impl ExtractionService for HttpExtractionClient {
    async fn begin(&self, request: &ExtractionRequest) -> Result<()> {
        info!(
            "Requesting extraction for sample {} over {} datasets",
            request.sample_uuid,
            request.dataset_uuids.len()
        );
        let mut builder = self.http.post(&self.url).json(request);
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        let resp = builder.send().await?;
        if resp.status() != StatusCode::ACCEPTED {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractionError::Rejected {
                sample_uuid: request.sample_uuid.clone(),
                status,
                body,
            });
        }
        Ok(())
    }
}
