use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use spatial_protocol::Placement;
use spatial_protocol::RuiLocation;

use crate::config::PlacementConfig;
use crate::error::PlacementError;
use crate::error::Result;

/// Computes a sample's placement relative to a target reference frame.
#[async_trait]
pub trait PlacementService: Send + Sync {
    async fn place(&self, target_iri: &str, rui_location: &RuiLocation) -> Result<Placement>;
}

#[derive(Serialize)]
struct PlacementRequest<'a> {
    target_iri: &'a str,
    rui_location: &'a RuiLocation,
}

#[derive(Clone)]
pub struct HttpPlacementClient {
    http: reqwest::Client,
    url: String,
}

impl HttpPlacementClient {
    pub fn new(config: &PlacementConfig) -> Result<Self> {
        config.validate().map_err(PlacementError::Config)?;
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl PlacementService for HttpPlacementClient {
    async fn place(&self, target_iri: &str, rui_location: &RuiLocation) -> Result<Placement> {
        let resp = self
            .http
            .post(&self.url)
            .json(&PlacementRequest {
                target_iri,
                rui_location,
            })
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PlacementError::Rejected {
                status,
                target_iri: target_iri.to_string(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}
