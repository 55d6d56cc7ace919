use crate::error::Result;
use crate::models::{AdPosition, AdRequestParams, AdType, DeviceInfo};
use crate::parser::MAX_WRAPPER_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_wrapper_depth() -> usize {
    MAX_WRAPPER_DEPTH
}

/// SDK settings loaded from a JSON file
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct SdkConfig {
    /// Ad server endpoint
    pub base_url: String,

    /// Placement identifier assigned by the ad server
    pub placement_id: String,

    #[serde(default)]
    pub ad_type: AdType,

    #[serde(default)]
    pub position: AdPosition,

    /// Timeout for ad and wrapper fetches, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub cta_text: Option<String>,

    /// Wrapper redirects to follow before giving up
    #[serde(default = "default_max_wrapper_depth")]
    pub max_wrapper_depth: usize,

    #[serde(default)]
    pub device: DeviceInfo,
}

impl SdkConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Ad request parameters for this configuration
    pub fn ad_request_params(&self) -> AdRequestParams {
        AdRequestParams {
            base_url: self.base_url.clone(),
            placement_id: self.placement_id.clone(),
            ad_type: self.ad_type,
            position: self.position,
            timeout_ms: self.timeout_ms,
            debug: self.debug,
            cta_text: self.cta_text.clone(),
            device: self.device.clone(),
        }
    }
}
