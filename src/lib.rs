pub mod config;
pub mod document;
pub mod error;
pub mod media;
pub mod models;
pub mod normalize;
pub mod parser;
pub mod request;
pub mod stitcher;
pub mod tracking;
pub mod unwrap;

pub use error::{Result, VastError};
pub use models::{
    AdPosition, AdRequestParams, AdType, DeviceInfo, TrackingEvent, TrackingUrls, VastData,
    WrapperIndirection, NOT_SKIPPABLE,
};
pub use normalize::clean_vast_xml;
pub use parser::{extract_wrapper_uri, is_wrapper, parse_vast, MAX_WRAPPER_DEPTH};
pub use request::build_ad_request_url;

pub mod async_api {
    use crate::config::SdkConfig;
    use crate::error::Result;
    use crate::models::VastData;
    use crate::unwrap::{self, HttpFetcher};
    use std::time::Duration;

    pub async fn parse_vast(xml: &str) -> Result<VastData> {
        // Parsing is CPU-bound, so we can just wrap the sync version
        crate::parser::parse_vast(xml, 0)
    }

    /// Resolve wrapper redirects over HTTP using the timeout and depth cap from `config`
    pub async fn resolve_vast(config: &SdkConfig, xml: &str) -> Result<VastData> {
        let fetcher = HttpFetcher::new(Duration::from_millis(config.timeout_ms))?;
        unwrap::resolve_vast(&fetcher, xml, config.max_wrapper_depth).await
    }

    /// Build the ad request from `config`, fetch it and resolve it to an InLine ad
    pub async fn load_ad(config: &SdkConfig) -> Result<VastData> {
        let url = crate::request::build_ad_request_url(&config.ad_request_params())?;
        let fetcher = HttpFetcher::new(Duration::from_millis(config.timeout_ms))?;
        let body = unwrap::fetch_vast_content(&fetcher, &url).await?;
        unwrap::resolve_vast(&fetcher, &body, config.max_wrapper_depth).await
    }
}
