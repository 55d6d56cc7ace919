use crate::error::{Result, VastError};
use crate::models::{VastData, WrapperIndirection};
use crate::parser;
use crate::stitcher::{self, WrapperTracking};
use log::{debug, info, warn};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

/// Source of VAST documents for wrapper redirects
pub trait VastFetcher {
    /// Fetch the response body behind `uri`
    fn fetch(&self, uri: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Follow wrapper redirects starting at `xml` until an InLine ad is reached.
///
/// Each redirect increments the depth. A redirect that would take the depth past
/// `max_depth` is not fetched and the chain fails with `DepthExceeded`. A URI
/// seen twice aborts with `WrapperCycle`.
/// Tracking from every wrapper on the way is stitched onto the final result.
pub async fn resolve_vast<F: VastFetcher>(fetcher: &F, xml: &str, max_depth: usize) -> Result<VastData> {
    let mut body = xml.to_string();
    let mut depth = 0;
    let mut visited = HashSet::new();
    let mut wrappers: Vec<WrapperTracking> = Vec::new();

    loop {
        let Some(WrapperIndirection { vast_ad_tag_uri }) = parser::wrapper_indirection(&body) else {
            let inline = parser::parse_vast_with_limit(&body, depth, max_depth)?;
            return Ok(stitcher::stitch_tracking(&inline, &wrappers));
        };

        if depth + 1 > max_depth {
            warn!("Maximum wrapper depth {} exceeded, not fetching {}", max_depth, vast_ad_tag_uri);
            return Err(VastError::DepthExceeded {
                depth: depth + 1,
                max: max_depth,
            });
        }

        if !visited.insert(vast_ad_tag_uri.clone()) {
            warn!("Cycle detected in wrapper chain: {}", vast_ad_tag_uri);
            return Err(VastError::WrapperCycle(vast_ad_tag_uri));
        }

        if let Some(tracking) = stitcher::collect_wrapper_tracking(&body) {
            wrappers.push(tracking);
        }

        info!("Following wrapper at depth {}: {}", depth, vast_ad_tag_uri);
        body = fetcher.fetch(&vast_ad_tag_uri).await?;
        depth += 1;
    }
}

/// Fetches VAST over HTTP(S), or from disk for `file://` URIs and local paths
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn fetch_url(&self, url: &str) -> Result<String> {
        // Random request ID to correlate log lines
        let req_id: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();

        let url = url::Url::parse(url)?;
        debug!("[{}] Fetching VAST from {}", req_id, url);
        let start_time = Instant::now();

        let response = self.client.get(url).send().await.inspect_err(|_| {
            warn!("[{}] Request failed after {:?}", req_id, start_time.elapsed());
        })?;

        if !response.status().is_success() {
            return Err(VastError::Other(format!(
                "Failed to fetch VAST: HTTP status {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        debug!("[{}] Received {} bytes in {:?}", req_id, body.len(), start_time.elapsed());
        Ok(body)
    }
}

impl VastFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> Result<String> {
        fetch_vast_content(self, uri).await
    }
}

/// Read `input` from disk when it names a file, otherwise fetch it as a URL
pub async fn fetch_vast_content(fetcher: &HttpFetcher, input: &str) -> Result<String> {
    if let Some(path) = input.strip_prefix("file://") {
        debug!("Reading VAST from file {}", path);
        return Ok(tokio::fs::read_to_string(path).await?);
    }
    if Path::new(input).exists() {
        debug!("Reading VAST from local file {}", input);
        return Ok(tokio::fs::read_to_string(input).await?);
    }
    fetcher.fetch_url(input).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackingEvent;
    use crate::parser::MAX_WRAPPER_DEPTH;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MapFetcher {
        documents: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl MapFetcher {
        fn with(mut self, uri: &str, body: String) -> Self {
            self.documents.insert(uri.to_string(), body);
            self
        }
    }

    impl VastFetcher for MapFetcher {
        async fn fetch(&self, uri: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.documents
                .get(uri)
                .cloned()
                .ok_or_else(|| VastError::Other(format!("no document at {}", uri)))
        }
    }

    fn wrapper(next: &str, hop: usize) -> String {
        format!(
            r#"<VAST version="3.0"><Ad><Wrapper>
                <VASTAdTagURI><![CDATA[{next}]]></VASTAdTagURI>
                <Impression>https://w.example.com/imp/{hop}</Impression>
            </Wrapper></Ad></VAST>"#
        )
    }

    fn inline() -> String {
        r#"<VAST version="3.0"><Ad><InLine>
            <Impression>https://i.example.com/imp</Impression>
            <Creatives><Creative><Linear><MediaFiles>
              <MediaFile type="video/mp4">https://cdn.example.com/final.mp4</MediaFile>
            </MediaFiles></Linear></Creative></Creatives>
        </InLine></Ad></VAST>"#
            .to_string()
    }

    /// Wrapper chain `hop0 -> hop1 -> ... -> hop{wrappers}` where the last is InLine
    fn chain(wrappers: usize) -> (String, MapFetcher) {
        let mut fetcher = MapFetcher::default();
        for hop in 1..wrappers {
            fetcher = fetcher.with(&format!("https://hop{hop}.example.com"), wrapper(&format!("https://hop{}.example.com", hop + 1), hop));
        }
        fetcher = fetcher.with(&format!("https://hop{wrappers}.example.com"), inline());
        (wrapper("https://hop1.example.com", 0), fetcher)
    }

    #[tokio::test]
    async fn test_inline_needs_no_fetch() {
        let fetcher = MapFetcher::default();
        let data = resolve_vast(&fetcher, &inline(), MAX_WRAPPER_DEPTH).await.unwrap();
        assert_eq!(data.video_url.as_deref(), Some("https://cdn.example.com/final.mp4"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_follows_wrappers_and_stitches_tracking() {
        let (start, fetcher) = chain(2);
        let data = resolve_vast(&fetcher, &start, MAX_WRAPPER_DEPTH).await.unwrap();
        assert_eq!(data.video_url.as_deref(), Some("https://cdn.example.com/final.mp4"));
        assert_eq!(
            data.urls_for(TrackingEvent::Impression),
            [
                "https://i.example.com/imp",
                "https://w.example.com/imp/0",
                "https://w.example.com/imp/1"
            ]
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_five_redirects_are_allowed() {
        let (start, fetcher) = chain(MAX_WRAPPER_DEPTH);
        let data = resolve_vast(&fetcher, &start, MAX_WRAPPER_DEPTH).await.unwrap();
        assert!(data.is_playable());
    }

    #[tokio::test]
    async fn test_long_chain_is_capped() {
        let (start, fetcher) = chain(MAX_WRAPPER_DEPTH + 3);
        let result = resolve_vast(&fetcher, &start, MAX_WRAPPER_DEPTH).await;
        assert!(matches!(result, Err(VastError::DepthExceeded { depth: 6, max: 5 })));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), MAX_WRAPPER_DEPTH);
    }

    #[tokio::test]
    async fn test_zero_depth_cap_fetches_nothing() {
        let (start, fetcher) = chain(1);
        let result = resolve_vast(&fetcher, &start, 0).await;
        assert!(matches!(result, Err(VastError::DepthExceeded { depth: 1, max: 0 })));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_follows_namespaced_wrapper() {
        let fetcher = MapFetcher::default().with("https://next.example.com", inline());
        let start = r#"<vast:VAST xmlns:vast="http://www.iab.com/VAST" version="4.1"><vast:Ad><vast:Wrapper>
            <vast:VASTAdTagURI>https://next.example.com</vast:VASTAdTagURI>
            <vast:Impression>https://w.example.com/imp/ns</vast:Impression>
            </vast:Wrapper></vast:Ad></vast:VAST>"#;
        let data = resolve_vast(&fetcher, start, MAX_WRAPPER_DEPTH).await.unwrap();
        assert_eq!(data.video_url.as_deref(), Some("https://cdn.example.com/final.mp4"));
        assert_eq!(
            data.urls_for(TrackingEvent::Impression),
            ["https://i.example.com/imp", "https://w.example.com/imp/ns"]
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cycle_is_detected() {
        let fetcher = MapFetcher::default()
            .with("https://a.example.com", wrapper("https://b.example.com", 1))
            .with("https://b.example.com", wrapper("https://a.example.com", 2));
        let start = wrapper("https://a.example.com", 0);
        let result = resolve_vast(&fetcher, &start, MAX_WRAPPER_DEPTH).await;
        assert!(matches!(result, Err(VastError::WrapperCycle(uri)) if uri == "https://a.example.com"));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_propagated() {
        let fetcher = MapFetcher::default();
        let start = wrapper("https://missing.example.com", 0);
        let result = resolve_vast(&fetcher, &start, MAX_WRAPPER_DEPTH).await;
        assert!(matches!(result, Err(VastError::Other(_))));
    }

    #[tokio::test]
    async fn test_wrapper_without_uri_is_rejected() {
        let fetcher = MapFetcher::default();
        let start = r#"<VAST><Ad><Wrapper><AdSystem>x</AdSystem></Wrapper></Ad></VAST>"#;
        let result = resolve_vast(&fetcher, start, MAX_WRAPPER_DEPTH).await;
        assert!(matches!(result, Err(VastError::WrapperWithoutInLine)));
    }
}
