use crate::error::Result;
use crate::models::{TrackingEvent, VastData};
use log::{debug, warn};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

static BACKGROUND: OnceLock<Runtime> = OnceLock::new();

/// Handle of the runtime the caller is on, or of a shared background runtime
/// started on first use by callers that have none
fn runtime_handle() -> Result<Handle> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle);
    }
    if let Some(runtime) = BACKGROUND.get() {
        return Ok(runtime.handle().clone());
    }

    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("vast-tracking")
        .enable_all()
        .build()?;
    debug!("Started background runtime for tracking pings");
    // A racing caller may have won, in which case ours is dropped unused
    Ok(BACKGROUND.get_or_init(|| runtime).handle().clone())
}

/// Sends tracking pings without waiting for, retrying or surfacing the outcome
#[derive(Debug, Clone)]
pub struct TrackingDispatcher {
    client: reqwest::Client,
    runtime: Handle,
}

impl TrackingDispatcher {
    /// Binds to the current tokio runtime. Synchronous callers get a shared
    /// background runtime that outlives every dispatcher.
    pub fn new(timeout: Duration) -> Result<Self> {
        let runtime = runtime_handle()?;
        let client = {
            let _entered = runtime.enter();
            reqwest::Client::builder().timeout(timeout).build()?
        };
        Ok(Self { client, runtime })
    }

    /// Issue one GET per URL and return at once, from async or sync code.
    ///
    /// Returns the number of requests dispatched. Empty URLs are skipped.
    pub fn fire(&self, urls: &[String]) -> usize {
        self.spawn_all(urls).len()
    }

    /// Fire every tracking URL `data` holds for `event`
    pub fn fire_event(&self, data: &VastData, event: TrackingEvent) -> usize {
        debug!("Firing {:?} tracking ({} URLs)", event, data.urls_for(event).len());
        self.fire(data.urls_for(event))
    }

    /// Like [`fire`](Self::fire), but hands back the spawned tasks so a
    /// short-lived caller can wait for them before exiting
    pub fn spawn_all(&self, urls: &[String]) -> Vec<JoinHandle<()>> {
        urls.iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(|url| {
                let client = self.client.clone();
                let url = url.to_string();
                self.runtime.spawn(async move { ping(client, url).await })
            })
            .collect()
    }
}

async fn ping(client: reqwest::Client, url: String) {
    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            debug!("Tracking ping {} -> {}", url, response.status());
        }
        Ok(response) => warn!("Tracking ping {} returned {}", url, response.status()),
        Err(e) => warn!("Tracking ping {} failed: {}", url, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn dispatcher() -> TrackingDispatcher {
        TrackingDispatcher::new(Duration::from_millis(200)).unwrap()
    }

    #[test]
    fn test_fire_from_sync_code_sends_request() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/imp?id=7", listener.local_addr().unwrap());

        assert_eq!(dispatcher().fire(&[url, String::new()]), 1);

        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut request = [0u8; 512];
        let read = stream.read(&mut request).unwrap();
        assert!(String::from_utf8_lossy(&request[..read]).starts_with("GET /imp?id=7 HTTP/1.1"));
    }

    #[test]
    fn test_sync_dispatchers_share_background_runtime() {
        let urls = vec!["http://127.0.0.1:9/a".to_string(), "http://127.0.0.1:9/b".to_string()];
        assert_eq!(dispatcher().fire(&urls), 2);
        assert_eq!(dispatcher().fire(&urls), 2);
        assert!(BACKGROUND.get().is_some());
    }

    #[tokio::test]
    async fn test_one_request_per_non_empty_url() {
        let urls = vec![
            "http://127.0.0.1:9/a".to_string(),
            "  ".to_string(),
            "http://127.0.0.1:9/b".to_string(),
        ];
        assert_eq!(dispatcher().fire(&urls), 2);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let urls = vec!["not a url".to_string(), "http://127.0.0.1:9/c".to_string()];
        for handle in dispatcher().spawn_all(&urls) {
            assert!(handle.await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_fire_event_uses_matching_urls() {
        let mut data = VastData::default();
        data.tracking.push(TrackingEvent::Complete, "http://127.0.0.1:9/done".to_string());
        let dispatcher = dispatcher();
        assert_eq!(dispatcher.fire_event(&data, TrackingEvent::Complete), 1);
        assert_eq!(dispatcher.fire_event(&data, TrackingEvent::Start), 0);
    }
}
