use crate::document::VastDocument;
use crate::models::{TrackingUrls, VastData};
use crate::parser::{self, AdNode};
use log::debug;

/// Tracking URLs a Wrapper asks to be pinged alongside the ad it points to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapperTracking {
    pub tracking: TrackingUrls,
    pub click_tracking_urls: Vec<String>,
}

impl WrapperTracking {
    pub fn is_empty(&self) -> bool {
        self.tracking.is_empty() && self.click_tracking_urls.is_empty()
    }
}

/// Collect impression, event and click tracking from a Wrapper document.
/// Returns `None` if the document does not load or holds no Wrapper node.
pub fn collect_wrapper_tracking(xml: &str) -> Option<WrapperTracking> {
    let document = VastDocument::load(xml).ok()?;
    let wrapper = match parser::find_ad_node(&document.root)? {
        AdNode::Wrapper(wrapper) => wrapper,
        AdNode::InLine(_) => return None,
    };

    let collected = WrapperTracking {
        tracking: parser::tracking_urls(wrapper),
        click_tracking_urls: parser::click_tracking_urls(wrapper),
    };
    debug!(
        "Collected wrapper tracking: {} impressions, {} click trackers",
        collected.tracking.impression_urls.len(),
        collected.click_tracking_urls.len()
    );
    Some(collected)
}

/// A new `VastData` with every wrapper's tracking appended after the InLine's own,
/// outermost wrapper first
pub fn stitch_tracking(inline: &VastData, wrappers: &[WrapperTracking]) -> VastData {
    let mut stitched = inline.clone();
    for wrapper in wrappers {
        stitched.tracking.extend(&wrapper.tracking);
        stitched
            .click_tracking_urls
            .extend_from_slice(&wrapper.click_tracking_urls);
    }
    stitched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackingEvent;

    const WRAPPER: &str = r#"<VAST version="3.0"><Ad><Wrapper>
        <VASTAdTagURI><![CDATA[https://next.example.com/vast]]></VASTAdTagURI>
        <Impression>https://w.example.com/imp</Impression>
        <Creatives><Creative><Linear>
          <TrackingEvents>
            <Tracking event="start">https://w.example.com/start</Tracking>
            <Tracking event="complete">https://w.example.com/complete</Tracking>
          </TrackingEvents>
          <VideoClicks><ClickTracking>https://w.example.com/click</ClickTracking></VideoClicks>
        </Linear></Creative></Creatives>
    </Wrapper></Ad></VAST>"#;

    #[test]
    fn test_collect_wrapper_tracking() {
        let collected = collect_wrapper_tracking(WRAPPER).unwrap();
        assert_eq!(collected.tracking.impression_urls, ["https://w.example.com/imp"]);
        assert_eq!(collected.tracking.start_urls, ["https://w.example.com/start"]);
        assert_eq!(collected.tracking.complete_urls, ["https://w.example.com/complete"]);
        assert_eq!(collected.click_tracking_urls, ["https://w.example.com/click"]);
        assert!(!collected.is_empty());
    }

    #[test]
    fn test_inline_documents_have_no_wrapper_tracking() {
        let inline = "<VAST><Ad><InLine><Impression>https://i.example.com</Impression></InLine></Ad></VAST>";
        assert_eq!(collect_wrapper_tracking(inline), None);
        assert_eq!(collect_wrapper_tracking("garbage"), None);
    }

    #[test]
    fn test_stitch_appends_after_inline() {
        let mut inline = VastData {
            video_url: Some("https://cdn.example.com/ad.mp4".to_string()),
            ..VastData::default()
        };
        inline.tracking.push(TrackingEvent::Start, "https://i.example.com/start".to_string());
        inline.click_tracking_urls.push("https://i.example.com/click".to_string());

        let wrapper = collect_wrapper_tracking(WRAPPER).unwrap();
        let stitched = stitch_tracking(&inline, &[wrapper]);

        assert_eq!(
            stitched.urls_for(TrackingEvent::Start),
            ["https://i.example.com/start", "https://w.example.com/start"]
        );
        assert_eq!(
            stitched.click_tracking_urls,
            ["https://i.example.com/click", "https://w.example.com/click"]
        );
        assert_eq!(stitched.video_url, inline.video_url);
        assert_eq!(inline.urls_for(TrackingEvent::Start).len(), 1);
    }
}
