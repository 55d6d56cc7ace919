use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Skip offset sentinel for ads that cannot be skipped
pub const NOT_SKIPPABLE: i32 = -1;

/// Normalized result of parsing one InLine VAST document
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VastData {
    /// The chosen media file URL, `None` when no usable media was found
    pub video_url: Option<String>,

    /// The click-through URL
    pub click_through_url: Option<String>,

    /// Click tracking URLs in document order
    pub click_tracking_urls: Vec<String>,

    /// Tracking URLs grouped by event
    #[serde(flatten)]
    pub tracking: TrackingUrls,

    /// Skip offset in seconds, `NOT_SKIPPABLE` when the ad cannot be skipped
    pub skip_offset: i32,

    /// Duration in seconds, 0 when unknown
    pub duration: u32,
}

impl Default for VastData {
    fn default() -> Self {
        Self {
            video_url: None,
            click_through_url: None,
            click_tracking_urls: Vec::new(),
            tracking: TrackingUrls::default(),
            skip_offset: NOT_SKIPPABLE,
            duration: 0,
        }
    }
}

impl VastData {
    /// Whether a media URL was located
    pub fn is_playable(&self) -> bool {
        self.video_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    pub fn is_skippable(&self) -> bool {
        self.skip_offset >= 0
    }

    /// Tracking URLs to ping when `event` is reached
    pub fn urls_for(&self, event: TrackingEvent) -> &[String] {
        self.tracking.urls(event)
    }
}

/// Tracking URLs for each playback milestone, in document order
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUrls {
    pub impression_urls: Vec<String>,
    pub start_urls: Vec<String>,
    pub first_quartile_urls: Vec<String>,
    pub midpoint_urls: Vec<String>,
    pub third_quartile_urls: Vec<String>,
    pub complete_urls: Vec<String>,
    pub skip_urls: Vec<String>,
}

impl TrackingUrls {
    pub fn urls(&self, event: TrackingEvent) -> &[String] {
        match event {
            TrackingEvent::Impression => &self.impression_urls,
            TrackingEvent::Start => &self.start_urls,
            TrackingEvent::FirstQuartile => &self.first_quartile_urls,
            TrackingEvent::Midpoint => &self.midpoint_urls,
            TrackingEvent::ThirdQuartile => &self.third_quartile_urls,
            TrackingEvent::Complete => &self.complete_urls,
            TrackingEvent::Skip => &self.skip_urls,
        }
    }

    fn urls_mut(&mut self, event: TrackingEvent) -> &mut Vec<String> {
        match event {
            TrackingEvent::Impression => &mut self.impression_urls,
            TrackingEvent::Start => &mut self.start_urls,
            TrackingEvent::FirstQuartile => &mut self.first_quartile_urls,
            TrackingEvent::Midpoint => &mut self.midpoint_urls,
            TrackingEvent::ThirdQuartile => &mut self.third_quartile_urls,
            TrackingEvent::Complete => &mut self.complete_urls,
            TrackingEvent::Skip => &mut self.skip_urls,
        }
    }

    pub fn push(&mut self, event: TrackingEvent, url: String) {
        self.urls_mut(event).push(url);
    }

    /// Append every URL of `other` after the ones already held
    pub fn extend(&mut self, other: &TrackingUrls) {
        for event in TrackingEvent::ALL {
            self.urls_mut(event).extend_from_slice(other.urls(event));
        }
    }

    pub fn is_empty(&self) -> bool {
        TrackingEvent::ALL.iter().all(|event| self.urls(*event).is_empty())
    }
}

/// Playback milestones that carry tracking URLs
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TrackingEvent {
    Impression,
    Start,
    FirstQuartile,
    Midpoint,
    ThirdQuartile,
    Complete,
    Skip,
}

impl TrackingEvent {
    pub const ALL: [TrackingEvent; 7] = [
        TrackingEvent::Impression,
        TrackingEvent::Start,
        TrackingEvent::FirstQuartile,
        TrackingEvent::Midpoint,
        TrackingEvent::ThirdQuartile,
        TrackingEvent::Complete,
        TrackingEvent::Skip,
    ];

    /// Map a `Tracking` element's `event` attribute, ignoring case.
    /// `creativeView` counts as `Start`; unknown names yield `None`.
    pub fn from_attribute(name: &str) -> Option<Self> {
        let event = match name.trim().to_ascii_lowercase().as_str() {
            "impression" => TrackingEvent::Impression,
            "start" | "creativeview" => TrackingEvent::Start,
            "firstquartile" => TrackingEvent::FirstQuartile,
            "midpoint" => TrackingEvent::Midpoint,
            "thirdquartile" => TrackingEvent::ThirdQuartile,
            "complete" => TrackingEvent::Complete,
            "skip" => TrackingEvent::Skip,
            _ => return None,
        };
        Some(event)
    }
}

/// A Wrapper ad that points at another VAST document
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WrapperIndirection {
    /// The URL of the next VAST document
    pub vast_ad_tag_uri: String,
}

/// Kind of creative requested from the ad server
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub enum AdType {
    #[default]
    Image,
    Video,
    Native,
}

impl AdType {
    /// Content-type code sent as the `c` query parameter
    pub fn content_code(self) -> &'static str {
        match self {
            AdType::Image => "b",
            AdType::Video => "v",
            AdType::Native => "n",
        }
    }
}

impl FromStr for AdType {
    type Err = std::convert::Infallible;

    /// Unrecognized names fall back to `Image`, which the ad server treats as a banner.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "video" | "v" => AdType::Video,
            "native" | "n" => AdType::Native,
            _ => AdType::Image,
        })
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdType::Image => "Image",
            AdType::Video => "Video",
            AdType::Native => "Native",
        };
        f.write_str(name)
    }
}

/// Where the host app intends to place the ad
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub enum AdPosition {
    #[default]
    Header,
    Center,
    Footer,
}

/// Device and privacy attributes sent with every ad request
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
#[serde(default)]
pub struct DeviceInfo {
    /// Application bundle identifier
    pub bundle_id: String,

    /// Human-readable application name
    pub app_name: String,

    /// Store listing URL of the application
    pub app_store_url: String,

    /// Device language (e.g., "en")
    pub language: String,

    /// Screen width in pixels
    pub screen_width: u32,

    /// Screen height in pixels
    pub screen_height: u32,

    /// User agent string of the embedded browser
    pub user_agent: String,

    /// Advertising identifier (IDFA / GAID)
    pub advertising_id: String,

    /// Do-not-track flag
    pub do_not_track: bool,

    /// Whether GDPR applies to this user
    pub gdpr: bool,

    /// IAB TCF consent string
    pub gdpr_consent: String,

    /// IAB US privacy string (e.g., "1YNN")
    pub us_privacy: String,

    /// Whether CCPA applies to this user
    pub ccpa: bool,

    /// Whether the app is child-directed
    pub coppa: bool,
}

/// Inputs to the ad-request URL builder
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct AdRequestParams {
    /// Ad server endpoint
    pub base_url: String,

    /// Placement identifier assigned by the ad server
    pub placement_id: String,

    pub ad_type: AdType,

    pub position: AdPosition,

    /// Request timeout the caller applies to the fetch
    pub timeout_ms: u64,

    pub debug: bool,

    /// Optional call-to-action label shown by the host app
    pub cta_text: Option<String>,

    /// Device and privacy snapshot
    pub device: DeviceInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names_are_camel_case() {
        let indirection = WrapperIndirection {
            vast_ad_tag_uri: "https://next.example.com".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&indirection).unwrap(),
            r#"{"vastAdTagUri":"https://next.example.com"}"#
        );

        let data = serde_json::to_value(VastData::default()).unwrap();
        assert!(data.get("videoUrl").is_some());
        assert!(data.get("impressionUrls").is_some());
        assert!(data.get("video_url").is_none());
    }
}
