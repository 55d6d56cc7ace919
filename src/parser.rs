use crate::document::{Element, VastDocument};
use crate::error::{Result, VastError};
use crate::media::{self, MediaContext, unwrap_cdata};
use crate::models::*;
use log::{debug, warn};
use regex::Regex;
use std::sync::OnceLock;

/// Maximum number of wrapper redirects a caller may follow
pub const MAX_WRAPPER_DEPTH: usize = 5;

/// Parse an InLine VAST document into a `VastData`.
///
/// `depth` is the number of wrapper redirects the caller followed to reach
/// this document. Fails when the depth exceeds `MAX_WRAPPER_DEPTH`, when the
/// document is empty or cannot be loaded even leniently, when no ad node
/// exists, or when the only ad node is an unresolved `Wrapper`.
///
/// A returned `VastData` may still lack a video URL; check
/// [`VastData::is_playable`] before playback.
pub fn parse_vast(xml: &str, depth: usize) -> Result<VastData> {
    parse_vast_with_limit(xml, depth, MAX_WRAPPER_DEPTH)
}

/// [`parse_vast`] with a caller-chosen redirect cap
pub fn parse_vast_with_limit(xml: &str, depth: usize, max_depth: usize) -> Result<VastData> {
    if depth > max_depth {
        warn!("Refusing to parse VAST at wrapper depth {}", depth);
        return Err(VastError::DepthExceeded {
            depth,
            max: max_depth,
        });
    }
    if xml.trim().is_empty() {
        return Err(VastError::EmptyDocument);
    }

    let document = VastDocument::load(xml).inspect_err(|e| warn!("Failed to load VAST XML: {}", e))?;

    let ad = match find_ad_node(&document.root) {
        Some(AdNode::InLine(ad)) => ad,
        Some(AdNode::Wrapper(_)) => {
            warn!("VAST document is a Wrapper without InLine; resolve VASTAdTagURI first");
            return Err(VastError::WrapperWithoutInLine);
        }
        None => {
            warn!("No InLine or Wrapper node in VAST document");
            return Err(VastError::NoAdNode);
        }
    };

    let pick = media::select_media(&MediaContext {
        document: &document,
        ad,
    });

    let duration = pick
        .as_ref()
        .and_then(|p| p.duration.as_deref())
        .and_then(parse_time)
        .or_else(|| ad.first("Duration").and_then(|d| parse_time(&d.text())))
        .unwrap_or(0);

    let data = VastData {
        video_url: pick.map(|p| p.url),
        click_through_url: ad
            .first("ClickThrough")
            .map(element_text)
            .filter(|url| !url.is_empty()),
        click_tracking_urls: click_tracking_urls(ad),
        tracking: tracking_urls(ad),
        skip_offset: skip_offset(ad, duration),
        duration,
    };

    debug!(
        "Parsed VAST: video={:?} duration={}s skip_offset={}",
        data.video_url, data.duration, data.skip_offset
    );
    Ok(data)
}

/// Cheap check for a `Wrapper` ad, done on the raw text without parsing
pub fn is_wrapper(xml: &str) -> bool {
    xml.contains("<Wrapper")
}

/// The `VASTAdTagURI` of a Wrapper document, CDATA-unwrapped and trimmed
pub fn extract_wrapper_uri(xml: &str) -> Option<String> {
    let uri = match VastDocument::load(xml) {
        Ok(document) => document.root.first("VASTAdTagURI").map(element_text),
        Err(e) => {
            debug!("Wrapper XML did not load ({}), scanning raw text for VASTAdTagURI", e);
            ad_tag_uri_regex()
                .captures(xml)
                .and_then(|caps| caps.get(1))
                .map(|m| unwrap_cdata(m.as_str()))
        }
    };
    uri.filter(|uri| !uri.is_empty())
}

/// Wrapper indirection carried by `xml`, if it is a Wrapper with no InLine.
///
/// Decided on the loaded tree, so prefixed `vast:Wrapper` ads count. Text that
/// does not load falls back to [`is_wrapper`] and the raw `VASTAdTagURI` scan.
pub fn wrapper_indirection(xml: &str) -> Option<WrapperIndirection> {
    let uri = match VastDocument::load(xml) {
        Ok(document) => match find_ad_node(&document.root)? {
            AdNode::Wrapper(_) => document.root.first("VASTAdTagURI").map(element_text),
            AdNode::InLine(_) => None,
        },
        Err(_) if is_wrapper(xml) => extract_wrapper_uri(xml),
        Err(_) => None,
    };
    uri.filter(|uri| !uri.is_empty())
        .map(|vast_ad_tag_uri| WrapperIndirection { vast_ad_tag_uri })
}

fn ad_tag_uri_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:[\w-]+:)?VASTAdTagURI[^>]*>(.*?)</(?:[\w-]+:)?VASTAdTagURI\s*>")
            .expect("VASTAdTagURI pattern is valid")
    })
}

pub(crate) enum AdNode<'a> {
    InLine(&'a Element),
    Wrapper(&'a Element),
}

/// Locate the active ad node, preferring `InLine` over `Wrapper`
pub(crate) fn find_ad_node(root: &Element) -> Option<AdNode<'_>> {
    root.first("InLine")
        .map(AdNode::InLine)
        .or_else(|| root.first("Wrapper").map(AdNode::Wrapper))
}

fn element_text(element: &Element) -> String {
    unwrap_cdata(&element.text())
}

/// Non-empty `ClickTracking` URLs in document order
pub(crate) fn click_tracking_urls(ad: &Element) -> Vec<String> {
    ad.descendants("ClickTracking")
        .into_iter()
        .map(element_text)
        .filter(|url| !url.is_empty())
        .collect()
}

/// Impression and `Tracking` URLs grouped by event, in document order.
/// Unknown event names are skipped.
pub(crate) fn tracking_urls(ad: &Element) -> TrackingUrls {
    let mut tracking = TrackingUrls::default();
    for (element, _) in ad.walk() {
        let event = if element.is("Impression") {
            Some(TrackingEvent::Impression)
        } else if element.is("Tracking") {
            element.attr("event").and_then(TrackingEvent::from_attribute)
        } else {
            None
        };

        if let Some(event) = event {
            let url = element_text(element);
            if !url.is_empty() {
                tracking.push(event, url);
            }
        }
    }
    tracking
}

/// Skip offset from a `Skipoffset` element, else the `skipoffset` attribute of `Linear`
fn skip_offset(ad: &Element, duration: u32) -> i32 {
    let from_element = ad
        .select(|e, _| e.name.eq_ignore_ascii_case("skipoffset"))
        .first()
        .map(|e| e.text());
    let raw = from_element.or_else(|| {
        ad.descendants("Linear")
            .into_iter()
            .find_map(|linear| linear.attr("skipoffset").map(str::to_string))
    });

    match raw {
        Some(raw) => parse_skip_offset(&raw, duration),
        None => NOT_SKIPPABLE,
    }
}

/// Parse `HH:MM:SS`, `MM:SS` or plain seconds. Fractional seconds are truncated.
pub fn parse_time(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    let (seconds, units) = parts.split_last()?;
    let seconds: f64 = seconds.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let mut total = seconds.trunc() as u64;
    for (unit, multiplier) in units.iter().rev().zip([60u64, 3600]) {
        let unit: u64 = unit.trim().parse().ok()?;
        total = total.checked_add(unit.checked_mul(multiplier)?)?;
    }
    u32::try_from(total).ok()
}

/// Parse a skip offset: a time value, seconds with an `s` suffix, or a
/// percentage of `duration`. Unparseable values yield `NOT_SKIPPABLE`.
pub fn parse_skip_offset(value: &str, duration: u32) -> i32 {
    let value = value.trim();

    if let Some(percent) = value.strip_suffix('%') {
        return match percent.trim().parse::<f64>() {
            Ok(p) if duration > 0 && (0.0..=100.0).contains(&p) => {
                (f64::from(duration) * p / 100.0) as i32
            }
            _ => NOT_SKIPPABLE,
        };
    }

    let value = value
        .strip_suffix('s')
        .or_else(|| value.strip_suffix('S'))
        .unwrap_or(value);
    parse_time(value)
        .and_then(|secs| i32::try_from(secs).ok())
        .unwrap_or(NOT_SKIPPABLE)
}
