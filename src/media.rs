//! Ranked media file lookup.
//!
//! Ad servers put the playable asset in many places, so the lookup is an
//! ordered chain of independent tiers. The first tier that yields a URL wins.

use crate::document::{Element, VastDocument};
use log::debug;
use regex::Regex;
use std::sync::OnceLock;

/// Extensions recognized when scanning free text for a video URL
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".m3u8"];

/// What a tier looks at: the loaded document and the active ad node
pub struct MediaContext<'a> {
    pub document: &'a VastDocument,
    pub ad: &'a Element,
}

/// The media URL a tier settled on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPick {
    pub url: String,

    /// Raw `duration` attribute of the chosen `MediaFile`, if any
    pub duration: Option<String>,
}

type Tier = fn(&MediaContext<'_>) -> Option<MediaPick>;

const TIERS: &[(&str, Tier)] = &[
    ("MediaFile under ad node", media_in_ad_node),
    ("MediaFile anywhere", media_in_document),
    ("MediaFile under Linear", media_under_linear),
    ("MediaFile under MediaFiles", media_under_media_files),
    ("MediaFile under Creative/Linear", media_under_creative_linear),
    ("MediaFile with http(s) URL", media_with_http_url),
    ("element text", video_url_in_element_text),
    ("CDATA blocks", video_url_in_cdata),
    ("raw text", video_url_in_raw_text),
    ("raw text incl. flv", video_url_in_raw_text_extended),
];

/// Run the tiers in order and return the first hit
pub fn select_media(ctx: &MediaContext<'_>) -> Option<MediaPick> {
    for (name, tier) in TIERS {
        match tier(ctx) {
            Some(pick) => {
                debug!("Media tier '{}' selected {}", name, pick.url);
                return Some(pick);
            }
            None => debug!("Media tier '{}' found nothing", name),
        }
    }
    debug!("No media URL found in any tier");
    None
}

struct Candidate<'a> {
    url: String,
    element: Option<&'a Element>,
}

impl Candidate<'_> {
    fn mime_type(&self) -> String {
        self.element
            .and_then(|e| e.attr("type"))
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    fn is_format(&self, extension: &str, mime: &str) -> bool {
        url_path(&self.url).to_ascii_lowercase().ends_with(extension) || self.mime_type().contains(mime)
    }

    fn into_pick(self) -> MediaPick {
        MediaPick {
            duration: self.element.and_then(|e| e.attr("duration")).map(str::to_string),
            url: self.url,
        }
    }
}

/// Prefer mp4, then webm, then whatever came first
fn choose(candidates: Vec<Candidate<'_>>) -> Option<MediaPick> {
    let mut candidates: Vec<_> = candidates.into_iter().filter(|c| !c.url.is_empty()).collect();
    if candidates.is_empty() {
        return None;
    }
    let index = candidates
        .iter()
        .position(|c| c.is_format(".mp4", "mp4"))
        .or_else(|| candidates.iter().position(|c| c.is_format(".webm", "webm")))
        .unwrap_or(0);
    Some(candidates.swap_remove(index).into_pick())
}

fn from_media_files<'a>(elements: Vec<&'a Element>) -> Vec<Candidate<'a>> {
    elements
        .into_iter()
        .map(|element| Candidate {
            url: media_file_url(element),
            element: Some(element),
        })
        .collect()
}

/// URL of a `MediaFile`: its text, then a `url` attribute, then the raw inner XML
pub fn media_file_url(element: &Element) -> String {
    let text = unwrap_cdata(&element.text());
    if !text.is_empty() {
        return text;
    }
    if let Some(url) = element.attr("url").map(str::trim).filter(|url| !url.is_empty()) {
        return url.to_string();
    }
    unwrap_cdata(&element.inner_xml())
}

/// Remove literal CDATA markers and surrounding whitespace
pub fn unwrap_cdata(text: &str) -> String {
    text.replace("<![CDATA[", "").replace("]]>", "").trim().to_string()
}

fn url_path(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

fn has_video_extension(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub(crate) fn media_in_ad_node(ctx: &MediaContext<'_>) -> Option<MediaPick> {
    choose(from_media_files(ctx.ad.descendants("MediaFile")))
}

pub(crate) fn media_in_document(ctx: &MediaContext<'_>) -> Option<MediaPick> {
    choose(from_media_files(ctx.document.root.descendants("MediaFile")))
}

pub(crate) fn media_under_linear(ctx: &MediaContext<'_>) -> Option<MediaPick> {
    let elements = ctx
        .document
        .root
        .select(|e, ancestors| e.is("MediaFile") && ancestors.iter().any(|a| a.is("Linear")));
    choose(from_media_files(elements))
}

pub(crate) fn media_under_media_files(ctx: &MediaContext<'_>) -> Option<MediaPick> {
    let elements = ctx.document.root.select(|e, ancestors| {
        e.is("MediaFile") && ancestors.last().is_some_and(|parent| parent.is("MediaFiles"))
    });
    choose(from_media_files(elements))
}

pub(crate) fn media_under_creative_linear(ctx: &MediaContext<'_>) -> Option<MediaPick> {
    let elements = ctx.document.root.select(|e, ancestors| {
        e.is("MediaFile")
            && ancestors
                .windows(2)
                .any(|pair| pair[0].is("Creative") && pair[1].is("Linear"))
    });
    choose(from_media_files(elements))
}

pub(crate) fn media_with_http_url(ctx: &MediaContext<'_>) -> Option<MediaPick> {
    let candidates = from_media_files(ctx.document.root.descendants("MediaFile"))
        .into_iter()
        .filter(|c| is_http_url(&c.url))
        .collect();
    choose(candidates)
}

pub(crate) fn video_url_in_element_text(ctx: &MediaContext<'_>) -> Option<MediaPick> {
    let candidates = ctx
        .document
        .root
        .walk()
        .into_iter()
        .filter_map(|(element, _)| {
            let text = unwrap_cdata(&element.own_text());
            let looks_like_url = !text.is_empty()
                && !text.contains(char::is_whitespace)
                && has_video_extension(&text);
            looks_like_url.then_some(Candidate {
                url: text,
                element: Some(element),
            })
        })
        .collect();
    choose(candidates)
}

fn cdata_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<!\[CDATA\[\s*(https?://[^\s\]]+\.(?:mp4|webm|mov|m3u8)(?:[?#][^\s\]]*)?)\s*\]\]>")
            .expect("CDATA pattern is valid")
    })
}

fn raw_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(https?://[^\s"'<>\[\]]+\.(?:mp4|webm|mov|avi|m3u8)(?:[?#][^\s"'<>\[\]]*)?)(?:[\s"'<>\[\]]|$)"#)
            .expect("raw URL pattern is valid")
    })
}

fn raw_url_regex_extended() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(https?://[^\s"'<>\[\]]+\.(?:mp4|webm|mov|avi|m3u8|flv)(?:[?#][^\s"'<>\[\]]*)?)(?:[\s"'<>\[\]]|$)"#)
            .expect("extended raw URL pattern is valid")
    })
}

fn first_group<'t>(caps: regex::Captures<'t>) -> Option<&'t str> {
    caps.get(1).map(|m| m.as_str())
}

fn from_matches<'a>(urls: impl Iterator<Item = &'a str>) -> Option<MediaPick> {
    let candidates = urls
        .map(|url| Candidate {
            url: url.trim().replace("&amp;", "&"),
            element: None,
        })
        .collect();
    choose(candidates)
}

pub(crate) fn video_url_in_cdata(ctx: &MediaContext<'_>) -> Option<MediaPick> {
    from_matches(
        cdata_regex()
            .captures_iter(&ctx.document.source)
            .filter_map(first_group),
    )
}

pub(crate) fn video_url_in_raw_text(ctx: &MediaContext<'_>) -> Option<MediaPick> {
    from_matches(
        raw_url_regex()
            .captures_iter(&ctx.document.source)
            .filter_map(first_group),
    )
}

pub(crate) fn video_url_in_raw_text_extended(ctx: &MediaContext<'_>) -> Option<MediaPick> {
    from_matches(
        raw_url_regex_extended()
            .captures_iter(&ctx.document.source)
            .filter_map(first_group),
    )
}
