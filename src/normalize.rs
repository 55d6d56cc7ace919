use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Escape sequences left behind when VAST XML was JSON-encoded twice.
/// Resolved before `SINGLE_ESCAPES`, otherwise a backslash survives.
const DOUBLE_ESCAPES: &[(&str, &str)] = &[
    (r#"\\\""#, "\""),
    (r#"\\""#, "\""),
    (r"\\n", "\n"),
    (r"\\r", "\r"),
    (r"\\t", "\t"),
    (r"\\/", "/"),
];

const SINGLE_ESCAPES: &[(&str, &str)] = &[
    (r#"\""#, "\""),
    (r"\n", "\n"),
    (r"\r", "\r"),
    (r"\t", "\t"),
    (r"\/", "/"),
];

fn escape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\\(u[0-9a-fA-F]{4}|["\\/bfnrt])?"#).expect("escape pattern is valid")
    })
}

/// Repair a raw ad-server response so that it can be handed to an XML reader.
///
/// Steps, in order:
/// 1. strip a leading byte-order mark and surrounding whitespace
/// 2. undo double then single backslash escaping
/// 3. drop backslashes that do not start a recognized escape sequence
/// 4. drop a leading `<?xml ... ?>` declaration
/// 5. cut everything before the first `<VAST` and after the last `</VAST>`
///
/// The result is best-effort and may still be malformed. Empty input is
/// returned unchanged.
pub fn clean_vast_xml(raw: &str) -> String {
    if raw.trim().is_empty() {
        return raw.to_string();
    }

    let mut text = raw.trim_start_matches('\u{feff}').trim().to_string();

    for (from, to) in DOUBLE_ESCAPES.iter().chain(SINGLE_ESCAPES) {
        if text.contains(from) {
            text = text.replace(from, to);
        }
    }

    text = strip_stray_backslashes(&text);
    text = strip_xml_declaration(&text).to_string();
    cut_to_vast_root(&text).trim().to_string()
}

fn strip_stray_backslashes(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }
    escape_regex()
        .replace_all(text, |caps: &Captures| {
            if caps.get(1).is_some() {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

fn strip_xml_declaration(text: &str) -> &str {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}

/// Keep only the span from the first `<VAST` to the end of the last `</VAST>`,
/// matching case-insensitively and allowing a namespace prefix on the close tag.
fn cut_to_vast_root(text: &str) -> &str {
    // ASCII lowercasing keeps byte offsets identical to `text`
    let lower = text.to_ascii_lowercase();

    let start = lower.find("<vast").unwrap_or(0);
    let end = lower[start..]
        .rfind("</vast")
        .map(|pos| start + pos)
        .and_then(|pos| lower[pos..].find('>').map(|close| pos + close + 1))
        .unwrap_or(text.len());

    &text[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_returned_unchanged() {
        assert_eq!(clean_vast_xml(""), "");
        assert_eq!(clean_vast_xml("   "), "   ");
    }

    #[test]
    fn test_strips_bom_declaration_and_trailing_garbage() {
        let raw = "\u{feff}  <?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<VAST version=\"3.0\"></VAST>\n<!-- trailing -->junk";
        assert_eq!(clean_vast_xml(raw), "<VAST version=\"3.0\"></VAST>");
    }

    #[test]
    fn test_discards_bytes_before_root() {
        let raw = "{\"adm\":\"<vast version=\"2.0\"><Ad/></vast>\"}";
        assert_eq!(clean_vast_xml(raw), "<vast version=\"2.0\"><Ad/></vast>");
    }

    #[test]
    fn test_resolves_single_escaping() {
        let raw = r#"\"<VAST version=\"3.0\">\n<Ad id=\"1\"/>\n</VAST>\""#;
        assert_eq!(
            clean_vast_xml(raw),
            "<VAST version=\"3.0\">\n<Ad id=\"1\"/>\n</VAST>"
        );
    }

    #[test]
    fn test_resolves_double_escaping_before_single() {
        let raw = r#"\"<VAST version=\\\"3.0\\\"><Ad id=\\"7\\"/></VAST>\""#;
        assert_eq!(
            clean_vast_xml(raw),
            "<VAST version=\"3.0\"><Ad id=\"7\"/></VAST>"
        );
    }

    #[test]
    fn test_drops_unrecognized_backslashes_only() {
        let raw = r"<VAST>\qé\b</VAST>";
        assert_eq!(clean_vast_xml(raw), r"<VAST>qé\b</VAST>");
    }

    #[test]
    fn test_unescapes_slashes_in_urls() {
        let raw = r"<VAST><MediaFile>https:\/\/cdn.example.com\/ad.mp4</MediaFile></VAST>";
        assert_eq!(
            clean_vast_xml(raw),
            "<VAST><MediaFile>https://cdn.example.com/ad.mp4</MediaFile></VAST>"
        );
    }

    #[test]
    fn test_namespaced_close_tag() {
        let raw = "<vast:VAST xmlns:vast=\"urn\"></vast:VAST>tail";
        assert_eq!(
            clean_vast_xml(raw),
            "<vast:VAST xmlns:vast=\"urn\"></vast:VAST>"
        );
    }
}
