// Course link decoding. Classroom share links look like
// `https://classroom.google.com/c/NjI4NTY3ODkwMTIz` where the last segment
// is the numeric course id encoded as base64.

use crate::error::{Error, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use regex::Regex;
use std::sync::OnceLock;

fn course_segment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/c/([A-Za-z0-9_-]+)").expect("course segment pattern"))
}

/// Standard alphabet; share links drop the `=` padding so either form is accepted.
fn engine() -> GeneralPurpose {
    GeneralPurpose::new(
        &alphabet::STANDARD,
        GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
    )
}

/// Extract and decode the course id from a Google Classroom link.
pub fn extract_course_id(link: &str) -> Result<String> {
    let encoded = course_segment()
        .captures(link)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| Error::InvalidLink(link.trim().to_string()))?;

    let bytes = engine()
        .decode(encoded)
        .map_err(|e| Error::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::Decode(e.to_string()))
}
