use chardetng::EncodingDetector;
use encoding_rs::Encoding;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHtml {
    pub html: String,
    pub encoding_label: String,
    /// Malformed sequences were replaced with U+FFFD.
    pub lossy: bool,
}

/// Decodes a response body to UTF-8: BOM first, then the Content-Type charset,
/// then chardetng's guess. Never fails; malformed input decodes lossily.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> DecodedHtml {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(enc) = content_type
        .and_then(extract_charset)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, enc);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    decode_with(bytes, detector.guess(None, true))
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim_matches(&[' ', '"', '\''][..]).to_string())
    })
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> DecodedHtml {
    let (text, actual, lossy) = enc.decode(bytes);
    DecodedHtml {
        html: text.into_owned(),
        encoding_label: actual.name().to_string(),
        lossy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_charset_wins_over_detection() {
        let bytes = b"<p>Tr\xe8s bon produit</p>";
        let decoded = decode_html(bytes, Some("text/html; Charset=\"windows-1252\""));
        assert_eq!(decoded.html, "<p>Très bon produit</p>");
        assert_eq!(decoded.encoding_label, "windows-1252");
        assert!(!decoded.lossy);
    }

    #[test]
    fn bom_overrides_header() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("<p>★★★★☆</p>".as_bytes());
        let decoded = decode_html(&bytes, Some("text/html; charset=iso-8859-1"));
        assert_eq!(decoded.html, "<p>★★★★☆</p>");
        assert_eq!(decoded.encoding_label, "UTF-8");
    }

    #[test]
    fn malformed_utf8_is_decoded_lossily() {
        let decoded = decode_html(b"<p>ok \xff</p>", Some("text/html; charset=utf-8"));
        assert!(decoded.lossy);
        assert!(decoded.html.contains('\u{fffd}'));
    }
}
