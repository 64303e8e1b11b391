use encoding_rs::Encoding;
use encoding_rs::UTF_8;

const CHARSET_SNIFF_BYTES: usize = 8192;

/// Decodes a saved page. A `<meta charset>` in the first bytes wins; a byte
/// order mark overrides both; anything else is read as UTF-8.
pub(crate) fn decode_page(body: &[u8]) -> String {
    let encoding = parse_charset_from_html_prefix(body)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

fn parse_charset_from_html_prefix(body: &[u8]) -> Option<String> {
    let prefix_len = body.len().min(CHARSET_SNIFF_BYTES);
    let prefix = String::from_utf8_lossy(&body[..prefix_len]);
    let lower = prefix.to_ascii_lowercase();
    let mut search_start = 0_usize;

    while let Some(relative) = lower[search_start..].find("charset=") {
        let charset_start = search_start + relative + "charset=".len();
        if let Some(label) = parse_charset_label(&prefix[charset_start..]) {
            return Some(label);
        }
        search_start = charset_start;
    }

    None
}

fn parse_charset_label(input: &str) -> Option<String> {
    let trimmed = input.trim_start();
    let first = trimmed.chars().next()?;

    let label = if first == '"' || first == '\'' {
        let rest = &trimmed[first.len_utf8()..];
        &rest[..rest.find(first)?]
    } else {
        let end = trimmed
            .find(|ch: char| ch.is_whitespace() || matches!(ch, '"' | '\'' | ';' | '>' | '/'))
            .unwrap_or(trimmed.len());
        &trimmed[..end]
    };

    let label = label.trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_owned())
    }
}
