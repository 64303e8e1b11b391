//! Identifier escaping for generated selectors.

use std::fmt::Write as _;

/// Escapes a class name or id so it can be embedded in a selector.
///
/// Every char outside `[A-Za-z0-9_-]` becomes `\<hex> `. A digit in leading
/// position (also right after a leading `-`) is escaped the same way. The
/// separator after a final escape is dropped.
pub fn escape_ident(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let leading_hyphen = raw.starts_with('-');

    for (index, ch) in raw.chars().enumerate() {
        let leading_digit =
            ch.is_ascii_digit() && (index == 0 || (index == 1 && leading_hyphen));
        if is_plain_ident_char(ch) && !leading_digit {
            out.push(ch);
            continue;
        }
        let _ = write!(out, "\\{:x} ", u32::from(ch));
    }

    // Raw spaces are always escaped, so a trailing space is a separator.
    if out.ends_with(' ') {
        out.pop();
    }

    out
}

pub(crate) fn is_plain_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::escape_ident;

    #[test]
    fn leaves_safe_names_alone() {
        assert_eq!(escape_ident("card-title_2"), "card-title_2");
        assert_eq!(escape_ident("-x"), "-x");
    }

    #[test]
    fn escapes_unsafe_chars_with_separator() {
        assert_eq!(escape_ident("a b"), "a\\20 b");
        assert_eq!(escape_ident("md:flex"), "md\\3a flex");
        assert_eq!(escape_ident("w-1/2"), "w-1\\2f 2");
    }

    #[test]
    fn trims_trailing_separator() {
        assert_eq!(escape_ident("hover:"), "hover\\3a");
        assert_eq!(escape_ident("caf\u{e9}"), "caf\\e9");
    }

    #[test]
    fn escapes_leading_digits() {
        assert_eq!(escape_ident("1col"), "\\31 col");
        assert_eq!(escape_ident("-2x"), "-\\32 x");
        assert_eq!(escape_ident("x1"), "x1");
    }
}
