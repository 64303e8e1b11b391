//! HTML tokenization and tree building.
//!
//! This is a forgiving tag-soup builder, not an HTML5 tree constructor: end
//! tags close the nearest open element with the same name and stray end tags
//! are ignored. The result always has a single `<html>` document element so
//! that anchoring can treat the root and its child as shared ancestors.

use mg_dom::Document;
use mg_dom::NodeId;
use tracing::debug;

/// Parses raw HTML into a DOM document.
#[derive(Debug, Default)]
pub struct HtmlParser;

impl HtmlParser {
    pub fn parse(&self, input: &str) -> Document {
        let tokens = tokenize(input);
        let document = build_tree(tokens);
        debug!(
            nodes = document.node_count(),
            input_bytes = input.len(),
            "parsed html document"
        );
        document
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Text(String),
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if starts_with(bytes, i, b"<!--") {
            i = skip_comment(bytes, i);
            continue;
        }

        if bytes[i] == b'<' {
            if starts_with(bytes, i, b"</") {
                if let Some((tok, next)) = parse_end_tag(bytes, i) {
                    out.push(tok);
                    i = next;
                    continue;
                }
            } else if starts_with(bytes, i, b"<!") || starts_with(bytes, i, b"<?") {
                i = skip_to_gt(bytes, i.saturating_add(2));
                continue;
            } else if let Some((tok, next)) = parse_start_tag(bytes, i) {
                let raw_text_tag = match &tok {
                    Token::Start {
                        name, self_closing, ..
                    } if !*self_closing && is_raw_text_tag(name) => Some(name.clone()),
                    _ => None,
                };

                out.push(tok);
                i = next;

                if let Some(tag_name) = raw_text_tag {
                    let (raw_text, closing_end) = parse_raw_text_until_end_tag(bytes, i, &tag_name);
                    if !raw_text.is_empty() {
                        out.push(Token::Text(raw_text));
                    }
                    out.push(Token::End { name: tag_name });
                    i = closing_end.unwrap_or(bytes.len());
                }

                continue;
            }
        }

        let (txt, next) = parse_text(bytes, i);
        if !txt.is_empty() {
            out.push(Token::Text(txt));
        }
        i = next;
    }

    out
}

struct TreeBuilder {
    document: Document,
    stack: Vec<(NodeId, String)>,
    html: Option<NodeId>,
}

impl TreeBuilder {
    fn new(has_html: bool, has_body: bool) -> Self {
        let mut builder = Self {
            document: Document::new(),
            stack: Vec::new(),
            html: None,
        };

        if !has_html {
            builder.open("html", Vec::new());
            if !has_body {
                builder.open("body", Vec::new());
            }
        }

        builder
    }

    fn insertion_point(&self) -> NodeId {
        match self.stack.last() {
            Some((node, _)) => *node,
            None => self.html.unwrap_or(self.document.root()),
        }
    }

    fn open(&mut self, name: &str, attrs: Vec<(String, String)>) {
        let parent = self.insertion_point();
        let Ok(node) = self.document.append_element(parent, name, attrs) else {
            return;
        };
        if self.html.is_none() && parent == self.document.root() {
            self.html = Some(node);
        }
        self.stack.push((node, name.to_owned()));
    }

    fn void(&mut self, name: &str, attrs: Vec<(String, String)>) {
        let parent = self.insertion_point();
        let _ = self.document.append_element(parent, name, attrs);
    }

    fn close(&mut self, name: &str) {
        let Some(position) = self.stack.iter().rposition(|(_, open)| open == name) else {
            return;
        };
        // The synthesized document element stays open for trailing content.
        let keep = if position == 0 { 1 } else { position };
        self.stack.truncate(keep);
    }

    fn text(&mut self, raw: &str) {
        let parent = self.insertion_point();
        if parent == self.document.root() && raw.trim().is_empty() {
            return;
        }
        let _ = self.document.append_text(parent, &decode_entities(raw));
    }
}

fn build_tree(tokens: Vec<Token>) -> Document {
    let has_html = tokens
        .iter()
        .any(|token| matches!(token, Token::Start { name, .. } if name == "html"));
    let has_body = tokens
        .iter()
        .any(|token| matches!(token, Token::Start { name, .. } if name == "body"));
    let mut builder = TreeBuilder::new(has_html, has_body);

    for token in tokens {
        match token {
            Token::Text(text) => builder.text(&text),
            Token::Start {
                name,
                attrs,
                self_closing,
            } => {
                if name == "html" && builder.html.is_some() {
                    continue;
                }
                if self_closing || is_void(&name) {
                    builder.void(&name, attrs);
                } else {
                    builder.open(&name, attrs);
                }
            }
            Token::End { name } => builder.close(&name),
        }
    }

    builder.document
}

fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0_usize;

    while let Some(rel_amp) = input[cursor..].find('&') {
        let amp = cursor + rel_amp;
        out.push_str(&input[cursor..amp]);

        let rest = &input[(amp + 1)..];
        let Some(rel_semi) = rest.find(';') else {
            out.push('&');
            cursor = amp + 1;
            continue;
        };

        let semi = amp + 1 + rel_semi;
        let entity = &input[(amp + 1)..semi];
        if let Some(decoded) = decode_entity(entity) {
            out.push(decoded);
            cursor = semi + 1;
        } else {
            out.push('&');
            cursor = amp + 1;
        }
    }

    out.push_str(&input[cursor..]);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "nbsp" => Some('\u{a0}'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                char::from_u32(u32::from_str_radix(hex, 16).ok()?)
            } else if let Some(dec) = entity.strip_prefix('#') {
                char::from_u32(dec.parse::<u32>().ok()?)
            } else {
                None
            }
        }
    }
}

fn starts_with(bytes: &[u8], i: usize, pat: &[u8]) -> bool {
    let end = i.saturating_add(pat.len());
    end <= bytes.len() && &bytes[i..end] == pat
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start.saturating_add(4);
    while i + 2 < bytes.len() {
        if bytes[i] == b'-' && bytes[i + 1] == b'-' && bytes[i + 2] == b'>' {
            return i + 3;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_to_gt(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() {
        if bytes[i] == b'>' {
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn parse_text(bytes: &[u8], start: usize) -> (String, usize) {
    // A `<` that did not open a tag is literal text.
    let mut i = start.saturating_add(1);
    while i < bytes.len() && bytes[i] != b'<' {
        i += 1;
    }
    let end = i.min(bytes.len());
    (String::from_utf8_lossy(&bytes[start..end]).into_owned(), end)
}

fn parse_raw_text_until_end_tag(
    bytes: &[u8],
    start: usize,
    tag_name: &str,
) -> (String, Option<usize>) {
    let tag_bytes = tag_name.as_bytes();
    let mut i = start;

    while i < bytes.len() {
        if bytes[i] != b'<' || i + 2 + tag_bytes.len() > bytes.len() || bytes[i + 1] != b'/' {
            i = i.saturating_add(1);
            continue;
        }

        let name_start = i + 2;
        let name_end = name_start + tag_bytes.len();
        if !bytes[name_start..name_end].eq_ignore_ascii_case(tag_bytes) {
            i = i.saturating_add(1);
            continue;
        }

        let mut close = name_end;
        while close < bytes.len() && bytes[close].is_ascii_whitespace() {
            close = close.saturating_add(1);
        }

        if close < bytes.len() && bytes[close] == b'>' {
            let text = String::from_utf8_lossy(&bytes[start..i]).into_owned();
            return (text, Some(close + 1));
        }

        i = i.saturating_add(1);
    }

    (String::from_utf8_lossy(&bytes[start..]).into_owned(), None)
}

fn parse_end_tag(bytes: &[u8], start: usize) -> Option<(Token, usize)> {
    let mut i = start + 2;
    skip_spaces(bytes, &mut i);
    let begin = i;
    while i < bytes.len() && is_name_char(bytes[i]) {
        i += 1;
    }
    if i == begin {
        return None;
    }

    let name = String::from_utf8_lossy(&bytes[begin..i]).to_ascii_lowercase();
    while i < bytes.len() && bytes[i] != b'>' {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }

    Some((Token::End { name }, i + 1))
}

fn parse_start_tag(bytes: &[u8], start: usize) -> Option<(Token, usize)> {
    let mut i = start + 1;
    let begin = i;
    while i < bytes.len() && is_name_char(bytes[i]) {
        i += 1;
    }
    if i == begin || !bytes[begin].is_ascii_alphabetic() {
        return None;
    }

    let name = String::from_utf8_lossy(&bytes[begin..i]).to_ascii_lowercase();
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;

    loop {
        skip_spaces(bytes, &mut i);
        if i >= bytes.len() {
            return None;
        }

        if bytes[i] == b'>' {
            i += 1;
            break;
        }

        if bytes[i] == b'/' {
            self_closing = true;
            i += 1;
            continue;
        }

        let a_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }
        if i == a_start {
            i += 1;
            continue;
        }

        let a_name = String::from_utf8_lossy(&bytes[a_start..i]).to_ascii_lowercase();
        skip_spaces(bytes, &mut i);

        let mut val = String::new();
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            skip_spaces(bytes, &mut i);
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let q = bytes[i];
                i += 1;
                let v_start = i;
                while i < bytes.len() && bytes[i] != q {
                    i += 1;
                }
                val = String::from_utf8_lossy(&bytes[v_start..i]).into_owned();
                if i < bytes.len() {
                    i += 1;
                }
            } else {
                let v_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                val = String::from_utf8_lossy(&bytes[v_start..i]).into_owned();
            }
        }

        // First occurrence of an attribute wins, as in browsers.
        if !attrs.iter().any(|(existing, _)| *existing == a_name) {
            attrs.push((a_name, decode_entities(&val)));
        }
    }

    Some((
        Token::Start {
            name,
            attrs,
            self_closing,
        },
        i,
    ))
}

fn skip_spaces(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':')
}

fn is_attr_name_char(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/' | b'"' | b'\'')
}

fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "textarea" | "title")
}

fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

#[cfg(test)]
mod tests {
    use super::HtmlParser;

    #[test]
    fn wraps_fragments_in_html_and_body() {
        let doc = HtmlParser.parse("<div id=\"x\"><p class=\"a b\">Hello <b>world</b>!</p></div>");
        let html = doc.document_element().unwrap_or_else(|| unreachable!());
        assert_eq!(doc.node_name(html), "html");
        assert_eq!(doc.children(doc.root()).len(), 1);

        let body = doc.element_children(html);
        assert_eq!(body.len(), 1);
        assert_eq!(doc.node_name(body[0]), "body");
        assert_eq!(doc.text_content(html), "Hello world!");
    }

    #[test]
    fn keeps_existing_document_structure() {
        let doc = HtmlParser.parse(
            "<!DOCTYPE html>\n<html><head><title> T </title></head><body><p>x</p></body></html>\n",
        );
        let html = doc.document_element().unwrap_or_else(|| unreachable!());
        assert_eq!(doc.children(doc.root()).len(), 1);
        let names = doc
            .element_children(html)
            .into_iter()
            .map(|node| doc.node_name(node).to_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["head".to_owned(), "body".to_owned()]);
    }

    #[test]
    fn stray_end_tags_do_not_close_ancestors() {
        let doc = HtmlParser.parse("<div><span>a</i>b</span>c</div>");
        let div = doc
            .elements()
            .into_iter()
            .find(|node| doc.node_name(*node) == "div")
            .unwrap_or_else(|| unreachable!());
        assert_eq!(doc.children(div).len(), 2);
        assert_eq!(doc.text_content(div), "abc");
    }

    #[test]
    fn decodes_entities_and_preserves_class_duplicates() {
        let doc = HtmlParser.parse("<p class='x  y x'>a&amp;b&nbsp;c&#33;</p>");
        let p = doc
            .elements()
            .into_iter()
            .find(|node| doc.node_name(*node) == "p")
            .unwrap_or_else(|| unreachable!());
        assert_eq!(doc.text_content(p), "a&b\u{a0}c!");
        assert_eq!(
            doc.element(p).map(|element| element.classes().to_vec()),
            Some(vec!["x".to_owned(), "y".to_owned(), "x".to_owned()])
        );
        assert_eq!(doc.class_count("x"), 1);
    }

    #[test]
    fn raw_text_elements_keep_markup_as_text() {
        let doc = HtmlParser.parse("<body><script>if (a < b) { x(); }</script><p>t</p></body>");
        let body = doc
            .elements()
            .into_iter()
            .find(|node| doc.node_name(*node) == "body")
            .unwrap_or_else(|| unreachable!());
        assert_eq!(doc.element_children(body).len(), 2);
    }

    #[test]
    fn literal_less_than_is_text() {
        let doc = HtmlParser.parse("<p>1 < 2</p>");
        let p = doc
            .elements()
            .into_iter()
            .find(|node| doc.node_name(*node) == "p")
            .unwrap_or_else(|| unreachable!());
        assert_eq!(doc.text_content(p), "1 < 2");
    }
}
