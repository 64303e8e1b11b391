//! Parser for the generated selector grammar.
//!
//! Supported: type selectors, `*`, `#id`, `.class`, `:nth-child(k)`, the
//! child combinator `>` and the descendant combinator (whitespace). Anything
//! else makes the whole selector invalid.

use crate::escape::is_plain_ident_char;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Compounds left to right; `combinators[i]` joins `compounds[i]` and
    /// `compounds[i + 1]`.
    pub(crate) compounds: Vec<Compound>,
    pub(crate) combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Compound {
    pub(crate) tag: Option<String>,
    pub(crate) id: Option<String>,
    pub(crate) classes: Vec<String>,
    pub(crate) nth_child: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combinator {
    Descendant,
    Child,
}

impl Selector {
    pub fn parse(input: &str) -> Option<Self> {
        let mut chars = input.chars().peekable();
        let mut compounds = Vec::new();
        let mut combinators = Vec::new();
        let mut pending: Option<Combinator> = None;

        loop {
            let saw_space = skip_whitespace(&mut chars);
            let Some(&next) = chars.peek() else {
                break;
            };

            if next == '>' {
                if compounds.is_empty() || pending == Some(Combinator::Child) {
                    return None;
                }
                chars.next();
                pending = Some(Combinator::Child);
                continue;
            }

            if !compounds.is_empty() {
                let combinator = match pending.take() {
                    Some(combinator) => combinator,
                    None if saw_space => Combinator::Descendant,
                    None => return None,
                };
                combinators.push(combinator);
            }
            compounds.push(parse_compound(&mut chars)?);
        }

        if compounds.is_empty() || pending.is_some() {
            return None;
        }

        Some(Self {
            compounds,
            combinators,
        })
    }
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) -> bool {
    let mut skipped = false;
    while chars.peek().is_some_and(|ch| ch.is_whitespace()) {
        chars.next();
        skipped = true;
    }
    skipped
}

fn parse_compound(chars: &mut Peekable<Chars<'_>>) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut empty = true;

    match chars.peek() {
        Some('*') => {
            chars.next();
            empty = false;
        }
        Some(ch) if ch.is_ascii_alphabetic() => {
            compound.tag = Some(parse_ident(chars)?.to_ascii_lowercase());
            empty = false;
        }
        _ => {}
    }

    while let Some(&marker) = chars.peek() {
        match marker {
            '#' => {
                chars.next();
                if compound.id.is_some() {
                    return None;
                }
                compound.id = Some(parse_ident(chars)?);
            }
            '.' => {
                chars.next();
                compound.classes.push(parse_ident(chars)?);
            }
            ':' => {
                chars.next();
                compound.nth_child = Some(parse_nth_child(chars)?);
            }
            ch if ch.is_whitespace() || ch == '>' => break,
            _ => return None,
        }
        empty = false;
    }

    if empty { None } else { Some(compound) }
}

fn parse_nth_child(chars: &mut Peekable<Chars<'_>>) -> Option<usize> {
    for expected in "nth-child(".chars() {
        if chars.next()? != expected {
            return None;
        }
    }

    let mut digits = String::new();
    while let Some(&ch) = chars.peek() {
        if ch == ')' {
            break;
        }
        digits.push(ch);
        chars.next();
    }
    if chars.next()? != ')' {
        return None;
    }

    let index = digits.trim().parse::<usize>().ok()?;
    if index == 0 { None } else { Some(index) }
}

/// Reads an identifier, decoding `\<hex>` and `\<char>` escapes.
fn parse_ident(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut out = String::new();

    while let Some(&ch) = chars.peek() {
        if ch == '\\' {
            chars.next();
            out.push(parse_escape(chars)?);
            continue;
        }
        if is_plain_ident_char(ch) || !ch.is_ascii() {
            out.push(ch);
            chars.next();
            continue;
        }
        break;
    }

    if out.is_empty() { None } else { Some(out) }
}

fn parse_escape(chars: &mut Peekable<Chars<'_>>) -> Option<char> {
    let mut hex = String::new();
    while hex.len() < 6 {
        match chars.peek() {
            Some(ch) if ch.is_ascii_hexdigit() => {
                hex.push(*ch);
                chars.next();
            }
            _ => break,
        }
    }

    if hex.is_empty() {
        let literal = chars.next()?;
        return if literal == '\n' { None } else { Some(literal) };
    }

    if chars.peek().is_some_and(|ch| ch.is_whitespace()) {
        chars.next();
    }

    let code = u32::from_str_radix(&hex, 16).ok()?;
    Some(match code {
        0 => char::REPLACEMENT_CHARACTER,
        _ => char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER),
    })
}

#[cfg(test)]
mod tests {
    use super::Combinator;
    use super::Selector;

    #[test]
    fn parses_compound_with_id_and_classes() {
        let selector = Selector::parse("DIV#main.a.b").unwrap_or_else(|| unreachable!());
        assert_eq!(selector.compounds.len(), 1);
        let compound = &selector.compounds[0];
        assert_eq!(compound.tag.as_deref(), Some("div"));
        assert_eq!(compound.id.as_deref(), Some("main"));
        assert_eq!(compound.classes, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn parses_child_and_descendant_combinators() {
        let selector = Selector::parse("body > div p").unwrap_or_else(|| unreachable!());
        assert_eq!(
            selector.combinators,
            vec![Combinator::Child, Combinator::Descendant]
        );
    }

    #[test]
    fn parses_structural_paths() {
        let selector =
            Selector::parse(":nth-child(2) > :nth-child(10)").unwrap_or_else(|| unreachable!());
        assert_eq!(selector.compounds[0].nth_child, Some(2));
        assert_eq!(selector.compounds[1].nth_child, Some(10));
        assert_eq!(selector.compounds[1].tag, None);
    }

    #[test]
    fn decodes_escapes() {
        let selector = Selector::parse("p.a\\20 b.\\31 col.hover\\3a > b")
            .unwrap_or_else(|| unreachable!());
        assert_eq!(
            selector.compounds[0].classes,
            vec!["a b".to_owned(), "1col".to_owned(), "hover:".to_owned()]
        );
        assert_eq!(selector.compounds[1].tag.as_deref(), Some("b"));
    }

    #[test]
    fn rejects_malformed_selectors() {
        for input in ["", ">", "p >", "p > > b", "p..a", "p#a#b", "p:hover", "p + b", "p:nth-child(0)"] {
            assert!(Selector::parse(input).is_none(), "{input}");
        }
    }
}
