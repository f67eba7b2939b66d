//! Recognition of the three source forms a callable can take.
//!
//! Only the outer syntax is inspected: a leading `async`, the `function`
//! keyword, the parameter list and the `=>` token. Parameter lists and
//! bodies are sliced out of the original text untouched.

/// Syntactic form of a callable's source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Shape<'a> {
    /// `[async] function [name](params) { body }`, normalized to a single
    /// space after the `function` keyword.
    Declaration(String),
    /// `[async] (params) => body` or `[async] param => body`.
    Arrow,
    /// `[async] name(params) { body }`.
    Shorthand {
        is_async: bool,
        params: &'a str,
        body: &'a str,
    },
}

/// Classify trimmed source text. Returns `None` when no form matches.
pub(crate) fn classify(raw: &str) -> Option<Shape<'_>> {
    let (is_async, rest) = match strip_word(raw, "async") {
        Some(rest) => (true, rest.trim_start()),
        None => (false, raw),
    };

    if let Some(after) = strip_word(rest, "function") {
        let prefix = if is_async { "async " } else { "" };
        return Some(Shape::Declaration(format!(
            "{prefix}function {}",
            after.trim_start()
        )));
    }

    if is_arrow(rest) || is_arrow(raw) {
        return Some(Shape::Arrow);
    }

    if is_async && let Some((params, body)) = shorthand(rest) {
        return Some(Shape::Shorthand {
            is_async: true,
            params,
            body,
        });
    }

    // Also covers a method literally named `async`.
    shorthand(raw).map(|(params, body)| Shape::Shorthand {
        is_async: false,
        params,
        body,
    })
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Strip `word` when it is a whole leading token.
fn strip_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(word)?;
    match rest.chars().next() {
        Some(c) if is_ident_char(c) => None,
        _ => Some(rest),
    }
}

fn is_arrow(text: &str) -> bool {
    let after_params = if text.starts_with('(') {
        match matching_paren(text, 0) {
            Some(close) => &text[close + 1..],
            None => return false,
        }
    } else {
        let ident_len: usize = text
            .chars()
            .take_while(|c| is_ident_char(*c))
            .map(char::len_utf8)
            .sum();
        if ident_len == 0 {
            return false;
        }
        &text[ident_len..]
    };
    after_params.trim_start().starts_with("=>")
}

/// Split `name(params) { body }` into trimmed params and body.
fn shorthand(text: &str) -> Option<(&str, &str)> {
    let open = text.find('(')?;
    if text[..open].trim().is_empty() {
        return None;
    }
    let close = matching_paren(text, open)?;
    let tail = text[close + 1..].trim();
    let inner = tail.strip_prefix('{')?.strip_suffix('}')?;
    Some((text[open + 1..close].trim(), inner.trim()))
}

/// Byte index of the `)` closing the `(` at `open`, skipping string literals.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}
