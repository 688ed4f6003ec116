//! Lenient HTML tokenizer.
//!
//! Splits markup into tags and text runs with a handful of regexes. Anything
//! that does not look like a tag (a stray `<`, an unterminated `<div`) stays
//! in the surrounding text run, so no input is ever rejected.

use regex::Regex;
use std::sync::LazyLock;

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<!\[CDATA\[(.*?)\]\]>|<[!?][^>]*>|<(/?)([a-zA-Z][a-zA-Z0-9:-]*)((?:"[^"]*"|'[^']*'|[^'">])*)>"#,
    )
    .unwrap()
});

static ATTR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

static ENTITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});").unwrap());

/// Elements whose content is never text, removed before tokenizing.
const RAW_TEXT_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "template", "svg"];

static RAW_TEXT_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    RAW_TEXT_ELEMENTS
        .iter()
        .map(|name| Regex::new(&format!(r"(?is)<{0}\b[^>]*>.*?</{0}\s*>", name)).unwrap())
        .collect()
});

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    Text(&'a str),
    Open {
        name: String,
        attrs: &'a str,
        self_closing: bool,
    },
    Close(String),
}

/// Remove script, style and similar blocks including their content.
pub fn strip_raw_text_elements(html: &str) -> String {
    let mut out = html.to_string();
    for re in RAW_TEXT_REGEXES.iter() {
        out = re.replace_all(&out, "").into_owned();
    }
    out
}

pub fn tokenize(html: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut last = 0;

    for cap in TAG_REGEX.captures_iter(html) {
        let Some(whole) = cap.get(0) else { continue };
        if whole.start() > last {
            tokens.push(Token::Text(&html[last..whole.start()]));
        }
        last = whole.end();

        if let Some(cdata) = cap.get(1) {
            tokens.push(Token::Text(cdata.as_str()));
            continue;
        }
        let Some(name) = cap.get(3) else {
            // comment, doctype or processing instruction
            continue;
        };

        let name = name.as_str().to_ascii_lowercase();
        let closing = cap.get(2).is_some_and(|m| !m.as_str().is_empty());
        if closing {
            tokens.push(Token::Close(name));
        } else {
            let attrs = cap.get(4).map_or("", |m| m.as_str());
            tokens.push(Token::Open {
                name,
                attrs,
                self_closing: attrs.trim_end().ends_with('/'),
            });
        }
    }

    if last < html.len() {
        tokens.push(Token::Text(&html[last..]));
    }
    tokens
}

/// Value of attribute `name` in a raw attribute string, entities decoded.
pub fn attr(attrs: &str, name: &str) -> Option<String> {
    ATTR_REGEX.captures_iter(attrs).find_map(|cap| {
        let key = cap.get(1)?;
        if !key.as_str().eq_ignore_ascii_case(name) {
            return None;
        }
        let value = cap.get(2).or(cap.get(3)).or(cap.get(4))?;
        Some(decode_entities(value.as_str()))
    })
}

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_REGEX
        .replace_all(text, |cap: &regex::Captures| {
            let body = &cap[1];
            decode_entity(body).unwrap_or_else(|| cap[0].to_string())
        })
        .into_owned()
}

fn decode_entity(body: &str) -> Option<String> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    let decoded = match body {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "deg" => "\u{b0}",
        "frac12" => "\u{bd}",
        "times" => "\u{d7}",
        "bull" => "\u{2022}",
        "middot" => "\u{b7}",
        _ => return None,
    };
    Some(decoded.to_string())
}
