use crate::utils::urls::product_slug;

const MINOR_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "for", "from", "in", "into", "of", "on", "or", "the", "to",
    "with", "without", "over", "under",
];

const UPPERCASE_WORDS: &[&str] = &["D23", "WDW", "WDI"];

/// Turn a product slug into a display title, stopping at the first numeric
/// product-code token.
///
/// `pin-display-frame-with-three-pins-438018657693` becomes
/// `Pin Display Frame with Three Pins`.
pub fn slug_to_title(slug: &str) -> String {
    let words: Vec<&str> = slug
        .split('-')
        .take_while(|token| !(token.len() >= 6 && token.chars().all(|c| c.is_ascii_digit())))
        .filter(|token| !token.is_empty())
        .collect();

    if words.is_empty() {
        return slug.to_string();
    }

    let last = words.len() - 1;
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let base = word.replace('_', " ");
            if UPPERCASE_WORDS.contains(&base.to_uppercase().as_str()) {
                base.to_uppercase()
            } else if base.chars().all(|c| c.is_ascii_digit()) {
                base
            } else if i != 0 && i != last && MINOR_WORDS.contains(&base.to_lowercase().as_str()) {
                base.to_lowercase()
            } else {
                capitalize(&base)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Best-effort display name derived from a product URL.
pub fn pretty_name_from_url(url: &str) -> Option<String> {
    product_slug(url).map(slug_to_title)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape the characters that would break a markdown masked link.
pub fn escape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '[' | ']' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn masked_link(name: &str, url: &str) -> String {
    format!("[{}]({})", escape_link_text(name), url)
}
