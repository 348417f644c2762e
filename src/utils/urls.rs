//! URL canonicalization, product codes and composite item keys.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::utils::error::{AppError, Result};

static MULTI_SLASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/{2,}").expect("valid regex"));

/// Last path segment of a product page, e.g. `/foo-bar-438039197642.html`.
static CODE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/([^/]+)\.html(?:\?|$)").expect("valid regex"));

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{6,}").expect("valid regex"));

/// Product detail links end in `<slug>.html`, optionally followed by a query.
pub static PRODUCT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/[^/]+\.html(?:\?|$)").expect("valid regex"));

/// Normalize a product URL: https, lowercase host without `www.`, collapsed
/// slashes, no query string or fragment.
pub fn canonicalize(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim())?;
    let host = parsed.host_str().ok_or_else(|| AppError::Parse {
        message: format!("URL has no host: {}", raw),
    })?;
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let path = MULTI_SLASH.replace_all(parsed.path(), "/");

    Ok(match parsed.port() {
        Some(port) => format!("https://{}:{}{}", host, port, path),
        None => format!("https://{}{}", host, path),
    })
}

/// Extract the numeric product code (the last run of 6+ digits in the
/// `.html` filename).
pub fn extract_product_code(url: &str) -> Option<String> {
    let file = CODE_FILE.captures(url)?.get(1)?.as_str();
    DIGIT_RUN.find_iter(file).last().map(|m| m.as_str().to_string())
}

/// Host used to namespace item keys: lowercase, without `www.` and port.
pub fn managed_host(url: &str) -> Result<String> {
    let parsed = Url::parse(url.trim())?;
    let host = parsed.host_str().ok_or_else(|| AppError::Validation(format!("URL has no host: {}", url)))?;
    let host = host.to_lowercase();
    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

pub fn make_key(host: &str, code: &str) -> String {
    format!("{}:{}", host, code)
}

/// Split a composite `host:code` key. Returns `None` for legacy keys (bare
/// codes or full URLs).
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    if key.contains("://") {
        return None;
    }
    key.split_once(':').filter(|(host, code)| !host.is_empty() && !code.is_empty())
}

pub fn key_host(key: &str) -> Option<&str> {
    split_key(key).map(|(host, _)| host)
}

pub fn key_code(key: &str) -> &str {
    split_key(key).map(|(_, code)| code).unwrap_or(key)
}

/// Shortest URL that still resolves to the product page. Disney Store
/// accepts `/<code>.html`; other hosts fall back to the canonical URL.
pub fn short_product_url(url: &str, code: &str) -> String {
    let host = managed_host(url).unwrap_or_default();
    if !code.is_empty() && host.ends_with("disneystore.com") {
        return format!("https://www.disneystore.com/{}.html", code);
    }
    canonicalize(url).unwrap_or_else(|_| url.to_string())
}

/// Filename portion (without `.html`) of a product URL.
pub fn product_slug(url: &str) -> Option<&str> {
    CODE_FILE.captures(url).and_then(|c| c.get(1)).map(|m| m.as_str())
}
