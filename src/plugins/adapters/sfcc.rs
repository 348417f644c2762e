//! Salesforce Commerce Cloud (SFCC) category grids.
//!
//! Grid pages are server-rendered HTML served by `Search-UpdateGrid`; stock
//! details come from the JSON `Product-Variation` endpoint of the same site.

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

use crate::models::ItemObservation;
use crate::plugins::traits::{ItemFilters, SiteAdapter};
use crate::session::HttpSession;
use crate::utils::error::Result;
use crate::utils::urls::{canonicalize, extract_product_code, PRODUCT_LINK};

pub const DEFAULT_REGION_SLUG: &str = "Sites-shopDisney-Site";
pub const DEFAULT_LOCALE: &str = "default";

/// Safety cap on grid pagination.
pub const MAX_PAGES: usize = 10;
const DETAIL_QUANTITY: u32 = 10_000;
const CARD_SEARCH_DEPTH: usize = 8;

static SFCC_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^/on/demandware\.store/([^/]+)/([^/]+)/").expect("valid regex"));

/// Class fragments SFCC themes put on product card containers.
static CARD_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(product|tile|grid|card|result|hit|search|listing|item|cell|slot)").expect("valid regex")
});

/// Build a `Search-UpdateGrid` URL for a category.
pub fn build_grid_url(
    scheme: &str,
    host: &str,
    region_slug: &str,
    locale: &str,
    category_slug: &str,
    start: u32,
    size: u32,
) -> Result<String> {
    let scheme = if scheme.trim().is_empty() { "https" } else { scheme.trim() };
    let mut url = Url::parse(&format!(
        "{}://{}/on/demandware.store/{}/{}/Search-UpdateGrid",
        scheme, host, region_slug, locale
    ))?;
    url.query_pairs_mut()
        .append_pair("cgid", category_slug)
        .append_pair("start", &start.to_string())
        .append_pair("sz", &size.to_string());
    Ok(url.to_string())
}

/// Region slug and locale segments of an SFCC URL, or the shopDisney
/// defaults when the path does not follow the pattern.
pub fn region_and_locale(url: &Url) -> (String, String) {
    match SFCC_PATH.captures(url.path()) {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => (DEFAULT_REGION_SLUG.to_string(), DEFAULT_LOCALE.to_string()),
    }
}

/// `Product-Variation` URL for `code` on the same site as `listing_url`.
pub fn build_variation_url(listing_url: &str, code: &str) -> Result<String> {
    let listing = Url::parse(listing_url)?;
    let (region, locale) = region_and_locale(&listing);

    let mut url = listing.join(&format!("/on/demandware.store/{}/{}/Product-Variation", region, locale))?;
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("pid", code)
        .append_pair("quantity", &DETAIL_QUANTITY.to_string());
    Ok(url.to_string())
}

/// URL of grid page `page` (1-based), for grids paginated with `start`/`sz`.
/// Returns `None` when the URL has no such parameters.
pub fn page_url(url: &str, page: usize) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();

    let size: usize = pairs.iter().find(|(k, _)| k == "sz")?.1.parse().ok()?;
    if size == 0 || !pairs.iter().any(|(k, _)| k == "start") {
        return None;
    }
    let start = (page.saturating_sub(1) * size).to_string();

    parsed.query_pairs_mut().clear().extend_pairs(
        pairs
            .iter()
            .map(|(k, v)| (k.as_str(), if k == "start" { start.as_str() } else { v.as_str() })),
    );
    Some(parsed.to_string())
}

struct GridSelectors {
    anchor: Selector,
    picture_source: Selector,
    img: Selector,
}

impl GridSelectors {
    fn new() -> Self {
        Self {
            anchor: Selector::parse("a[href]").expect("anchor selector"),
            picture_source: Selector::parse("picture source").expect("picture selector"),
            img: Selector::parse("img").expect("img selector"),
        }
    }
}

/// Extract product tiles from one grid page. Codes already in `seen` are
/// skipped and new ones are added to it.
pub fn parse_grid(html: &str, page_url: &str, filters: &ItemFilters, seen: &mut HashSet<String>) -> Result<Vec<ItemObservation>> {
    let base = Url::parse(page_url)?;
    let document = Html::parse_document(html);
    let selectors = GridSelectors::new();
    let mut items = Vec::new();

    for anchor in document.select(&selectors.anchor) {
        let Some(href) = anchor.value().attr("href") else { continue };
        let Ok(joined) = base.join(href.trim()) else { continue };
        if !PRODUCT_LINK.is_match(joined.as_str()) {
            continue;
        }

        let Ok(canonical) = canonicalize(joined.as_str()) else { continue };
        if !filters.allows(&canonical) {
            continue;
        }
        let Some(code) = extract_product_code(&canonical) else { continue };
        if !seen.insert(code.clone()) {
            continue;
        }

        let card = find_card(anchor).unwrap_or(anchor);
        let image = find_image(card, &selectors, &base);

        items.push(
            ItemObservation::new(code, canonical)
                .with_title(anchor_title(anchor))
                .with_image(image),
        );
    }

    Ok(items)
}

fn anchor_title(anchor: ElementRef) -> Option<String> {
    anchor
        .value()
        .attr("title")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            let text = anchor.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ");
            Some(text).filter(|t| !t.is_empty())
        })
}

/// Closest element (the link itself or an ancestor) that looks like a
/// product card.
fn find_card(anchor: ElementRef<'_>) -> Option<ElementRef<'_>> {
    std::iter::once(anchor)
        .chain(anchor.ancestors().filter_map(ElementRef::wrap))
        .take(CARD_SEARCH_DEPTH)
        .find(|el| el.value().attr("class").is_some_and(|class| CARD_CLASS.is_match(class)))
}

fn find_image(card: ElementRef, selectors: &GridSelectors, base: &Url) -> Option<String> {
    card.select(&selectors.picture_source)
        .chain(card.select(&selectors.img))
        .find_map(|el| image_src(el, base))
}

fn image_src(el: ElementRef, base: &Url) -> Option<String> {
    ["src", "data-src", "srcset", "data-srcset"].iter().find_map(|attr| {
        let raw = el.value().attr(attr)?;
        let first = raw.split(',').next()?.split_whitespace().next()?;
        if first.starts_with("data:") {
            return None;
        }
        base.join(first).ok().map(|u| u.to_string())
    })
}

/// Fields of interest from a `Product-Variation` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariationDetails {
    pub available: bool,
    pub availability_message: Option<String>,
    pub in_stock_allocation: u32,
    pub image: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub price: Option<String>,
}

/// Decode a `Product-Variation` payload. `None` when it has no product.
pub fn parse_variation(payload: &Value) -> Option<VariationDetails> {
    let product = payload.get("product").filter(|p| p.is_object())?;
    let availability = &product["availability"];

    let mut message = availability["messages"]
        .get(0)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from);

    let in_stock_allocation = match &availability["inStockAllocation"] {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };
    let available = in_stock_allocation > 0;

    if message.is_none() {
        match availability["displayLowStockMessage"].as_bool() {
            Some(true) => message = Some("Low Stock".to_string()),
            Some(false) if !available => message = Some("Out of Stock".to_string()),
            _ => {}
        }
    }

    let feature_images = payload["productMedia"]["feature"]["images"].as_array();
    let high_res = product["images"]["highRes"].as_array();
    let picked = feature_images
        .into_iter()
        .chain(high_res)
        .flatten()
        .filter(|img| img.is_object())
        .find_map(|img| {
            let src = img["imgSrc"].as_str().or_else(|| img["url"].as_str())?;
            let label = img["title"].as_str().or_else(|| img["alt"].as_str());
            Some((src.to_string(), label.map(String::from)))
        });
    let (image, image_label) = match picked {
        Some((src, label)) => (Some(src), label),
        None => (None, None),
    };

    let title = product["custom"]["productDisplayName"]
        .as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .or(image_label.filter(|l| !l.trim().is_empty()));

    Some(VariationDetails {
        available,
        availability_message: message,
        in_stock_allocation,
        image,
        url: product["selectedProductUrl"].as_str().map(String::from),
        title,
        price: product["price"]["sales"]["formatted"].as_str().map(String::from),
    })
}

impl VariationDetails {
    /// Turn the details into an observation, resolving the product URL
    /// against the site it came from.
    fn into_observation(self, code: &str, base_url: &str) -> ItemObservation {
        let url = self
            .url
            .as_deref()
            .and_then(|u| Url::parse(base_url).ok()?.join(u).ok())
            .and_then(|u| canonicalize(u.as_str()).ok())
            .unwrap_or_default();

        let mut obs = ItemObservation::new(code, url)
            .with_title(self.title)
            .with_image(self.image)
            .with_available(self.available)
            .with_in_stock_allocation(self.in_stock_allocation);
        obs.price = self.price;
        obs.availability_message = self.availability_message;
        obs
    }
}

/// Generic adapter for SFCC grid pages.
#[derive(Debug, Clone)]
pub struct SfccGridAdapter {
    enrich_listing: bool,
}

impl Default for SfccGridAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SfccGridAdapter {
    pub fn new() -> Self {
        Self { enrich_listing: true }
    }

    /// Skip the per-item `Product-Variation` lookups while listing.
    pub fn without_enrichment(mut self) -> Self {
        self.enrich_listing = false;
        self
    }

    async fn variation(&self, session: &HttpSession, listing_url: &str, code: &str) -> Option<VariationDetails> {
        let detail_url = match build_variation_url(listing_url, code) {
            Ok(url) => url,
            Err(e) => {
                debug!(code = %code, error = %e, "Cannot build variation URL");
                return None;
            }
        };
        match session.get_json(&detail_url).await {
            Ok(payload) => parse_variation(&payload),
            Err(e) => {
                debug!(code = %code, error = %e, "Variation lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl SiteAdapter for SfccGridAdapter {
    fn name(&self) -> &str {
        "SFCC Grid"
    }

    fn site_key(&self) -> &str {
        "sfcc"
    }

    fn description(&self) -> &str {
        "Salesforce Commerce Cloud category grids with Product-Variation stock details"
    }

    async fn fetch(&self, session: &HttpSession, url: &str, filters: &ItemFilters) -> Result<Vec<ItemObservation>> {
        let mut seen = HashSet::new();
        let body = session.get_text(url).await?;
        let mut items = parse_grid(&body, url, filters, &mut seen)?;

        for page in 2..=MAX_PAGES {
            let Some(next) = page_url(url, page) else { break };
            let body = session.get_text(&next).await?;
            let batch = parse_grid(&body, &next, filters, &mut seen)?;
            if batch.is_empty() {
                break;
            }
            debug!(page, count = batch.len(), "Fetched grid page");
            items.extend(batch);
        }

        if self.enrich_listing {
            for item in items.iter_mut() {
                if let Some(details) = self.variation(session, url, &item.code).await {
                    let fallback_url = item.url.clone();
                    let title = item.title.take();
                    let mut enriched = details.into_observation(&item.code, url);
                    if enriched.url.is_empty() {
                        enriched.url = fallback_url;
                    }
                    // Grid titles win over variation titles.
                    if title.is_some() {
                        enriched.title = title;
                    }
                    if enriched.image.is_none() {
                        enriched.image = item.image.take();
                    }
                    *item = enriched;
                }
            }
        }

        info!(url = %url, count = items.len(), "Fetched SFCC listing");
        Ok(items)
    }

    fn supports_details(&self) -> bool {
        true
    }

    async fn fetch_detail(&self, session: &HttpSession, url: &str, code: &str) -> Option<ItemObservation> {
        self.variation(session, url, code)
            .await
            .map(|details| details.into_observation(code, url))
    }
}
