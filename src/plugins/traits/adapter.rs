use async_trait::async_trait;
use regex::Regex;

use crate::models::ItemObservation;
use crate::session::HttpSession;
use crate::utils::error::Result;

/// Include/exclude patterns applied to canonical product URLs.
#[derive(Debug, Clone, Default)]
pub struct ItemFilters {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl ItemFilters {
    /// Blank patterns are treated as unset.
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self> {
        let compile = |pattern: Option<&str>| -> Result<Option<Regex>> {
            match pattern.map(str::trim).filter(|p| !p.is_empty()) {
                Some(p) => Ok(Some(Regex::new(p)?)),
                None => Ok(None),
            }
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn allows(&self, url: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(url) {
                return false;
            }
        }
        !self.exclude.as_ref().is_some_and(|exclude| exclude.is_match(url))
    }
}

/// Knows how to list the items on one kind of store page.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn site_key(&self) -> &str;
    fn description(&self) -> &str;

    /// Fetch the items currently listed at `url`, deduplicated by product
    /// code, with canonical URLs, after applying `filters`.
    async fn fetch(&self, session: &HttpSession, url: &str, filters: &ItemFilters) -> Result<Vec<ItemObservation>>;

    /// Whether [`SiteAdapter::fetch_detail`] can answer anything.
    fn supports_details(&self) -> bool {
        false
    }

    /// Look up a single item that was missing from the listing. Any failure
    /// yields `None`.
    async fn fetch_detail(&self, _session: &HttpSession, _url: &str, _code: &str) -> Option<ItemObservation> {
        None
    }
}
