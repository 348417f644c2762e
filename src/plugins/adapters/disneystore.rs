use async_trait::async_trait;
use std::collections::HashSet;
use tracing::info;

use crate::models::ItemObservation;
use crate::plugins::adapters::sfcc::parse_grid;
use crate::plugins::traits::{ItemFilters, SiteAdapter};
use crate::session::HttpSession;
use crate::utils::error::Result;

/// Single-page Disney Store grid, e.g.
/// `https://www.disneystore.com/on/demandware.store/Sites-shopDisney-Site/default/Search-UpdateGrid?cgid=collectibles-pins&start=0&sz=200`.
///
/// No pagination and no per-item stock lookups.
#[derive(Debug, Clone, Default)]
pub struct DisneyStoreAdapter;

impl DisneyStoreAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SiteAdapter for DisneyStoreAdapter {
    fn name(&self) -> &str {
        "Disney Store"
    }

    fn site_key(&self) -> &str {
        "disneystore"
    }

    fn description(&self) -> &str {
        "Disney Store category grid, first page only"
    }

    async fn fetch(&self, session: &HttpSession, url: &str, filters: &ItemFilters) -> Result<Vec<ItemObservation>> {
        let body = session.get_text(url).await?;
        let items = parse_grid(&body, url, filters, &mut HashSet::new())?;
        info!(url = %url, count = items.len(), "Fetched Disney Store listing");
        Ok(items)
    }
}
