//! Renders a tick's new and restocked items into a notification digest.

use serde::{Deserialize, Serialize};

use crate::core::reconciler::TickOutcome;
use crate::models::{ItemRecord, RecordMap};
use crate::utils::text::{escape_html, masked_link, pretty_name_from_url};
use crate::utils::urls::key_code;

pub const SUBJECT_PREFIX: &str = "[Store Watch]";

/// A rendered digest, handed unchanged to every notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestMessage {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl DigestMessage {
    pub fn from_outcome(outcome: &TickOutcome, restock_hours: u64) -> Self {
        render(
            &outcome.new_keys,
            &outcome.restocked_keys,
            &outcome.next_state,
            restock_hours,
            outcome.present_count,
        )
    }
}

struct Entry {
    name: String,
    url: String,
    details: Vec<String>,
}

impl Entry {
    fn lookup(key: &str, state: &RecordMap) -> Self {
        match state.get(key) {
            Some(record) => Self::from_record(record),
            None => Self {
                name: key_code(key).to_string(),
                url: String::new(),
                details: Vec::new(),
            },
        }
    }

    fn from_record(record: &ItemRecord) -> Self {
        let name = Some(record.name.trim())
            .filter(|n| !n.is_empty())
            .map(String::from)
            .or_else(|| pretty_name_from_url(&record.url))
            .unwrap_or_else(|| record.code().to_string());

        let mut details = Vec::new();
        if let Some(price) = &record.price {
            match (&record.prev_price, record.price_changed) {
                (Some(prev), true) => details.push(format!("{} (was {})", price, prev)),
                _ => details.push(price.clone()),
            }
        }
        if let Some(message) = &record.availability_message {
            details.push(message.clone());
        }
        if let Some(stock) = record.in_stock_allocation {
            details.push(format!("Stock: {}", stock));
        }

        Self {
            name,
            url: record.short_url(),
            details,
        }
    }

    fn html(&self) -> String {
        let label = if self.url.is_empty() {
            escape_html(&self.name)
        } else {
            format!("<a href=\"{}\">{}</a>", escape_html(&self.url), escape_html(&self.name))
        };
        let details: String = self.details.iter().map(|d| format!(" · {}", escape_html(d))).collect();
        format!("<li>{}{}</li>", label, details)
    }

    fn text(&self) -> String {
        let label = if self.url.is_empty() {
            self.name.clone()
        } else {
            masked_link(&self.name, &self.url)
        };
        let details: String = self.details.iter().map(|d| format!(" · {}", d)).collect();
        format!("- {}{}", label, details)
    }
}

pub fn subject(new_count: usize, restocked_count: usize, total: usize) -> String {
    let mut bits = Vec::new();
    if new_count > 0 {
        bits.push(format!("{} new", new_count));
    }
    if restocked_count > 0 {
        bits.push(format!("{} restocked", restocked_count));
    }
    let summary = if bits.is_empty() {
        "No changes".to_string()
    } else {
        bits.join(" & ")
    };
    format!("{} {} (now {} total)", SUBJECT_PREFIX, summary, total)
}

/// Build subject, HTML and markdown bodies. Keys are listed in sorted order.
pub fn render(
    new_keys: &[String],
    restocked_keys: &[String],
    state: &RecordMap,
    restock_hours: u64,
    total: usize,
) -> DigestMessage {
    let sections = [
        (format!("New items ({})", new_keys.len()), sorted_entries(new_keys, state)),
        (
            format!("Restocked (≥{}h absent) ({})", restock_hours, restocked_keys.len()),
            sorted_entries(restocked_keys, state),
        ),
    ];

    let mut html = Vec::new();
    let mut text = Vec::new();
    for (heading, entries) in sections.iter().filter(|(_, entries)| !entries.is_empty()) {
        html.push(format!("<p><strong>{}:</strong></p><ul>", escape_html(heading)));
        html.extend(entries.iter().map(Entry::html));
        html.push("</ul>".to_string());

        text.push(format!("{}:", heading));
        text.extend(entries.iter().map(Entry::text));
        text.push(String::new());
    }
    html.push(format!("<p>Total items now: {}</p>", total));
    text.push(format!("Total items now: {}", total));

    DigestMessage {
        subject: subject(new_keys.len(), restocked_keys.len(), total),
        html_body: html.join("\n"),
        text_body: text.join("\n").trim().to_string(),
    }
}

fn sorted_entries(keys: &[String], state: &RecordMap) -> Vec<Entry> {
    let mut keys: Vec<&String> = keys.iter().collect();
    keys.sort();
    keys.dedup();
    keys.into_iter().map(|key| Entry::lookup(key, state)).collect()
}
