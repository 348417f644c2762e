use serde::{Deserialize, Serialize};

/// One item as seen by a site adapter during a single fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemObservation {
    pub code: String,
    pub url: String,
    pub title: Option<String>,
    pub price: Option<String>,
    pub image: Option<String>,
    pub available: Option<bool>,
    pub availability_message: Option<String>,
    pub in_stock_allocation: Option<u32>,
}

impl ItemObservation {
    pub fn new(code: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<Option<String>>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<Option<String>>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_available(mut self, available: bool) -> Self {
        self.available = Some(available);
        self
    }

    pub fn with_availability_message(mut self, message: impl Into<String>) -> Self {
        self.availability_message = Some(message.into());
        self
    }

    pub fn with_in_stock_allocation(mut self, allocation: u32) -> Self {
        self.in_stock_allocation = Some(allocation);
        self
    }

    /// Trim text fields and turn blank strings into absent values, so that
    /// "present" always means "carries information".
    pub fn normalized(self) -> Self {
        Self {
            code: self.code.trim().to_string(),
            url: self.url.trim().to_string(),
            title: non_blank(self.title),
            price: non_blank(self.price),
            image: non_blank(self.image),
            available: self.available,
            availability_message: non_blank(self.availability_message),
            in_stock_allocation: self.in_stock_allocation,
        }
    }

    /// Fold a later observation of the same item into this one. Values
    /// present in `later` win; absent values never erase what is already
    /// known.
    pub fn absorb(&mut self, later: ItemObservation) {
        if !later.url.is_empty() {
            self.url = later.url;
        }
        overlay(&mut self.title, later.title);
        overlay(&mut self.price, later.price);
        overlay(&mut self.image, later.image);
        overlay(&mut self.available, later.available);
        overlay(&mut self.availability_message, later.availability_message);
        overlay(&mut self.in_stock_allocation, later.in_stock_allocation);
    }

    /// An item counts towards the listing total unless the site said it is
    /// unavailable.
    pub fn counts_as_present(&self) -> bool {
        self.available != Some(false)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn overlay<T>(current: &mut Option<T>, later: Option<T>) {
    if later.is_some() {
        *current = later;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_drops_blank_fields() {
        let obs = ItemObservation::new(" 123456 ", "https://a.com/x-123456.html")
            .with_title(Some("  ".to_string()))
            .with_price(" $9.99 ")
            .with_availability_message("");

        let obs = obs.normalized();
        assert_eq!(obs.code, "123456");
        assert_eq!(obs.title, None);
        assert_eq!(obs.price.as_deref(), Some("$9.99"));
        assert_eq!(obs.availability_message, None);
    }

    #[test]
    fn test_absorb_keeps_earlier_values_when_later_missing() {
        let mut first = ItemObservation::new("1", "https://a.com/1.html")
            .with_title(Some("Pin".to_string()))
            .with_price("$10");
        let later = ItemObservation::new("1", "https://a.com/pin-1.html")
            .with_available(true)
            .with_in_stock_allocation(4);

        first.absorb(later);

        assert_eq!(first.url, "https://a.com/pin-1.html");
        assert_eq!(first.title.as_deref(), Some("Pin"));
        assert_eq!(first.price.as_deref(), Some("$10"));
        assert_eq!(first.available, Some(true));
        assert_eq!(first.in_stock_allocation, Some(4));
    }

    #[test]
    fn test_absorb_later_value_wins() {
        let mut first = ItemObservation::new("1", "").with_price("$10");
        first.absorb(ItemObservation::new("1", "").with_price("$12"));
        assert_eq!(first.price.as_deref(), Some("$12"));
        assert_eq!(first.url, "");
    }

    #[test]
    fn test_counts_as_present() {
        assert!(ItemObservation::new("1", "").counts_as_present());
        assert!(ItemObservation::new("1", "").with_available(true).counts_as_present());
        assert!(!ItemObservation::new("1", "").with_available(false).counts_as_present());
    }
}
