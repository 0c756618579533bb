// 📄 ScrapedRecord - one promotion snapshot as it comes off a store page
//
// Transient: crosses the orchestrator → reconciliation boundary and is never
// persisted as-is. Prices stay as raw display text until reconciliation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScrapedRecord {
    pub title: String,

    #[serde(default)]
    pub subtitle: String,

    #[serde(default)]
    pub author: String,

    /// Raw retail price text, e.g. "54,99 zł"
    #[serde(default)]
    pub retail_price: String,

    /// Raw promotional price text, empty when the store shows no discount
    #[serde(default)]
    pub promotional_price: String,

    #[serde(default)]
    pub image_link: String,

    pub hyperlink: String,

    #[serde(rename = "bookstore", default)]
    pub store_name: String,
}

impl ScrapedRecord {
    /// Create a record with the identity fields, prices empty
    pub fn new(title: &str, author: &str, hyperlink: &str, store_name: &str) -> Self {
        ScrapedRecord {
            title: title.to_string(),
            author: author.to_string(),
            hyperlink: hyperlink.to_string(),
            store_name: store_name.to_string(),
            ..Default::default()
        }
    }

    /// Builder pattern: set both raw price texts
    pub fn with_prices(mut self, retail: &str, promotional: &str) -> Self {
        self.retail_price = retail.to_string();
        self.promotional_price = promotional.to_string();
        self
    }

    pub fn with_subtitle(mut self, subtitle: &str) -> Self {
        self.subtitle = subtitle.to_string();
        self
    }

    pub fn with_image_link(mut self, image_link: &str) -> Self {
        self.image_link = image_link.to_string();
        self
    }
}
