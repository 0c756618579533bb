// 🔑 Identity Resolver - scraped text → stable identity keys
//
// Identity is what survives re-scraping. Display text may change cosmetically
// between runs ("Dune ", "DUNE", "Frank  Herbert"); keys must not.
//
//   BookKey    (title, author)  whitespace collapsed, case folded
//   StoreKey   store name       whitespace collapsed, case folded
//   ListingKey hyperlink        trimmed only (URLs are case-sensitive)

use crate::error::ParseError;
use crate::record::ScrapedRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookKey {
    title: String,
    author: String,
}

impl BookKey {
    pub fn new(title: &str, author: &str) -> Self {
        BookKey {
            title: fold_name(title),
            author: fold_name(author),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.title, self.author)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreKey(String);

impl StoreKey {
    pub fn new(name: &str) -> Self {
        StoreKey(fold_name(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingKey(String);

impl ListingKey {
    pub fn new(hyperlink: &str) -> Self {
        ListingKey(hyperlink.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// All three keys of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKeys {
    pub book: BookKey,
    pub store: StoreKey,
    pub listing: ListingKey,
}

pub struct IdentityResolver;

impl IdentityResolver {
    /// Derive identity keys for a record
    ///
    /// Title, hyperlink and store name must be non-blank. Author may be blank:
    /// some stores list anthologies without one.
    pub fn resolve(record: &ScrapedRecord) -> Result<IdentityKeys, ParseError> {
        if record.title.trim().is_empty() {
            return Err(ParseError::MissingField("title"));
        }
        if record.hyperlink.trim().is_empty() {
            return Err(ParseError::MissingField("hyperlink"));
        }
        if record.store_name.trim().is_empty() {
            return Err(ParseError::MissingField("store_name"));
        }

        Ok(IdentityKeys {
            book: BookKey::new(&record.title, &record.author),
            store: StoreKey::new(&record.store_name),
            listing: ListingKey::new(&record.hyperlink),
        })
    }
}

/// Collapse runs of whitespace and trim, keeping case
///
/// Used for display text stored on first sighting.
pub fn tidy(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `tidy` + case folding, used for key comparison
fn fold_name(s: &str) -> String {
    tidy(s).to_lowercase()
}
