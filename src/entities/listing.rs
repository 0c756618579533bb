// 🔗 StoreListing Entity + price history
//
// A listing is one book offered at one store, identified by its hyperlink.
// Its prices form an append-only timeline:
//   - PricePoint is a VALUE: never updated, never deleted
//   - timestamps are non-decreasing
//   - the last point is the current price

use super::{Book, Bookstore, Entity};
use crate::identity::{BookKey, ListingKey, StoreKey};
use crate::record::ScrapedRecord;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// STORE LISTING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreListing {
    pub hyperlink: String,
    pub image_link: String,

    /// Owning book
    pub book: BookKey,

    /// Owning bookstore
    pub bookstore: StoreKey,
}

impl StoreListing {
    pub fn new(hyperlink: &str, image_link: &str, book: &Book, bookstore: &Bookstore) -> Self {
        StoreListing {
            hyperlink: hyperlink.trim().to_string(),
            image_link: image_link.trim().to_string(),
            book: book.key(),
            bookstore: bookstore.key(),
        }
    }

    pub fn from_record(record: &ScrapedRecord, book: &Book, bookstore: &Bookstore) -> Self {
        StoreListing::new(&record.hyperlink, &record.image_link, book, bookstore)
    }
}

impl Entity for StoreListing {
    type Key = ListingKey;

    fn key(&self) -> ListingKey {
        ListingKey::new(&self.hyperlink)
    }

    fn adopt_identity(&mut self, canonical: &StoreListing) {
        self.hyperlink = canonical.hyperlink.clone();
    }
}

// ============================================================================
// PRICE POINT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub retail: Decimal,

    /// Equals `retail` when the store showed no promotion
    pub promotional: Decimal,

    pub currency: String,
    pub recorded_at: DateTime<Utc>,
}

impl PricePoint {
    pub fn new(
        retail: Decimal,
        promotional: Decimal,
        currency: &str,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        PricePoint {
            retail,
            promotional,
            currency: currency.to_string(),
            recorded_at,
        }
    }

    /// Amount saved against retail; negative when the source data is inconsistent
    pub fn discount(&self) -> Decimal {
        self.retail - self.promotional
    }

    pub fn is_promotional(&self) -> bool {
        self.promotional < self.retail
    }
}

// ============================================================================
// PRICE HISTORY
// ============================================================================

/// Chronological price timeline of one listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistory {
    points: Vec<PricePoint>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from points already ordered by storage
    pub fn from_points(mut points: Vec<PricePoint>) -> Self {
        // stable sort keeps insertion order for equal timestamps
        points.sort_by_key(|p| p.recorded_at);
        PriceHistory { points }
    }

    /// Append a point, clamping its timestamp so the timeline never goes back
    pub fn push(&mut self, mut point: PricePoint) -> &PricePoint {
        if let Some(last) = self.points.last() {
            if point.recorded_at < last.recorded_at {
                point.recorded_at = last.recorded_at;
            }
        }
        self.points.push(point);
        &self.points[self.points.len() - 1]
    }

    /// Current price (most recent point)
    pub fn current(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Price in effect at `as_of` (last point recorded at or before it)
    pub fn at(&self, as_of: DateTime<Utc>) -> Option<&PricePoint> {
        self.points.iter().rev().find(|p| p.recorded_at <= as_of)
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Lowest promotional price seen so far
    pub fn lowest(&self) -> Option<&PricePoint> {
        self.points.iter().min_by_key(|p| p.promotional)
    }
}
