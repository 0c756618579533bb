// ⚖️ Reconciliation Engine - one scraped record → persisted entities
//
// For each record:
//   1. resolve identity keys (book, store, listing)
//   2. look each one up; absence means "create"
//   3. build candidates, adopting stored identity text where the row exists
//   4. parse prices into one PricePoint stamped now
//   5. upsert Book → Bookstore → StoreListing, then append the PricePoint
//
// Nothing is written until the record has parsed. Transactions belong to the
// caller: a failed record leaves the open batch untouched.

use crate::entities::{reconcile_or_create, Book, Bookstore, EntityChange, PricePoint, StoreListing};
use crate::error::ReconcileError;
use crate::identity::{IdentityResolver, ListingKey};
use crate::price::PriceParser;
use crate::record::ScrapedRecord;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// RECONCILE OUTCOME
// ============================================================================

/// What one `reconcile` call did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub listing: ListingKey,
    pub book: EntityChange,
    pub bookstore: EntityChange,
    pub listing_change: EntityChange,

    /// The point as stored (timestamp possibly clamped)
    pub price: PricePoint,
}

impl ReconcileOutcome {
    pub fn created_listing(&self) -> bool {
        self.listing_change == EntityChange::Created
    }

    pub fn created_book(&self) -> bool {
        self.book == EntityChange::Created
    }
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    parser: PriceParser,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser(parser: PriceParser) -> Self {
        ReconciliationEngine { parser }
    }

    pub fn reconcile<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        record: &ScrapedRecord,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile_at(storage, record, Utc::now())
    }

    /// `reconcile` with an explicit clock
    pub fn reconcile_at<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        record: &ScrapedRecord,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let keys = IdentityResolver::resolve(record)?;

        let existing_book = storage.find_book(&keys.book)?;
        let existing_store = storage.find_bookstore(&keys.store)?;
        let existing_listing = storage.find_listing(&keys.listing)?;

        let (book, book_change) =
            reconcile_or_create(Book::from_record(record), existing_book.as_ref());
        let (bookstore, store_change) =
            reconcile_or_create(Bookstore::new(&record.store_name), existing_store.as_ref());
        let (listing, listing_change) = reconcile_or_create(
            StoreListing::from_record(record, &book, &bookstore),
            existing_listing.as_ref(),
        );

        let parsed = self.parser.parse(&record.retail_price, &record.promotional_price)?;

        let recorded_at = match storage.latest_price_point(&keys.listing)? {
            Some(last) if last.recorded_at > now => last.recorded_at,
            _ => now,
        };
        let price =
            PricePoint::new(parsed.retail, parsed.promotional, &parsed.currency, recorded_at);

        storage.upsert_book(&book)?;
        storage.upsert_bookstore(&bookstore)?;
        storage.upsert_listing(&listing)?;
        storage.append_price_point(&keys.listing, &price)?;

        tracing::debug!(
            hyperlink = keys.listing.as_str(),
            book = ?book_change,
            listing = ?listing_change,
            promotional = %price.promotional,
            "reconciled record"
        );

        Ok(ReconcileOutcome {
            listing: keys.listing,
            book: book_change,
            bookstore: store_change,
            listing_change,
            price,
        })
    }
}
