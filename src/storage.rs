// 🗄️ Storage - the persistence seam used by reconciliation
//
// Point lookups return `Ok(None)` for "not stored yet"; that is the signal to
// create, never an error. Writes are insert-or-update by identity.
// begin/commit/rollback scope one batch; a batch is all-or-nothing.

use crate::db::Event;
use crate::entities::{Book, Bookstore, PricePoint, StoreListing};
use crate::error::PersistenceError;
use crate::identity::{BookKey, ListingKey, StoreKey};

pub trait Storage {
    fn begin(&mut self) -> Result<(), PersistenceError>;
    fn commit(&mut self) -> Result<(), PersistenceError>;
    fn rollback(&mut self) -> Result<(), PersistenceError>;

    fn find_book(&self, key: &BookKey) -> Result<Option<Book>, PersistenceError>;
    fn find_bookstore(&self, key: &StoreKey) -> Result<Option<Bookstore>, PersistenceError>;
    fn find_listing(&self, key: &ListingKey) -> Result<Option<StoreListing>, PersistenceError>;

    /// Most recent PricePoint of a listing
    fn latest_price_point(&self, key: &ListingKey) -> Result<Option<PricePoint>, PersistenceError>;

    fn upsert_book(&mut self, book: &Book) -> Result<(), PersistenceError>;
    fn upsert_bookstore(&mut self, bookstore: &Bookstore) -> Result<(), PersistenceError>;

    /// Book and bookstore referenced by the listing must already be stored
    fn upsert_listing(&mut self, listing: &StoreListing) -> Result<(), PersistenceError>;

    fn append_price_point(
        &mut self,
        listing: &ListingKey,
        point: &PricePoint,
    ) -> Result<(), PersistenceError>;

    /// Audit trail; stores without one ignore events
    fn record_event(&mut self, _event: &Event) -> Result<(), PersistenceError> {
        Ok(())
    }
}
