// Entity Models
// "Identity persists, values change"
//
// Each entity has:
// - An identity key that never changes once the row exists
// - Values that are refreshed on every sighting (subtitle, image link, ...)
// - Price history that only grows (PricePoint is immutable)

pub mod book;
pub mod bookstore;
pub mod listing;

pub use book::Book;
pub use bookstore::Bookstore;
pub use listing::{PriceHistory, PricePoint, StoreListing};

use serde::{Deserialize, Serialize};

/// An entity with a stable identity key
pub trait Entity {
    type Key: Eq;

    fn key(&self) -> Self::Key;

    /// Copy the canonical identity fields of an already-stored entity
    fn adopt_identity(&mut self, canonical: &Self);
}

/// What reconciliation did to one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityChange {
    Created,
    Merged,
}

/// Reconcile a freshly built candidate with what storage already holds
///
/// When `existing` has the same identity the candidate keeps its new values but
/// takes the stored identity text, so the upsert hits the same row.
pub fn reconcile_or_create<T: Entity>(mut candidate: T, existing: Option<&T>) -> (T, EntityChange) {
    match existing {
        Some(stored) if stored.key() == candidate.key() => {
            candidate.adopt_identity(stored);
            (candidate, EntityChange::Merged)
        }
        _ => (candidate, EntityChange::Created),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_or_create_without_existing() {
        let candidate = Bookstore::new("EMPIK");
        let (store, change) = reconcile_or_create(candidate, None);

        assert_eq!(change, EntityChange::Created);
        assert_eq!(store.name, "EMPIK");
    }

    #[test]
    fn test_reconcile_or_create_adopts_canonical_identity() {
        let stored = Book::new("Dune", "Frank Herbert", "");
        let candidate = Book::new("DUNE ", "Frank  Herbert", "Kroniki Diuny");

        let (book, change) = reconcile_or_create(candidate, Some(&stored));

        assert_eq!(change, EntityChange::Merged);
        assert_eq!(book.title, "Dune");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.subtitle, "Kroniki Diuny");
    }

    #[test]
    fn test_reconcile_or_create_ignores_different_identity() {
        let stored = Bookstore::new("PWN");
        let (store, change) = reconcile_or_create(Bookstore::new("EMPIK"), Some(&stored));

        assert_eq!(change, EntityChange::Created);
        assert_eq!(store.name, "EMPIK");
    }
}
