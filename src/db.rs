use crate::entities::{Book, Bookstore, PriceHistory, PricePoint, StoreListing};
use crate::error::PersistenceError;
use crate::identity::{BookKey, ListingKey, StoreKey};
use crate::storage::Storage;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Event for audit trail ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// A listing joined with its book, store and current price
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingSnapshot {
    pub book: Book,
    pub bookstore: Bookstore,
    pub listing: StoreListing,
    pub current: PricePoint,
}

/// A listing joined with its book, store and full price history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingHistory {
    pub book: Book,
    pub bookstore: Bookstore,
    pub listing: StoreListing,
    pub prices: PriceHistory,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageCounts {
    pub books: i64,
    pub bookstores: i64,
    pub listings: i64,
    pub price_points: i64,
}

pub fn setup_database(conn: &Connection) -> Result<(), PersistenceError> {
    // Enable WAL mode for crash recovery
    // journal_mode answers with the mode now in effect ("memory" for in-memory dbs)
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Books - identity (title_key, author_key), display text kept as first seen
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS books (
            title_key TEXT NOT NULL,
            author_key TEXT NOT NULL,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            subtitle TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (title_key, author_key)
        )",
        [],
    )?;

    // ==========================================================================
    // Bookstores
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS bookstores (
            name_key TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Store listings - one book at one store, identity = hyperlink
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS store_listings (
            hyperlink TEXT PRIMARY KEY,
            image_link TEXT NOT NULL DEFAULT '',
            book_title_key TEXT NOT NULL,
            book_author_key TEXT NOT NULL,
            bookstore_key TEXT NOT NULL REFERENCES bookstores(name_key),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (book_title_key, book_author_key)
                REFERENCES books(title_key, author_key)
        )",
        [],
    )?;

    // ==========================================================================
    // Price points - append-only history
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS price_points (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            listing_hyperlink TEXT NOT NULL REFERENCES store_listings(hyperlink),
            retail_price TEXT NOT NULL,
            promotional_price TEXT NOT NULL,
            currency TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_price_points_listing
         ON price_points(listing_hyperlink, recorded_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_listings_bookstore ON store_listings(bookstore_key)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<(), PersistenceError> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            format_timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>, PersistenceError> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], event_columns)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Get events of one type, newest first
pub fn get_events_by_type(
    conn: &Connection,
    event_type: &str,
) -> Result<Vec<Event>, PersistenceError> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE event_type = ?1
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map([event_type], event_columns)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SQLITE STORAGE
// ============================================================================

/// `Storage` on a single SQLite connection
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, PersistenceError> {
        setup_database(&conn)?;
        Ok(SqliteStorage { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    // ========================================================================
    // READ SIDE
    // ========================================================================

    /// Every listing with its current price
    pub fn latest_listings(&self) -> Result<Vec<ListingSnapshot>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT l.hyperlink, l.image_link, b.title, b.author, b.subtitle, s.name,
                    p.retail_price, p.promotional_price, p.currency, p.recorded_at
             FROM store_listings l
             JOIN books b ON b.title_key = l.book_title_key AND b.author_key = l.book_author_key
             JOIN bookstores s ON s.name_key = l.bookstore_key
             JOIN price_points p ON p.id = (
                 SELECT id FROM price_points
                 WHERE listing_hyperlink = l.hyperlink
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT 1
             )
             ORDER BY b.title, s.name, l.hyperlink",
        )?;

        let snapshots = stmt
            .query_map([], |row| {
                let (book, bookstore, listing) = listing_columns(row)?;
                Ok(ListingSnapshot {
                    book,
                    bookstore,
                    listing,
                    current: price_columns(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = snapshots.len(), "loaded latest listings");
        Ok(snapshots)
    }

    /// One listing with its full price history, `None` for an unknown hyperlink
    pub fn listing_history(
        &self,
        hyperlink: &str,
    ) -> Result<Option<ListingHistory>, PersistenceError> {
        let key = ListingKey::new(hyperlink);

        let header = self
            .conn
            .query_row(
                "SELECT l.hyperlink, l.image_link, b.title, b.author, b.subtitle, s.name
                 FROM store_listings l
                 JOIN books b ON b.title_key = l.book_title_key AND b.author_key = l.book_author_key
                 JOIN bookstores s ON s.name_key = l.bookstore_key
                 WHERE l.hyperlink = ?1",
                [key.as_str()],
                listing_columns,
            )
            .optional()?;

        let Some((book, bookstore, listing)) = header else {
            tracing::info!(hyperlink = key.as_str(), "no listing for hyperlink");
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT retail_price, promotional_price, currency, recorded_at
             FROM price_points
             WHERE listing_hyperlink = ?1
             ORDER BY recorded_at ASC, id ASC",
        )?;
        let points = stmt
            .query_map([key.as_str()], |row| price_columns(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ListingHistory {
            book,
            bookstore,
            listing,
            prices: PriceHistory::from_points(points),
        }))
    }

    /// Price in effect at `as_of`
    pub fn price_at(
        &self,
        hyperlink: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<PricePoint>, PersistenceError> {
        let point = self
            .conn
            .query_row(
                "SELECT retail_price, promotional_price, currency, recorded_at
                 FROM price_points
                 WHERE listing_hyperlink = ?1 AND recorded_at <= ?2
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT 1",
                params![ListingKey::new(hyperlink).as_str(), format_timestamp(&as_of)],
                |row| price_columns(row, 0),
            )
            .optional()?;

        Ok(point)
    }

    pub fn counts(&self) -> Result<StorageCounts, PersistenceError> {
        let count = |table: &str| -> Result<i64, PersistenceError> {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            Ok(self.conn.query_row(&sql, [], |row| row.get::<_, i64>(0))?)
        };

        Ok(StorageCounts {
            books: count("books")?,
            bookstores: count("bookstores")?,
            listings: count("store_listings")?,
            price_points: count("price_points")?,
        })
    }
}

impl Storage for SqliteStorage {
    fn begin(&mut self) -> Result<(), PersistenceError> {
        if self.in_transaction() {
            return Err(PersistenceError::Transaction("batch already open"));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PersistenceError> {
        if !self.in_transaction() {
            return Err(PersistenceError::Transaction("commit without an open batch"));
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), PersistenceError> {
        // SQLite may already have rolled back on its own after an error
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn find_book(&self, key: &BookKey) -> Result<Option<Book>, PersistenceError> {
        let book = self
            .conn
            .query_row(
                "SELECT title, author, subtitle FROM books
                 WHERE title_key = ?1 AND author_key = ?2",
                params![key.title(), key.author()],
                |row| {
                    Ok(Book {
                        title: row.get(0)?,
                        author: row.get(1)?,
                        subtitle: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(book)
    }

    fn find_bookstore(&self, key: &StoreKey) -> Result<Option<Bookstore>, PersistenceError> {
        let bookstore = self
            .conn
            .query_row(
                "SELECT name FROM bookstores WHERE name_key = ?1",
                [key.as_str()],
                |row| Ok(Bookstore { name: row.get(0)? }),
            )
            .optional()?;

        Ok(bookstore)
    }

    fn find_listing(&self, key: &ListingKey) -> Result<Option<StoreListing>, PersistenceError> {
        let listing = self
            .conn
            .query_row(
                "SELECT hyperlink, image_link, book_title_key, book_author_key, bookstore_key
                 FROM store_listings WHERE hyperlink = ?1",
                [key.as_str()],
                |row| {
                    let title_key: String = row.get(2)?;
                    let author_key: String = row.get(3)?;
                    let store_key: String = row.get(4)?;

                    Ok(StoreListing {
                        hyperlink: row.get(0)?,
                        image_link: row.get(1)?,
                        book: BookKey::new(&title_key, &author_key),
                        bookstore: StoreKey::new(&store_key),
                    })
                },
            )
            .optional()?;

        Ok(listing)
    }

    fn latest_price_point(&self, key: &ListingKey) -> Result<Option<PricePoint>, PersistenceError> {
        let point = self
            .conn
            .query_row(
                "SELECT retail_price, promotional_price, currency, recorded_at
                 FROM price_points
                 WHERE listing_hyperlink = ?1
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT 1",
                [key.as_str()],
                |row| price_columns(row, 0),
            )
            .optional()?;

        Ok(point)
    }

    fn upsert_book(&mut self, book: &Book) -> Result<(), PersistenceError> {
        let key = BookKey::new(&book.title, &book.author);
        let now = format_timestamp(&Utc::now());

        // identity columns are never rewritten
        self.conn.execute(
            "INSERT INTO books
                (title_key, author_key, title, author, subtitle, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(title_key, author_key) DO UPDATE SET
                subtitle = excluded.subtitle,
                updated_at = excluded.updated_at",
            params![key.title(), key.author(), book.title, book.author, book.subtitle, now],
        )?;

        Ok(())
    }

    fn upsert_bookstore(&mut self, bookstore: &Bookstore) -> Result<(), PersistenceError> {
        let key = StoreKey::new(&bookstore.name);

        self.conn.execute(
            "INSERT INTO bookstores (name_key, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name_key) DO NOTHING",
            params![key.as_str(), bookstore.name, format_timestamp(&Utc::now())],
        )?;

        Ok(())
    }

    fn upsert_listing(&mut self, listing: &StoreListing) -> Result<(), PersistenceError> {
        let now = format_timestamp(&Utc::now());

        self.conn.execute(
            "INSERT INTO store_listings (
                hyperlink, image_link, book_title_key, book_author_key, bookstore_key,
                created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(hyperlink) DO UPDATE SET
                image_link = excluded.image_link,
                book_title_key = excluded.book_title_key,
                book_author_key = excluded.book_author_key,
                bookstore_key = excluded.bookstore_key,
                updated_at = excluded.updated_at",
            params![
                ListingKey::new(&listing.hyperlink).as_str(),
                listing.image_link,
                listing.book.title(),
                listing.book.author(),
                listing.bookstore.as_str(),
                now,
            ],
        )?;

        Ok(())
    }

    fn append_price_point(
        &mut self,
        listing: &ListingKey,
        point: &PricePoint,
    ) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO price_points (
                listing_hyperlink, retail_price, promotional_price, currency, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                listing.as_str(),
                point.retail.to_string(),
                point.promotional.to_string(),
                point.currency,
                format_timestamp(&point.recorded_at),
            ],
        )?;

        Ok(())
    }

    fn record_event(&mut self, event: &Event) -> Result<(), PersistenceError> {
        insert_event(&self.conn, event)
    }
}

// ============================================================================
// ROW HELPERS
// ============================================================================

/// Fixed-width UTC timestamps so TEXT ordering matches time ordering
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn event_columns(row: &Row<'_>) -> rusqlite::Result<Event> {
    let data_json: String = row.get(5)?;

    Ok(Event {
        event_id: row.get(0)?,
        timestamp: timestamp_column(row, 1)?,
        event_type: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
        actor: row.get(6)?,
    })
}

/// retail, promotional, currency, recorded_at starting at `offset`
fn price_columns(row: &Row<'_>, offset: usize) -> rusqlite::Result<PricePoint> {
    Ok(PricePoint {
        retail: decimal_column(row, offset)?,
        promotional: decimal_column(row, offset + 1)?,
        currency: row.get(offset + 2)?,
        recorded_at: timestamp_column(row, offset + 3)?,
    })
}

/// hyperlink, image_link, title, author, subtitle, store name
fn listing_columns(row: &Row<'_>) -> rusqlite::Result<(Book, Bookstore, StoreListing)> {
    let hyperlink: String = row.get(0)?;
    let image_link: String = row.get(1)?;
    let book = Book {
        title: row.get(2)?,
        author: row.get(3)?,
        subtitle: row.get(4)?,
    };
    let bookstore = Bookstore { name: row.get(5)? };
    let listing = StoreListing::new(&hyperlink, &image_link, &book, &bookstore);

    Ok((book, bookstore, listing))
}
