// 📚 Book Entity
//
// Identity: (title, author) - fixed at first sighting
// Value: subtitle - refreshed on every sighting

use super::Entity;
use crate::identity::{tidy, BookKey};
use crate::record::ScrapedRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub subtitle: String,
}

impl Book {
    pub fn new(title: &str, author: &str, subtitle: &str) -> Self {
        Book {
            title: tidy(title),
            author: tidy(author),
            subtitle: tidy(subtitle),
        }
    }

    pub fn from_record(record: &ScrapedRecord) -> Self {
        Book::new(&record.title, &record.author, &record.subtitle)
    }
}

impl Entity for Book {
    type Key = BookKey;

    fn key(&self) -> BookKey {
        BookKey::new(&self.title, &self.author)
    }

    fn adopt_identity(&mut self, canonical: &Book) {
        self.title = canonical.title.clone();
        self.author = canonical.author.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_from_record_tidies_text() {
        let record = ScrapedRecord::new(" Dune\n", "Frank  Herbert", "/dune", "EMPIK")
            .with_subtitle(" Kroniki   Diuny ");
        let book = Book::from_record(&record);

        assert_eq!(book.title, "Dune");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.subtitle, "Kroniki Diuny");
        assert_eq!(book.key(), BookKey::new("dune", "frank herbert"));
    }
}
