// 🏪 Bookstore Entity - identity is the display name

use super::Entity;
use crate::identity::{tidy, StoreKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookstore {
    pub name: String,
}

impl Bookstore {
    pub fn new(name: &str) -> Self {
        Bookstore { name: tidy(name) }
    }
}

impl Entity for Bookstore {
    type Key = StoreKey;

    fn key(&self) -> StoreKey {
        StoreKey::new(&self.name)
    }

    fn adopt_identity(&mut self, canonical: &Bookstore) {
        self.name = canonical.name.clone();
    }
}
