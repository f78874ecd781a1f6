//! Deterministic catalog generator for the in-memory store.
//!
//! The same sizes always produce the same users, products and prices, so
//! runs against a `MockStore` are comparable across modes.

use serde::{Deserialize, Serialize};
use testbed_core::{Cents, Product, ProductId, StorageResult, User, UserId};

use crate::mock::MockStore;

const CATEGORIES: &[&str] = &[
    "books", "electronics", "garden", "kitchen", "outdoors", "sports", "toys", "office",
];

const NOUNS: &[&str] = &[
    "Lamp", "Chair", "Kettle", "Backpack", "Notebook", "Speaker", "Tent", "Racket", "Puzzle",
    "Blender",
];

const ADJECTIVES: &[&str] = &["Classic", "Compact", "Deluxe", "Eco", "Pro", "Rustic", "Smart"];

/// Catalog dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSeed {
    pub users: usize,
    pub products: usize,
}

impl Default for CatalogSeed {
    /// Matches the load generator's id ranges.
    fn default() -> Self {
        Self {
            users: 1_000,
            products: 50_000,
        }
    }
}

/// Product with the given 1-based id.
pub fn seeded_product(id: ProductId) -> Product {
    let n = id.unsigned_abs() as usize;
    Product {
        id,
        name: format!(
            "{} {} {}",
            ADJECTIVES[n % ADJECTIVES.len()],
            NOUNS[n % NOUNS.len()],
            id
        ),
        category: CATEGORIES[n % CATEGORIES.len()].to_string(),
        price_cents: seeded_price(id),
    }
}

/// Price between 0.99 and 500.98, spread by a multiplicative hash.
pub fn seeded_price(id: ProductId) -> Cents {
    (id.wrapping_mul(7_919)).rem_euclid(50_000) + 99
}

/// User with the given 1-based id.
pub fn seeded_user(id: UserId) -> User {
    User {
        id,
        name: format!("User {}", id),
        email: format!("user{}@example.com", id),
    }
}

impl MockStore {
    /// Fill the store with a deterministic catalog.
    pub fn seed(&self, seed: CatalogSeed) -> StorageResult<()> {
        for id in 1..=seed.users as UserId {
            self.insert_user(seeded_user(id))?;
        }
        for id in 1..=seed.products as ProductId {
            self.insert_product(seeded_product(id))?;
        }
        tracing::info!(
            users = seed.users,
            products = seed.products,
            "Seeded in-memory catalog"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataStore;

    #[test]
    fn test_seed_is_deterministic() {
        assert_eq!(seeded_product(17), seeded_product(17));
        assert_ne!(seeded_product(17).name, seeded_product(18).name);
        for id in 1..=500 {
            let price = seeded_price(id);
            assert!((99..50_099).contains(&price));
        }
    }

    #[tokio::test]
    async fn test_seed_populates_store() {
        let store = MockStore::new();
        store.seed(CatalogSeed { users: 3, products: 20 }).unwrap();

        assert_eq!(store.find_user(3).await.unwrap(), Some(seeded_user(3)));
        assert!(store.find_user(4).await.unwrap().is_none());
        assert_eq!(store.search_products("", None).await.unwrap().len(), 20);
    }
}
