use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::book::Book;

/// Who a cart belongs to. Resolved once per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    Anonymous(String),
    Authenticated(Uuid),
}

impl CartOwner {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            CartOwner::Authenticated(id) => Some(*id),
            CartOwner::Anonymous(_) => None,
        }
    }
}

/// A line in a cart. At most one per book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartItem {
    pub book_id: Uuid,
    pub quantity: u32,
    /// Price captured when the book was first added
    pub price_at_addition: Decimal,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub owner: CartOwner,
    pub items: Vec<CartItem>,
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart line resolved against the live catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricedLine {
    pub book_id: Uuid,
    pub title: String,
    pub unit_price: Decimal,
    pub price_at_addition: Decimal,
    pub quantity: u32,
}

impl PricedLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    pub fn subtotal(lines: &[PricedLine]) -> Decimal {
        lines.iter().map(PricedLine::line_total).sum()
    }
}

/// Largest quantity one cart line may hold; quantities are stored as INTEGER.
pub const MAX_LINE_QUANTITY: u32 = i32::MAX as u32;

impl Cart {
    pub fn new(owner: CartOwner) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner,
            items: Vec::new(),
            coupon_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a book, or bump (or replace, with `update_quantity`) the existing line.
    pub fn add(&mut self, book: &Book, quantity: u32, update_quantity: bool) -> Result<&CartItem, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityTooLarge(u64::from(quantity)));
        }

        let position = self.items.iter().position(|i| i.book_id == book.id);
        let target = match position {
            Some(index) if !update_quantity => {
                let current = self.items[index].quantity;
                current
                    .checked_add(quantity)
                    .filter(|q| *q <= MAX_LINE_QUANTITY)
                    .ok_or(CartError::QuantityTooLarge(u64::from(current) + u64::from(quantity)))?
            }
            _ => quantity,
        };

        self.updated_at = Utc::now();

        let index = match position {
            Some(index) => {
                self.items[index].quantity = target;
                index
            }
            None => {
                self.items.push(CartItem {
                    book_id: book.id,
                    quantity,
                    price_at_addition: book.current_price,
                    added_at: self.updated_at,
                });
                self.items.len() - 1
            }
        };

        Ok(&self.items[index])
    }

    pub fn remove(&mut self, book_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.book_id != book_id);
        self.updated_at = Utc::now();
        before != self.items.len()
    }

    /// Empty the cart and forget the applied coupon (post-checkout state).
    pub fn clear(&mut self) {
        self.items.clear();
        self.coupon_code = None;
        self.updated_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_items(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn book_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|i| i.book_id).collect()
    }

    /// Fold an anonymous cart into this one. Quantities are summed up to
    /// `MAX_LINE_QUANTITY`; lines new to this cart keep the price captured in the other cart.
    pub fn merge_from(&mut self, other: Cart) {
        for incoming in other.items {
            match self.items.iter_mut().find(|i| i.book_id == incoming.book_id) {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .saturating_add(incoming.quantity)
                        .min(MAX_LINE_QUANTITY);
                }
                None => self.items.push(incoming),
            }
        }
        if self.coupon_code.is_none() {
            self.coupon_code = other.coupon_code;
        }
        self.updated_at = Utc::now();
    }

    /// Price every line at the book's current catalog price.
    pub fn price(&self, books: &[Book]) -> Result<Vec<PricedLine>, CartError> {
        let by_id: HashMap<Uuid, &Book> = books.iter().map(|b| (b.id, b)).collect();

        self.items
            .iter()
            .map(|item| {
                let book = by_id
                    .get(&item.book_id)
                    .ok_or(CartError::BookMissing(item.book_id))?;
                Ok(PricedLine {
                    book_id: book.id,
                    title: book.title.clone(),
                    unit_price: book.current_price,
                    price_at_addition: item.price_at_addition,
                    quantity: item.quantity,
                })
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),

    #[error("Quantity {0} exceeds the per-line limit")]
    QuantityTooLarge(u64),

    #[error("Book {0} is no longer in the catalog")]
    BookMissing(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, cents: i64) -> Book {
        Book {
            id: Uuid::new_v4(),
            title: title.to_string(),
            current_price: Decimal::new(cents, 2),
            stock: 10,
        }
    }

    #[test]
    fn test_one_line_per_book() {
        let mut cart = Cart::new(CartOwner::Anonymous("sess-1".to_string()));
        let dune = book("Dune", 1500);

        cart.add(&dune, 1, false).unwrap();
        cart.add(&dune, 2, false).unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.total_items(), 3);

        // Replace instead of sum
        cart.add(&dune, 5, true).unwrap();
        assert_eq!(cart.total_items(), 5);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut cart = Cart::new(CartOwner::Anonymous("sess-1".to_string()));
        let result = cart.add(&book("Dune", 1500), 0, false);
        assert!(matches!(result, Err(CartError::InvalidQuantity(0))));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_quantity_overflow_rejected() {
        let mut cart = Cart::new(CartOwner::Anonymous("sess-1".to_string()));
        let dune = book("Dune", 1500);

        let result = cart.add(&dune, u32::MAX, false);
        assert!(matches!(result, Err(CartError::QuantityTooLarge(_))));
        assert!(cart.is_empty());

        cart.add(&dune, MAX_LINE_QUANTITY, false).unwrap();
        let result = cart.add(&dune, 1, false);
        assert!(matches!(result, Err(CartError::QuantityTooLarge(n)) if n == u64::from(MAX_LINE_QUANTITY) + 1));
        assert_eq!(cart.total_items(), MAX_LINE_QUANTITY);

        // Replacing stays allowed at the limit
        cart.add(&dune, 3, true).unwrap();
        assert_eq!(cart.total_items(), 3);
    }

    #[test]
    fn test_merge_saturates_at_line_limit() {
        let dune = book("Dune", 1500);
        let mut user_cart = Cart::new(CartOwner::Authenticated(Uuid::new_v4()));
        user_cart.add(&dune, MAX_LINE_QUANTITY, false).unwrap();

        let mut anon = Cart::new(CartOwner::Anonymous("sess-9".to_string()));
        anon.add(&dune, 5, false).unwrap();

        user_cart.merge_from(anon);
        assert_eq!(user_cart.items[0].quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_price_uses_current_catalog_price() {
        let mut cart = Cart::new(CartOwner::Authenticated(Uuid::new_v4()));
        let mut dune = book("Dune", 1500);
        cart.add(&dune, 2, false).unwrap();

        // Catalog reprices after the book was added
        dune.current_price = Decimal::new(1200, 2);
        let lines = cart.price(&[dune]).unwrap();

        assert_eq!(lines[0].unit_price, Decimal::new(1200, 2));
        assert_eq!(lines[0].price_at_addition, Decimal::new(1500, 2));
        assert_eq!(PricedLine::subtotal(&lines), Decimal::new(2400, 2));
    }

    #[test]
    fn test_price_fails_for_missing_book() {
        let mut cart = Cart::new(CartOwner::Anonymous("sess-1".to_string()));
        let dune = book("Dune", 1500);
        cart.add(&dune, 1, false).unwrap();

        let result = cart.price(&[]);
        assert!(matches!(result, Err(CartError::BookMissing(id)) if id == dune.id));
    }

    #[test]
    fn test_merge_sums_quantities() {
        let user = Uuid::new_v4();
        let dune = book("Dune", 1500);
        let emma = book("Emma", 900);

        let mut user_cart = Cart::new(CartOwner::Authenticated(user));
        user_cart.add(&dune, 1, false).unwrap();

        let mut anon = Cart::new(CartOwner::Anonymous("sess-9".to_string()));
        anon.add(&dune, 2, false).unwrap();
        anon.add(&emma, 1, false).unwrap();
        anon.coupon_code = Some("WELCOME".to_string());

        user_cart.merge_from(anon);

        assert_eq!(user_cart.items.len(), 2);
        assert_eq!(user_cart.total_items(), 4);
        assert_eq!(user_cart.coupon_code.as_deref(), Some("WELCOME"));
        assert_eq!(user_cart.owner, CartOwner::Authenticated(user));
    }

    #[test]
    fn test_clear_drops_coupon() {
        let mut cart = Cart::new(CartOwner::Anonymous("sess-1".to_string()));
        cart.add(&book("Dune", 1500), 1, false).unwrap();
        cart.coupon_code = Some("WELCOME".to_string());

        cart.clear();

        assert!(cart.is_empty());
        assert!(cart.coupon_code.is_none());
    }
}
