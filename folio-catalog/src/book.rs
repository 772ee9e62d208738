use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable book as the catalog currently prices it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub current_price: Decimal,
    pub stock: i32,
}

/// Read-only access to the live catalog
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_book(&self, id: Uuid) -> Result<Option<Book>, CatalogError>;

    /// Resolve many books at once. Unknown ids are simply absent from the result.
    async fn get_books(&self, ids: &[Uuid]) -> Result<Vec<Book>, CatalogError> {
        let mut books = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(book) = self.get_book(*id).await? {
                books.push(book);
            }
        }
        Ok(books)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}
