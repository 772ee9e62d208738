use async_trait::async_trait;
use folio_catalog::{Book, CatalogError, CatalogService};
use sqlx::PgPool;
use uuid::Uuid;

/// Catalog reads backed by the `books` table
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookRow {
    id: Uuid,
    title: String,
    current_price: rust_decimal::Decimal,
    stock: i32,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Book {
            id: row.id,
            title: row.title,
            current_price: row.current_price,
            stock: row.stock,
        }
    }
}

#[async_trait]
impl CatalogService for PgCatalog {
    async fn get_book(&self, id: Uuid) -> Result<Option<Book>, CatalogError> {
        let row: Option<BookRow> = sqlx::query_as("SELECT id, title, current_price, stock FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        Ok(row.map(Book::from))
    }

    async fn get_books(&self, ids: &[Uuid]) -> Result<Vec<Book>, CatalogError> {
        let rows: Vec<BookRow> =
            sqlx::query_as("SELECT id, title, current_price, stock FROM books WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        Ok(rows.into_iter().map(Book::from).collect())
    }
}
