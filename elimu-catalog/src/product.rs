use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A purchasable digital resource as the order pipeline sees it: price,
/// title and the opaque reference to the deliverable file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub unit_price_cents: i64,
    pub is_active: bool,
    /// Opaque key into the blob store.
    pub content_ref: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Product {
    pub fn new(title: impl Into<String>, unit_price_cents: i64, content_ref: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            unit_price_cents,
            is_active: true,
            content_ref: content_ref.into(),
            created_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog lookup failed: {0}")]
    LookupFailed(String),
}

/// Read-only product resolution, a consistent snapshot per call.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, CatalogError>;
}

/// In-memory catalog used by tests and the dev server.
pub struct InMemoryCatalog {
    products: RwLock<HashMap<Uuid, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, product: Product) -> Uuid {
        let id = product.id;
        self.products.write().await.insert(id, product);
        id
    }

    /// Change the listed price. Placed orders keep their snapshot.
    pub async fn set_price(&self, id: Uuid, unit_price_cents: i64) {
        if let Some(p) = self.products.write().await.get_mut(&id) {
            p.unit_price_cents = unit_price_cents;
        }
    }

    pub async fn deactivate(&self, id: Uuid) {
        if let Some(p) = self.products.write().await.get_mut(&id) {
            p.is_active = false;
        }
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, CatalogError> {
        Ok(self.products.read().await.get(&id).cloned())
    }
}
