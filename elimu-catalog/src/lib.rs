pub mod product;

pub use product::{CatalogError, CatalogReader, InMemoryCatalog, Product};
