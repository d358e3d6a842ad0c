pub mod app_config;
pub mod blob;
pub mod daraja;

pub use app_config::Config;
pub use blob::{FsBlobStore, InMemoryBlobStore};
pub use daraja::DarajaClient;
