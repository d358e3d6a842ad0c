pub mod blob;
pub mod payment;
