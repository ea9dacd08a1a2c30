pub mod error;
pub mod stocks;
