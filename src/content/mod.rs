pub mod catalog;

pub use catalog::{load_catalog, Catalog, CatalogError};
