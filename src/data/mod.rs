//! Data module - CSV and boundary loading

mod boundary;
mod loader;
mod model;

pub use boundary::BoundarySet;
pub use loader::{DataStore, LoaderError};
pub use model::{DatasetKind, PriceRecord, PropertyType};

#[cfg(test)]
pub(crate) use boundary::tests::{collection as geojson_collection, square_feature};
