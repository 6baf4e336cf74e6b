//! Role mapping store and its display formatter

pub mod mapping;
pub mod overview;

pub use mapping::{MappingTable, RoleMappings};
