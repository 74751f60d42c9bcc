//! Resolution of configured layer entries and auto-tree catalog slices.

pub mod config;
pub mod filter;
pub mod resolver;
pub mod style;

pub use config::{ChildConfig, LayerConfigEntry, LayerRef, MalformedEntry};
pub use filter::{AutoTreeConfig, CatalogFilter};
pub use resolver::{LayerResolver, ResolverSettings, add_additional};
pub use style::StyleEntry;
