//! Layer tree construction for portals.

pub mod builder;
pub mod node;
pub mod portal;

pub use builder::*;
pub use node::*;
pub use portal::*;
