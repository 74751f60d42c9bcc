pub mod diagnostics;
pub mod ids;

// Foundation crate: small, well-tested primitives only.
pub use diagnostics::*;
pub use ids::*;
