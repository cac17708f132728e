//! Resource status cache: which resources the signed-in user has marked.

pub mod cache;
pub mod lookup;

pub use cache::StatusCache;
pub use lookup::StatusLookup;
