//! Queries over entities and their components.

mod access;
mod fetch;
mod filter;
mod state;

pub use access::Access;
pub use fetch::{QueryData, ReadOnlyQueryData};
pub use filter::{Added, Changed, QueryFilter, With, Without};
pub use state::{QueryEntityError, QueryIter, QueryState};
