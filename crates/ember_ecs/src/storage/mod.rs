//! Component and resource storage backends.
//!
//! Table storage keeps one column per component per archetype; sparse-set
//! storage keeps one set per component keyed by entity index. Resources are
//! a type-keyed singleton map. All three hand out raw pointers under the
//! scheduler's access-conflict discipline.

mod blob_vec;
mod resource;
mod sparse_set;
mod table;

pub(crate) use resource::Resources;
pub(crate) use sparse_set::SparseSets;
pub(crate) use table::Table;
