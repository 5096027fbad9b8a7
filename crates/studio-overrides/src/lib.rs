//! Layered override configuration.
//!
//! A configuration document is an immutable defaults tree plus an ordered
//! log of `Set`/`Delete` operations. The effective value is never stored;
//! it is recomputed from the pair on every read.

mod helper;
mod op;
mod path;
mod resolve;
mod wrapped;

pub use helper::{OverrideOpBatch, OverrideOpHelper};
pub use op::{generate_op_id, ObjectWithOverrides, OverrideOp};
pub use path::{OverridePath, PathSegment};
pub use resolve::{apply_op, lookup, resolve, resolve_with_report, set_value_at, ResolvedOverrides};
pub use wrapped::{
    item_rank, resolve_all_items, resolve_item, OverrideIndex, Provenance, WrappedItem, RANK_FIELD,
};
