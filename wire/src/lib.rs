//! Operation vocabulary and framing for the graphsync state codec.
//!
//! A state delta is a sequence of structure sections. This crate owns the
//! byte-level shape of those sections: the [`Operation`] codes, the two
//! reserved sentinels, and the compressed (schema field) and uncompressed
//! (collection item) operation headers. It does not know about schemas or
//! object graphs.
//!
//! # Design Principles
//!
//! - **Stable wire format** - Operation byte values are fixed; see `WIRE_FORMAT.md`.
//! - **Sentinel safety** - No compressed operation byte ever equals a sentinel.
//! - **No domain knowledge** - This crate handles framing, not state.

mod error;
mod frame;
mod operation;

pub use error::{WireError, WireResult};
pub use frame::{
    field_op_byte, read_item_header, split_field_op_byte, write_field_op, write_item_op,
    write_pure_op, write_switch, write_type_id, ItemHeader, FIELD_INDEX_MASK, MAX_FIELDS,
    SWITCH_TO_STRUCTURE, TYPE_ID,
};
pub use operation::Operation;
