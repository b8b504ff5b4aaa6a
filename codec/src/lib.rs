//! Change tracking and incremental encoding of replicated object graphs.
//!
//! This is the main codec crate that ties together bytestream, wire, and schema:
//! - [`State`]: the authoritative graph of schema instances and collections,
//!   recording every mutation as a pending operation
//! - [`Encoder`]: turns pending operations into compact patches, or the whole
//!   state into a full snapshot for a joining peer
//! - [`View`]: per-viewer visibility over tagged fields and filtered subtrees
//! - [`Decoder`]: applies patches to a decode-only graph, preserving node
//!   identity and reporting every effective change
//!
//! # Design Principles
//!
//! - **Explicit mutation** - Every change goes through a `State` method; there
//!   is no interception.
//! - **Arena ownership** - Nodes live in an arena and are addressed by
//!   generational [`NodeId`]s. Views hold ids, never nodes.
//! - **Authoring errors are loud** - Wrong kinds, out-of-range values and
//!   misplaced structures fail at the mutation.
//! - **Decoding never fails** - Streams that do not match local definitions
//!   are logged, counted and skipped.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use codec::{Decoder, Encoder, State};
//! use schema::{FieldDef, FieldType, TypeDef, TypeRegistry};
//!
//! let registry = Arc::new(
//!     TypeRegistry::builder()
//!         .register(TypeDef::new("Room").field(FieldDef::new("round", FieldType::number())))
//!         .build()
//!         .unwrap(),
//! );
//!
//! let mut encoder = Encoder::new(State::new(Arc::clone(&registry), "Room").unwrap());
//! let root = encoder.state().root();
//! encoder.state_mut().set(root, "round", 3).unwrap();
//!
//! let mut decoder = Decoder::new(registry, "Room").unwrap();
//! let changes = decoder.decode(encoder.encode());
//! assert_eq!(changes.len(), 1);
//! assert_eq!(decoder.snapshot(), encoder.state().snapshot());
//! ```

mod arena;
mod array;
mod change_set;
mod change_tree;
mod decoder;
mod encoder;
mod error;
mod limits;
mod map;
mod node;
mod root;
mod set;
mod snapshot;
mod state;
mod types;
mod value;
mod view;

pub use array::ArrayMut;
pub use decoder::{ChangeTarget, DataChange, DecodedGraph, Decoder};
pub use encoder::Encoder;
pub use error::{CodecError, CodecResult, MismatchReason, ValueReason};
pub use limits::CodecLimits;
pub use map::MapMut;
pub use set::SetMut;
pub use snapshot::Snapshot;
pub use state::State;
pub use types::{NodeId, NodeKind, RefId};
pub use value::Value;
pub use view::View;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let _ = CodecLimits::default();
        let _ = View::new();
        let _ = RefId::ROOT;
        let _ = Value::from(1);
        let _: CodecResult<()> = Ok(());
    }

    #[test]
    fn root_ref_id_display() {
        assert_eq!(RefId::ROOT.to_string(), "@0");
        assert_eq!(NodeKind::Collection.to_string(), "collection");
    }
}
