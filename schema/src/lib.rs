//! Type declarations and metadata tables for the graphsync state codec.
//!
//! This crate describes the shapes that take part in replication:
//! - Declarations: [`TypeDef`] and [`FieldDef`] with primitive, nested-structure
//!   and collection field types, optional visibility tags and single inheritance
//! - A validated [`TypeRegistry`] holding one immutable [`Metadata`] table per type
//! - Deterministic schema hashing
//!
//! # Design Principles
//!
//! - **Runtime-first** - Types are declared at runtime; no derive macros.
//! - **Explicit registry** - Metadata lives in a registry passed by reference, never in globals.
//! - **Fail at definition** - Every authoring mistake is reported by [`TypeRegistryBuilder::build`].
//! - **Deterministic hashing** - Schema hash is stable given the same declarations.
//!
//! # Example
//!
//! ```
//! use schema::{ChildType, FieldDef, FieldType, PrimitiveType, TypeDef, TypeRegistry};
//!
//! let registry = TypeRegistry::builder()
//!     .register(TypeDef::new("Item").field(FieldDef::new("name", FieldType::string())))
//!     .register(
//!         TypeDef::new("State")
//!             .field(FieldDef::new("items", FieldType::array(ChildType::schema("Item"))))
//!             .field(FieldDef::new("tick", FieldType::primitive(PrimitiveType::UInt32))),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let state = registry.by_name("State").unwrap();
//! assert_eq!(state.field_index("tick"), Some(1));
//! ```

mod error;
mod field;
mod hash;
mod registry;

pub use error::{SchemaError, SchemaResult};
pub use field::{ChildType, CollectionKind, FieldDef, FieldType, PrimitiveType, ViewTag};
pub use hash::schema_hash;
pub use registry::{
    Field, ItemType, Metadata, TypeDef, TypeId, TypeRegistry, TypeRegistryBuilder, ValueType,
};

/// Maximum number of fields per type, inherited fields included.
pub const MAX_FIELDS: usize = 64;
