//! Byte-level primitives for the graphsync state codec.
//!
//! This crate provides [`ByteWriter`] and [`ByteReader`] for the primitive value
//! encodings used on the wire: fixed-width little-endian integers and floats,
//! LEB128 varints, length-prefixed and nul-terminated UTF-8 strings, and the
//! self-describing [`Number`] kind.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - All reads are bounds-checked; writes past the
//!   writer's capacity are counted, never performed.
//! - **No domain knowledge** - This crate knows nothing about operations, schemas, or graphs.
//! - **Explicit errors** - All failures return structured errors, never panic.
//!
//! # Example
//!
//! ```
//! use bytestream::{ByteReader, ByteWriter};
//!
//! let mut writer = ByteWriter::new(16);
//! writer.write_varu32(300);
//! writer.write_string("hp");
//! assert!(!writer.overflowed());
//!
//! let mut reader = ByteReader::new(writer.as_bytes());
//! assert_eq!(reader.read_varu32().unwrap(), 300);
//! assert_eq!(reader.read_string().unwrap(), "hp");
//! ```

mod error;
mod number;
mod reader;
mod writer;

pub use error::{ByteError, ByteResult};
pub use number::Number;
pub use reader::ByteReader;
pub use writer::ByteWriter;
