//! Operation headers and structure sentinels.
//!
//! Schema fields use a compressed header: `op | (index & 0x3F)` in one byte.
//! Collection items use an uncompressed header: the op byte followed by a
//! varint slot index (or, for the by-ref-id ops, a varint ref id).

use bytestream::{ByteReader, ByteWriter};

use crate::error::{WireError, WireResult};
use crate::Operation;

/// Sentinel that opens a new structure section; followed by a varint ref id.
pub const SWITCH_TO_STRUCTURE: u8 = 255;

/// Sentinel placed right after a ref id on ADD; followed by a varint type id.
pub const TYPE_ID: u8 = 213;

/// Maximum number of fields per schema type.
pub const MAX_FIELDS: usize = 64;

/// Mask selecting the field index from a compressed header.
pub const FIELD_INDEX_MASK: u8 = 0x3F;

/// Builds the compressed header byte for a schema field operation.
///
/// Returns the byte and the operation it actually encodes. A
/// `DELETE_AND_ADD` whose byte would equal a sentinel (fields 21 and 63) is
/// sent as `ADD`; decoders treat an ADD over a different previous structure as
/// a replacement, so the result is the same.
pub fn field_op_byte(op: Operation, index: usize) -> WireResult<(u8, Operation)> {
    if !op.is_field_operation() {
        return Err(WireError::NotFieldOperation { op });
    }
    let index = u8::try_from(index)
        .ok()
        .filter(|index| usize::from(*index) < MAX_FIELDS)
        .ok_or(WireError::IndexOutOfRange {
            index,
            max: MAX_FIELDS - 1,
        })?;
    let byte = op.raw() | index;
    if byte == SWITCH_TO_STRUCTURE || byte == TYPE_ID {
        return Ok((Operation::Add.raw() | index, Operation::Add));
    }
    Ok((byte, op))
}

/// Splits a compressed header byte into its operation and field index.
#[must_use]
pub fn split_field_op_byte(byte: u8) -> (Operation, u8) {
    let op = match byte & !FIELD_INDEX_MASK {
        0x40 => Operation::Delete,
        0x80 => Operation::Add,
        0xC0 => Operation::DeleteAndAdd,
        _ => Operation::Replace,
    };
    (op, byte & FIELD_INDEX_MASK)
}

/// Writes a compressed field header, returning the operation written.
pub fn write_field_op(
    writer: &mut ByteWriter,
    op: Operation,
    index: usize,
) -> WireResult<Operation> {
    let (byte, written) = field_op_byte(op, index)?;
    writer.write_u8(byte);
    Ok(written)
}

/// Writes an uncompressed item header: op byte + varint index or ref id.
pub fn write_item_op(writer: &mut ByteWriter, op: Operation, index: u32) {
    writer.write_u8(op.raw());
    writer.write_varu32(index);
}

/// Writes an index-less operation (CLEAR, REVERSE).
pub fn write_pure_op(writer: &mut ByteWriter, op: Operation) {
    writer.write_u8(op.raw());
}

/// Writes a structure switch: sentinel + varint ref id.
pub fn write_switch(writer: &mut ByteWriter, ref_id: u32) {
    writer.write_u8(SWITCH_TO_STRUCTURE);
    writer.write_varu32(ref_id);
}

/// Writes a type-id override: sentinel + varint type id.
pub fn write_type_id(writer: &mut ByteWriter, type_id: u32) {
    writer.write_u8(TYPE_ID);
    writer.write_varu32(type_id);
}

/// A parsed uncompressed item header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemHeader {
    /// CLEAR or REVERSE.
    Pure(Operation),
    /// Operation addressed by ref id (ADD_BY_REFID, DELETE_BY_REFID).
    ByRefId { op: Operation, ref_id: u32 },
    /// Operation addressed by slot index.
    Indexed { op: Operation, index: u32 },
}

/// Reads an uncompressed item header.
pub fn read_item_header(reader: &mut ByteReader<'_>) -> WireResult<ItemHeader> {
    let byte = reader.read_u8()?;
    let op = Operation::from_raw(byte).ok_or(WireError::UnknownOperation { byte })?;
    if op.is_pure() {
        return Ok(ItemHeader::Pure(op));
    }
    let value = reader.read_varu32()?;
    Ok(match op {
        Operation::AddByRefId | Operation::DeleteByRefId => ItemHeader::ByRefId { op, ref_id: value },
        _ => ItemHeader::Indexed { op, index: value },
    })
}
