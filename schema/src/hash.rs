//! Deterministic schema hashing.

use blake3::Hasher;

use crate::{CollectionKind, ItemType, TypeRegistry, ValueType};

/// Computes a deterministic 64-bit fingerprint of a registry.
///
/// Peers compare fingerprints to detect schema skew before exchanging state.
/// Type ids, field names, resolved field types and visibility tags all
/// contribute.
#[must_use]
pub fn schema_hash(registry: &TypeRegistry) -> u64 {
    let mut hasher = Hasher::new();
    write_len(&mut hasher, registry.len());

    for metadata in registry.iter() {
        write_u16(&mut hasher, metadata.id().raw());
        write_str(&mut hasher, metadata.name());
        match metadata.parent() {
            Some(parent) => {
                write_u8(&mut hasher, 1);
                write_u16(&mut hasher, parent.raw());
            }
            None => write_u8(&mut hasher, 0),
        }
        write_len(&mut hasher, metadata.len());

        for field in metadata.fields() {
            write_str(&mut hasher, &field.name);
            write_value_type(&mut hasher, field.ty);
            match field.tag {
                Some(tag) => {
                    write_u8(&mut hasher, 1);
                    write_u32(&mut hasher, tag.raw());
                }
                None => write_u8(&mut hasher, 0),
            }
        }
    }

    let hash = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(out)
}

fn write_value_type(hasher: &mut Hasher, ty: ValueType) {
    match ty {
        ValueType::Primitive(primitive) => {
            write_u8(hasher, 0);
            write_u8(hasher, primitive.code());
        }
        ValueType::Schema(id) => {
            write_u8(hasher, 1);
            write_u16(hasher, id.raw());
        }
        ValueType::Collection { kind, item } => {
            write_u8(hasher, 2);
            write_u8(hasher, kind_code(kind));
            match item {
                ItemType::Primitive(primitive) => {
                    write_u8(hasher, 0);
                    write_u8(hasher, primitive.code());
                }
                ItemType::Schema(id) => {
                    write_u8(hasher, 1);
                    write_u16(hasher, id.raw());
                }
            }
        }
    }
}

const fn kind_code(kind: CollectionKind) -> u8 {
    match kind {
        CollectionKind::Array => 0,
        CollectionKind::Map => 1,
        CollectionKind::Set => 2,
        CollectionKind::Collection => 3,
    }
}

fn write_str(hasher: &mut Hasher, value: &str) {
    write_len(hasher, value.len());
    hasher.update(value.as_bytes());
}

fn write_len(hasher: &mut Hasher, value: usize) {
    hasher.update(&(value as u64).to_le_bytes());
}

fn write_u8(hasher: &mut Hasher, value: u8) {
    hasher.update(&[value]);
}

fn write_u16(hasher: &mut Hasher, value: u16) {
    hasher.update(&value.to_le_bytes());
}

fn write_u32(hasher: &mut Hasher, value: u32) {
    hasher.update(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldDef, FieldType, PrimitiveType, TypeDef, ViewTag};

    fn registry(fields: Vec<FieldDef>) -> TypeRegistry {
        let mut def = TypeDef::new("State");
        def.fields = fields;
        TypeRegistry::builder().register(def).build().unwrap()
    }

    #[test]
    fn schema_hash_is_stable() {
        let fields = vec![
            FieldDef::new("a", FieldType::boolean()),
            FieldDef::new("b", FieldType::array(PrimitiveType::UInt8)),
        ];
        let first = registry(fields.clone());
        let second = registry(fields);
        assert_eq!(schema_hash(&first), schema_hash(&second));
    }

    #[test]
    fn schema_hash_changes_with_field_order() {
        let a = FieldDef::new("a", FieldType::boolean());
        let b = FieldDef::new("b", FieldType::number());
        let first = registry(vec![a.clone(), b.clone()]);
        let second = registry(vec![b, a]);
        assert_ne!(schema_hash(&first), schema_hash(&second));
    }

    #[test]
    fn schema_hash_changes_with_tag() {
        let plain = registry(vec![FieldDef::new("a", FieldType::string())]);
        let tagged = registry(vec![
            FieldDef::new("a", FieldType::string()).view_tag(ViewTag::new(3))
        ]);
        assert_ne!(schema_hash(&plain), schema_hash(&tagged));
    }

    #[test]
    fn schema_hash_changes_with_primitive_width() {
        let narrow = registry(vec![FieldDef::new("a", FieldType::primitive(PrimitiveType::Int8))]);
        let wide = registry(vec![FieldDef::new("a", FieldType::primitive(PrimitiveType::Int16))]);
        assert_ne!(schema_hash(&narrow), schema_hash(&wide));
    }
}
