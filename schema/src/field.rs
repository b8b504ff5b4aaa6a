//! Field declarations: primitive kinds, collection kinds and visibility tags.

/// The wire representation of a primitive field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PrimitiveType {
    /// UTF-8, varint byte-length prefix.
    String,
    /// UTF-8, nul terminated.
    CString,
    /// Self-describing number (smallest integer encoding, or `f64`).
    Number,
    Boolean,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    /// 64-bit signed integer, distinct wire kind.
    BigInt64,
    /// 64-bit unsigned integer, distinct wire kind.
    BigUInt64,
    /// Zigzag LEB128 signed integer.
    VarInt,
    /// LEB128 unsigned integer.
    VarUInt,
}

impl PrimitiveType {
    /// Returns the declaration name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::CString => "cstring",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::BigInt64 => "bigint64",
            Self::BigUInt64 => "biguint64",
            Self::VarInt => "varint",
            Self::VarUInt => "varuint",
        }
    }

    /// Returns `true` for kinds that carry numbers.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        !matches!(self, Self::String | Self::CString | Self::Boolean)
    }

    /// Returns the inclusive integer range for integer kinds.
    #[must_use]
    pub const fn integer_range(self) -> Option<(i128, i128)> {
        Some(match self {
            Self::Int8 => (i8::MIN as i128, i8::MAX as i128),
            Self::UInt8 => (0, u8::MAX as i128),
            Self::Int16 => (i16::MIN as i128, i16::MAX as i128),
            Self::UInt16 => (0, u16::MAX as i128),
            Self::Int32 => (i32::MIN as i128, i32::MAX as i128),
            Self::UInt32 => (0, u32::MAX as i128),
            Self::Int64 | Self::BigInt64 | Self::VarInt => (i64::MIN as i128, i64::MAX as i128),
            Self::UInt64 | Self::BigUInt64 | Self::VarUInt => (0, u64::MAX as i128),
            _ => return None,
        })
    }

    /// Stable code used by schema hashing.
    pub(crate) const fn code(self) -> u8 {
        self as u8
    }
}

/// The kind of a collection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CollectionKind {
    /// Ordered slots; the slot position is the field index.
    Array,
    /// String keys with synthetic field indexes.
    Map,
    /// Unique values with synthetic field indexes.
    Set,
    /// Ordered values, duplicates allowed, synthetic field indexes.
    Collection,
}

impl CollectionKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::Map => "map",
            Self::Set => "set",
            Self::Collection => "collection",
        }
    }
}

/// The declared item type of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ChildType {
    Primitive(PrimitiveType),
    /// A schema type, by name.
    Schema(String),
}

impl ChildType {
    /// Item type referring to a schema type by name.
    #[must_use]
    pub fn schema(name: impl Into<String>) -> Self {
        Self::Schema(name.into())
    }
}

impl From<PrimitiveType> for ChildType {
    fn from(primitive: PrimitiveType) -> Self {
        Self::Primitive(primitive)
    }
}

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FieldType {
    Primitive(PrimitiveType),
    /// A nested schema instance, by type name. Subtypes are accepted.
    Schema(String),
    Collection {
        kind: CollectionKind,
        child: ChildType,
    },
}

impl FieldType {
    #[must_use]
    pub const fn primitive(primitive: PrimitiveType) -> Self {
        Self::Primitive(primitive)
    }

    #[must_use]
    pub const fn string() -> Self {
        Self::Primitive(PrimitiveType::String)
    }

    #[must_use]
    pub const fn number() -> Self {
        Self::Primitive(PrimitiveType::Number)
    }

    #[must_use]
    pub const fn boolean() -> Self {
        Self::Primitive(PrimitiveType::Boolean)
    }

    /// Nested schema instance of the named type.
    #[must_use]
    pub fn schema(name: impl Into<String>) -> Self {
        Self::Schema(name.into())
    }

    #[must_use]
    pub fn array(child: impl Into<ChildType>) -> Self {
        Self::collection_of(CollectionKind::Array, child)
    }

    #[must_use]
    pub fn map(child: impl Into<ChildType>) -> Self {
        Self::collection_of(CollectionKind::Map, child)
    }

    #[must_use]
    pub fn set(child: impl Into<ChildType>) -> Self {
        Self::collection_of(CollectionKind::Set, child)
    }

    #[must_use]
    pub fn collection(child: impl Into<ChildType>) -> Self {
        Self::collection_of(CollectionKind::Collection, child)
    }

    fn collection_of(kind: CollectionKind, child: impl Into<ChildType>) -> Self {
        Self::Collection {
            kind,
            child: child.into(),
        }
    }
}

/// A visibility tag restricting a field to views granted that tag.
///
/// [`ViewTag::DEFAULT`] marks a field visible to every view in which the
/// owning node is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ViewTag(pub u32);

impl ViewTag {
    pub const DEFAULT: Self = Self(0);

    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl Default for ViewTag {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A field declaration. Field indexes follow declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDef {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub ty: FieldType,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub tag: Option<ViewTag>,
}

impl FieldDef {
    /// Creates an untagged field.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            tag: None,
        }
    }

    /// Restricts the field to views in which the owning node is visible.
    #[must_use]
    pub fn view(self) -> Self {
        self.view_tag(ViewTag::DEFAULT)
    }

    /// Restricts the field to views holding `tag` on the owning node.
    #[must_use]
    pub fn view_tag(mut self, tag: ViewTag) -> Self {
        self.tag = Some(tag);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_constructors() {
        let field = FieldDef::new("hp", FieldType::primitive(PrimitiveType::UInt8));
        assert_eq!(field.name, "hp");
        assert_eq!(field.tag, None);
        assert_eq!(field.view().tag, Some(ViewTag::DEFAULT));
    }

    #[test]
    fn collection_constructors() {
        let ty = FieldType::map(ChildType::schema("Player"));
        assert_eq!(
            ty,
            FieldType::Collection {
                kind: CollectionKind::Map,
                child: ChildType::Schema("Player".to_owned()),
            }
        );
        let ty = FieldType::set(PrimitiveType::Int32);
        assert!(matches!(
            ty,
            FieldType::Collection {
                kind: CollectionKind::Set,
                child: ChildType::Primitive(PrimitiveType::Int32),
            }
        ));
    }

    #[test]
    fn integer_ranges() {
        assert_eq!(PrimitiveType::UInt8.integer_range(), Some((0, 255)));
        assert_eq!(PrimitiveType::Int16.integer_range(), Some((-32768, 32767)));
        assert_eq!(PrimitiveType::Float32.integer_range(), None);
        assert_eq!(PrimitiveType::Number.integer_range(), None);
    }

    #[test]
    fn numeric_kinds() {
        assert!(PrimitiveType::Number.is_numeric());
        assert!(PrimitiveType::VarUInt.is_numeric());
        assert!(!PrimitiveType::CString.is_numeric());
    }

    #[test]
    fn tags_order() {
        assert!(ViewTag::DEFAULT < ViewTag::new(1));
        assert_eq!(ViewTag::default(), ViewTag::DEFAULT);
    }
}
