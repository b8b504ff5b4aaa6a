//! Type declarations and the validated registry of metadata tables.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::error::{SchemaError, SchemaResult};
use crate::{ChildType, CollectionKind, FieldDef, FieldType, PrimitiveType, ViewTag, MAX_FIELDS};

/// A type id, assigned by the registry in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u16);

impl TypeId {
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A schema type declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeDef {
    pub name: String,
    /// Parent type; its fields come first in this type's index space.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub extends: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fields: Vec<FieldDef>,
}

impl TypeDef {
    /// Creates a type with no fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            fields: Vec::new(),
        }
    }

    /// Declares the parent type.
    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }
}

/// Item type of a resolved collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Primitive(PrimitiveType),
    Schema(TypeId),
}

/// Resolved type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Primitive(PrimitiveType),
    Schema(TypeId),
    Collection { kind: CollectionKind, item: ItemType },
}

impl ValueType {
    /// Returns `true` if values of this type are structural nodes.
    #[must_use]
    pub const fn is_structure(self) -> bool {
        !matches!(self, Self::Primitive(_))
    }
}

impl From<ItemType> for ValueType {
    fn from(item: ItemType) -> Self {
        match item {
            ItemType::Primitive(primitive) => Self::Primitive(primitive),
            ItemType::Schema(id) => Self::Schema(id),
        }
    }
}

/// A resolved field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub index: usize,
    pub name: String,
    pub ty: ValueType,
    pub tag: Option<ViewTag>,
}

/// The immutable metadata table of one type.
///
/// Maps field index to name, resolved type and visibility tag, with inherited
/// fields first.
#[derive(Debug, Clone)]
pub struct Metadata {
    id: TypeId,
    name: String,
    parent: Option<TypeId>,
    fields: Vec<Field>,
    by_name: HashMap<String, usize>,
    view_fields: Vec<usize>,
    by_tag: BTreeMap<ViewTag, Vec<usize>>,
}

impl Metadata {
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn parent(&self) -> Option<TypeId> {
        self.parent
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|index| &self.fields[*index])
    }

    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Returns `true` if any field carries a visibility tag.
    #[must_use]
    pub fn has_view_fields(&self) -> bool {
        !self.view_fields.is_empty()
    }

    /// Indexes of every tagged field.
    #[must_use]
    pub fn view_field_indexes(&self) -> &[usize] {
        &self.view_fields
    }

    /// Indexes of fields carrying exactly `tag`.
    #[must_use]
    pub fn field_indexes_for_tag(&self, tag: ViewTag) -> &[usize] {
        self.by_tag.get(&tag).map_or(&[], Vec::as_slice)
    }
}

/// A validated set of type metadata tables.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: Vec<Metadata>,
    by_name: HashMap<String, TypeId>,
    has_filters: bool,
}

impl TypeRegistry {
    /// Creates a registry builder.
    #[must_use]
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Validates declarations and builds the registry.
    pub fn from_defs(defs: Vec<TypeDef>) -> SchemaResult<Self> {
        Resolver::new(&defs)?.resolve()
    }

    #[must_use]
    pub fn get(&self, id: TypeId) -> Option<&Metadata> {
        self.types.get(usize::from(id.raw()))
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Metadata> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metadata> {
        self.types.iter()
    }

    /// Returns `true` if any field of any type carries a visibility tag.
    #[must_use]
    pub const fn has_filters(&self) -> bool {
        self.has_filters
    }

    /// Returns `true` if `actual` is `declared` or inherits from it.
    #[must_use]
    pub fn is_assignable(&self, actual: TypeId, declared: TypeId) -> bool {
        let mut current = Some(actual);
        while let Some(id) = current {
            if id == declared {
                return true;
            }
            current = self.get(id).and_then(Metadata::parent);
        }
        false
    }
}

/// Builder for [`TypeRegistry`].
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    defs: Vec<TypeDef>,
}

impl TypeRegistryBuilder {
    /// Adds a type declaration. Type ids follow registration order.
    #[must_use]
    pub fn register(mut self, def: TypeDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Builds the registry after validation.
    pub fn build(self) -> SchemaResult<TypeRegistry> {
        TypeRegistry::from_defs(self.defs)
    }
}

struct Resolver<'a> {
    defs: &'a [TypeDef],
    ids: HashMap<&'a str, TypeId>,
    flattened: Vec<Option<Vec<&'a FieldDef>>>,
}

impl<'a> Resolver<'a> {
    fn new(defs: &'a [TypeDef]) -> SchemaResult<Self> {
        let mut ids = HashMap::new();
        for (position, def) in defs.iter().enumerate() {
            if def.name.is_empty() {
                return Err(SchemaError::EmptyTypeName);
            }
            let id = u16::try_from(position)
                .map(TypeId::new)
                .map_err(|_| SchemaError::TooManyTypes {
                    count: defs.len(),
                    max: usize::from(u16::MAX),
                })?;
            if ids.insert(def.name.as_str(), id).is_some() {
                return Err(SchemaError::DuplicateType {
                    type_name: def.name.clone(),
                });
            }
        }
        Ok(Self {
            defs,
            ids,
            flattened: vec![None; defs.len()],
        })
    }

    fn resolve(mut self) -> SchemaResult<TypeRegistry> {
        let mut types = Vec::with_capacity(self.defs.len());
        let mut has_filters = false;
        for position in 0..self.defs.len() {
            let fields = self.flatten(position, &mut Vec::new())?;
            let def = &self.defs[position];
            let metadata = self.metadata(position, def, &fields)?;
            has_filters |= metadata.has_view_fields();
            types.push(metadata);
        }
        let by_name = types
            .iter()
            .map(|metadata| (metadata.name.clone(), metadata.id))
            .collect();
        Ok(TypeRegistry {
            types,
            by_name,
            has_filters,
        })
    }

    fn flatten(
        &mut self,
        position: usize,
        visiting: &mut Vec<usize>,
    ) -> SchemaResult<Vec<&'a FieldDef>> {
        if let Some(fields) = &self.flattened[position] {
            return Ok(fields.clone());
        }
        let defs = self.defs;
        let def = &defs[position];
        if visiting.contains(&position) {
            return Err(SchemaError::InheritanceCycle {
                type_name: def.name.clone(),
            });
        }
        visiting.push(position);
        let mut fields = match &def.extends {
            Some(parent) => {
                let parent_id = self.lookup(parent, || format!("{} extends", def.name))?;
                self.flatten(usize::from(parent_id.raw()), visiting)?
            }
            None => Vec::new(),
        };
        visiting.pop();
        fields.extend(def.fields.iter());

        let mut names = HashSet::new();
        for field in &fields {
            if !names.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    type_name: def.name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        if fields.len() > MAX_FIELDS {
            return Err(SchemaError::TooManyFields {
                type_name: def.name.clone(),
                count: fields.len(),
                max: MAX_FIELDS,
            });
        }
        self.flattened[position] = Some(fields.clone());
        Ok(fields)
    }

    fn metadata(
        &self,
        position: usize,
        def: &TypeDef,
        fields: &[&FieldDef],
    ) -> SchemaResult<Metadata> {
        let id = self.ids[def.name.as_str()];
        debug_assert_eq!(usize::from(id.raw()), position);
        let parent = match &def.extends {
            Some(parent) => Some(self.lookup(parent, || format!("{} extends", def.name))?),
            None => None,
        };

        let mut resolved = Vec::with_capacity(fields.len());
        let mut by_name = HashMap::with_capacity(fields.len());
        let mut view_fields = Vec::new();
        let mut by_tag: BTreeMap<ViewTag, Vec<usize>> = BTreeMap::new();
        for (index, field) in fields.iter().enumerate() {
            let context = || format!("{}.{}", def.name, field.name);
            let ty = match &field.ty {
                FieldType::Primitive(primitive) => ValueType::Primitive(*primitive),
                FieldType::Schema(name) => ValueType::Schema(self.lookup(name, context)?),
                FieldType::Collection { kind, child } => ValueType::Collection {
                    kind: *kind,
                    item: match child {
                        ChildType::Primitive(primitive) => ItemType::Primitive(*primitive),
                        ChildType::Schema(name) => ItemType::Schema(self.lookup(name, context)?),
                    },
                },
            };
            if let Some(tag) = field.tag {
                view_fields.push(index);
                by_tag.entry(tag).or_default().push(index);
            }
            by_name.insert(field.name.clone(), index);
            resolved.push(Field {
                index,
                name: field.name.clone(),
                ty,
                tag: field.tag,
            });
        }

        Ok(Metadata {
            id,
            name: def.name.clone(),
            parent,
            fields: resolved,
            by_name,
            view_fields,
            by_tag,
        })
    }

    fn lookup(&self, name: &str, referenced_by: impl FnOnce() -> String) -> SchemaResult<TypeId> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| SchemaError::UnknownType {
                type_name: name.to_owned(),
                referenced_by: referenced_by(),
            })
    }
}
