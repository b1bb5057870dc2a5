use crate::object::{builder::TreeBuilder, FieldSource, JoinedTable, ObjectField};

use std::ops::Index;

/// Identifies an [`Object`] within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) usize);

/// Identifies a [`FieldSource`] within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) usize);

/// One JSON object shape within the tree.
///
/// The root object maps the base table; every other object maps a joined
/// table and hangs off a nested field of its parent. Fields of unnested
/// to-one joins live directly on the parent object, so an object may draw
/// from several sources even though `root_source` names just one.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub id: ObjectId,
    pub parent: Option<ObjectId>,
    pub root_source: SourceId,
    pub fields: Vec<ObjectField>,
}

impl Object {
    pub fn field(&self, name: &str) -> Option<&ObjectField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Primary-key fields, in declaration order.
    pub fn pk_fields(&self) -> impl Iterator<Item = &ObjectField> {
        self.fields.iter().filter(|field| field.primary_key)
    }

    pub fn owner_field(&self) -> Option<&ObjectField> {
        self.fields.iter().find(|field| field.owner)
    }

    /// Fields holding nested objects, in declaration order.
    pub fn nested_fields(&self) -> impl Iterator<Item = &ObjectField> {
        self.fields.iter().filter(|field| field.is_nested())
    }

    /// Sources of unnested to-one joins feeding this object, first use
    /// first, deduplicated.
    pub fn unnested_sources(&self) -> Vec<SourceId> {
        let mut seen = vec![];
        for field in &self.fields {
            if field.nested.is_none()
                && field.source != self.root_source
                && !seen.contains(&field.source)
            {
                seen.push(field.source);
            }
        }
        seen
    }
}

/// The duality mapping: one tree of objects describing how a JSON
/// document shape maps onto joined relational tables.
///
/// Trees are immutable once built and carry no per-request state, so a
/// single tree may serve concurrent reads and writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTree {
    name: String,
    objects: Vec<Object>,
    sources: Vec<FieldSource>,
}

impl ObjectTree {
    /// Starts a tree for the given view name over `schema`.`table`.
    pub fn builder(
        name: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> TreeBuilder {
        TreeBuilder::new(name.into(), schema.into(), table.into())
    }

    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            objects: vec![],
            sources: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Object {
        &self.objects[0]
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.iter()
    }

    pub fn source(&self, id: SourceId) -> &FieldSource {
        &self.sources[id.0]
    }

    /// The join description of a joined source. Panics on the base
    /// source.
    pub fn joined(&self, id: SourceId) -> &JoinedTable {
        match self.sources[id.0].as_joined() {
            Some(joined) => joined,
            None => panic!("source {id:?} is the base table, not a join"),
        }
    }

    pub fn table_name(&self, id: SourceId) -> &str {
        self.sources[id.0].table()
    }

    pub(crate) fn push_source(&mut self, source: FieldSource) -> SourceId {
        let id = SourceId(self.sources.len());
        self.sources.push(source);
        id
    }

    pub(crate) fn push_object(&mut self, parent: Option<ObjectId>, root_source: SourceId) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects.push(Object {
            id,
            parent,
            root_source,
            fields: vec![],
        });
        id
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.objects[id.0]
    }

    pub(crate) fn source_mut(&mut self, id: SourceId) -> &mut FieldSource {
        &mut self.sources[id.0]
    }
}

impl Index<ObjectId> for ObjectTree {
    type Output = Object;

    fn index(&self, id: ObjectId) -> &Object {
        &self.objects[id.0]
    }
}

impl Index<SourceId> for ObjectTree {
    type Output = FieldSource;

    fn index(&self, id: SourceId) -> &FieldSource {
        &self.sources[id.0]
    }
}
