use crate::model::field::{FieldKind, FieldModel};
use std::collections::BTreeMap;

/// Columns every table carries and every leaf may reference.
pub const MAGIC_COLUMNS: [&str; 5] = ["id", "create_uid", "create_date", "write_uid", "write_date"];

///
/// EntityModel
///
/// Runtime model metadata: table name, primary key, display field and the
/// ordered field map (local fields first, then fields pulled in through
/// `_inherits` links once the registry is built).
///

#[derive(Clone, Debug)]
pub struct EntityModel {
    pub name: String,
    pub table: String,
    pub id_field: String,
    pub rec_name: String,
    pub parent_name: String,
    pub order: String,

    /// `(parent model, link field)` pairs, delegation-style inheritance.
    pub inherits: Vec<(String, String)>,

    fields: Vec<FieldModel>,
    index: BTreeMap<String, usize>,
}

impl EntityModel {
    #[must_use]
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        let mut model = Self {
            name: name.into(),
            table: table.into(),
            id_field: "id".to_string(),
            rec_name: "name".to_string(),
            parent_name: "parent_id".to_string(),
            order: "id".to_string(),
            inherits: Vec::new(),
            fields: Vec::new(),
            index: BTreeMap::new(),
        };
        model.push_field(FieldModel::integer("id"));

        model
    }

    #[must_use]
    pub fn field(mut self, field: FieldModel) -> Self {
        self.push_field(field);
        self
    }

    #[must_use]
    pub fn inherits(mut self, parent: impl Into<String>, link: impl Into<String>) -> Self {
        self.inherits.push((parent.into(), link.into()));
        self
    }

    #[must_use]
    pub fn rec_name(mut self, name: impl Into<String>) -> Self {
        self.rec_name = name.into();
        self
    }

    #[must_use]
    pub fn parent_name(mut self, name: impl Into<String>) -> Self {
        self.parent_name = name.into();
        self
    }

    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = order.into();
        self
    }

    /// Insert or replace a field by name.
    pub fn push_field(&mut self, field: FieldModel) {
        match self.index.get(&field.name) {
            Some(&pos) => self.fields[pos] = field,
            None => {
                self.index.insert(field.name.clone(), self.fields.len());
                self.fields.push(field);
            }
        }
    }

    // lookups

    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldModel> {
        self.index.get(name).map(|&pos| &self.fields[pos])
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldModel] {
        &self.fields
    }

    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Named field when it is a relation.
    #[must_use]
    pub fn related_field(&self, name: &str) -> Option<&FieldModel> {
        self.get_field(name).filter(|field| field.is_related())
    }

    /// Join columns for following relation `name` one hop.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<Relation<'_>> {
        let field = self.get_field(name)?;
        match &field.kind {
            FieldKind::ManyToOne { comodel } => Some(Relation {
                comodel,
                local_column: &field.name,
                remote_column: None,
            }),
            FieldKind::OneToMany { comodel, inverse } => Some(Relation {
                comodel,
                local_column: &self.id_field,
                remote_column: Some(inverse),
            }),
            _ => None,
        }
    }

    #[must_use]
    pub fn primary_keys(&self) -> Vec<&str> {
        vec![self.id_field.as_str()]
    }

    #[must_use]
    pub fn is_magic_column(&self, name: &str) -> bool {
        name == self.id_field || MAGIC_COLUMNS.contains(&name)
    }
}

///
/// Relation
/// One-hop join description; a `None` remote column means the comodel's id.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Relation<'a> {
    pub comodel: &'a str,
    pub local_column: &'a str,
    pub remote_column: Option<&'a str>,
}
