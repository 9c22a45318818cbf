use crate::{
    db::domain::{DomainNode, Operator},
    error::Error,
    value::Value,
};
use std::{fmt, sync::Arc};

///
/// FieldModel
/// Runtime field metadata used by the domain compiler and statement glue.
///

#[derive(Clone)]
pub struct FieldModel {
    /// Field name as used in domains; also the column name when stored.
    pub name: String,
    /// Tagged field type (replaces reflection-driven type lookups).
    pub kind: FieldKind,
    /// Backed by a physical column.
    pub store: bool,
    /// Values are translated per language.
    pub translate: bool,
    /// Dotted paths through this relation compile to SQL joins.
    pub auto_join: bool,
    /// Default sub-domain applied when joining through a one-to-many.
    pub domain: Option<String>,
    /// Domain synthesizer for non-stored fields.
    pub search: Option<Arc<dyn FieldSearch>>,
    /// Set by the registry build when the field lives on an `_inherits` parent.
    pub inherited: Option<Inherited>,
}

impl FieldModel {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            store: true,
            translate: false,
            auto_join: false,
            domain: None,
            search: None,
            inherited: None,
        }
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    #[must_use]
    pub fn char(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Char)
    }

    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    #[must_use]
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    #[must_use]
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    #[must_use]
    pub fn many2one(name: impl Into<String>, comodel: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::ManyToOne {
                comodel: comodel.into(),
            },
        )
    }

    #[must_use]
    pub fn one2many(
        name: impl Into<String>,
        comodel: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::OneToMany {
                comodel: comodel.into(),
                inverse: inverse.into(),
            },
        )
    }

    #[must_use]
    pub fn many2many(
        name: impl Into<String>,
        comodel: impl Into<String>,
        relation: impl Into<String>,
        column1: impl Into<String>,
        column2: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::ManyToMany {
                comodel: comodel.into(),
                relation: relation.into(),
                column1: column1.into(),
                column2: column2.into(),
            },
        )
    }

    #[must_use]
    pub const fn auto_join(mut self) -> Self {
        self.auto_join = true;
        self
    }

    #[must_use]
    pub const fn translate(mut self) -> Self {
        self.translate = true;
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Non-stored field without search support.
    #[must_use]
    pub fn computed(mut self) -> Self {
        self.store = false;
        self.search = None;
        self
    }

    /// Non-stored field whose searches are rewritten by `search`.
    #[must_use]
    pub fn searchable(mut self, search: impl FieldSearch + 'static) -> Self {
        self.store = false;
        self.search = Some(Arc::new(search));
        self
    }

    // accessors mirroring the metadata provider contract

    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// x2many fields are stored as links elsewhere and have no local column.
    #[must_use]
    pub const fn has_column(&self) -> bool {
        self.store && !self.kind.is_x2many()
    }

    #[must_use]
    pub fn is_searchable(&self) -> bool {
        self.store || self.search.is_some()
    }

    #[must_use]
    pub const fn is_related(&self) -> bool {
        self.kind.is_relational()
    }

    #[must_use]
    pub const fn is_inherited(&self) -> bool {
        self.inherited.is_some()
    }

    #[must_use]
    pub fn related_model(&self) -> Option<&str> {
        self.kind.comodel()
    }

    /// Inverse column of a one-to-many.
    #[must_use]
    pub fn related_field(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::OneToMany { inverse, .. } => Some(inverse),
            _ => None,
        }
    }
}

impl fmt::Debug for FieldModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldModel")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("store", &self.store)
            .field("translate", &self.translate)
            .field("auto_join", &self.auto_join)
            .field("domain", &self.domain)
            .field("search", &self.search.is_some())
            .field("inherited", &self.inherited)
            .finish()
    }
}

///
/// FieldKind
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Binary,
    Boolean,
    Char,
    Date,
    DateTime,
    Float,
    Integer,
    Selection,
    Text,

    ManyToOne {
        comodel: String,
    },
    OneToMany {
        comodel: String,
        inverse: String,
    },
    ManyToMany {
        comodel: String,
        relation: String,
        /// Column of `relation` pointing at this model.
        column1: String,
        /// Column of `relation` pointing at the comodel.
        column2: String,
    },
}

impl FieldKind {
    #[must_use]
    pub const fn is_relational(&self) -> bool {
        matches!(
            self,
            Self::ManyToOne { .. } | Self::OneToMany { .. } | Self::ManyToMany { .. }
        )
    }

    #[must_use]
    pub const fn is_x2many(&self) -> bool {
        matches!(self, Self::OneToMany { .. } | Self::ManyToMany { .. })
    }

    #[must_use]
    pub fn comodel(&self) -> Option<&str> {
        match self {
            Self::ManyToOne { comodel }
            | Self::OneToMany { comodel, .. }
            | Self::ManyToMany { comodel, .. } => Some(comodel),
            _ => None,
        }
    }
}

///
/// Inherited
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Inherited {
    pub parent_model: String,
    /// Many-to-one on the child pointing at the parent row.
    pub link_field: String,
}

///
/// FieldSearch
///
/// Search support for non-stored fields: rewrite `(field, op, value)` into
/// an equivalent domain over stored fields.
///

pub trait FieldSearch: Send + Sync {
    fn search(&self, field: &FieldModel, op: Operator, value: &Value) -> Result<DomainNode, Error>;
}

impl<F> FieldSearch for F
where
    F: Fn(Operator, &Value) -> DomainNode + Send + Sync,
{
    fn search(&self, _field: &FieldModel, op: Operator, value: &Value) -> Result<DomainNode, Error> {
        Ok(self(op, value))
    }
}
