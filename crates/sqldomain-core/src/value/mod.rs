
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

///
/// Value
///
/// Scalar payload carried by domain atoms, leaf operands and bound SQL
/// parameters. Lists only appear once a domain list node has been lowered
/// into an operand; domain nodes themselves never hold `Value::List`.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Self>),

    /// Positional `?` marker, bound at SQL emission time.
    Placeholder,

    /// Pre-rendered sub-select used by `inselect` leaves.
    Select(Box<SubSelect>),
}

impl Value {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    #[must_use]
    pub fn ids(ids: impl IntoIterator<Item = i64>) -> Self {
        Self::List(ids.into_iter().map(Self::Int).collect())
    }

    /// `NULL` or `false`, the values a leaf treats as "unset".
    #[must_use]
    pub const fn is_blank(&self) -> bool {
        matches!(self, Self::Null | Self::Bool(false))
    }

    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// True for a text value or a non-empty list made only of text values.
    #[must_use]
    pub fn is_text_like(&self) -> bool {
        match self {
            Self::Text(_) => true,
            Self::List(items) => !items.is_empty() && items.iter().all(|v| v.as_text().is_some()),
            _ => false,
        }
    }

    /// Collect integer ids from a scalar or list operand, skipping anything else.
    #[must_use]
    pub fn to_ids(&self) -> Vec<i64> {
        match self {
            Self::Int(id) => vec![*id],
            Self::List(items) => items.iter().filter_map(Self::as_int).collect(),
            _ => Vec::new(),
        }
    }

    /// Render this value as a domain literal that the parser reads back.
    pub(crate) fn write_literal(&self, out: &mut String) {
        match self {
            Self::Null => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Self::Float(f) => {
                let _ = write!(out, "{f:?}");
            }
            Self::Text(s) => {
                out.push('\'');
                for ch in s.chars() {
                    if matches!(ch, '\'' | '\\') {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push('\'');
            }
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_literal(out);
                }
                out.push(']');
            }
            Self::Placeholder => out.push('?'),
            Self::Select(select) => {
                let _ = write!(out, "({})", select.sql);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_literal(&mut out);
        f.write_str(&out)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

///
/// SubSelect
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SubSelect {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SubSelect {
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}
