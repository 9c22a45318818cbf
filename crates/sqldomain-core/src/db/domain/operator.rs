use derive_more::Display;
use std::str::FromStr;

///
/// DomainOperator
///
/// Prefix boolean operators of the Polish-notation domain language.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum DomainOperator {
    #[display("!")]
    Not,
    #[display("&")]
    And,
    #[display("|")]
    Or,
}

impl DomainOperator {
    #[must_use]
    pub const fn arity(self) -> i32 {
        match self {
            Self::Not => 1,
            Self::And | Self::Or => 2,
        }
    }

    /// De Morgan dual; `!` has none.
    #[must_use]
    pub const fn dual(self) -> Option<Self> {
        match self {
            Self::And => Some(Self::Or),
            Self::Or => Some(Self::And),
            Self::Not => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::And => "&",
            Self::Or => "|",
        }
    }
}

impl FromStr for DomainOperator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "!" => Ok(Self::Not),
            "&" => Ok(Self::And),
            "|" => Ok(Self::Or),
            _ => Err(()),
        }
    }
}

///
/// Operator
///
/// Term operators allowed in the middle slot of a `(field, op, value)` leaf.
/// `InSelect` / `NotInSelect` are produced internally by the compiler and
/// only accept a pre-rendered sub-select operand.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Operator {
    #[display("=")]
    Eq,
    #[display("!=")]
    Ne,
    #[display("<=")]
    Le,
    #[display("<")]
    Lt,
    #[display(">")]
    Gt,
    #[display(">=")]
    Ge,
    #[display("=?")]
    EqOrSkip,
    #[display("=like")]
    EqLike,
    #[display("=ilike")]
    EqIlike,
    #[display("like")]
    Like,
    #[display("not like")]
    NotLike,
    #[display("ilike")]
    Ilike,
    #[display("not ilike")]
    NotIlike,
    #[display("in")]
    In,
    #[display("not in")]
    NotIn,
    #[display("child_of")]
    ChildOf,
    #[display("parent_of")]
    ParentOf,
    #[display("inselect")]
    InSelect,
    #[display("not inselect")]
    NotInSelect,
}

impl Operator {
    /// Term-negation table. `None` means there is no clean SQL negation and
    /// the leaf has to stay behind an explicit `!`.
    #[must_use]
    pub const fn negate(self) -> Option<Self> {
        match self {
            Self::Lt => Some(Self::Ge),
            Self::Ge => Some(Self::Lt),
            Self::Gt => Some(Self::Le),
            Self::Le => Some(Self::Gt),
            Self::Eq => Some(Self::Ne),
            Self::Ne => Some(Self::Eq),
            Self::In => Some(Self::NotIn),
            Self::NotIn => Some(Self::In),
            Self::Like => Some(Self::NotLike),
            Self::NotLike => Some(Self::Like),
            Self::Ilike => Some(Self::NotIlike),
            Self::NotIlike => Some(Self::Ilike),
            Self::InSelect => Some(Self::NotInSelect),
            Self::NotInSelect => Some(Self::InSelect),
            Self::EqOrSkip | Self::EqLike | Self::EqIlike | Self::ChildOf | Self::ParentOf => None,
        }
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        matches!(
            self,
            Self::Ne | Self::NotLike | Self::NotIlike | Self::NotIn | Self::NotInSelect
        )
    }

    /// Operators whose operand is wrapped in `%...%`.
    #[must_use]
    pub const fn needs_wildcard(self) -> bool {
        matches!(
            self,
            Self::Like | Self::NotLike | Self::Ilike | Self::NotIlike
        )
    }

    #[must_use]
    pub const fn is_hierarchical(self) -> bool {
        matches!(self, Self::ChildOf | Self::ParentOf)
    }

    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    /// SQL spelling; `=like` / `=ilike` collapse onto the plain operators.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Eq | Self::EqOrSkip => "=",
            Self::Ne => "!=",
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::EqLike | Self::Like => "like",
            Self::EqIlike | Self::Ilike => "ilike",
            Self::NotLike => "not like",
            Self::NotIlike => "not ilike",
            Self::In | Self::InSelect => "in",
            Self::NotIn | Self::NotInSelect => "not in",
            Self::ChildOf => "child_of",
            Self::ParentOf => "parent_of",
        }
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let op = match lowered.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
            "=" | "==" => Self::Eq,
            "!=" | "<>" => Self::Ne,
            "<=" => Self::Le,
            "<" => Self::Lt,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "=?" => Self::EqOrSkip,
            "=like" => Self::EqLike,
            "=ilike" => Self::EqIlike,
            "like" => Self::Like,
            "not like" => Self::NotLike,
            "ilike" => Self::Ilike,
            "not ilike" => Self::NotIlike,
            "in" => Self::In,
            "not in" => Self::NotIn,
            "child_of" => Self::ChildOf,
            "parent_of" => Self::ParentOf,
            "inselect" => Self::InSelect,
            "not inselect" => Self::NotInSelect,
            _ => return Err(()),
        };

        Ok(op)
    }
}
