use crate::{
    db::domain::{
        DomainError,
        normalize::normalize,
        operator::{DomainOperator, Operator},
    },
    value::Value,
};
use std::fmt;

///
/// DomainNode
///
/// One node of a domain tree: either an atom holding a `Value`, or an
/// ordered list of child nodes. A node never holds both; pushing a child
/// onto an atom first demotes the atom into a singleton child.
///
/// A leaf is a three-item list `(left, operator, right)` whose middle item
/// is a term operator. The operator tokens `&`, `|` and `!` are atoms.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DomainNode {
    value: Option<Value>,
    children: Vec<Self>,
}

impl DomainNode {
    /// Empty list node.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: None,
            children: Vec::new(),
        }
    }

    /// Atom node. A `Value::List` is lowered into a list node of atoms.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        match value.into() {
            Value::List(items) => Self::list(items.into_iter().map(Self::value)),
            value => Self {
                value: Some(value),
                children: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn list(children: impl IntoIterator<Item = Self>) -> Self {
        Self {
            value: None,
            children: children.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn leaf(left: impl Into<Value>, op: Operator, right: impl Into<Value>) -> Self {
        Self::list([
            Self::value(left),
            Self::value(op.to_string()),
            Self::value(right),
        ])
    }

    #[must_use]
    pub fn op(op: DomainOperator) -> Self {
        Self::value(op.as_str())
    }

    /// `(1, '=', 1)`
    #[must_use]
    pub fn true_leaf() -> Self {
        Self::leaf(1, Operator::Eq, 1)
    }

    /// `(0, '=', 1)`
    #[must_use]
    pub fn false_leaf() -> Self {
        Self::leaf(0, Operator::Eq, 1)
    }

    /// Conjunction of whole domains in prefix form. TRUE domains are
    /// skipped, a FALSE domain short-circuits, nothing left is TRUE.
    pub fn and(domains: impl IntoIterator<Item = Self>) -> Result<Self, DomainError> {
        Self::combine(DomainOperator::And, domains, Self::true_leaf, Self::false_leaf)
    }

    /// Disjunction of whole domains in prefix form. FALSE domains are
    /// skipped, a TRUE domain short-circuits, nothing left is FALSE.
    pub fn or(domains: impl IntoIterator<Item = Self>) -> Result<Self, DomainError> {
        Self::combine(DomainOperator::Or, domains, Self::false_leaf, Self::true_leaf)
    }

    /// Prefix a whole domain with `!`.
    pub fn not_(domain: &Self) -> Result<Self, DomainError> {
        let mut out = normalize(domain)?;
        out.insert(0, Self::op(DomainOperator::Not));
        Ok(out)
    }

    fn combine(
        op: DomainOperator,
        domains: impl IntoIterator<Item = Self>,
        unit: fn() -> Self,
        zero: fn() -> Self,
    ) -> Result<Self, DomainError> {
        let unit = Self::list([unit()]);
        let zero = Self::list([zero()]);

        let mut out = Self::new();
        let mut count = 0usize;
        for domain in domains {
            let domain = normalize(&domain)?;
            if domain == unit {
                continue;
            }
            if domain == zero {
                return Ok(zero);
            }
            for child in domain.children {
                out.push(child);
            }
            count += 1;
        }

        if count == 0 {
            return Ok(unit);
        }
        for _ in 1..count {
            out.insert(0, Self::op(op));
        }

        Ok(out)
    }

    // accessors

    #[must_use]
    pub const fn is_value(&self) -> bool {
        self.value.is_some()
    }

    #[must_use]
    pub const fn is_list(&self) -> bool {
        self.value.is_none()
    }

    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_text)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[Self] {
        &self.children
    }

    #[must_use]
    pub fn item(&self, index: usize) -> Option<&Self> {
        self.children.get(index)
    }

    pub fn into_items(self) -> Vec<Self> {
        self.children
    }

    // mutation

    pub fn push(&mut self, node: Self) {
        self.demote();
        self.children.push(node);
    }

    pub fn push_value(&mut self, value: impl Into<Value>) {
        self.push(Self::value(value));
    }

    pub fn pop(&mut self) -> Option<Self> {
        self.children.pop()
    }

    /// Remove and return the first child.
    pub fn shift(&mut self) -> Option<Self> {
        if self.children.is_empty() {
            None
        } else {
            Some(self.children.remove(0))
        }
    }

    /// Insert at `index`, clamped to the end of the list.
    pub fn insert(&mut self, index: usize, node: Self) {
        self.demote();
        let index = index.min(self.children.len());
        self.children.insert(index, node);
    }

    pub fn remove(&mut self, index: usize) -> Option<Self> {
        (index < self.children.len()).then(|| self.children.remove(index))
    }

    fn demote(&mut self) {
        if let Some(value) = self.value.take() {
            self.children.push(Self::value(value));
        }
    }

    // classification

    /// Depth-first sequence of every atom in the tree.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Value> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a Value>) {
        match &self.value {
            Some(value) => out.push(value),
            None => {
                for child in &self.children {
                    child.flatten_into(out);
                }
            }
        }
    }

    #[must_use]
    pub fn domain_operator(&self) -> Option<DomainOperator> {
        self.text().and_then(|s| s.parse().ok())
    }

    #[must_use]
    pub fn is_domain_operator(&self) -> bool {
        self.domain_operator().is_some()
    }

    #[must_use]
    pub fn term_operator(&self) -> Option<Operator> {
        self.text().and_then(|s| s.parse().ok())
    }

    #[must_use]
    pub fn is_term_operator(&self) -> bool {
        self.term_operator().is_some()
    }

    /// A three-item list whose middle item is a term operator.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.is_list()
            && self.children.len() == 3
            && self.children[0].is_value()
            && self.children[1].is_term_operator()
    }

    #[must_use]
    pub fn is_true_leaf(&self) -> bool {
        *self == Self::true_leaf()
    }

    #[must_use]
    pub fn is_false_leaf(&self) -> bool {
        *self == Self::false_leaf()
    }

    /// Operator string of a leaf (`"in"`, `"not like"`, ...).
    #[must_use]
    pub fn operator_str(&self) -> Option<&str> {
        if self.is_leaf() {
            self.children[1].text()
        } else {
            None
        }
    }

    /// Lower this node into an operand value; list nodes become `Value::List`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match &self.value {
            Some(value) => value.clone(),
            None => Value::List(self.children.iter().map(Self::to_value).collect()),
        }
    }

    /// Serialize back to bracket notation.
    #[must_use]
    pub fn string(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        if let Some(value) = &self.value {
            value.write_literal(out);
            return;
        }

        let (open, close) = if self.is_leaf() { ('(', ')') } else { ('[', ']') };
        out.push(open);
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            child.write_to(out);
        }
        out.push(close);
    }
}

impl fmt::Display for DomainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string())
    }
}

impl From<Value> for DomainNode {
    fn from(value: Value) -> Self {
        Self::value(value)
    }
}

impl FromIterator<Self> for DomainNode {
    fn from_iter<I: IntoIterator<Item = Self>>(iter: I) -> Self {
        Self::list(iter)
    }
}
