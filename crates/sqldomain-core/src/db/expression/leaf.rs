use crate::{
    db::{
        dialect::Dialect,
        domain::{DomainNode, DomainOperator, Operator},
        expression::{
            CompileError,
            join::{AliasPolicy, JoinContext, TableRef, generate_table_alias},
        },
    },
    model::EntityModel,
    value::Value,
};
use std::fmt;

///
/// Term
/// One element of a normalized domain, decoded for the compiler.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    Operator(DomainOperator),
    True,
    False,
    Leaf(Leaf),
}

impl Term {
    pub fn from_node(node: &DomainNode) -> Result<Self, CompileError> {
        if let Some(op) = node.domain_operator() {
            return Ok(Self::Operator(op));
        }
        if node.is_true_leaf() {
            return Ok(Self::True);
        }
        if node.is_false_leaf() {
            return Ok(Self::False);
        }

        let invalid = || CompileError::InvalidLeaf {
            leaf: node.string(),
        };
        if !node.is_leaf() {
            return Err(invalid());
        }

        let items = node.items();
        let left = items[0].text().ok_or_else(invalid)?;
        let op = items[1].term_operator().ok_or_else(invalid)?;

        Ok(Self::Leaf(Leaf {
            left: left.to_string(),
            op,
            right: items[2].to_value(),
        }))
    }

    #[must_use]
    pub fn leaf(left: impl Into<String>, op: Operator, right: impl Into<Value>) -> Self {
        Self::Leaf(Leaf {
            left: left.into(),
            op,
            right: right.into(),
        })
    }

    #[must_use]
    pub const fn is_operator(&self) -> bool {
        matches!(self, Self::Operator(_))
    }

    #[must_use]
    pub fn to_node(&self) -> DomainNode {
        match self {
            Self::Operator(op) => DomainNode::op(*op),
            Self::True => DomainNode::true_leaf(),
            Self::False => DomainNode::false_leaf(),
            Self::Leaf(leaf) => DomainNode::leaf(leaf.left.as_str(), leaf.op, leaf.right.clone()),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_node())
    }
}

///
/// Leaf
///

#[derive(Clone, Debug, PartialEq)]
pub struct Leaf {
    pub left: String,
    pub op: Operator,
    pub right: Value,
}

///
/// ExtendedLeaf
///
/// A term plus the model it is evaluated against and the chain of joins
/// that leads there from the root model. The first traversed model is
/// always the root; every join context adds exactly one hop.
///

#[derive(Clone, Debug)]
pub struct ExtendedLeaf<'r> {
    pub term: Term,
    pub model: &'r EntityModel,
    pub join_context: Vec<JoinContext<'r>>,
}

impl<'r> ExtendedLeaf<'r> {
    #[must_use]
    pub const fn new(term: Term, model: &'r EntityModel) -> Self {
        Self {
            term,
            model,
            join_context: Vec::new(),
        }
    }

    /// New leaf sharing this leaf's model and join chain.
    #[must_use]
    pub fn substitute(&self, term: Term) -> Self {
        Self {
            term,
            model: self.model,
            join_context: self.join_context.clone(),
        }
    }

    /// Move one hop: `model.source_column = dest.dest_column`.
    pub fn add_join_context(
        &mut self,
        dest: &'r EntityModel,
        source_column: &str,
        dest_column: &str,
        link: &str,
    ) {
        self.join_context.push(JoinContext {
            source: self.model,
            dest,
            source_column: source_column.to_string(),
            dest_column: dest_column.to_string(),
            link: link.to_string(),
        });
        self.model = dest;
    }

    #[must_use]
    pub fn root(&self) -> &'r EntityModel {
        self.join_context.first().map_or(self.model, |ctx| ctx.source)
    }

    /// Every model traversed, root first.
    #[must_use]
    pub fn models(&self) -> Vec<&'r EntityModel> {
        let mut models: Vec<_> = self.join_context.iter().map(|ctx| ctx.source).collect();
        models.push(self.model);
        models
    }

    // Alias of every hop; index 0 is the root table.
    fn aliases(&self, policy: &AliasPolicy) -> Vec<String> {
        let root = self.root().table();
        let mut links = Vec::with_capacity(self.join_context.len());
        let mut aliases = vec![root.to_string()];
        for ctx in &self.join_context {
            links.push(ctx.link.as_str());
            aliases.push(policy.apply(generate_table_alias(root, &links)));
        }

        aliases
    }

    /// Alias of the table this leaf's column lives on.
    #[must_use]
    pub fn alias(&self, policy: &AliasPolicy) -> String {
        self.aliases(policy).pop().unwrap_or_default()
    }

    /// `"prev"."source_column" = "alias"."dest_column"` per hop.
    #[must_use]
    pub fn join_conditions(&self, dialect: &dyn Dialect, policy: &AliasPolicy) -> Vec<String> {
        let aliases = self.aliases(policy);

        self.join_context
            .iter()
            .enumerate()
            .map(|(i, ctx)| {
                format!(
                    "{} = {}",
                    dialect.column(&aliases[i], &ctx.source_column),
                    dialect.column(&aliases[i + 1], &ctx.dest_column)
                )
            })
            .collect()
    }

    /// `(alias, unhashed alias)` of every joined table, without the root.
    #[must_use]
    pub fn alias_paths(&self, policy: &AliasPolicy) -> Vec<(String, String)> {
        let root = self.root().table();
        let mut links = Vec::with_capacity(self.join_context.len());
        let mut paths = Vec::with_capacity(self.join_context.len());
        for ctx in &self.join_context {
            links.push(ctx.link.as_str());
            let path = generate_table_alias(root, &links);
            paths.push((policy.apply(path.clone()), path));
        }

        paths
    }

    /// Joined tables, without the root.
    #[must_use]
    pub fn tables(&self, policy: &AliasPolicy) -> Vec<TableRef> {
        let aliases = self.aliases(policy);

        self.join_context
            .iter()
            .zip(aliases.into_iter().skip(1))
            .map(|(ctx, alias)| TableRef::new(ctx.dest.table(), alias))
            .collect()
    }
}
