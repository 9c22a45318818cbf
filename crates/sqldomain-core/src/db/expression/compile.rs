use crate::{
    db::{
        dialect::Dialect,
        domain::{DomainNode, DomainOperator, Operator, distribute_not, normalize, prepare},
        expression::{
            CompileEnv, CompileError,
            join::{AliasPolicy, TableRef},
            leaf::{ExtendedLeaf, Leaf, Term},
        },
    },
    error::Error,
    model::{EntityModel, FieldKind, FieldModel},
    obs::MetricsEvent,
    value::{SubSelect, Value},
};
use chrono::NaiveDate;
use std::{cell::RefCell, collections::BTreeSet};
use tracing::{trace, warn};

///
/// Expression
///
/// A compiled domain: the resolved leaves in prefix order plus the join
/// conditions they need. Render with [`Expression::to_sql`].
///
/// `reads` holds the tables consulted outside the FROM list: sub-select
/// sources and the models searched while resolving.
///

#[derive(Debug)]
pub struct Expression<'r> {
    pub(super) root: &'r EntityModel,
    pub(super) result: Vec<ExtendedLeaf<'r>>,
    pub(super) joins: Vec<String>,
    pub(super) dialect: &'r dyn Dialect,
    pub(super) policy: AliasPolicy,
    pub(super) reads: BTreeSet<String>,
}

impl<'r> Expression<'r> {
    /// Resolve `domain` against `root`. The domain is normalized and its
    /// negations distributed first, so raw parser output is accepted.
    pub fn compile(
        env: &CompileEnv<'r>,
        root: &'r EntityModel,
        domain: &DomainNode,
    ) -> Result<Self, Error> {
        let prepared = distribute_not(&normalize(domain)?);

        let mut stack = Vec::with_capacity(prepared.len());
        for node in prepared.items().iter().rev() {
            stack.push(ExtendedLeaf::new(Term::from_node(node)?, root));
        }

        let mut compiler = Compiler {
            env,
            stack,
            result: Vec::new(),
            reads: RefCell::default(),
        };
        compiler.run()?;

        let policy = env.alias_policy();
        let mut joins: Vec<String> = Vec::new();
        for leaf in &compiler.result {
            for condition in leaf.join_conditions(env.dialect, &policy) {
                if !joins.contains(&condition) {
                    joins.push(condition);
                }
            }
        }

        let leaves = compiler
            .result
            .iter()
            .filter(|leaf| !leaf.term.is_operator())
            .count();
        env.sink.record(MetricsEvent::Compile {
            model: &root.name,
            leaves: leaves as u64,
            joins: joins.len() as u64,
        });

        Ok(Self {
            root,
            result: compiler.result,
            joins,
            dialect: env.dialect,
            policy,
            reads: compiler.reads.into_inner(),
        })
    }

    #[must_use]
    pub const fn root(&self) -> &'r EntityModel {
        self.root
    }

    /// Resolved terms, in prefix order.
    #[must_use]
    pub fn result(&self) -> &[ExtendedLeaf<'r>] {
        &self.result
    }

    /// Join conditions, deduplicated in first-seen order.
    #[must_use]
    pub fn joins(&self) -> &[String] {
        &self.joins
    }

    /// Root table first, then every joined table once.
    #[must_use]
    pub fn tables(&self) -> Vec<TableRef> {
        let mut tables = vec![TableRef::bare(self.root.table())];
        for leaf in &self.result {
            for table in leaf.tables(&self.policy) {
                if !tables.iter().any(|t| t.alias == table.alias) {
                    tables.push(table);
                }
            }
        }

        tables
    }

    /// `(alias, unhashed alias)` of every joined table.
    #[must_use]
    pub fn alias_paths(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        for leaf in &self.result {
            for (alias, path) in leaf.alias_paths(&self.policy) {
                if !out.iter().any(|(seen, _)| *seen == alias) {
                    out.push((alias, path));
                }
            }
        }

        out
    }

    /// Every table the compiled statement depends on: the FROM tables plus
    /// those read through sub-selects or searched during resolution.
    #[must_use]
    pub fn dependencies(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let from = self.tables().into_iter().map(|t| t.table);
        for table in from.chain(self.reads.iter().cloned()) {
            if !out.contains(&table) {
                out.push(table);
            }
        }

        out
    }
}

///
/// Compiler
/// Working state of one compilation: the pending stack, the result and
/// the tables read along the way.
///

pub(super) struct Compiler<'e, 'r> {
    pub(super) env: &'e CompileEnv<'r>,
    stack: Vec<ExtendedLeaf<'r>>,
    result: Vec<ExtendedLeaf<'r>>,
    reads: RefCell<BTreeSet<String>>,
}

impl<'r> Compiler<'_, 'r> {
    fn run(&mut self) -> Result<(), Error> {
        while let Some(leaf) = self.stack.pop() {
            self.step(leaf)?;
        }

        Ok(())
    }

    fn step(&mut self, mut leaf: ExtendedLeaf<'r>) -> Result<(), Error> {
        let Term::Leaf(Leaf { left, op, right }) = leaf.term.clone() else {
            self.result.push(leaf);
            return Ok(());
        };
        let model = leaf.model;
        trace!(model = %model.name, term = %leaf.term, "resolving leaf");

        let (head, tail) = match left.split_once('.') {
            Some((head, tail)) => (head, Some(tail)),
            None => (left.as_str(), None),
        };

        if tail.is_none() && head == model.id_field() && op.is_hierarchical() {
            let ids = self.to_ids(&right, model)?;
            let domain =
                self.hierarchy_domain(model.id_field(), &ids, model, &model.parent_name, op)?;
            return self.push_terms(&leaf, &domain);
        }

        if tail.is_none() && model.is_magic_column(head) {
            self.result.push(leaf);
            return Ok(());
        }

        let Some(field) = model.get_field(head) else {
            return Err(CompileError::InvalidField {
                field: left.clone(),
                model: model.name.clone(),
            }
            .into());
        };

        if let Some(inherited) = &field.inherited {
            let parent = self.env.registry.model(&inherited.parent_model)?;
            leaf.add_join_context(
                parent,
                &inherited.link_field,
                parent.id_field(),
                &inherited.link_field,
            );
            self.stack.push(leaf);
            return Ok(());
        }

        if !field.store {
            return self.non_stored(leaf, field, tail, op, right);
        }

        match tail {
            Some(rest) => self.follow_path(leaf, field, rest, op, right),
            None => self.terminal(leaf, field, op, right),
        }
    }

    // dotted paths

    fn follow_path(
        &mut self,
        mut leaf: ExtendedLeaf<'r>,
        field: &'r FieldModel,
        rest: &str,
        op: Operator,
        right: Value,
    ) -> Result<(), Error> {
        let model = leaf.model;
        let comodel = self.comodel(model, field)?;

        match &field.kind {
            FieldKind::ManyToOne { .. } if field.auto_join => {
                leaf.add_join_context(comodel, &field.name, comodel.id_field(), &field.name);
                self.stack.push(leaf.substitute(Term::leaf(rest, op, right)));
            }

            FieldKind::OneToMany { inverse, .. } if field.auto_join => {
                leaf.add_join_context(comodel, model.id_field(), inverse, &field.name);
                self.stack.push(leaf.substitute(Term::leaf(rest, op, right)));

                if let Some(text) = &field.domain {
                    let domain = prepare(text, self.env.config.max_depth)?;
                    self.push_terms(&leaf, &domain)?;
                    self.stack
                        .push(leaf.substitute(Term::Operator(DomainOperator::And)));
                }
            }

            FieldKind::ManyToMany { .. } if field.auto_join => {
                return Err(CompileError::AutoJoinMany2Many {
                    field: field.name.clone(),
                    model: model.name.clone(),
                }
                .into());
            }

            FieldKind::ManyToOne { .. } => {
                let ids = self.sub_search(comodel, rest, op, right)?;
                leaf.term = Term::leaf(field.name.as_str(), Operator::In, Value::ids(ids));
                self.stack.push(leaf);
            }

            _ => {
                let ids = self.sub_search(comodel, rest, op, right)?;
                let domain = DomainNode::list([DomainNode::leaf(
                    field.name.as_str(),
                    Operator::In,
                    Value::ids(ids),
                )]);
                let own_ids = self.orm_search(model, &domain)?;
                leaf.term = Term::leaf(model.id_field(), Operator::In, Value::ids(own_ids));
                self.stack.push(leaf);
            }
        }

        Ok(())
    }

    // non-stored fields

    fn non_stored(
        &mut self,
        mut leaf: ExtendedLeaf<'r>,
        field: &'r FieldModel,
        tail: Option<&str>,
        op: Operator,
        right: Value,
    ) -> Result<(), Error> {
        let model = leaf.model;
        let Some(search) = &field.search else {
            warn!(
                model = %model.name,
                field = %field.name,
                "non-stored field is not searchable, leaf replaced by TRUE"
            );
            leaf.term = Term::True;
            self.result.push(leaf);
            return Ok(());
        };

        let (op, right) = match tail {
            Some(rest) => {
                let comodel = self.comodel(model, field)?;
                let ids = self.sub_search(comodel, rest, op, right)?;
                (Operator::In, Value::ids(ids))
            }
            None => (op, right),
        };

        let domain = search.search(field, op, &right)?;
        let domain = distribute_not(&normalize(&domain)?);

        self.push_terms(&leaf, &domain)
    }

    // terminal leaves

    fn terminal(
        &mut self,
        mut leaf: ExtendedLeaf<'r>,
        field: &'r FieldModel,
        op: Operator,
        right: Value,
    ) -> Result<(), Error> {
        if op.is_hierarchical() {
            return self.hierarchy_leaf(leaf, field, op, &right);
        }

        match &field.kind {
            FieldKind::OneToMany { .. } | FieldKind::ManyToMany { .. } => {
                self.x2many(leaf, field, op, &right)
            }

            FieldKind::ManyToOne { .. } if right.is_text_like() => {
                self.many2one_by_name(leaf, field, op, &right)
            }

            FieldKind::DateTime => {
                if let Value::Text(text) = &right
                    && text.len() == 10
                    && NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
                {
                    let time = if matches!(op, Operator::Gt | Operator::Le) {
                        "23:59:59"
                    } else {
                        "00:00:00"
                    };
                    leaf.term = Term::leaf(field.name.as_str(), op, format!("{text} {time}"));
                }
                self.result.push(leaf);
                Ok(())
            }

            _ => {
                if field.translate
                    && op.needs_wildcard()
                    && let Value::Text(text) = &right
                    && !text.contains('%')
                {
                    leaf.term = Term::leaf(field.name.as_str(), op, format!("%{text}%"));
                }
                self.result.push(leaf);
                Ok(())
            }
        }
    }

    fn hierarchy_leaf(
        &mut self,
        leaf: ExtendedLeaf<'r>,
        field: &'r FieldModel,
        op: Operator,
        right: &Value,
    ) -> Result<(), Error> {
        let model = leaf.model;
        if !field.is_related() {
            return Err(CompileError::UnsupportedOperator {
                field: field.name.clone(),
                model: model.name.clone(),
                op: op.to_string(),
            }
            .into());
        }

        let comodel = self.comodel(model, field)?;
        let ids = self.to_ids(right, comodel)?;

        // A self-referencing many-to-one is the hierarchy itself.
        let domain = if comodel.name == model.name
            && matches!(field.kind, FieldKind::ManyToOne { .. })
        {
            self.hierarchy_domain(model.id_field(), &ids, model, &field.name, op)?
        } else {
            self.hierarchy_domain(&field.name, &ids, comodel, &comodel.parent_name, op)?
        };

        self.push_terms(&leaf, &domain)
    }

    // x2many leaves become `id [not] inselect (...)` over the link column.
    fn x2many(
        &mut self,
        mut leaf: ExtendedLeaf<'r>,
        field: &'r FieldModel,
        op: Operator,
        right: &Value,
    ) -> Result<(), Error> {
        let model = leaf.model;
        let comodel = self.comodel(model, field)?;
        let dialect = self.env.dialect;
        let negative = op.is_negative();

        match &field.kind {
            FieldKind::ManyToMany { relation, .. } => self.note_read(relation),
            _ => self.note_read(comodel.table()),
        }

        let (select, select_op) = if right.is_blank() {
            let sql = match &field.kind {
                FieldKind::OneToMany { inverse, .. } => format!(
                    "SELECT {col} FROM {table} WHERE {col} IS NOT NULL",
                    col = dialect.quote(inverse),
                    table = dialect.quote(comodel.table()),
                ),
                FieldKind::ManyToMany {
                    relation, column1, ..
                } => format!(
                    "SELECT {} FROM {}",
                    dialect.quote(column1),
                    dialect.quote(relation)
                ),
                _ => return Err(CompileError::Internal("x2many leaf on a scalar field".into()).into()),
            };
            let select_op = if negative {
                Operator::InSelect
            } else {
                Operator::NotInSelect
            };
            (SubSelect::new(sql, Vec::new()), select_op)
        } else {
            let ids = if right.is_text_like() {
                let positive = if negative { op.negate().unwrap_or(op) } else { op };
                self.name_search(comodel, right, positive)?
            } else {
                right.to_ids()
            };

            if ids.is_empty() {
                leaf.term = if negative { Term::True } else { Term::False };
                self.result.push(leaf);
                return Ok(());
            }

            let marks = vec!["?"; ids.len()].join(",");
            let sql = match &field.kind {
                FieldKind::OneToMany { inverse, .. } => format!(
                    "SELECT {} FROM {} WHERE {} IN ({marks})",
                    dialect.quote(inverse),
                    dialect.quote(comodel.table()),
                    dialect.quote(comodel.id_field()),
                ),
                FieldKind::ManyToMany {
                    relation,
                    column1,
                    column2,
                    ..
                } => format!(
                    "SELECT {} FROM {} WHERE {} IN ({marks})",
                    dialect.quote(column1),
                    dialect.quote(relation),
                    dialect.quote(column2),
                ),
                _ => return Err(CompileError::Internal("x2many leaf on a scalar field".into()).into()),
            };
            let select_op = if negative {
                Operator::NotInSelect
            } else {
                Operator::InSelect
            };
            let params = ids.into_iter().map(Value::Int).collect();
            (SubSelect::new(sql, params), select_op)
        };

        leaf.term = Term::leaf(model.id_field(), select_op, Value::Select(Box::new(select)));
        self.result.push(leaf);

        Ok(())
    }

    // Many-to-one compared with a name: resolve through name_search.
    fn many2one_by_name(
        &mut self,
        mut leaf: ExtendedLeaf<'r>,
        field: &'r FieldModel,
        op: Operator,
        right: &Value,
    ) -> Result<(), Error> {
        let comodel = self.comodel(leaf.model, field)?;

        let op = if op.is_ordering() { Operator::In } else { op };
        let is_list = matches!(right, Value::List(_));
        let op = match op {
            Operator::In if !is_list => Operator::Eq,
            Operator::NotIn if !is_list => Operator::Ne,
            Operator::Eq if is_list => Operator::In,
            Operator::Ne if is_list => Operator::NotIn,
            other => other,
        };

        let mut ids: Vec<Value> = self
            .name_search(comodel, right, op)?
            .into_iter()
            .map(Value::Int)
            .collect();
        if op.is_negative() {
            ids.push(Value::Bool(false));
        }

        leaf.term = Term::leaf(field.name.as_str(), Operator::In, Value::List(ids));
        self.result.push(leaf);

        Ok(())
    }

    // helpers

    /// Push the terms of a normalized domain so they pop in order.
    pub(super) fn push_terms(
        &mut self,
        leaf: &ExtendedLeaf<'r>,
        domain: &DomainNode,
    ) -> Result<(), Error> {
        for node in domain.items().iter().rev() {
            self.stack.push(leaf.substitute(Term::from_node(node)?));
        }

        Ok(())
    }

    fn comodel(
        &self,
        model: &EntityModel,
        field: &FieldModel,
    ) -> Result<&'r EntityModel, Error> {
        let name = field
            .related_model()
            .ok_or_else(|| CompileError::NotRelational {
                field: field.name.clone(),
                model: model.name.clone(),
            })?;

        Ok(self.env.registry.model(name)?)
    }

    /// Record a table the result depends on beyond the FROM list.
    pub(super) fn note_read(&self, table: &str) {
        self.reads.borrow_mut().insert(table.to_string());
    }

    fn sub_search(
        &self,
        comodel: &EntityModel,
        left: &str,
        op: Operator,
        right: Value,
    ) -> Result<Vec<i64>, Error> {
        let domain = DomainNode::list([DomainNode::leaf(left, op, right)]);
        self.orm_search(comodel, &domain)
    }

    pub(super) fn orm_search(
        &self,
        model: &EntityModel,
        domain: &DomainNode,
    ) -> Result<Vec<i64>, Error> {
        self.env
            .sink
            .record(MetricsEvent::SubSearch { model: &model.name });
        self.note_read(model.table());
        self.env.orm.search(&model.name, domain, self.env.context)
    }

    pub(super) fn name_search(
        &self,
        model: &EntityModel,
        name: &Value,
        op: Operator,
    ) -> Result<Vec<i64>, Error> {
        self.env
            .sink
            .record(MetricsEvent::SubSearch { model: &model.name });
        self.note_read(model.table());
        self.env
            .orm
            .name_search(&model.name, name, op, self.env.context)
    }
}
