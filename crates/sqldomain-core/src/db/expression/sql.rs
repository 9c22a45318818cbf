use crate::{
    db::{
        domain::{DomainNode, DomainOperator, Operator},
        expression::{
            CompileError,
            compile::Expression,
            leaf::{ExtendedLeaf, Leaf, Term},
        },
    },
    model::FieldKind,
    value::Value,
};
use tracing::{debug, warn};

type Fragment = (String, Vec<Value>);

impl Expression<'_> {
    /// Render the WHERE fragment and its positional parameters.
    ///
    /// `?` placeholders still present in leaf operands are bound to
    /// `params` in the order they appear in the emitted SQL.
    pub fn to_sql(&self, params: &[Value]) -> Result<(String, Vec<Value>), CompileError> {
        let mut cursor = ParamCursor::new(params);

        let mut rendered = Vec::with_capacity(self.result.len());
        for leaf in &self.result {
            rendered.push(match &leaf.term {
                Term::Operator(op) => Err(*op),
                _ => Ok(self.leaf_to_sql(leaf, &mut cursor)?),
            });
        }
        cursor.finish()?;

        let mut stack: Vec<Fragment> = Vec::new();
        for fragment in rendered.into_iter().rev() {
            match fragment {
                Ok(fragment) => stack.push(fragment),
                Err(DomainOperator::Not) => {
                    let (query, params) = pop(&mut stack)?;
                    stack.push((format!("(NOT ({query}))"), params));
                }
                Err(op) => {
                    let (q1, mut p1) = pop(&mut stack)?;
                    let (q2, p2) = pop(&mut stack)?;
                    let keyword = if op == DomainOperator::And { "AND" } else { "OR" };
                    p1.extend(p2);
                    stack.push((format!("({q1} {keyword} {q2})"), p1));
                }
            }
        }

        if stack.len() != 1 {
            return Err(CompileError::Internal(format!(
                "expression reduced to {} fragments",
                stack.len()
            )));
        }
        let (mut query, params) = pop(&mut stack)?;
        if !self.joins.is_empty() {
            query = format!("({}) AND {query}", self.joins.join(" AND "));
        }
        debug!(model = %self.root.name, sql = %query, "compiled domain");

        Ok((query, params))
    }

    fn leaf_to_sql(
        &self,
        leaf: &ExtendedLeaf<'_>,
        cursor: &mut ParamCursor<'_>,
    ) -> Result<Fragment, CompileError> {
        let Leaf { left, op, right } = match &leaf.term {
            Term::True => return Ok(("TRUE".to_string(), Vec::new())),
            Term::False => return Ok(("FALSE".to_string(), Vec::new())),
            Term::Operator(op) => {
                return Err(CompileError::Internal(format!(
                    "operator '{op}' rendered as a leaf"
                )));
            }
            Term::Leaf(leaf) => leaf,
        };

        let model = leaf.model;
        let dialect = self.dialect;
        let alias = leaf.alias(&self.policy);
        let column = dialect.column(&alias, left);
        let right = cursor.bind(right)?;

        match op {
            Operator::InSelect | Operator::NotInSelect => {
                let Value::Select(select) = right else {
                    return Err(CompileError::InvalidLeaf {
                        leaf: leaf.term.to_string(),
                    });
                };
                return Ok((
                    format!("({column} {} ({}))", op.sql(), select.sql),
                    select.params,
                ));
            }
            Operator::In | Operator::NotIn => {
                return Ok(in_to_sql(&column, *op, right, left == model.id_field()));
            }
            _ => {}
        }

        let field = model.get_field(left);
        if field.is_none() && !model.is_magic_column(left) {
            return Err(CompileError::InvalidField {
                field: left.clone(),
                model: model.name.clone(),
            });
        }
        let is_boolean = field.is_some_and(|f| f.kind == FieldKind::Boolean);

        let op = match op {
            Operator::EqOrSkip if right.is_blank() => return Ok(("TRUE".to_string(), Vec::new())),
            Operator::EqOrSkip => Operator::Eq,
            other => *other,
        };

        match (op, &right) {
            (Operator::Eq, Value::Bool(false)) if is_boolean => {
                return Ok((format!("({column} IS NULL OR {column} = false)"), Vec::new()));
            }
            (Operator::Ne, Value::Bool(false)) if is_boolean => {
                return Ok((
                    format!("({column} IS NOT NULL AND {column} != false)"),
                    Vec::new(),
                ));
            }
            (Operator::Eq, value) if value.is_blank() => {
                return Ok((format!("{column} IS NULL"), Vec::new()));
            }
            (Operator::Ne, value) if value.is_blank() => {
                return Ok((format!("{column} IS NOT NULL"), Vec::new()));
            }
            _ => {}
        }

        if left == model.id_field() {
            return Ok((format!("{column} {} ?", op.sql()), vec![right]));
        }

        let is_like = op.sql().ends_with("like");
        let operand = if is_like {
            dialect.text_cast(&column)
        } else {
            column.clone()
        };
        let query = format!("({operand} {} ?)", dialect.like_operator(op.sql()));

        if op.needs_wildcard() {
            let text = match right {
                Value::Text(text) => text,
                other => other.to_string(),
            };
            let query = if text.is_empty() {
                format!("({query} OR {column} IS NULL)")
            } else {
                query
            };
            return Ok((query, vec![Value::Text(wrap_wildcards(&text))]));
        }

        Ok((query, vec![right]))
    }
}

// `in` / `not in` with NULL-aware handling of blank members.
fn in_to_sql(column: &str, op: Operator, right: Value, is_id: bool) -> Fragment {
    let items = match right {
        Value::Bool(flag) => {
            warn!(column, "boolean operand used with '{op}', use '=' or '!=' instead");
            let null = (op == Operator::In) != flag;
            let test = if null { "NULL" } else { "NOT NULL" };
            return (format!("({column} IS {test})"), Vec::new());
        }
        Value::List(items) => items,
        other => vec![other],
    };

    let (params, check_nulls) = if is_id {
        (items, false)
    } else {
        let total = items.len();
        let params: Vec<Value> = items.into_iter().filter(|v| !v.is_blank()).collect();
        let check_nulls = params.len() < total;
        (params, check_nulls)
    };

    let query = if !params.is_empty() {
        let marks = vec!["?"; params.len()].join(",");
        format!("({column} {} ({marks}))", op.sql())
    } else if op == Operator::In {
        "FALSE".to_string()
    } else {
        "TRUE".to_string()
    };

    let query = match (check_nulls, op) {
        (true, Operator::In) | (false, Operator::NotIn) => {
            format!("({query} OR {column} IS NULL)")
        }
        (true, Operator::NotIn) => format!("({query} AND {column} IS NOT NULL)"),
        _ => query,
    };

    (query, params)
}

// `%text%` unless the pattern is already wrapped.
fn wrap_wildcards(text: &str) -> String {
    if text.len() >= 2 && text.starts_with('%') && text.ends_with('%') {
        text.to_string()
    } else {
        format!("%{text}%")
    }
}

fn pop(stack: &mut Vec<Fragment>) -> Result<Fragment, CompileError> {
    stack
        .pop()
        .ok_or_else(|| CompileError::Internal("operator without enough operands".into()))
}

///
/// ParamCursor
/// Hands out caller parameters to `?` placeholders in order.
///

pub(crate) struct ParamCursor<'p> {
    params: &'p [Value],
    next: usize,
}

impl<'p> ParamCursor<'p> {
    pub(crate) const fn new(params: &'p [Value]) -> Self {
        Self { params, next: 0 }
    }

    /// Replace placeholders in `value`; a list bound inside a list is spliced.
    pub(crate) fn bind(&mut self, value: &Value) -> Result<Value, CompileError> {
        match value {
            Value::Placeholder => {
                let bound = self
                    .params
                    .get(self.next)
                    .cloned()
                    .ok_or(CompileError::MissingParameter { index: self.next })?;
                self.next += 1;
                Ok(bound)
            }
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match (item.is_placeholder(), self.bind(item)?) {
                        (true, Value::List(inner)) => out.extend(inner),
                        (_, bound) => out.push(bound),
                    }
                }
                Ok(Value::List(out))
            }
            other => Ok(other.clone()),
        }
    }

    pub(crate) fn finish(&self) -> Result<(), CompileError> {
        if self.next < self.params.len() {
            return Err(CompileError::UnusedParameters {
                given: self.params.len(),
                used: self.next,
            });
        }

        Ok(())
    }
}

/// Substitute `?` operands of a domain with `params`, leaf by leaf.
///
/// Binding before compilation lets sub-searches and name resolution see
/// real values instead of placeholders.
pub fn bind_params(domain: &DomainNode, params: &[Value]) -> Result<DomainNode, CompileError> {
    let mut cursor = ParamCursor::new(params);
    let bound = if domain.is_leaf() {
        bind_leaf(domain, &mut cursor)?
    } else {
        let mut out = DomainNode::new();
        for item in domain.items() {
            out.push(if item.is_leaf() {
                bind_leaf(item, &mut cursor)?
            } else {
                item.clone()
            });
        }
        out
    };
    cursor.finish()?;

    Ok(bound)
}

fn bind_leaf(leaf: &DomainNode, cursor: &mut ParamCursor<'_>) -> Result<DomainNode, CompileError> {
    let items = leaf.items();
    let right = cursor.bind(&items[2].to_value())?;

    Ok(DomainNode::list([
        items[0].clone(),
        items[1].clone(),
        DomainNode::value(right),
    ]))
}
