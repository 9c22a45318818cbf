use crate::{
    db::{
        domain::{DomainNode, Operator, normalize},
        expression::{CompileEnv, CompileError, Expression, TableRef, bind_params},
        query::{Connection, Query, QueryError},
    },
    error::Error,
    model::{EntityModel, FieldKind},
    value::Value,
};
use tracing::warn;

/// Compile `domain` (with `params` bound to its `?` operands) into a
/// [`Query`] over `model`.
///
/// When the model has an `active` field, and both the context and the
/// compiler config enable it, a domain that does not mention `active` at
/// its top level gets `('active', '=', True)` prepended.
pub fn where_calc<'r>(
    env: &CompileEnv<'r>,
    model: &'r EntityModel,
    domain: &DomainNode,
    params: &[Value],
) -> Result<Query, Error> {
    let mut domain = if domain.is_empty() {
        DomainNode::new()
    } else {
        normalize(&bind_params(domain, params)?)?
    };
    if domain.is_empty() && !params.is_empty() {
        return Err(CompileError::UnusedParameters {
            given: params.len(),
            used: 0,
        }
        .into());
    }

    if model.has_field("active")
        && env.context.active_test
        && env.config.active_test
        && !mentions_active(&domain)
    {
        domain.insert(0, DomainNode::leaf("active", Operator::Eq, true));
    }

    if domain.is_empty() {
        return Ok(Query::new(vec![TableRef::bare(model.table())], Vec::new(), Vec::new()));
    }

    let expression = Expression::compile(env, model, &domain)?;
    let (clause, params) = expression.to_sql(&[])?;

    Ok(Query::new(expression.tables(), vec![clause], params)
        .with_reads(expression.dependencies())
        .with_alias_paths(expression.alias_paths()))
}

fn mentions_active(domain: &DomainNode) -> bool {
    domain
        .items()
        .iter()
        .filter(|item| item.is_leaf())
        .any(|leaf| leaf.item(0).and_then(DomainNode::text) == Some("active"))
}

/// Qualified `"alias"."field"` reference, adding one implicit join per
/// `_inherits` hop until the model owning the column is reached.
pub fn inherits_join_calc(
    env: &CompileEnv<'_>,
    alias: &str,
    field: &str,
    model: &EntityModel,
    query: &mut Query,
) -> Result<String, Error> {
    let (alias, _) = inherited_owner(env, alias, field, model, query)?;

    Ok(env.dialect.column(&alias, field))
}

// Walk `_inherits` links for `field`; returns the owning alias and model.
fn inherited_owner<'r>(
    env: &CompileEnv<'r>,
    alias: &str,
    field: &str,
    model: &EntityModel,
    query: &mut Query,
) -> Result<(String, &'r EntityModel), Error> {
    let policy = env.alias_policy();
    let mut current = env.registry.model(&model.name)?;
    let mut alias = alias.to_string();

    loop {
        let Some(descriptor) = current.get_field(field) else {
            return Err(CompileError::InvalidField {
                field: field.to_string(),
                model: current.name.clone(),
            }
            .into());
        };
        let Some(inherited) = &descriptor.inherited else {
            return Ok((alias, current));
        };

        let parent = env.registry.model(&inherited.parent_model)?;
        let (parent_alias, _) = query.add_join(
            Connection {
                lhs_alias: &alias,
                table: parent.table(),
                lhs_column: &inherited.link_field,
                column: parent.id_field(),
                link: &inherited.link_field,
            },
            true,
            false,
            None,
            env.dialect,
            &policy,
        )?;

        alias = parent_alias;
        current = parent;
    }
}

/// `ORDER BY` terms for `spec` (`"name desc, partner_id"`); the model's
/// default order when `spec` is empty.
///
/// Many-to-one fields are ordered by the comodel's own order through an
/// explicit `LEFT JOIN`, in the requested direction. Fields without a
/// column are skipped.
pub fn order_calc(
    env: &CompileEnv<'_>,
    model: &EntityModel,
    spec: &str,
    query: &mut Query,
) -> Result<Vec<String>, Error> {
    let spec = if spec.trim().is_empty() {
        model.order.as_str()
    } else {
        spec
    };

    let mut terms = Vec::new();
    for (field, direction) in parse_order(spec)? {
        terms.extend(order_term(env, model, field, direction, query)?);
    }

    Ok(terms)
}

fn parse_order(spec: &str) -> Result<Vec<(&str, &'static str)>, QueryError> {
    let invalid = || QueryError::InvalidOrder {
        spec: spec.to_string(),
    };

    let mut parts = Vec::new();
    for part in spec.split(',') {
        let mut words = part.split_whitespace();
        let field = words.next().ok_or_else(invalid)?;
        let direction = match words.next() {
            None => "ASC",
            Some(word) if word.eq_ignore_ascii_case("asc") => "ASC",
            Some(word) if word.eq_ignore_ascii_case("desc") => "DESC",
            Some(_) => return Err(invalid()),
        };
        if words.next().is_some()
            || !field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid());
        }
        parts.push((field, direction));
    }

    Ok(parts)
}

fn order_term(
    env: &CompileEnv<'_>,
    model: &EntityModel,
    field: &str,
    direction: &str,
    query: &mut Query,
) -> Result<Vec<String>, Error> {
    let root = model.table();
    if field == model.id_field() {
        return Ok(vec![format!("{} {direction}", env.dialect.column(root, field))]);
    }

    let Some(descriptor) = model.get_field(field) else {
        return Err(QueryError::UnknownOrderField {
            field: field.to_string(),
            model: model.name.clone(),
        }
        .into());
    };
    if !descriptor.has_column() {
        warn!(model = %model.name, field, "cannot order by a field without a column, skipped");
        return Ok(Vec::new());
    }

    let (alias, owner) = inherited_owner(env, root, field, model, query)?;
    let FieldKind::ManyToOne { comodel } = &descriptor.kind else {
        return Ok(vec![format!("{} {direction}", env.dialect.column(&alias, field))]);
    };

    let comodel = env.registry.model(comodel)?;
    let (join_alias, _) = query.add_join(
        Connection {
            lhs_alias: &alias,
            table: comodel.table(),
            lhs_column: field,
            column: comodel.id_field(),
            link: field,
        },
        false,
        true,
        None,
        env.dialect,
        &env.alias_policy(),
    )?;

    let mut terms = Vec::new();
    for (order_field, _) in parse_order(&comodel.order)? {
        let qualified = if order_field == comodel.id_field() {
            env.dialect.column(&join_alias, order_field)
        } else {
            match comodel.get_field(order_field) {
                Some(f) if f.has_column() => {
                    inherits_join_calc(env, &join_alias, order_field, comodel, query)?
                }
                _ => {
                    warn!(
                        model = %owner.name,
                        field,
                        order_field,
                        "comodel order field has no column, skipped"
                    );
                    continue;
                }
            }
        };
        terms.push(format!("{qualified} {direction}"));
    }

    Ok(terms)
}
