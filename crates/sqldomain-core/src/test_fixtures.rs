use crate::{
    config::CompilerConfig,
    db::{
        dialect::Postgres,
        domain::{DomainNode, Operator, parse},
        expression::{CompileEnv, Context, Expression, Orm},
    },
    error::Error,
    model::{EntityModel, FieldModel, Registry},
    value::Value,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;

///
/// registry
///
/// Partner-style fixture models:
/// - `res.partner` with every relation kind, computed fields and `active`
/// - `res.users` inheriting `res.partner` through `partner_id`
/// - `res.company`, `res.partner.category` (both hierarchical)
/// - `res.partner.bank` (joined through an auto-join one-to-many)
/// - `res.partner.title`
///

pub(crate) fn registry() -> Registry {
    Registry::builder()
        .model(partner())
        .and_then(|b| {
            b.model(
                EntityModel::new("res.users", "res_users")
                    .inherits("res.partner", "partner_id")
                    .rec_name("login")
                    .order("login")
                    .field(FieldModel::char("login"))
                    .field(FieldModel::boolean("share")),
            )
        })
        .and_then(|b| {
            b.model(
                EntityModel::new("res.company", "res_company")
                    .field(FieldModel::char("name"))
                    .field(FieldModel::many2one("parent_id", "res.company")),
            )
        })
        .and_then(|b| {
            b.model(
                EntityModel::new("res.partner.category", "res_partner_category")
                    .field(FieldModel::char("name").translate())
                    .field(FieldModel::many2one("parent_id", "res.partner.category")),
            )
        })
        .and_then(|b| {
            b.model(
                EntityModel::new("res.partner.bank", "res_partner_bank")
                    .rec_name("acc_number")
                    .field(FieldModel::char("acc_number"))
                    .field(FieldModel::many2one("partner_id", "res.partner"))
                    .field(FieldModel::boolean("active")),
            )
        })
        .and_then(|b| {
            b.model(
                EntityModel::new("res.partner.title", "res_partner_title")
                    .field(FieldModel::char("name").translate()),
            )
        })
        .and_then(crate::model::RegistryBuilder::build)
        .expect("fixture registry builds")
}

fn partner() -> EntityModel {
    EntityModel::new("res.partner", "res_partner")
        .order("name")
        .field(FieldModel::char("name"))
        .field(FieldModel::boolean("active"))
        .field(FieldModel::boolean("is_company"))
        .field(FieldModel::text("comment").translate())
        .field(FieldModel::date("date"))
        .field(FieldModel::datetime("last_seen"))
        .field(FieldModel::many2one("parent_id", "res.partner"))
        .field(FieldModel::one2many("child_ids", "res.partner", "parent_id"))
        .field(FieldModel::many2one("company_id", "res.company").auto_join())
        .field(FieldModel::many2one("title", "res.partner.title"))
        .field(FieldModel::many2many(
            "category_id",
            "res.partner.category",
            "res_partner_res_partner_category_rel",
            "partner_id",
            "category_id",
        ))
        .field(
            FieldModel::one2many("bank_ids", "res.partner.bank", "partner_id")
                .auto_join()
                .with_domain("[('active', '=', True)]"),
        )
        .field(
            FieldModel::char("display_name").searchable(|op: Operator, value: &Value| {
                DomainNode::list([DomainNode::leaf("name", op, value.clone())])
            }),
        )
        .field(FieldModel::char("complete_address").computed())
}

///
/// MockOrm
///
/// Canned answers for sub-searches. Searches are keyed by the serialized
/// domain, name searches by the literal of the searched name. Every call
/// is recorded.
///

#[derive(Default)]
pub(crate) struct MockOrm {
    searches: BTreeMap<(String, String), Vec<i64>>,
    names: BTreeMap<(String, String), Vec<i64>>,
    parents: BTreeMap<(String, i64), i64>,
    calls: Mutex<Vec<String>>,
}

impl MockOrm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_search(mut self, model: &str, domain: &DomainNode, ids: &[i64]) -> Self {
        self.searches
            .insert((model.to_string(), domain.string()), ids.to_vec());
        self
    }

    pub(crate) fn with_leaf_search(
        self,
        model: &str,
        left: &str,
        op: Operator,
        right: impl Into<Value>,
        ids: &[i64],
    ) -> Self {
        let domain = DomainNode::list([DomainNode::leaf(left, op, right)]);
        self.with_search(model, &domain, ids)
    }

    pub(crate) fn with_names(mut self, model: &str, name: impl Into<Value>, ids: &[i64]) -> Self {
        self.names
            .insert((model.to_string(), name.into().to_string()), ids.to_vec());
        self
    }

    pub(crate) fn with_parent(mut self, model: &str, id: i64, parent: i64) -> Self {
        self.parents.insert((model.to_string(), id), parent);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl Orm for MockOrm {
    fn search(
        &self,
        model: &str,
        domain: &DomainNode,
        _context: &Context,
    ) -> Result<Vec<i64>, Error> {
        let key = (model.to_string(), domain.string());
        self.calls.lock().push(format!("search {model} {}", key.1));

        Ok(self.searches.get(&key).cloned().unwrap_or_default())
    }

    fn name_search(
        &self,
        model: &str,
        name: &Value,
        op: Operator,
        _context: &Context,
    ) -> Result<Vec<i64>, Error> {
        self.calls
            .lock()
            .push(format!("name_search {model} {name} {op}"));

        Ok(self
            .names
            .get(&(model.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn read_ids(
        &self,
        model: &str,
        field: &str,
        ids: &[i64],
        _context: &Context,
    ) -> Result<Vec<i64>, Error> {
        self.calls
            .lock()
            .push(format!("read_ids {model} {field} {ids:?}"));

        Ok(ids
            .iter()
            .filter_map(|id| self.parents.get(&(model.to_string(), *id)).copied())
            .collect())
    }
}

/// Compile `domain` against `model` with default settings and render it.
pub(crate) fn compile_sql(
    registry: &Registry,
    orm: &MockOrm,
    model: &str,
    domain: &str,
) -> Result<(String, Vec<Value>), Error> {
    compile_with(registry, orm, &CompilerConfig::default(), model, domain, &[])
}

pub(crate) fn compile_with(
    registry: &Registry,
    orm: &MockOrm,
    config: &CompilerConfig,
    model: &str,
    domain: &str,
    params: &[Value],
) -> Result<(String, Vec<Value>), Error> {
    let context = Context::default();
    let env = CompileEnv::new(registry, &Postgres, orm, &context, config);
    let model = registry.model(model)?;
    let domain = parse(domain)?;
    let expression = Expression::compile(&env, model, &domain)?;

    Ok(expression.to_sql(params)?)
}
