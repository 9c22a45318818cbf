use crate::{
    db::{
        domain::{DomainNode, Operator},
        expression::compile::Compiler,
    },
    error::Error,
    model::EntityModel,
    obs::MetricsEvent,
    value::Value,
};
use std::collections::BTreeSet;

impl Compiler<'_, '_> {
    /// Resolve a hierarchy operand to ids: integers pass through, names go
    /// through `name_search` with `ilike`.
    pub(super) fn to_ids(&self, value: &Value, model: &EntityModel) -> Result<Vec<i64>, Error> {
        let mut ids = Vec::new();
        match value {
            Value::Int(id) => ids.push(*id),
            Value::Text(_) => ids.extend(self.name_search(model, value, Operator::Ilike)?),
            Value::List(items) => {
                for item in items {
                    match item {
                        Value::Int(id) => ids.push(*id),
                        Value::Text(_) => {
                            ids.extend(self.name_search(model, item, Operator::Ilike)?);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        let mut seen = BTreeSet::new();
        ids.retain(|id| seen.insert(*id));

        Ok(ids)
    }

    /// `[(left, 'in', ids)]` where ids is `ids` plus every descendant
    /// (`child_of`) or ancestor (`parent_of`) along `parent_field`.
    pub(super) fn hierarchy_domain(
        &self,
        left: &str,
        ids: &[i64],
        model: &EntityModel,
        parent_field: &str,
        op: Operator,
    ) -> Result<DomainNode, Error> {
        if ids.is_empty() {
            return Ok(DomainNode::list([DomainNode::false_leaf()]));
        }

        let ids = match op {
            Operator::ChildOf => self.descendants(model, parent_field, ids)?,
            Operator::ParentOf => self.ancestors(model, parent_field, ids)?,
            _ => ids.to_vec(),
        };

        Ok(DomainNode::list([DomainNode::leaf(
            left,
            Operator::In,
            Value::ids(ids),
        )]))
    }

    // Breadth-first; ids already seen stop the walk, so cycles terminate.
    fn descendants(
        &self,
        model: &EntityModel,
        parent_field: &str,
        ids: &[i64],
    ) -> Result<Vec<i64>, Error> {
        let context = self.env.context.clone().with_active_test(false);
        let mut seen: BTreeSet<i64> = ids.iter().copied().collect();
        let mut out = ids.to_vec();
        let mut frontier = ids.to_vec();

        while !frontier.is_empty() {
            let domain = DomainNode::list([DomainNode::leaf(
                parent_field,
                Operator::In,
                Value::ids(frontier),
            )]);
            self.env
                .sink
                .record(MetricsEvent::SubSearch { model: &model.name });
            self.note_read(model.table());
            let children = self.env.orm.search(&model.name, &domain, &context)?;

            frontier = children.into_iter().filter(|id| seen.insert(*id)).collect();
            out.extend_from_slice(&frontier);
        }

        Ok(out)
    }

    fn ancestors(
        &self,
        model: &EntityModel,
        parent_field: &str,
        ids: &[i64],
    ) -> Result<Vec<i64>, Error> {
        let context = self.env.context.clone().with_active_test(false);
        let mut seen: BTreeSet<i64> = ids.iter().copied().collect();
        let mut out = ids.to_vec();
        let mut frontier = ids.to_vec();

        while !frontier.is_empty() {
            self.env
                .sink
                .record(MetricsEvent::SubSearch { model: &model.name });
            self.note_read(model.table());
            let parents = self
                .env
                .orm
                .read_ids(&model.name, parent_field, &frontier, &context)?;

            frontier = parents.into_iter().filter(|id| seen.insert(*id)).collect();
            out.extend_from_slice(&frontier);
        }

        Ok(out)
    }
}
