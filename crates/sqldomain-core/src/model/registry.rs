use crate::model::{
    ModelError,
    entity::EntityModel,
    field::{FieldModel, Inherited},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::debug;

///
/// Registry
///
/// Immutable set of built models, keyed by model name.
///

#[derive(Clone, Debug, Default)]
pub struct Registry {
    models: BTreeMap<String, Arc<EntityModel>>,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EntityModel> {
        self.models.get(name).map(AsRef::as_ref)
    }

    pub fn model(&self, name: &str) -> Result<&EntityModel, ModelError> {
        self.get(name).ok_or_else(|| ModelError::UnknownModel {
            model: name.to_string(),
        })
    }

    /// Model owning `table`.
    #[must_use]
    pub fn by_table(&self, table: &str) -> Option<&EntityModel> {
        self.models
            .values()
            .map(AsRef::as_ref)
            .find(|model| model.table == table)
    }

    pub fn models(&self) -> impl Iterator<Item = &EntityModel> {
        self.models.values().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

///
/// RegistryBuilder
///

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    models: BTreeMap<String, EntityModel>,
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum Visit {
    Active,
    Done,
}

impl RegistryBuilder {
    pub fn model(mut self, model: EntityModel) -> Result<Self, ModelError> {
        if self.models.contains_key(&model.name) {
            return Err(ModelError::DuplicateModel { model: model.name });
        }
        self.models.insert(model.name.clone(), model);

        Ok(self)
    }

    /// Validate relations and resolve `_inherits` fields, parents first.
    pub fn build(mut self) -> Result<Registry, ModelError> {
        self.check_references()?;

        let names: Vec<String> = self.models.keys().cloned().collect();
        let mut state = BTreeMap::new();
        for name in &names {
            self.resolve(name, &mut state)?;
        }

        debug!(models = self.models.len(), "model registry built");

        Ok(Registry {
            models: self
                .models
                .into_iter()
                .map(|(name, model)| (name, Arc::new(model)))
                .collect(),
        })
    }

    fn check_references(&self) -> Result<(), ModelError> {
        for model in self.models.values() {
            for field in model.fields() {
                if let Some(comodel) = field.related_model()
                    && !self.models.contains_key(comodel)
                {
                    return Err(ModelError::UnknownComodel {
                        model: model.name.clone(),
                        field: field.name.clone(),
                        comodel: comodel.to_string(),
                    });
                }
            }
            for (parent, _) in &model.inherits {
                if !self.models.contains_key(parent) {
                    return Err(ModelError::UnknownModel {
                        model: parent.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    fn resolve(
        &mut self,
        name: &str,
        state: &mut BTreeMap<String, Visit>,
    ) -> Result<(), ModelError> {
        match state.get(name) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::Active) => {
                return Err(ModelError::InheritanceCycle {
                    model: name.to_string(),
                });
            }
            None => {}
        }
        state.insert(name.to_string(), Visit::Active);

        let inherits = self
            .models
            .get(name)
            .map(|model| model.inherits.clone())
            .unwrap_or_default();

        let mut pulled = Vec::new();
        for (parent, link) in &inherits {
            self.resolve(parent, state)?;
            let Some(parent_model) = self.models.get(parent) else {
                continue;
            };
            pulled.push((parent.clone(), link.clone(), parent_model.fields().to_vec()));
        }

        if let Some(model) = self.models.get_mut(name) {
            for (parent, link, fields) in pulled {
                if !model.has_field(&link) {
                    model.push_field(FieldModel::many2one(link.clone(), parent.clone()));
                }
                inherit_fields(model, &parent, &link, fields);
            }
        }
        state.insert(name.to_string(), Visit::Done);

        Ok(())
    }
}

// Local fields win; the first parent declaring a field wins over later ones.
fn inherit_fields(model: &mut EntityModel, parent: &str, link: &str, fields: Vec<FieldModel>) {
    let mut taken: BTreeSet<String> = model.fields().iter().map(|f| f.name.clone()).collect();

    for mut field in fields {
        if model.is_magic_column(&field.name) || taken.contains(&field.name) {
            continue;
        }
        field.inherited = Some(Inherited {
            parent_model: parent.to_string(),
            link_field: link.to_string(),
        });
        taken.insert(field.name.clone());
        model.push_field(field);
    }
}
