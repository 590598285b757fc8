//! Field catalog (which field implementations exist) and field lists (the
//! live, per-request instances for one revision and role).

use std::collections::{HashMap, HashSet};

use revfield_core::{FieldValue, Phid, RevisionRecord, TransactionType, Viewer};
use revfield_storage::{FieldStorageKey, Storage};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::field::{Field, FieldRole, StorageLocation};
use crate::fields::{RevisionTextField, StandardField, TitleField};

pub type FieldFactory = Box<dyn Fn() -> Box<dyn Field> + Send + Sync>;

/// The runtime-registered set of field implementations, in registration order.
pub struct FieldCatalog {
    factories: Vec<FieldFactory>,
    field_keys: HashSet<String>,
    api_keys: HashSet<String>,
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
            field_keys: HashSet::new(),
            api_keys: HashSet::new(),
        }
    }

    /// Built-in revision fields followed by every configured custom field.
    pub fn with_defaults(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut catalog = Self::new();
        catalog.register(|| Box::new(TitleField::new()))?;
        catalog.register(|| Box::new(RevisionTextField::summary()))?;
        let require_test_plan = config.require_test_plan;
        catalog.register(move || Box::new(RevisionTextField::test_plan(require_test_plan)))?;
        for spec in &config.custom_fields {
            spec.check()?;
            let spec = spec.clone();
            catalog.register(move || Box::new(StandardField::new(spec.clone())))?;
        }
        Ok(catalog)
    }

    /// Add a field implementation. Both its internal and its API key must be
    /// unique across the catalog.
    pub fn register<F>(&mut self, factory: F) -> Result<(), EngineError>
    where
        F: Fn() -> Box<dyn Field> + Send + Sync + 'static,
    {
        let probe = factory();
        let field_key = probe.field_key().to_string();
        let api_key = probe.key_for_api().to_string();
        if self.field_keys.contains(&field_key) {
            return Err(EngineError::DuplicateFieldKey(field_key));
        }
        if self.api_keys.contains(&api_key) {
            return Err(EngineError::DuplicateFieldKey(api_key));
        }
        self.field_keys.insert(field_key);
        self.api_keys.insert(api_key);
        self.factories.push(Box::new(factory));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Fresh field instances enabled for `role`.
    pub fn object_fields(&self, role: FieldRole) -> FieldList {
        let fields = self
            .factories
            .iter()
            .map(|factory| factory())
            .filter(|field| field.should_enable_for_role(role))
            .collect();
        FieldList {
            role,
            object: None,
            fields,
        }
    }
}

/// Field instances bound to one viewer and (once read) one revision.
pub struct FieldList {
    role: FieldRole,
    object: Option<Phid>,
    fields: Vec<Box<dyn Field>>,
}

impl FieldList {
    pub fn role(&self) -> FieldRole {
        self.role
    }

    pub fn object(&self) -> Option<Phid> {
        self.object
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[Box<dyn Field>] {
        &self.fields
    }

    pub fn set_viewer(&mut self, viewer: &Viewer) -> &mut Self {
        for field in &mut self.fields {
            field.set_viewer(viewer);
        }
        self
    }

    /// Load every object-stored field from the revision row. Auxiliary fields
    /// stay unloaded until a [`FieldStorageQuery`] runs.
    pub fn read_fields_from_object(&mut self, revision: &RevisionRecord) -> &mut Self {
        self.object = Some(revision.phid);
        for field in &mut self.fields {
            field.read_value_from_object(revision);
        }
        self
    }

    /// Load the full field state of a single revision.
    pub fn read_fields_from_storage<S: Storage + ?Sized>(
        &mut self,
        storage: &S,
        revision: &RevisionRecord,
    ) -> Result<&mut Self, EngineError> {
        self.read_fields_from_object(revision);
        FieldStorageQuery::new().add_fields(self).execute(storage)?;
        Ok(self)
    }

    /// Position of each field by API key.
    pub fn index_by_api_key(&self) -> HashMap<String, usize> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, field)| (field.key_for_api().to_string(), i))
            .collect()
    }

    /// `api key -> api value` for every field, in list order.
    pub fn into_api_key_map(self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|field| (field.key_for_api().to_string(), field.api_value()))
            .collect()
    }

    pub fn field_by_api_key(&self, key: &str) -> Option<&dyn Field> {
        self.fields
            .iter()
            .find(|field| field.key_for_api() == key)
            .map(|field| field.as_ref())
    }

    pub fn field_at_mut(&mut self, index: usize) -> Option<&mut Box<dyn Field>> {
        self.fields.get_mut(index)
    }

    pub fn field_by_key_mut(&mut self, field_key: &str) -> Option<&mut Box<dyn Field>> {
        self.fields
            .iter_mut()
            .find(|field| field.field_key() == field_key)
    }

    pub fn field_by_transaction_type_mut(
        &mut self,
        transaction_type: &TransactionType,
    ) -> Option<&mut Box<dyn Field>> {
        self.fields
            .iter_mut()
            .find(|field| field.transaction_type() == *transaction_type)
    }

    fn auxiliary_keys(&self) -> Vec<FieldStorageKey> {
        let Some(object) = self.object else {
            return Vec::new();
        };
        self.fields
            .iter()
            .filter(|field| field.storage_location() == StorageLocation::Auxiliary)
            .map(|field| FieldStorageKey::new(object, field.field_key()))
            .collect()
    }

    fn apply_storage_values(&mut self, values: &HashMap<FieldStorageKey, FieldValue>) {
        let Some(object) = self.object else {
            return;
        };
        for field in &mut self.fields {
            if field.storage_location() != StorageLocation::Auxiliary {
                continue;
            }
            let key = FieldStorageKey::new(object, field.field_key());
            field.read_value_from_storage(values.get(&key).cloned());
        }
    }
}

/// Resolves auxiliary field values for any number of field lists with one
/// storage round trip.
#[derive(Default)]
pub struct FieldStorageQuery<'a> {
    lists: Vec<&'a mut FieldList>,
}

impl<'a> FieldStorageQuery<'a> {
    pub fn new() -> Self {
        Self { lists: Vec::new() }
    }

    pub fn add_fields(mut self, list: &'a mut FieldList) -> Self {
        self.lists.push(list);
        self
    }

    pub fn add_all<I>(mut self, lists: I) -> Self
    where
        I: IntoIterator<Item = &'a mut FieldList>,
    {
        self.lists.extend(lists);
        self
    }

    pub fn execute<S: Storage + ?Sized>(self, storage: &S) -> Result<(), EngineError> {
        let keys: Vec<FieldStorageKey> = self
            .lists
            .iter()
            .flat_map(|list| list.auxiliary_keys())
            .collect();
        let values = storage.load_field_values(&keys)?;
        debug!(
            lists = self.lists.len(),
            keys = keys.len(),
            found = values.len(),
            "loaded auxiliary field values"
        );
        for list in self.lists {
            list.apply_storage_values(&values);
        }
        Ok(())
    }
}
