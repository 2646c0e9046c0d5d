//! An in-memory [`DataEngine`].
//!
//! Object definitions and records live in process memory behind
//! `parking_lot` locks. Code generation lowers a rule into a closure that
//! evaluates the expression tree directly:
//!
//! 1. positional arguments are popped off the context stack (last parameter
//!    first) and bound on the heap under the parameter names;
//! 2. the body runs statement by statement until the first `return`;
//! 3. each returned object contributes the records its condition accepts.
//!
//! [`InMemoryEngine::from_json`] loads a schema and data set, which is what
//! the CLI `run` command uses.

use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::context::Context;
use crate::errors::{ErrorKind, SelError};
use crate::names::{CanonicalName, ObjectName};
use crate::repository::{
    Code, DataEngine, Declaration, EntryDefinition, ObjectDefinition, Record, RecordFilter,
};
use crate::types::{DataType, Value};
use crate::xpt::{ResultObject, SelectionRule};

mod evaluate;

use evaluate::{evaluate, run_block, truth, Flow, Frame};

#[derive(Debug, Default)]
struct Store {
    definitions: RwLock<Vec<Arc<ObjectDefinition>>>,
    records: RwLock<BTreeMap<CanonicalName, Vec<Record>>>,
}

impl Store {
    fn definition(&self, name: &CanonicalName) -> Option<Arc<ObjectDefinition>> {
        let definitions = self.definitions.read();
        definitions
            .iter()
            .find(|d| d.object_name().canonical() == name)
            .or_else(|| {
                (name.len() == 1)
                    .then(|| definitions.iter().find(|d| d.object_name().object() == name.full_id()))
                    .flatten()
            })
            .cloned()
    }

    fn require(&self, object: &ObjectName) -> Result<Arc<ObjectDefinition>, SelError> {
        self.definition(object.canonical()).ok_or_else(|| {
            SelError::runtime(ErrorKind::UnknownObject {
                name: object.to_string(),
            })
        })
    }

    fn retrieve(&self, object: &ObjectName, filter: RecordFilter<'_>) -> Result<Vec<Record>, SelError> {
        let definition = self.require(object)?;
        let records = self.records.read();
        let mut selected = Vec::new();
        for record in records.get(definition.object_name().canonical()).into_iter().flatten() {
            if filter(record)? {
                selected.push(record.clone());
            }
        }
        Ok(selected)
    }
}

/// Normalizes a record against its definition: keys upper-cased, values
/// converted to the entry types, unknown entries rejected.
fn conform(definition: &ObjectDefinition, record: Record) -> Result<Record, SelError> {
    let mut conformed = Record::new();
    for (key, value) in record {
        let entry = definition.entry(&key).ok_or_else(|| {
            SelError::runtime(ErrorKind::UnknownEntry {
                object: definition.object_name().to_string(),
                entry: key.clone(),
            })
        })?;
        conformed.insert(entry.id().to_string(), entry.data_type().convert(value)?);
    }
    Ok(conformed)
}

#[derive(Debug, Clone)]
pub struct InMemoryEngine {
    name: String,
    store: Arc<Store>,
}

impl InMemoryEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(Store::default()),
        }
    }

    /// Adds or replaces an object definition.
    pub fn define(&self, definition: ObjectDefinition) {
        let mut definitions = self.store.definitions.write();
        definitions.retain(|d| d.object_name() != definition.object_name());
        debug!(engine = %self.name, object = %definition.object_name(), "object defined");
        definitions.push(Arc::new(definition));
    }

    pub fn records(&self, object: &ObjectName) -> Vec<Record> {
        self.store
            .definition(object.canonical())
            .and_then(|d| self.store.records.read().get(d.object_name().canonical()).cloned())
            .unwrap_or_default()
    }

    /// Loads a schema and data set:
    ///
    /// ```json
    /// { "name": "memory",
    ///   "objects": [ { "name": "projects.deliverables",
    ///                  "entries": [ { "name": "id", "type": "integer", "key": 1 } ],
    ///                  "records": [ { "id": 100 } ] } ] }
    /// ```
    pub fn from_json(text: &str) -> Result<Self, SelError> {
        let data_set: DataSetFile = serde_json::from_str(text).map_err(|e| {
            SelError::new(
                ErrorKind::Config {
                    message: format!("data set: {}", e),
                },
                "memory",
            )
        })?;
        let engine = Self::new(data_set.name);
        for object in data_set.objects {
            let name = ObjectName::parse(&object.name);
            let mut definition = ObjectDefinition::new(name.clone());
            for entry in object.entries {
                let data_type = DataType::builtin(&entry.data_type).ok_or_else(|| {
                    SelError::new(
                        ErrorKind::UnknownType {
                            name: entry.data_type.clone(),
                        },
                        "memory",
                    )
                })?;
                definition = definition.with_entry(&entry.name, data_type, entry.key);
            }
            engine.define(definition);
            for record in object.records {
                engine.persist(&name, record.into_iter().collect())?;
            }
        }
        Ok(engine)
    }
}

#[derive(Debug, Deserialize)]
struct DataSetFile {
    #[serde(default = "default_engine_name")]
    name: String,
    #[serde(default)]
    objects: Vec<ObjectLayout>,
}

fn default_engine_name() -> String {
    "memory".to_string()
}

#[derive(Debug, Deserialize)]
struct ObjectLayout {
    name: String,
    #[serde(default)]
    entries: Vec<EntryLayout>,
    #[serde(default)]
    records: Vec<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct EntryLayout {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    key: Option<usize>,
}

impl DataEngine for InMemoryEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn modules(&self) -> Vec<CanonicalName> {
        let mut modules: Vec<CanonicalName> = self
            .store
            .definitions
            .read()
            .iter()
            .map(|d| d.object_name().module())
            .collect();
        modules.sort();
        modules.dedup();
        modules
    }

    fn get_object_definition(&self, name: &CanonicalName) -> Option<Arc<ObjectDefinition>> {
        self.store.definition(name)
    }

    fn add_definition(&self, definition: &Declaration) -> bool {
        match definition {
            Declaration::Object(object) => {
                if self.has_object_definition(object.object_name().canonical()) {
                    return false;
                }
                self.define(object.as_ref().clone());
                true
            }
            Declaration::Entry(entry) => add_entry(self, entry),
            _ => false,
        }
    }

    fn remove_definition(&self, name: &CanonicalName) -> bool {
        let mut definitions = self.store.definitions.write();
        let before = definitions.len();
        definitions.retain(|d| d.object_name().canonical() != name);
        let removed = before != definitions.len();
        if removed {
            self.store.records.write().remove(name);
        }
        removed
    }

    fn retrieve(&self, object: &ObjectName, filter: RecordFilter<'_>) -> Result<Vec<Record>, SelError> {
        self.store.retrieve(object, filter)
    }

    fn persist(&self, object: &ObjectName, record: Record) -> Result<(), SelError> {
        let definition = self.store.require(object)?;
        let record = conform(&definition, record)?;
        self.store
            .records
            .write()
            .entry(definition.object_name().canonical().clone())
            .or_default()
            .push(record);
        Ok(())
    }

    fn delete(&self, object: &ObjectName, filter: RecordFilter<'_>) -> Result<usize, SelError> {
        let definition = self.store.require(object)?;
        let mut records = self.store.records.write();
        let Some(stored) = records.get_mut(definition.object_name().canonical()) else {
            return Ok(0);
        };
        // Decide for every record first so a failing filter deletes nothing.
        let mut doomed = Vec::with_capacity(stored.len());
        for record in stored.iter() {
            doomed.push(filter(record)?);
        }
        let before = stored.len();
        let mut flags = doomed.into_iter();
        stored.retain(|_| !flags.next().unwrap_or(false));
        Ok(before - stored.len())
    }

    /// Keys are cleared: the copy is a new object, not the same one.
    fn clone_object(&self, object: &ObjectName, record: &Record) -> Result<Record, SelError> {
        let definition = self.store.require(object)?;
        let mut copy = conform(&definition, record.clone())?;
        for entry in definition.entries() {
            if entry.key().is_some() || !copy.contains_key(entry.id()) {
                copy.insert(entry.id().to_string(), Value::Null);
            }
        }
        Ok(copy)
    }

    fn generate(&self, rule: Arc<SelectionRule>) -> Result<Code, SelError> {
        let store = Arc::clone(&self.store);
        debug!(engine = %self.name, rule = %rule.name(), "generating code");
        let code: Code = Arc::new(move |context: &mut Context| -> Result<bool, SelError> {
            for parameter in rule.parameters().iter().rev() {
                let value = parameter.data_type.convert(context.pop()?)?;
                context.bind(parameter.name.full_id(), value);
            }
            let selection = match run_block(rule.body(), context)? {
                Flow::Return(selection) => selection,
                Flow::Next => rule.header(),
            };
            for object in &selection.objects {
                let records = select(&store, object, context)?;
                for record in records {
                    context.emit(record);
                }
            }
            Ok(true)
        });
        Ok(code)
    }
}

fn add_entry(engine: &InMemoryEngine, entry: &EntryDefinition) -> bool {
    let object = entry.entry_name().object_name();
    let Some(existing) = engine.store.definition(object.canonical()) else {
        return false;
    };
    if existing.entry(entry.id()).is_some() {
        return false;
    }
    let extended = existing
        .as_ref()
        .clone()
        .with_entry(entry.id(), entry.data_type().clone(), entry.key());
    engine.define(extended);
    true
}

fn select(store: &Store, object: &ResultObject, context: &Context) -> Result<Vec<Record>, SelError> {
    let name = object.object.qualified_name();
    match &object.condition {
        None => store.retrieve(&name, &|_| Ok(true)),
        Some(condition) => store.retrieve(&name, &|record| {
            truth(&evaluate(condition, Frame::new(context).with_record(record))?)
        }),
    }
}
