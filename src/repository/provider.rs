//! The narrow interface to external data-object stores.
//!
//! A data engine owns object definitions (grouped by module) and their
//! records, and knows how to turn a validated rule into executable code. The
//! core never stores object or entry definitions itself; repositories forward
//! those lookups here.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::errors::SelError;
use crate::names::{CanonicalName, EntryName, ObjectName};
use crate::repository::Declaration;
use crate::signature::{Signature, Signed};
use crate::types::{DataType, Value};
use crate::xpt::SelectionRule;

/// One data-object instance: entry id to value.
pub type Record = im::OrdMap<String, Value>;

/// Generated code for one rule. Reads arguments from the context stack,
/// leaves result records in the context, reports success.
pub type Code = Arc<dyn Fn(&mut Context) -> Result<bool, SelError> + Send + Sync>;

/// Filter applied to records during retrieval and deletion.
pub type RecordFilter<'a> = &'a dyn Fn(&Record) -> Result<bool, SelError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryDefinition {
    name: EntryName,
    #[serde(skip)]
    canonical: CanonicalName,
    data_type: DataType,
    /// 1-based position among the object's key entries.
    key: Option<usize>,
}

impl EntryDefinition {
    pub fn new(object: &ObjectName, entry: &str, data_type: DataType, key: Option<usize>) -> Self {
        let name = object.entry(entry);
        Self {
            canonical: name.canonical().clone(),
            name,
            data_type,
            key,
        }
    }

    pub fn entry_name(&self) -> &EntryName {
        &self.name
    }

    pub fn id(&self) -> &str {
        self.name.entry()
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn key(&self) -> Option<usize> {
        self.key
    }
}

impl Signed for EntryDefinition {
    fn signature(&self) -> Signature {
        Signature::structured("ENTRY", false, &[Signature::from(&self.canonical)])
    }

    fn name(&self) -> &CanonicalName {
        &self.canonical
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDefinition {
    name: ObjectName,
    entries: Vec<Arc<EntryDefinition>>,
}

impl ObjectDefinition {
    pub fn new(name: ObjectName) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: &str, data_type: DataType, key: Option<usize>) -> Self {
        self.entries.push(Arc::new(EntryDefinition::new(
            &self.name, entry, data_type, key,
        )));
        self
    }

    pub fn object_name(&self) -> &ObjectName {
        &self.name
    }

    pub fn entries(&self) -> &[Arc<EntryDefinition>] {
        &self.entries
    }

    pub fn entry(&self, id: &str) -> Option<Arc<EntryDefinition>> {
        self.entries
            .iter()
            .find(|e| e.id().eq_ignore_ascii_case(id))
            .cloned()
    }

    /// The key entry at 1-based `ordinal`.
    pub fn key(&self, ordinal: usize) -> Option<Arc<EntryDefinition>> {
        self.entries.iter().find(|e| e.key == Some(ordinal)).cloned()
    }

    pub fn data_type(&self) -> DataType {
        DataType::object(&self.name)
    }
}

impl Signed for ObjectDefinition {
    fn signature(&self) -> Signature {
        Signature::structured("DATAOBJECT", false, &[Signature::from(self.name.canonical())])
    }

    fn name(&self) -> &CanonicalName {
        self.name.canonical()
    }
}

/// Recovers the kind and name behind an object or entry definition signature.
pub(crate) fn external_name(signature: &Signature) -> Option<(bool, CanonicalName)> {
    let uid = signature.uid();
    let unwrap = |prefix: &str| {
        uid.strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix('>'))
            .map(CanonicalName::new)
    };
    unwrap("DATAOBJECT<")
        .map(|name| (true, name))
        .or_else(|| unwrap("ENTRY<").map(|name| (false, name)))
}

/// A pluggable store of data objects.
pub trait DataEngine: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Modules this engine declares objects in.
    fn modules(&self) -> Vec<CanonicalName>;

    /// Looks up an object by qualified name, or by bare object name across
    /// this engine's modules.
    fn get_object_definition(&self, name: &CanonicalName) -> Option<Arc<ObjectDefinition>>;

    fn has_object_definition(&self, name: &CanonicalName) -> bool {
        self.get_object_definition(name).is_some()
    }

    fn get_entry_definition(&self, name: &CanonicalName) -> Option<Arc<EntryDefinition>> {
        let (object, entry) = name.pop_id();
        self.get_object_definition(&object)?.entry(&entry?)
    }

    fn has_entry(&self, name: &CanonicalName) -> bool {
        self.get_entry_definition(name).is_some()
    }

    /// Accepts a definition pushed through a repository. Engines with a fixed
    /// schema refuse.
    fn add_definition(&self, _definition: &Declaration) -> bool {
        false
    }

    fn remove_definition(&self, _name: &CanonicalName) -> bool {
        false
    }

    fn retrieve(&self, object: &ObjectName, filter: RecordFilter<'_>) -> Result<Vec<Record>, SelError>;

    fn persist(&self, object: &ObjectName, record: Record) -> Result<(), SelError>;

    /// Deletes matching records and returns how many went.
    fn delete(&self, object: &ObjectName, filter: RecordFilter<'_>) -> Result<usize, SelError>;

    /// A detached copy of `record` with every entry of the object present.
    fn clone_object(&self, object: &ObjectName, record: &Record) -> Result<Record, SelError>;

    /// Lowers a validated rule into executable code.
    fn generate(&self, rule: Arc<SelectionRule>) -> Result<Code, SelError>;
}
