//! Name references inside the tree.
//!
//! Variables and parameters are resolved when the generator builds the
//! reference. Data-object and entry references are different: they can be
//! created before any data engine knows the object, and only fail when
//! [`DataObjectSymbol::resolve`] is called. The first resolution is cached;
//! later calls never query the scope tree again.

use once_cell::sync::OnceCell;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::errors::{ErrorKind, SelError};
use crate::names::{CanonicalName, EntryName, ObjectName};
use crate::repository::{EntryDefinition, ObjectDefinition, SymbolKind};
use crate::scope::{ScopeId, ScopeTree};
use crate::syntax::Span;
use crate::types::DataType;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Validity {
    Unchecked,
    Valid,
    Invalid(String),
}

fn validity_of<T>(cell: &OnceCell<Result<T, SelError>>) -> Validity {
    match cell.get() {
        None => Validity::Unchecked,
        Some(Ok(_)) => Validity::Valid,
        Some(Err(error)) => Validity::Invalid(error.to_string()),
    }
}

fn serialize_validity<S, T>(cell: &OnceCell<Result<T, SelError>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    validity_of(cell).serialize(serializer)
}

fn semantic(kind: ErrorKind) -> SelError {
    SelError::new(kind, "resolve")
}

/// A parameter or variable in scope at the point of use.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableRef {
    name: CanonicalName,
    data_type: DataType,
    kind: SymbolKind,
    span: Span,
}

impl VariableRef {
    pub fn new(name: CanonicalName, data_type: DataType, kind: SymbolKind, span: Span) -> Self {
        Self {
            name,
            data_type,
            kind,
            span,
        }
    }

    pub fn name(&self) -> &CanonicalName {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

impl fmt::Display for VariableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A reference to a data object by (possibly unqualified) name.
#[derive(Debug, Clone, Serialize)]
pub struct DataObjectSymbol {
    name: ObjectName,
    span: Span,
    #[serde(rename = "validity", serialize_with = "serialize_validity")]
    resolved: OnceCell<Result<Arc<ObjectDefinition>, SelError>>,
}

impl DataObjectSymbol {
    pub fn new(name: ObjectName, span: Span) -> Self {
        Self {
            name,
            span,
            resolved: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &ObjectName {
        &self.name
    }

    pub fn span(&self) -> Span {
        self.span
    }

    /// Looks the object up from `from` the first time; returns the cached
    /// outcome afterwards.
    pub fn resolve(&self, tree: &ScopeTree, from: ScopeId) -> Result<Arc<ObjectDefinition>, SelError> {
        self.resolved
            .get_or_init(|| {
                let name = self.name.canonical();
                if !name.is_well_formed() {
                    return Err(semantic(ErrorKind::MalformedName {
                        name: name.to_string(),
                    }));
                }
                tree.get_data_object_definition(from, name).ok_or_else(|| {
                    semantic(ErrorKind::UnknownObject {
                        name: name.to_string(),
                    })
                })
            })
            .clone()
    }

    pub fn validity(&self) -> Validity {
        validity_of(&self.resolved)
    }

    /// The definition, once resolved successfully.
    pub fn definition(&self) -> Option<Arc<ObjectDefinition>> {
        self.resolved.get().and_then(|r| r.as_ref().ok().cloned())
    }

    /// The fully qualified name when resolved, the written name otherwise.
    pub fn qualified_name(&self) -> ObjectName {
        self.definition()
            .map(|d| d.object_name().clone())
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn data_type(&self) -> DataType {
        DataType::object(&self.qualified_name())
    }
}

impl fmt::Display for DataObjectSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A reference to one entry of a data object: `object.entry`, optionally
/// module-qualified.
#[derive(Debug, Clone, Serialize)]
pub struct DataObjectEntrySymbol {
    name: EntryName,
    span: Span,
    #[serde(rename = "validity", serialize_with = "serialize_validity")]
    resolved: OnceCell<Result<Arc<EntryDefinition>, SelError>>,
}

impl DataObjectEntrySymbol {
    pub fn new(name: EntryName, span: Span) -> Self {
        Self {
            name,
            span,
            resolved: OnceCell::new(),
        }
    }

    /// A reference that is already known to be valid.
    pub fn resolved(definition: Arc<EntryDefinition>, span: Span) -> Self {
        Self {
            name: definition.entry_name().clone(),
            span,
            resolved: OnceCell::with_value(Ok(definition)),
        }
    }

    pub fn name(&self) -> &EntryName {
        &self.name
    }

    pub fn span(&self) -> Span {
        self.span
    }

    /// Distinguishes a malformed name, an unknown object and an unknown
    /// entry on a known object. Cached like [`DataObjectSymbol::resolve`].
    pub fn resolve(&self, tree: &ScopeTree, from: ScopeId) -> Result<Arc<EntryDefinition>, SelError> {
        self.resolved
            .get_or_init(|| {
                let name = self.name.canonical();
                if name.len() < 2 || !name.is_well_formed() {
                    return Err(semantic(ErrorKind::MalformedName {
                        name: name.to_string(),
                    }));
                }
                let object = self.name.object_name();
                let definition = tree
                    .get_data_object_definition(from, object.canonical())
                    .ok_or_else(|| {
                        semantic(ErrorKind::UnknownObject {
                            name: object.to_string(),
                        })
                    })?;
                definition.entry(self.name.entry()).ok_or_else(|| {
                    semantic(ErrorKind::UnknownEntry {
                        object: definition.object_name().to_string(),
                        entry: self.name.entry().to_string(),
                    })
                })
            })
            .clone()
    }

    pub fn validity(&self) -> Validity {
        validity_of(&self.resolved)
    }

    pub fn definition(&self) -> Option<Arc<EntryDefinition>> {
        self.resolved.get().and_then(|r| r.as_ref().ok().cloned())
    }

    /// Entry id within its object.
    pub fn entry(&self) -> &str {
        self.name.entry()
    }

    pub fn data_type(&self) -> DataType {
        self.definition()
            .map(|d| d.data_type().clone())
            .unwrap_or_else(DataType::any)
    }
}

impl fmt::Display for DataObjectEntrySymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.definition() {
            Some(definition) => write!(f, "{}", definition.entry_name()),
            None => write!(f, "{}", self.name),
        }
    }
}
