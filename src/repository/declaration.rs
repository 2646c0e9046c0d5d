//! Everything a repository can hold, and where each kind lives.

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::catalog::{FunctionDef, Operator};
use crate::errors::{ErrorKind, SelError};
use crate::names::CanonicalName;
use crate::repository::provider::{EntryDefinition, ObjectDefinition};
use crate::signature::{Signature, Signed};
use crate::types::DataType;
use crate::xpt::SelectionRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DeclKind {
    Rule,
    Operator,
    Function,
    Type,
    Symbol,
    ObjectDefinition,
    EntryDefinition,
}

/// Where declarations of a kind are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// In the repository's own indices.
    Local,
    /// In the data engines registered with the repository.
    External,
}

impl DeclKind {
    pub const fn storage(self) -> Storage {
        match self {
            DeclKind::Rule
            | DeclKind::Operator
            | DeclKind::Function
            | DeclKind::Type
            | DeclKind::Symbol => Storage::Local,
            DeclKind::ObjectDefinition | DeclKind::EntryDefinition => Storage::External,
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub enum Declaration {
    Rule(Arc<RuleDeclaration>),
    Operator(Arc<Operator>),
    Function(Arc<FunctionDef>),
    Type(Arc<DataType>),
    Symbol(Arc<SymbolDeclaration>),
    Object(Arc<ObjectDefinition>),
    Entry(Arc<EntryDefinition>),
}

impl Declaration {
    pub fn kind(&self) -> DeclKind {
        match self {
            Declaration::Rule(_) => DeclKind::Rule,
            Declaration::Operator(_) => DeclKind::Operator,
            Declaration::Function(_) => DeclKind::Function,
            Declaration::Type(_) => DeclKind::Type,
            Declaration::Symbol(_) => DeclKind::Symbol,
            Declaration::Object(_) => DeclKind::ObjectDefinition,
            Declaration::Entry(_) => DeclKind::EntryDefinition,
        }
    }

    fn signed(&self) -> &dyn Signed {
        match self {
            Declaration::Rule(d) => d.as_ref(),
            Declaration::Operator(d) => d.as_ref(),
            Declaration::Function(d) => d.as_ref(),
            Declaration::Type(d) => d.as_ref(),
            Declaration::Symbol(d) => d.as_ref(),
            Declaration::Object(d) => d.as_ref(),
            Declaration::Entry(d) => d.as_ref(),
        }
    }

    pub fn signature(&self) -> Signature {
        self.signed().signature()
    }

    pub fn name(&self) -> &CanonicalName {
        self.signed().name()
    }

    pub fn typed<T: Storable>(&self) -> Option<Arc<T>> {
        T::from_declaration(self)
    }
}

/// A declaration type with a fixed kind tag. The kind decides, at compile
/// time, whether lookups for `T` go to the local indices or to data engines.
pub trait Storable: Signed + Sized {
    const KIND: DeclKind;

    fn into_declaration(self: Arc<Self>) -> Declaration;

    fn from_declaration(declaration: &Declaration) -> Option<Arc<Self>>;
}

macro_rules! storable {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl Storable for $ty {
            const KIND: DeclKind = DeclKind::$kind;

            fn into_declaration(self: Arc<Self>) -> Declaration {
                Declaration::$variant(self)
            }

            fn from_declaration(declaration: &Declaration) -> Option<Arc<Self>> {
                match declaration {
                    Declaration::$variant(inner) => Some(Arc::clone(inner)),
                    _ => None,
                }
            }
        }
    };
}

storable!(RuleDeclaration, Rule, Rule);
storable!(Operator, Operator, Operator);
storable!(FunctionDef, Function, Function);
storable!(DataType, Type, Type);
storable!(SymbolDeclaration, Symbol, Symbol);
storable!(ObjectDefinition, ObjectDefinition, Object);
storable!(EntryDefinition, EntryDefinition, Entry);

// ============================================================================
// SYMBOLS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SymbolKind {
    Parameter,
    Variable,
}

/// A variable or rule parameter declared in a scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolDeclaration {
    name: CanonicalName,
    data_type: DataType,
    kind: SymbolKind,
    /// Source offset where the symbol comes into view.
    visible_from: usize,
}

impl SymbolDeclaration {
    pub fn new(name: CanonicalName, data_type: DataType, kind: SymbolKind) -> Self {
        Self {
            name,
            data_type,
            kind,
            visible_from: 0,
        }
    }

    pub fn visible_from(mut self, offset: usize) -> Self {
        self.visible_from = offset;
        self
    }

    /// True when a use at source offset `offset` can see this symbol.
    pub fn is_visible_at(&self, offset: usize) -> bool {
        self.visible_from <= offset
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }
}

impl Signed for SymbolDeclaration {
    fn signature(&self) -> Signature {
        Signature::structured("SYMBOL", false, &[Signature::from(&self.name)])
    }

    fn name(&self) -> &CanonicalName {
        &self.name
    }
}

// ============================================================================
// RULES
// ============================================================================

/// Lifecycle of a declared rule. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RuleState {
    Created,
    Updated,
    GeneratedCode,
}

impl fmt::Display for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDecl {
    pub name: CanonicalName,
    pub data_type: DataType,
}

/// A selection rule as registered in its declaring scope. The declarator
/// creates it; the generator attaches the expression tree; code generation
/// marks it generated.
#[derive(Debug)]
pub struct RuleDeclaration {
    id: CanonicalName,
    full_name: CanonicalName,
    parameters: Vec<ParameterDecl>,
    state: RwLock<RuleState>,
    tree: RwLock<Option<Arc<SelectionRule>>>,
}

impl RuleDeclaration {
    pub fn new(full_name: CanonicalName, parameters: Vec<ParameterDecl>) -> Self {
        Self {
            id: CanonicalName::new(full_name.id()),
            full_name,
            parameters,
            state: RwLock::new(RuleState::Created),
            tree: RwLock::new(None),
        }
    }

    pub fn full_name(&self) -> &CanonicalName {
        &self.full_name
    }

    pub fn parameters(&self) -> &[ParameterDecl] {
        &self.parameters
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub fn state(&self) -> RuleState {
        *self.state.read()
    }

    /// Moves the state machine forward. Staying put is allowed; going back is not.
    pub fn advance(&self, to: RuleState) -> Result<(), SelError> {
        let mut state = self.state.write();
        if to < *state {
            return Err(SelError::structural(ErrorKind::StateRegression {
                rule: self.full_name.to_string(),
                from: state.to_string(),
                to: to.to_string(),
            }));
        }
        *state = to;
        Ok(())
    }

    pub fn attach(&self, rule: SelectionRule) -> Result<Arc<SelectionRule>, SelError> {
        self.advance(RuleState::Updated)?;
        let rule = Arc::new(rule);
        *self.tree.write() = Some(Arc::clone(&rule));
        Ok(rule)
    }

    pub fn tree(&self) -> Option<Arc<SelectionRule>> {
        self.tree.read().clone()
    }

    /// The key generated code is registered under. Unique engine-wide.
    pub fn handle(&self) -> String {
        self.signature().uid().to_string()
    }

    pub fn parameter_signature(&self) -> Signature {
        let sigs: Vec<_> = self
            .parameters
            .iter()
            .map(|p| p.data_type.signature())
            .collect();
        Signature::list(&sigs)
    }
}

impl Signed for RuleDeclaration {
    fn signature(&self) -> Signature {
        Signature::structured(
            "RULE",
            false,
            &[Signature::from(&self.full_name), self.parameter_signature()],
        )
    }

    fn name(&self) -> &CanonicalName {
        &self.id
    }
}
