//! Multi-indexed declaration store.
//!
//! Every scope owns one [`Repository`]. Declarations are keyed by
//! [`Signature`]; two secondary indices (kind + name, name alone) answer the
//! less specific queries. Object and entry definitions are never stored here:
//! their kind routes them to the registered [`DataEngine`]s, queried in
//! registration order.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::names::CanonicalName;
use crate::signature::Signature;

pub mod declaration;
pub mod provider;

pub use declaration::{
    DeclKind, Declaration, ParameterDecl, RuleDeclaration, RuleState, Storable, Storage,
    SymbolDeclaration, SymbolKind,
};
pub use provider::{Code, DataEngine, EntryDefinition, ObjectDefinition, Record, RecordFilter};

#[derive(Debug, Clone, Default)]
struct Indices {
    by_signature: BTreeMap<Signature, Declaration>,
    by_kind: HashMap<(DeclKind, CanonicalName), BTreeSet<Signature>>,
    by_name: HashMap<CanonicalName, BTreeSet<Signature>>,
}

impl Indices {
    fn collect(&self, signatures: Option<&BTreeSet<Signature>>) -> Vec<Declaration> {
        signatures
            .into_iter()
            .flatten()
            .filter_map(|sig| self.by_signature.get(sig).cloned())
            .collect()
    }
}

#[derive(Default)]
pub struct Repository {
    indices: RwLock<Indices>,
    engines: RwLock<Vec<Arc<dyn DataEngine>>>,
}

impl Clone for Repository {
    fn clone(&self) -> Self {
        Self {
            indices: RwLock::new(self.indices.read().clone()),
            engines: RwLock::new(self.engines.read().clone()),
        }
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indices = self.indices.read();
        f.debug_struct("Repository")
            .field("declarations", &indices.by_signature.keys().collect::<Vec<_>>())
            .field(
                "engines",
                &self.engines.read().iter().map(|e| e.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Stores a declaration. Returns `false` when the signature is already
    /// taken, or, for externally stored kinds, when no data engine accepts it.
    pub fn add(&self, declaration: Declaration) -> bool {
        let kind = declaration.kind();
        if kind.storage() == Storage::External {
            return self
                .engines
                .read()
                .iter()
                .any(|engine| engine.add_definition(&declaration));
        }

        let signature = declaration.signature();
        let name = declaration.name().clone();
        let mut indices = self.indices.write();
        if indices.by_signature.contains_key(&signature) {
            trace!(%signature, "duplicate signature rejected");
            return false;
        }
        indices
            .by_kind
            .entry((kind, name.clone()))
            .or_default()
            .insert(signature.clone());
        indices.by_name.entry(name).or_default().insert(signature.clone());
        trace!(%signature, %kind, "declared");
        indices.by_signature.insert(signature, declaration);
        true
    }

    /// Typed convenience over [`Repository::add`].
    pub fn add_as<T: Storable>(&self, value: T) -> bool {
        self.add(Arc::new(value).into_declaration())
    }

    /// Removes the declaration with `signature` from every index, and from the
    /// data engines for externally stored kinds.
    pub fn remove(&self, signature: &Signature) -> bool {
        {
            let mut indices = self.indices.write();
            if let Some(declaration) = indices.by_signature.remove(signature) {
                let kind = declaration.kind();
                let name = declaration.name().clone();
                prune(&mut indices.by_kind, &(kind, name.clone()), signature);
                prune(&mut indices.by_name, &name, signature);
                trace!(%signature, "removed");
                return true;
            }
        }
        match provider::external_name(signature) {
            Some((_, name)) => self
                .engines
                .read()
                .iter()
                .any(|engine| engine.remove_definition(&name)),
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Queries, from least to most specific
    // ------------------------------------------------------------------------

    pub fn has(&self, signature: &Signature) -> bool {
        !self.get(signature).is_empty()
    }

    pub fn get(&self, signature: &Signature) -> Vec<Declaration> {
        if let Some(found) = self.indices.read().by_signature.get(signature) {
            return vec![found.clone()];
        }
        match provider::external_name(signature) {
            Some((true, name)) => self.external(DeclKind::ObjectDefinition, &name),
            Some((false, name)) => self.external(DeclKind::EntryDefinition, &name),
            None => Vec::new(),
        }
    }

    pub fn has_kind(&self, kind: DeclKind, signature: &Signature) -> bool {
        !self.get_kind(kind, signature).is_empty()
    }

    pub fn get_kind(&self, kind: DeclKind, signature: &Signature) -> Vec<Declaration> {
        self.get(signature)
            .into_iter()
            .filter(|d| d.kind() == kind)
            .collect()
    }

    pub fn has_name(&self, name: &CanonicalName) -> bool {
        !self.get_name(name).is_empty()
    }

    /// Every declaration called `name`, of any kind. Data engines are only
    /// consulted when nothing local matches.
    pub fn get_name(&self, name: &CanonicalName) -> Vec<Declaration> {
        let local = {
            let indices = self.indices.read();
            indices.collect(indices.by_name.get(name))
        };
        if !local.is_empty() {
            return local;
        }
        let objects = self.external(DeclKind::ObjectDefinition, name);
        if !objects.is_empty() {
            return objects;
        }
        self.external(DeclKind::EntryDefinition, name)
    }

    pub fn has_kind_name(&self, kind: DeclKind, name: &CanonicalName) -> bool {
        !self.get_kind_name(kind, name).is_empty()
    }

    pub fn get_kind_name(&self, kind: DeclKind, name: &CanonicalName) -> Vec<Declaration> {
        match kind.storage() {
            Storage::Local => {
                let indices = self.indices.read();
                indices.collect(indices.by_kind.get(&(kind, name.clone())))
            }
            Storage::External => self.external(kind, name),
        }
    }

    /// Typed lookup by name. The routing of `T` is fixed by its kind tag.
    pub fn get_as<T: Storable>(&self, name: &CanonicalName) -> Vec<Arc<T>> {
        self.get_kind_name(T::KIND, name)
            .iter()
            .filter_map(Declaration::typed::<T>)
            .collect()
    }

    pub fn has_as<T: Storable>(&self, name: &CanonicalName) -> bool {
        !self.get_as::<T>(name).is_empty()
    }

    /// Typed lookup by signature.
    pub fn get_signature_as<T: Storable>(&self, signature: &Signature) -> Option<Arc<T>> {
        self.get_kind(T::KIND, signature)
            .first()
            .and_then(Declaration::typed::<T>)
    }

    /// All local declarations of `kind`, in signature order.
    pub fn all(&self, kind: DeclKind) -> Vec<Declaration> {
        self.indices
            .read()
            .by_signature
            .values()
            .filter(|d| d.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.indices.read().by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------------
    // Data engines
    // ------------------------------------------------------------------------

    /// Appends a data engine. An engine with the same name is not registered twice.
    pub fn register_data_engine(&self, engine: Arc<dyn DataEngine>) -> bool {
        let mut engines = self.engines.write();
        if engines.iter().any(|e| e.name() == engine.name()) {
            warn!(engine = engine.name(), "data engine already registered");
            return false;
        }
        trace!(engine = engine.name(), "data engine registered");
        engines.push(engine);
        true
    }

    pub fn deregister_data_engine(&self, name: &str) -> bool {
        let mut engines = self.engines.write();
        let before = engines.len();
        engines.retain(|e| e.name() != name);
        before != engines.len()
    }

    pub fn data_engines(&self) -> Vec<Arc<dyn DataEngine>> {
        self.engines.read().clone()
    }

    /// First hit across the data engines, in registration order.
    fn external(&self, kind: DeclKind, name: &CanonicalName) -> Vec<Declaration> {
        let engines = self.engines.read();
        let hit = match kind {
            DeclKind::ObjectDefinition => engines
                .iter()
                .find_map(|e| e.get_object_definition(name))
                .map(Declaration::Object),
            DeclKind::EntryDefinition => engines
                .iter()
                .find_map(|e| e.get_entry_definition(name))
                .map(Declaration::Entry),
            _ => None,
        };
        hit.into_iter().collect()
    }
}

fn prune<K: std::hash::Hash + Eq>(
    index: &mut HashMap<K, BTreeSet<Signature>>,
    key: &K,
    signature: &Signature,
) {
    if let Some(set) = index.get_mut(key) {
        set.remove(signature);
        if set.is_empty() {
            index.remove(key);
        }
    }
}
