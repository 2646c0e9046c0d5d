//! Nested lexical scopes.
//!
//! Scopes live in an arena ([`ScopeTree`]) and refer to each other by
//! [`ScopeId`]. The root is the global scope with the empty name; every other
//! scope's full name is its parent's name plus one segment. Each scope owns a
//! [`Repository`].
//!
//! Two lookup styles coexist and are kept apart:
//! - lexical lookups (`get_operator`, `get_symbol`, ...) start at a scope and
//!   walk up the parent chain, never sideways;
//! - tree-wide searches go through [`ScopeTree::accept`], a pre-order visit
//!   of every scope.

use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

use crate::catalog::{FunctionDef, Operator};
use crate::names::CanonicalName;
use crate::repository::{
    DeclKind, EntryDefinition, ObjectDefinition, Repository, RuleDeclaration, Storable, SymbolDeclaration,
};
use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(usize);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeKind {
    Global,
    Module,
    Rule,
    Block,
}

#[derive(Debug, Clone)]
pub struct Scope {
    id: ScopeId,
    name: CanonicalName,
    kind: ScopeKind,
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    repository: Repository,
}

impl Scope {
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Full dotted name from the root.
    pub fn name(&self) -> &CanonicalName {
        &self.name
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn children(&self) -> &[ScopeId] {
        &self.children
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }
}

/// Callback for whole-tree visits.
pub trait ScopeVisitor {
    fn visit_scope(&mut self, scope: &Scope);
}

impl<F: FnMut(&Scope)> ScopeVisitor for F {
    fn visit_scope(&mut self, scope: &Scope) {
        self(scope)
    }
}

#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                id: ScopeId::ROOT,
                name: CanonicalName::root(),
                kind: ScopeKind::Global,
                parent: None,
                children: Vec::new(),
                repository: Repository::new(),
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId::ROOT
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn repository(&self, id: ScopeId) -> &Repository {
        &self.scopes[id.0].repository
    }

    pub fn global(&self) -> &Repository {
        self.repository(ScopeId::ROOT)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Walks the parent chain up to the root.
    pub fn root_of(&self, id: ScopeId) -> ScopeId {
        let mut current = id;
        while let Some(parent) = self.scopes[current.0].parent {
            current = parent;
        }
        current
    }

    // ------------------------------------------------------------------------
    // Immediate children
    // ------------------------------------------------------------------------

    pub fn has_sub_scope(&self, parent: ScopeId, id: &str) -> bool {
        self.get_sub_scope(parent, id).is_some()
    }

    pub fn get_sub_scope(&self, parent: ScopeId, id: &str) -> Option<ScopeId> {
        let wanted = self.scopes[parent.0].name.push(id);
        self.scopes[parent.0]
            .children
            .iter()
            .copied()
            .find(|child| self.scopes[child.0].name == wanted)
    }

    /// Adds a direct child. `None` when it already exists.
    pub fn add_sub_scope(&mut self, parent: ScopeId, id: &str, kind: ScopeKind) -> Option<ScopeId> {
        if self.has_sub_scope(parent, id) {
            return None;
        }
        Some(self.insert(parent, id, kind))
    }

    fn insert(&mut self, parent: ScopeId, id: &str, kind: ScopeKind) -> ScopeId {
        let scope_id = ScopeId(self.scopes.len());
        let name = self.scopes[parent.0].name.push(id);
        trace!(scope = %name, ?kind, "scope created");
        self.scopes.push(Scope {
            id: scope_id,
            name,
            kind,
            parent: Some(parent),
            children: Vec::new(),
            repository: Repository::new(),
        });
        self.scopes[parent.0].children.push(scope_id);
        scope_id
    }

    // ------------------------------------------------------------------------
    // Descendants
    // ------------------------------------------------------------------------

    /// Finds the descendant of `from` named `name` relative to it.
    pub fn get_scope(&self, from: ScopeId, name: &CanonicalName) -> Option<ScopeId> {
        let target = self.scopes[from.0].name.join(name);
        self.descend(from, &target)
    }

    pub fn has_scope(&self, from: ScopeId, name: &CanonicalName) -> bool {
        self.get_scope(from, name).is_some()
    }

    /// Finds a scope by its full name.
    pub fn find(&self, full_name: &CanonicalName) -> Option<ScopeId> {
        self.descend(ScopeId::ROOT, full_name)
    }

    /// Descent by common prefix: strip this scope's name from the target and
    /// follow the child whose first relative segment matches.
    fn descend(&self, at: ScopeId, target: &CanonicalName) -> Option<ScopeId> {
        let here = &self.scopes[at.0].name;
        let rest = target.reduce(here)?;
        let Some(first) = rest.first() else {
            return Some(at);
        };
        self.scopes[at.0]
            .children
            .iter()
            .copied()
            .find(|child| {
                self.scopes[child.0]
                    .name
                    .reduce(here)
                    .is_some_and(|relative| relative.first() == Some(first))
            })
            .and_then(|child| self.descend(child, target))
    }

    /// Creates `name` under `from`, with any missing intermediate scopes.
    /// `None` when the leaf already exists.
    pub fn add_scope(&mut self, from: ScopeId, name: &CanonicalName, kind: ScopeKind) -> Option<ScopeId> {
        if name.is_empty() || self.has_scope(from, name) {
            return None;
        }
        Some(self.new_scope(from, name, kind))
    }

    /// Returns the scope `name` under `from`, creating every missing segment
    /// on the way. Existing intermediate scopes are reused. Intermediates get
    /// kind `Module`; the leaf gets `kind`.
    pub fn new_scope(&mut self, from: ScopeId, name: &CanonicalName, kind: ScopeKind) -> ScopeId {
        let segments: Vec<String> = name.segments().map(str::to_string).collect();
        let mut current = from;
        for (index, segment) in segments.iter().enumerate() {
            let segment_kind = if index + 1 == segments.len() {
                kind
            } else {
                ScopeKind::Module
            };
            current = match self.get_sub_scope(current, segment) {
                Some(existing) => existing,
                None => self.insert(current, segment, segment_kind),
            };
        }
        current
    }

    // ------------------------------------------------------------------------
    // Lexical lookups
    // ------------------------------------------------------------------------

    /// Resolves `name` from `from`. A qualified rule, type, operator or
    /// function name is first looked up in its module scope; then the parent
    /// chain is searched with the full name. Symbols are never reached
    /// through a qualified name.
    fn lookup<T: Storable>(&self, from: ScopeId, name: &CanonicalName) -> Vec<Arc<T>> {
        if name.len() > 1 && Self::module_qualified(T::KIND) {
            let (module, id) = name.pop_id();
            let module_scope = self
                .find(&module)
                .filter(|scope| matches!(self.scopes[scope.0].kind, ScopeKind::Module | ScopeKind::Global));
            if let (Some(scope), Some(id)) = (module_scope, id) {
                let found = self.repository(scope).get_as::<T>(&CanonicalName::new(&id));
                if !found.is_empty() {
                    return found;
                }
            }
        }
        let mut current = Some(from);
        while let Some(id) = current {
            let found = self.repository(id).get_as::<T>(name);
            if !found.is_empty() {
                return found;
            }
            current = self.scopes[id.0].parent;
        }
        Vec::new()
    }

    fn module_qualified(kind: DeclKind) -> bool {
        matches!(
            kind,
            DeclKind::Rule | DeclKind::Type | DeclKind::Operator | DeclKind::Function
        )
    }

    fn lookup_first<T: Storable>(&self, from: ScopeId, name: &CanonicalName) -> Option<Arc<T>> {
        self.lookup::<T>(from, name).into_iter().next()
    }

    pub fn has_selection_rule(&self, from: ScopeId, name: &CanonicalName) -> bool {
        !self.get_selection_rules(from, name).is_empty()
    }

    /// All overloads of the nearest rule called `name`.
    pub fn get_selection_rules(&self, from: ScopeId, name: &CanonicalName) -> Vec<Arc<RuleDeclaration>> {
        self.lookup(from, name)
    }

    pub fn has_operator(&self, from: ScopeId, name: &CanonicalName) -> bool {
        self.get_operator(from, name).is_some()
    }

    pub fn get_operator(&self, from: ScopeId, name: &CanonicalName) -> Option<Arc<Operator>> {
        self.lookup_first(from, name)
    }

    pub fn has_function(&self, from: ScopeId, name: &CanonicalName) -> bool {
        self.get_function(from, name).is_some()
    }

    pub fn get_function(&self, from: ScopeId, name: &CanonicalName) -> Option<Arc<FunctionDef>> {
        self.lookup_first(from, name)
    }

    pub fn has_data_object_definition(&self, from: ScopeId, name: &CanonicalName) -> bool {
        self.get_data_object_definition(from, name).is_some()
    }

    pub fn get_data_object_definition(
        &self,
        from: ScopeId,
        name: &CanonicalName,
    ) -> Option<Arc<ObjectDefinition>> {
        self.lookup_first(from, name)
    }

    pub fn get_entry_definition(&self, from: ScopeId, name: &CanonicalName) -> Option<Arc<EntryDefinition>> {
        self.lookup_first(from, name)
    }

    pub fn has_symbol(&self, from: ScopeId, name: &CanonicalName) -> bool {
        self.get_symbol(from, name).is_some()
    }

    pub fn get_symbol(&self, from: ScopeId, name: &CanonicalName) -> Option<Arc<SymbolDeclaration>> {
        self.lookup_first(from, name)
    }

    /// The nearest symbol called `name` already declared at source offset
    /// `offset`. Later declarations in the same or an outer scope are passed
    /// over, so an outer binding stays visible until it is shadowed.
    pub fn get_symbol_at(&self, from: ScopeId, name: &CanonicalName, offset: usize) -> Option<Arc<SymbolDeclaration>> {
        let mut current = Some(from);
        while let Some(id) = current {
            let visible = self
                .repository(id)
                .get_as::<SymbolDeclaration>(name)
                .into_iter()
                .find(|symbol| symbol.is_visible_at(offset));
            if visible.is_some() {
                return visible;
            }
            current = self.scopes[id.0].parent;
        }
        None
    }

    pub fn has_type(&self, from: ScopeId, name: &CanonicalName) -> bool {
        self.get_type(from, name).is_some()
    }

    pub fn get_type(&self, from: ScopeId, name: &CanonicalName) -> Option<Arc<DataType>> {
        self.lookup_first(from, name)
    }

    // ------------------------------------------------------------------------
    // Tree-wide visits
    // ------------------------------------------------------------------------

    /// Visits every scope, parent before children, children in creation order.
    pub fn accept<V: ScopeVisitor + ?Sized>(&self, visitor: &mut V) {
        let mut stack = vec![ScopeId::ROOT];
        while let Some(id) = stack.pop() {
            let scope = &self.scopes[id.0];
            visitor.visit_scope(scope);
            stack.extend(scope.children.iter().rev().copied());
        }
    }

    /// Collects `f(scope)` for every scope, in visit order.
    pub fn collect<T, F>(&self, mut f: F) -> Vec<T>
    where
        F: FnMut(&Scope) -> Vec<T>,
    {
        let mut found = Vec::new();
        self.accept(&mut |scope: &Scope| found.extend(f(scope)));
        found
    }

    /// A serializable picture of the tree for display.
    pub fn summary(&self) -> ScopeSummary {
        self.summarize(ScopeId::ROOT)
    }

    fn summarize(&self, id: ScopeId) -> ScopeSummary {
        let scope = &self.scopes[id.0];
        let repository = &scope.repository;
        let declarations = [DeclKind::Rule, DeclKind::Symbol]
        .into_iter()
        .flat_map(|kind| repository.all(kind))
        .map(|d| d.signature().to_string())
        .collect();
        ScopeSummary {
            name: scope.name.to_string(),
            kind: scope.kind,
            declarations,
            children: scope.children.iter().map(|c| self.summarize(*c)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeSummary {
    pub name: String,
    pub kind: ScopeKind,
    pub declarations: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ScopeSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Op;
    use crate::repository::SymbolKind;

    fn name(text: &str) -> CanonicalName {
        CanonicalName::new(text)
    }

    #[test]
    fn new_scope_creates_missing_intermediates_once() {
        let mut tree = ScopeTree::new();
        let leaf = tree.new_scope(tree.root(), &name("a.b.c"), ScopeKind::Rule);
        assert_eq!(tree.scope(leaf).name().full_id(), "A.B.C");
        assert_eq!(tree.scope(leaf).kind(), ScopeKind::Rule);
        assert_eq!(tree.len(), 4);

        let other = tree.new_scope(tree.root(), &name("a.b.d"), ScopeKind::Rule);
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.scope(other).parent(), tree.scope(leaf).parent());
        assert_eq!(tree.new_scope(tree.root(), &name("a.b.c"), ScopeKind::Rule), leaf);
    }

    #[test]
    fn scope_lookup_descends_by_prefix() {
        let mut tree = ScopeTree::new();
        let ab = tree.new_scope(tree.root(), &name("a.b"), ScopeKind::Module);
        let abc = tree.new_scope(ab, &name("c"), ScopeKind::Rule);
        tree.new_scope(tree.root(), &name("ab"), ScopeKind::Module);

        assert_eq!(tree.get_scope(tree.root(), &name("a.b.c")), Some(abc));
        assert_eq!(tree.get_scope(ab, &name("c")), Some(abc));
        assert_eq!(tree.find(&name("a.b")), Some(ab));
        assert!(!tree.has_scope(tree.root(), &name("a.c")));
        assert!(!tree.has_scope(ab, &name("a.b")));
        assert_eq!(tree.get_scope(ab, &CanonicalName::root()), Some(ab));
        assert_eq!(tree.root_of(abc), tree.root());
    }

    #[test]
    fn add_scope_reports_existing() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        assert!(tree.add_scope(root, &name("m.r"), ScopeKind::Rule).is_some());
        assert!(tree.add_scope(root, &name("m.r"), ScopeKind::Rule).is_none());
        assert!(tree.add_scope(root, &name("m"), ScopeKind::Module).is_none());
        assert!(tree.add_sub_scope(root, "m", ScopeKind::Module).is_none());
        assert!(tree.add_sub_scope(root, "n", ScopeKind::Module).is_some());
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn lookups_walk_up_never_sideways() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.global().add_as(Operator::new(Op::Add));
        let left = tree.new_scope(root, &name("m.left"), ScopeKind::Rule);
        let right = tree.new_scope(root, &name("m.right"), ScopeKind::Rule);
        tree.repository(left).add_as(SymbolDeclaration::new(
            name("x"),
            DataType::number(),
            SymbolKind::Variable,
        ));

        assert!(tree.has_operator(left, &name("add")));
        assert!(tree.has_operator(right, &name("add")));
        assert!(tree.has_symbol(left, &name("x")));
        assert!(!tree.has_symbol(right, &name("x")));
        assert!(!tree.has_symbol(root, &name("x")));
    }

    #[test]
    fn qualified_names_reach_module_rules_but_not_symbols() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let module = tree.new_scope(root, &name("m"), ScopeKind::Module);
        let left = tree.new_scope(module, &name("left"), ScopeKind::Rule);
        let other = tree.new_scope(root, &name("n"), ScopeKind::Module);
        tree.repository(module)
            .add_as(RuleDeclaration::new(name("m.left"), Vec::new()));
        tree.repository(left).add_as(SymbolDeclaration::new(
            name("x"),
            DataType::number(),
            SymbolKind::Parameter,
        ));

        assert!(tree.has_selection_rule(other, &name("m.left")));
        assert!(!tree.has_selection_rule(other, &name("m.right")));
        assert!(!tree.has_symbol(other, &name("m.left.x")));
        assert!(!tree.has_symbol(module, &name("left.x")));
        assert!(tree.has_symbol(left, &name("x")));
    }

    #[test]
    fn symbols_come_into_view_at_their_declaration() {
        let mut tree = ScopeTree::new();
        let rule = tree.new_scope(tree.root(), &name("r"), ScopeKind::Rule);
        let block = tree.new_scope(rule, &name("block1"), ScopeKind::Block);
        tree.repository(rule).add_as(SymbolDeclaration::new(
            name("p"),
            DataType::number(),
            SymbolKind::Parameter,
        ));
        tree.repository(block).add_as(
            SymbolDeclaration::new(name("p"), DataType::text(), SymbolKind::Variable).visible_from(40),
        );

        let early = tree.get_symbol_at(block, &name("p"), 10).unwrap();
        assert_eq!(early.kind(), SymbolKind::Parameter);
        let late = tree.get_symbol_at(block, &name("p"), 40).unwrap();
        assert_eq!(late.kind(), SymbolKind::Variable);
        assert!(tree.get_symbol_at(block, &name("q"), 99).is_none());
    }

    #[test]
    fn visits_pre_order() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.new_scope(root, &name("a.x"), ScopeKind::Rule);
        tree.new_scope(root, &name("b"), ScopeKind::Module);
        tree.new_scope(root, &name("a.y"), ScopeKind::Rule);
        let names = tree.collect(|scope| vec![scope.name().to_string()]);
        assert_eq!(names, ["", "A", "A.X", "A.Y", "B"]);
    }
}
