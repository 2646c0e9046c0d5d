//! First semantic pass: scopes and declarations.
//!
//! The declarator listens to the syntax walk and mirrors its nesting in the
//! scope tree. It creates module scopes for `module` items, a rule scope per
//! rule (holding the parameters), and a block scope per `{ ... }` (holding
//! the variables declared in it). Rules are registered in their module's
//! repository.
//!
//! Block scopes are named `BLOCK1`, `BLOCK2`, ... in source order within each
//! rule. The generator finds them again through [`Declarations::block`].

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::EngineConfig;
use crate::errors::{to_source_span, ErrorKind, ErrorReporting, PhaseContext, SelError};
use crate::names::CanonicalName;
use crate::repository::{ParameterDecl, RuleDeclaration, Storable, SymbolDeclaration, SymbolKind};
use crate::scope::{ScopeId, ScopeKind, ScopeTree};
use crate::syntax::{
    walk, BlockSyntax, Listener, ModuleSyntax, ParamSyntax, RuleSyntax, Span, StatementSyntax,
    UnitSyntax,
};
use crate::types::DataType;

/// A rule that made it into the scope tree.
#[derive(Debug, Clone)]
pub struct DeclaredRule {
    pub module: ScopeId,
    pub scope: ScopeId,
    pub declaration: Arc<RuleDeclaration>,
}

/// What the pass produced, keyed by the source offset of each construct.
#[derive(Debug, Default)]
pub struct Declarations {
    rules: HashMap<usize, DeclaredRule>,
    blocks: HashMap<usize, ScopeId>,
    pub errors: Vec<SelError>,
}

impl Declarations {
    pub fn rule(&self, rule: &RuleSyntax) -> Option<&DeclaredRule> {
        self.rules.get(&rule.span.start)
    }

    pub fn block(&self, block: &BlockSyntax) -> Option<ScopeId> {
        self.blocks.get(&block.span.start).copied()
    }

    pub fn rules(&self) -> impl Iterator<Item = &DeclaredRule> {
        self.rules.values()
    }
}

/// Resolves a written type name from `scope`, falling back to the built-in
/// catalog.
pub fn resolve_type(tree: &ScopeTree, scope: ScopeId, name: &str) -> Option<DataType> {
    tree.get_type(scope, &CanonicalName::new(name))
        .map(|t| t.as_ref().clone())
        .or_else(|| DataType::builtin(name))
}

pub fn declare(
    tree: &mut ScopeTree,
    unit: &UnitSyntax,
    reporter: &PhaseContext,
    config: &EngineConfig,
) -> Declarations {
    let mut declarator = Declarator {
        tree,
        reporter,
        default_module: config.default_module.as_deref().map(CanonicalName::new),
        module: ScopeId::ROOT,
        module_rejected: false,
        stack: Vec::new(),
        rule: None,
        block_counter: 0,
        output: Declarations::default(),
    };
    walk(unit, &mut declarator);
    debug!(
        rules = declarator.output.rules.len(),
        errors = declarator.output.errors.len(),
        "declaration pass finished"
    );
    declarator.output
}

struct Declarator<'a> {
    tree: &'a mut ScopeTree,
    reporter: &'a PhaseContext,
    default_module: Option<CanonicalName>,
    module: ScopeId,
    /// Set when the last `module` item was refused; its rules are skipped.
    module_rejected: bool,
    /// Open scopes, innermost last. Empty outside rules.
    stack: Vec<ScopeId>,
    /// The rule being walked, `None` when it was rejected.
    rule: Option<DeclaredRule>,
    block_counter: usize,
    output: Declarations,
}

impl Declarator<'_> {
    fn error(&mut self, kind: ErrorKind, span: Span) {
        let error = self.reporter.report(kind, to_source_span(span));
        self.output.errors.push(error);
    }

    fn type_of(&mut self, scope: ScopeId, name: &str, span: Span) -> DataType {
        match resolve_type(self.tree, scope, name) {
            Some(data_type) => data_type,
            None => {
                self.error(ErrorKind::UnknownType { name: name.to_string() }, span);
                DataType::any()
            }
        }
    }

    /// Declares `name` in `scope`, visible from source offset `visible_from`.
    fn declare_symbol(
        &mut self,
        scope: ScopeId,
        name: &str,
        type_name: &str,
        kind: SymbolKind,
        span: Span,
        visible_from: usize,
    ) {
        let data_type = self.type_of(scope, type_name.trim(), span);
        let symbol = SymbolDeclaration::new(CanonicalName::new(name), data_type, kind).visible_from(visible_from);
        if !self.tree.repository(scope).add_as(symbol) {
            let scope_name = self.tree.scope(scope).name().to_string();
            self.error(
                ErrorKind::Redefinition {
                    name: CanonicalName::new(name).to_string(),
                    scope: scope_name,
                },
                span,
            );
        }
    }

    /// The first rule or block scope along the path of a module `name`.
    /// A module may not open inside one, nor reuse one.
    fn rule_scope_on(&self, name: &CanonicalName) -> Option<ScopeId> {
        let mut prefix = CanonicalName::root();
        for segment in name.segments() {
            prefix = prefix.push(segment);
            let scope = self.tree.find(&prefix)?;
            if matches!(self.tree.scope(scope).kind(), ScopeKind::Rule | ScopeKind::Block) {
                return Some(scope);
            }
        }
        None
    }
}

impl Listener for Declarator<'_> {
    fn enter_unit(&mut self, _unit: &UnitSyntax) {
        self.module = match &self.default_module {
            Some(module) => self.tree.new_scope(ScopeId::ROOT, module, ScopeKind::Module),
            None => ScopeId::ROOT,
        };
    }

    fn enter_module(&mut self, module: &ModuleSyntax) {
        let name = CanonicalName::new(&module.name);
        if !name.is_well_formed() {
            self.error(ErrorKind::MalformedName { name: module.name.clone() }, module.span);
            return;
        }
        if let Some(clash) = self.rule_scope_on(&name) {
            let scope = self.tree.scope(clash).name().pop().to_string();
            let taken = self.tree.scope(clash).name().to_string();
            self.error(ErrorKind::Redefinition { name: taken, scope }, module.span);
            self.module_rejected = true;
            return;
        }
        self.module_rejected = false;
        self.module = self.tree.new_scope(ScopeId::ROOT, &name, ScopeKind::Module);
        debug!(module = %name, "entering module");
    }

    fn enter_rule(&mut self, rule: &RuleSyntax) {
        self.block_counter = 0;
        self.rule = None;
        self.stack.clear();

        if self.module_rejected {
            return;
        }
        let id = CanonicalName::new(&rule.name);
        if self.tree.get_sub_scope(self.module, id.full_id()).is_some() {
            let scope = self.tree.scope(self.module).name().to_string();
            self.error(
                ErrorKind::Redefinition {
                    name: id.to_string(),
                    scope,
                },
                rule.name_span,
            );
            return;
        }

        let parameters: Vec<ParameterDecl> = rule
            .params
            .iter()
            .map(|p| ParameterDecl {
                name: CanonicalName::new(&p.name),
                data_type: resolve_type(self.tree, self.module, &p.type_name).unwrap_or_else(DataType::any),
            })
            .collect();
        let full_name = self.tree.scope(self.module).name().join(&id);
        let declaration = Arc::new(RuleDeclaration::new(full_name.clone(), parameters));
        if !self
            .tree
            .repository(self.module)
            .add(Arc::clone(&declaration).into_declaration())
        {
            let scope = self.tree.scope(self.module).name().to_string();
            self.error(
                ErrorKind::Redefinition {
                    name: full_name.to_string(),
                    scope,
                },
                rule.name_span,
            );
            return;
        }

        let scope = self.tree.new_scope(self.module, &id, ScopeKind::Rule);
        debug!(rule = %full_name, "rule declared");
        let declared = DeclaredRule {
            module: self.module,
            scope,
            declaration,
        };
        self.output.rules.insert(rule.span.start, declared.clone());
        self.rule = Some(declared);
        self.stack.push(scope);
    }

    fn exit_rule(&mut self, _rule: &RuleSyntax) {
        self.rule = None;
        self.stack.clear();
    }

    fn enter_param(&mut self, param: &ParamSyntax) {
        let Some(rule) = &self.rule else {
            return;
        };
        let scope = rule.scope;
        self.declare_symbol(scope, &param.name, &param.type_name, SymbolKind::Parameter, param.span, 0);
    }

    fn enter_block(&mut self, block: &BlockSyntax) {
        let Some(&parent) = self.stack.last() else {
            return;
        };
        self.block_counter += 1;
        let id = format!("BLOCK{}", self.block_counter);
        let scope = self.tree.new_scope(parent, &CanonicalName::new(&id), ScopeKind::Block);
        self.output.blocks.insert(block.span.start, scope);
        self.stack.push(scope);
    }

    fn exit_block(&mut self, _block: &BlockSyntax) {
        // The rule scope stays at the bottom.
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    fn enter_statement(&mut self, statement: &StatementSyntax) {
        let StatementSyntax::Var {
            name,
            type_name,
            span,
            ..
        } = statement
        else {
            return;
        };
        let Some(&scope) = self.stack.last() else {
            return;
        };
        // The initializer still sees the outer binding.
        self.declare_symbol(scope, name, type_name, SymbolKind::Variable, *span, span.end);
    }
}
