//! The engine façade.
//!
//! An [`Engine`] owns the scope tree, the registered data engines (through
//! the global repository) and the table of generated code. Source text goes
//! through three passes: parse, declare, generate. [`Engine::verify`] runs
//! them on a scratch copy of the tree; [`Engine::compile`] runs them on a
//! staged copy and commits it only when the unit is clean and every rule
//! got code.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{self, FunctionDef, Op, Operator};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::declarator::declare;
use crate::errors::{ErrorKind, Message, PhaseContext, SelError, SourceContext};
use crate::generator::generate;
use crate::names::CanonicalName;
use crate::repository::{Code, DataEngine, DeclKind, Declaration, Record, RuleDeclaration, RuleState};
use crate::scope::{Scope, ScopeSummary, ScopeTree};
use crate::signature::Signed;
use crate::syntax::parse;
use crate::types::Value;
use crate::xpt::{SelectionRule, Unit};

/// Outcome of [`Engine::verify`]: the annotated tree and its messages in
/// source order.
#[derive(Debug, Clone)]
pub struct Verification {
    pub unit: Unit,
    pub messages: Vec<Message>,
}

impl Verification {
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(Message::is_error)
    }
}

/// A unit whose rules are stored and executable. `messages` holds the
/// warnings that did not block it.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub unit: Unit,
    pub messages: Vec<Message>,
}

pub struct Engine {
    config: EngineConfig,
    scopes: RwLock<ScopeTree>,
    code: RwLock<HashMap<String, Code>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let tree = ScopeTree::new();
        catalog::install(tree.global());
        Self {
            config,
            scopes: RwLock::new(tree),
            code: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Data engines
    // ------------------------------------------------------------------------

    pub fn register_data_engine(&self, engine: Arc<dyn DataEngine>) -> bool {
        self.scopes.read().global().register_data_engine(engine)
    }

    pub fn deregister_data_engine(&self, name: &str) -> bool {
        self.scopes.read().global().deregister_data_engine(name)
    }

    pub fn data_engines(&self) -> Vec<Arc<dyn DataEngine>> {
        self.scopes.read().global().data_engines()
    }

    // ------------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------------

    fn run_passes(&self, tree: &mut ScopeTree, source_name: &str, text: &str) -> Unit {
        let source = SourceContext::from_file(source_name, text);
        let syntax = parse(source.clone());
        debug!(source = source_name, items = syntax.items.len(), "parsed");
        let declarations = declare(
            tree,
            &syntax,
            &PhaseContext::new(source.clone(), "declare"),
            &self.config,
        );
        generate(
            tree,
            &syntax,
            &declarations,
            &PhaseContext::new(source, "generate"),
            &self.config,
        )
    }

    /// Checks `text` without storing anything.
    pub fn verify(&self, source_name: &str, text: &str) -> Verification {
        let mut scratch = self.scopes.read().clone();
        let unit = self.run_passes(&mut scratch, source_name, text);
        let messages = unit.messages();
        info!(
            source = source_name,
            rules = unit.rules.len(),
            messages = messages.len(),
            "verified"
        );
        Verification { unit, messages }
    }

    /// Compiles `text` and stores its rules. Either every rule of the unit is
    /// stored with its code, or nothing is.
    pub fn compile(&self, source_name: &str, text: &str) -> Result<Compilation, SelError> {
        let mut scopes = self.scopes.write();
        let mut staged = scopes.clone();
        let unit = self.run_passes(&mut staged, source_name, text);
        let messages = unit.messages();

        let blocked = messages
            .iter()
            .any(|m| m.is_error() || self.config.warnings_as_errors);
        if blocked {
            warn!(source = source_name, messages = messages.len(), "compilation rejected");
            return Err(SelError::new(
                ErrorKind::CompilationFailed {
                    unit: source_name.to_string(),
                    messages,
                },
                "engine",
            ));
        }

        let mut generated = Vec::with_capacity(unit.rules.len());
        for rule in &unit.rules {
            let declaration = declaration_of(&staged, rule).ok_or_else(|| {
                SelError::new(
                    ErrorKind::UnknownRule {
                        name: rule.name().to_string(),
                    },
                    "engine",
                )
            })?;
            let owner = owner_of(&staged, rule)?;
            debug!(rule = %rule.name(), engine = owner.name(), "generating code");
            generated.push((declaration, owner.generate(Arc::clone(rule))?));
        }

        *scopes = staged;
        let mut table = self.code.write();
        for (declaration, code) in generated {
            table.insert(declaration.handle(), code);
            declaration.advance(RuleState::GeneratedCode)?;
        }
        info!(source = source_name, rules = unit.rules.len(), "compiled");
        Ok(Compilation { unit, messages })
    }

    // ------------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------------

    /// Runs the rule called `rule_name` (qualified or not) with positional
    /// arguments and returns the records it selected.
    pub fn invoke(&self, rule_name: &str, args: Vec<Value>) -> Result<Vec<Record>, SelError> {
        let matches = self.selection_rules(rule_name);
        if matches.len() > 1 {
            warn!(rule = rule_name, found = matches.len(), "ambiguous rule name, using the first");
        }
        let declaration = matches.into_iter().next().ok_or_else(|| {
            SelError::runtime(ErrorKind::UnknownRule {
                name: rule_name.to_string(),
            })
        })?;

        if args.len() != declaration.arity() {
            return Err(SelError::runtime(ErrorKind::InvalidArgumentCount {
                rule: declaration.name().to_string(),
                expected: declaration.arity(),
                actual: args.len(),
            }));
        }

        let handle = declaration.handle();
        let code = self
            .code
            .read()
            .get(&handle)
            .cloned()
            .ok_or_else(|| SelError::runtime(ErrorKind::MissingCode { handle: handle.clone() }))?;

        let mut context = Context::new(self.config.max_stack_depth);
        for arg in args {
            context.push(arg)?;
        }
        let failed = || {
            SelError::runtime(ErrorKind::InvocationFailed {
                rule: declaration.full_name().to_string(),
            })
        };
        match (code.as_ref())(&mut context) {
            Ok(true) => {}
            Ok(false) => return Err(failed()),
            Err(error) => return Err(failed().with_cause(error)),
        }
        let records = context.take_results();
        debug!(rule = %declaration.full_name(), records = records.len(), "invoked");
        Ok(records)
    }

    // ------------------------------------------------------------------------
    // Tree-wide queries
    // ------------------------------------------------------------------------

    /// Every stored rule matching `name`, in scope visit order. A qualified
    /// name must match the full name; a bare one matches the rule id in any
    /// module.
    pub fn selection_rules(&self, name: &str) -> Vec<Arc<RuleDeclaration>> {
        let wanted = CanonicalName::new(name);
        self.scopes.read().collect(|scope| {
            scope
                .repository()
                .all(DeclKind::Rule)
                .iter()
                .filter_map(Declaration::typed::<RuleDeclaration>)
                .filter(|rule| {
                    if wanted.len() > 1 {
                        rule.full_name() == &wanted
                    } else {
                        rule.name() == &wanted
                    }
                })
                .collect()
        })
    }

    pub fn has_selection_rule(&self, name: &str) -> bool {
        !self.selection_rules(name).is_empty()
    }

    /// Accepts an operator name (`EQ`) or its symbol (`=`).
    pub fn has_operator(&self, name: &str) -> bool {
        let wanted = match Op::from_token(name) {
            Some(op) => CanonicalName::new(op.name()),
            None => CanonicalName::new(name),
        };
        self.any_scope(|scope| scope.repository().has_as::<Operator>(&wanted))
    }

    pub fn has_function(&self, name: &str) -> bool {
        let wanted = CanonicalName::new(name);
        self.any_scope(|scope| scope.repository().has_as::<FunctionDef>(&wanted))
    }

    fn any_scope(&self, test: impl Fn(&Scope) -> bool) -> bool {
        let mut found = false;
        self.scopes.read().accept(&mut |scope: &Scope| {
            found = found || test(scope);
        });
        found
    }

    pub fn scope_summary(&self) -> ScopeSummary {
        self.scopes.read().summary()
    }
}

/// The declaration a generated rule belongs to, found in its module scope.
fn declaration_of(tree: &ScopeTree, rule: &SelectionRule) -> Option<Arc<RuleDeclaration>> {
    let module = tree.find(&rule.name().module())?;
    tree.repository(module)
        .get_as::<RuleDeclaration>(&CanonicalName::new(rule.id()))
        .into_iter()
        .find(|declaration| declaration.full_name() == rule.name())
}

/// The first data engine that defines every object the rule selects.
fn owner_of(tree: &ScopeTree, rule: &SelectionRule) -> Result<Arc<dyn DataEngine>, SelError> {
    let mut objects = rule.header().object_names();
    if let Some(returned) = rule.body().returned_selection() {
        objects.extend(returned.object_names());
    }
    tree.global()
        .data_engines()
        .into_iter()
        .find(|engine| objects.iter().all(|o| engine.has_object_definition(o.canonical())))
        .ok_or_else(|| {
            warn!(rule = %rule.name(), "no data engine owns the rule's objects");
            SelError::new(
                ErrorKind::NoDataEngine {
                    rule: rule.name().to_string(),
                },
                "engine",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEngine;
    use crate::names::ObjectName;
    use crate::repository::ObjectDefinition;
    use crate::types::DataType;

    fn engine_with(config: EngineConfig) -> Engine {
        let engine = Engine::new(config);
        let memory = InMemoryEngine::new("memory");
        memory.define(
            ObjectDefinition::new(ObjectName::parse("projects.deliverables"))
                .with_entry("id", DataType::integer(), Some(1))
                .with_entry("title", DataType::text(), None),
        );
        engine.register_data_engine(Arc::new(memory));
        engine
    }

    fn engine() -> Engine {
        engine_with(EngineConfig::default())
    }

    #[test]
    fn builtins_are_visible_to_global_queries() {
        let engine = Engine::default();
        assert!(engine.has_operator("="));
        assert!(engine.has_operator("and"));
        assert!(engine.has_operator("eq"));
        assert!(engine.has_operator(&String::from("<=")));
        assert!(!engine.has_operator("%%"));
        assert!(engine.has_function("upper"));
        assert!(!engine.has_function("frobnicate"));
    }

    #[test]
    fn verify_stores_nothing() {
        let engine = engine();
        let verification = engine.verify("v.sel", "selection s as deliverables[1];");
        assert!(!verification.has_errors());
        assert_eq!(verification.unit.rules.len(), 1);
        assert!(!engine.has_selection_rule("s"));
    }

    #[test]
    fn compile_registers_code_and_advances_state() {
        let engine = engine();
        engine
            .compile("c.sel", "module reports; selection s (p as number) as deliverables[p];")
            .unwrap();
        let rules = engine.selection_rules("reports.s");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].state(), RuleState::GeneratedCode);
        assert_eq!(engine.selection_rules("S").len(), 1);
        assert!(engine.selection_rules("other.s").is_empty());
        assert!(engine.invoke("s", vec![Value::Number(1.0)]).unwrap().is_empty());
    }

    #[test]
    fn failed_compilation_commits_nothing() {
        let engine = engine();
        let err = engine
            .compile("c.sel", "selection good as deliverables; selection bad as nowhere;")
            .unwrap_err();
        match err.kind {
            ErrorKind::CompilationFailed { messages, .. } => assert_eq!(messages.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!engine.has_selection_rule("good"));
    }

    #[test]
    fn warnings_block_only_when_configured() {
        let source = "selection s (unused as number) as deliverables;";
        assert!(engine().compile("w.sel", source).is_ok());

        let strict = engine_with(EngineConfig {
            warnings_as_errors: true,
            ..EngineConfig::default()
        });
        let err = strict.compile("w.sel", source).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::CompilationFailed { .. }));
    }

    #[test]
    fn rules_need_one_engine_owning_every_object() {
        let engine = Engine::default();
        let first = InMemoryEngine::new("first");
        first.define(ObjectDefinition::new(ObjectName::parse("a.left")));
        let second = InMemoryEngine::new("second");
        second.define(ObjectDefinition::new(ObjectName::parse("b.right")));
        engine.register_data_engine(Arc::new(first));
        engine.register_data_engine(Arc::new(second));

        engine.compile("one.sel", "selection l as left;").unwrap();
        let err = engine.compile("two.sel", "selection both as left, right;").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NoDataEngine { .. }));
        assert!(!engine.has_selection_rule("both"));
        assert!(engine.deregister_data_engine("second"));
        assert!(!engine.deregister_data_engine("second"));
    }

    #[test]
    fn invoke_checks_the_rule_and_its_arity() {
        let engine = engine();
        engine
            .compile("c.sel", "selection s (p as number) as deliverables[p];")
            .unwrap();
        let err = engine.invoke("s", vec![]).unwrap_err();
        match err.kind {
            ErrorKind::InvalidArgumentCount { rule, expected, actual } => {
                assert_eq!((rule.as_str(), expected, actual), ("S", 1, 0));
            }
            other => panic!("unexpected {:?}", other),
        }
        let err = engine.invoke("missing", vec![]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownRule { .. }));
    }

    #[test]
    fn stack_limit_applies_to_arguments() {
        let engine = engine_with(EngineConfig {
            max_stack_depth: 1,
            ..EngineConfig::default()
        });
        engine
            .compile("c.sel", "selection t (a as number, b as number) as deliverables[a or b];")
            .unwrap();
        let err = engine
            .invoke("t", vec![Value::Number(1.0), Value::Number(2.0)])
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::StackOverflow { limit: 1 }));
    }
}
