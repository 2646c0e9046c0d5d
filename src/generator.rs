//! Second semantic pass: builds the expression tree.
//!
//! The generator walks the syntax tree again with the scopes the declarator
//! created, resolves every name, folds operator chains and assembles the XPT
//! through the smart constructors. Nothing here aborts: a problem in user
//! input becomes a [`Message`] on the nearest statement (or rule, or unit)
//! and the offending node is replaced by a `NULL` literal so the rest of the
//! tree still gets built and checked.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::{Op, OperatorCategory};
use crate::config::EngineConfig;
use crate::declarator::Declarations;
use crate::errors::{to_source_span, ErrorKind, ErrorReporting, Message, PhaseContext, SelError, Severity};
use crate::names::{CanonicalName, EntryName, ObjectName};
use crate::repository::{ObjectDefinition, SymbolDeclaration};
use crate::scope::{ScopeId, ScopeTree};
use crate::signature::Signed;
use crate::syntax::{
    BlockSyntax, ChainSyntax, ItemSyntax, RuleSyntax, SelectionSyntax, Span, StatementSyntax, TermSyntax,
    UnitSyntax,
};
use crate::types::{DataType, TypeCategory};
use crate::xpt::rule::referenced_variables;
use crate::xpt::{
    fold, DataObjectEntrySymbol, DataObjectSymbol, Expression, FoldOperand, Literal, Meta, NodeRef,
    Parameter, ResultObject, Return, SelectionExpression, SelectionRule, Statement, StatementBlock,
    Unit, VariableRef,
};

pub fn generate(
    tree: &ScopeTree,
    syntax: &UnitSyntax,
    declarations: &Declarations,
    reporter: &PhaseContext,
    config: &EngineConfig,
) -> Unit {
    let mut unit = Unit {
        source: reporter.source.name.clone(),
        ..Unit::default()
    };
    for error in syntax.errors.iter().chain(&declarations.errors) {
        unit.meta.messages.push(reporter.message(error, Severity::Error));
    }

    let mut generator = Generator {
        tree,
        declarations,
        reporter,
        config,
        pending: Vec::new(),
    };
    for item in &syntax.items {
        if let ItemSyntax::Rule(rule) = item {
            if let Some(rule) = generator.rule(rule) {
                unit.rules.push(rule);
            }
        }
    }
    unit.meta.messages.extend(generator.drain());
    debug!(
        rules = unit.rules.len(),
        messages = unit.messages().len(),
        "generation pass finished"
    );
    unit
}

fn placeholder(span: Span) -> Expression {
    Expression::Literal(Literal::null(span))
}

enum SymbolLookup {
    Visible(Arc<SymbolDeclaration>),
    /// Declared, but only further down.
    Later,
    Missing,
}

fn arithmetic_accepts(op: Op, left: &DataType, right: &DataType) -> bool {
    let numeric = |t: &DataType| t.category().is_numeric() || t.category() == TypeCategory::Any;
    let text = |t: &DataType| t.category() == TypeCategory::Text;
    (numeric(left) && numeric(right)) || (op == Op::Add && (text(left) || text(right)))
}

struct Generator<'a> {
    tree: &'a ScopeTree,
    declarations: &'a Declarations,
    reporter: &'a PhaseContext,
    config: &'a EngineConfig,
    /// Messages waiting for the next statement, rule or unit to claim them.
    pending: Vec<Message>,
}

impl Generator<'_> {
    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    fn emit(&mut self, kind: ErrorKind, span: Span, severity: Severity) {
        let error = self.reporter.report(kind, to_source_span(span));
        self.pending.push(self.reporter.message(&error, severity));
    }

    fn error(&mut self, kind: ErrorKind, span: Span) {
        self.emit(kind, span, Severity::Error);
    }

    /// Records a constructor failure caused by the source text.
    fn rejected(&mut self, error: SelError, span: Span) {
        let kind = match error.kind {
            ErrorKind::InvalidChild {
                parent,
                expected,
                found,
                ..
            } => ErrorKind::TypeMismatch {
                expected,
                actual: found,
                context: parent,
            },
            other => other,
        };
        self.error(kind, span);
    }

    fn mismatch(&mut self, expected: &DataType, actual: &DataType, context: String, span: Span) {
        self.error(
            ErrorKind::TypeMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
                context,
            },
            span,
        );
    }

    fn drain(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.pending)
    }

    // ------------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------------

    fn rule(&mut self, syntax: &RuleSyntax) -> Option<Arc<SelectionRule>> {
        let declared = self.declarations.rule(syntax)?.clone();
        let scope = declared.scope;
        let name = declared.declaration.full_name().clone();

        let mut parameters = Vec::with_capacity(syntax.params.len());
        for (param, declared_param) in syntax.params.iter().zip(declared.declaration.parameters()) {
            let default = param.default.as_ref().map(|chain| {
                let value = self.chain(chain, scope, None, false);
                if !declared_param.data_type.accepts(&value.data_type()) {
                    let context = format!("default of '{}'", declared_param.name);
                    self.mismatch(&declared_param.data_type, &value.data_type(), context, chain.span);
                }
                value
            });
            parameters.push(Parameter {
                name: declared_param.name.clone(),
                data_type: declared_param.data_type.clone(),
                default,
                meta: Meta::new(param.span).with_messages(self.drain()),
            });
        }

        let header = self.selection(&syntax.selection, scope);
        let mut messages = self.drain();

        let body = match &syntax.body {
            Some(block) => self.block(block, scope),
            None => StatementBlock::new(
                name.push("BLOCK1"),
                vec![Statement::Return(Return {
                    selection: header.clone(),
                    meta: Meta::new(syntax.selection.span),
                })],
                Meta::new(syntax.span),
            ),
        };

        if !body.has_return() {
            self.error(
                ErrorKind::MissingReturn {
                    block: body.id.to_string(),
                },
                body.meta.span,
            );
        }
        self.check_returns(&name, &header, &body);
        if self.config.warn_unused_parameters {
            self.check_unused(&name, &parameters, &header, &body);
        }
        messages.extend(self.drain());

        let meta = Meta::new(syntax.span).with_messages(messages);
        let rule = match SelectionRule::new(name, parameters, header, body, meta) {
            Ok(rule) => rule,
            Err(error) => {
                self.rejected(error, syntax.span);
                return None;
            }
        };
        match declared.declaration.attach(rule) {
            Ok(rule) => {
                debug!(rule = %rule.name(), "rule generated");
                Some(rule)
            }
            Err(error) => {
                self.rejected(error, syntax.span);
                None
            }
        }
    }

    /// Every `return` must produce the objects the header declares.
    fn check_returns(&mut self, rule: &CanonicalName, header: &SelectionExpression, body: &StatementBlock) {
        let resolved = |selection: &SelectionExpression| {
            selection.objects.iter().all(|o| o.object.definition().is_some())
        };
        if !resolved(header) {
            return;
        }
        let expected = header.object_names();
        let mut mismatches = Vec::new();
        crate::xpt::rule::walk(NodeRef::Block(body), &mut |node, _| {
            if let NodeRef::Statement(Statement::Return(r)) = node {
                if resolved(&r.selection) && r.selection.object_names() != expected {
                    mismatches.push((r.selection.object_names(), r.meta.span));
                }
            }
        });
        let list = |names: &[ObjectName]| {
            names.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        };
        for (actual, span) in mismatches {
            self.error(
                ErrorKind::ResultMismatch {
                    rule: rule.to_string(),
                    expected: list(&expected),
                    actual: list(&actual),
                },
                span,
            );
        }
    }

    fn check_unused(
        &mut self,
        rule: &CanonicalName,
        parameters: &[Parameter],
        header: &SelectionExpression,
        body: &StatementBlock,
    ) {
        let mut used: HashSet<CanonicalName> = HashSet::new();
        for object in &header.objects {
            used.extend(referenced_variables(NodeRef::ResultObject(object)));
        }
        used.extend(referenced_variables(NodeRef::Block(body)));
        for parameter in parameters {
            if let Some(default) = &parameter.default {
                used.extend(referenced_variables(NodeRef::Expression(default)));
            }
        }
        for parameter in parameters {
            if !used.contains(&parameter.name) {
                self.emit(
                    ErrorKind::UnusedParameter {
                        name: parameter.name.to_string(),
                        rule: rule.to_string(),
                    },
                    parameter.meta.span,
                    Severity::Warning,
                );
            }
        }
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn block(&mut self, syntax: &BlockSyntax, parent: ScopeId) -> StatementBlock {
        let scope = self.declarations.block(syntax).unwrap_or(parent);
        let id = self.tree.scope(scope).name().clone();
        let mut statements = Vec::with_capacity(syntax.statements.len());
        for statement in &syntax.statements {
            if let Some(statement) = self.statement(statement, scope) {
                statements.push(statement);
            }
        }
        StatementBlock::new(id, statements, Meta::new(syntax.span).with_messages(self.drain()))
    }

    fn statement(&mut self, syntax: &StatementSyntax, scope: ScopeId) -> Option<Statement> {
        let span = syntax.span();
        let built = match syntax {
            StatementSyntax::Var { name, init, .. } => {
                let variable = self.variable(name, span, scope)?;
                let init = init.as_ref().map(|chain| self.value(chain, scope, &variable));
                Statement::declare(variable, init, Meta::new(span).with_messages(self.drain()))
            }
            StatementSyntax::Assign { target, value, .. } => {
                let target = self.variable(target, span, scope)?;
                let value = self.value(value, scope, &target);
                Statement::assignment(target, value, Meta::new(span).with_messages(self.drain()))
            }
            StatementSyntax::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let mut condition_expression = self.chain(condition, scope, None, false);
                if !condition_expression.is_logical() {
                    let actual = condition_expression.data_type();
                    self.mismatch(&DataType::boolean(), &actual, "if condition".into(), condition.span);
                    condition_expression = placeholder(condition.span);
                }
                let messages = self.drain();
                let then_branch = self.branch(then_branch, scope);
                let else_branch = match else_branch {
                    Some(else_branch) => Some(self.branch(else_branch, scope)),
                    None => None,
                };
                Statement::if_then_else(
                    condition_expression,
                    then_branch,
                    else_branch,
                    Meta::new(span).with_messages(messages),
                )
            }
            StatementSyntax::Return(selection) => {
                let selection = self.selection(selection, scope);
                Ok(Statement::Return(Return {
                    selection,
                    meta: Meta::new(span).with_messages(self.drain()),
                }))
            }
            StatementSyntax::Block(block) => Ok(Statement::Block(self.block(block, scope))),
        };
        match built {
            Ok(statement) => Some(statement),
            Err(error) => {
                self.rejected(error, span);
                None
            }
        }
    }

    /// A branch whose statement was dropped becomes an empty block.
    fn branch(&mut self, syntax: &StatementSyntax, scope: ScopeId) -> Statement {
        if let Some(statement) = self.statement(syntax, scope) {
            return statement;
        }
        let id = self.tree.scope(scope).name().clone();
        let meta = Meta::new(syntax.span()).with_messages(self.drain());
        Statement::Block(StatementBlock::new(id, Vec::new(), meta))
    }

    /// A variable or parameter visible from `scope`.
    fn variable(&mut self, name: &str, span: Span, scope: ScopeId) -> Option<VariableRef> {
        match self.symbol(name, span, scope) {
            SymbolLookup::Visible(symbol) => Some(VariableRef::new(
                symbol.name().clone(),
                symbol.data_type().clone(),
                symbol.kind(),
                span,
            )),
            SymbolLookup::Later => {
                self.used_before_declaration(name, span, scope);
                None
            }
            SymbolLookup::Missing => {
                self.undefined(name, span, scope);
                None
            }
        }
    }

    /// The symbol `name` as seen from source offset `span.start`.
    fn symbol(&self, name: &str, span: Span, scope: ScopeId) -> SymbolLookup {
        let canonical = CanonicalName::new(name);
        match self.tree.get_symbol_at(scope, &canonical, span.start) {
            Some(symbol) => SymbolLookup::Visible(symbol),
            None if self.tree.has_symbol(scope, &canonical) => SymbolLookup::Later,
            None => SymbolLookup::Missing,
        }
    }

    fn used_before_declaration(&mut self, name: &str, span: Span, scope: ScopeId) {
        let block = self.tree.scope(scope).name().to_string();
        self.error(
            ErrorKind::UsedBeforeDeclaration {
                symbol: CanonicalName::new(name).to_string(),
                block,
            },
            span,
        );
    }

    /// An expression stored into `target`, type-checked against it.
    fn value(&mut self, chain: &ChainSyntax, scope: ScopeId, target: &VariableRef) -> Expression {
        let value = self.chain(chain, scope, None, false);
        if !target.data_type().accepts(&value.data_type()) {
            let context = format!("assignment to '{}'", target.name());
            self.mismatch(target.data_type(), &value.data_type(), context, chain.span);
        }
        value
    }

    fn undefined(&mut self, name: &str, span: Span, scope: ScopeId) {
        let block = self.tree.scope(scope).name().to_string();
        self.error(
            ErrorKind::UndefinedSymbol {
                symbol: CanonicalName::new(name).to_string(),
                block,
            },
            span,
        );
    }

    // ------------------------------------------------------------------------
    // Selections
    // ------------------------------------------------------------------------

    fn selection(&mut self, syntax: &SelectionSyntax, scope: ScopeId) -> SelectionExpression {
        let mut objects = Vec::with_capacity(syntax.objects.len());
        for object in &syntax.objects {
            let symbol = DataObjectSymbol::new(ObjectName::parse(&object.name), object.name_span);
            let definition = match symbol.resolve(self.tree, scope) {
                Ok(definition) => Some(definition),
                Err(error) => {
                    self.error(error.kind, object.name_span);
                    None
                }
            };
            let condition = match (&object.condition, &definition) {
                (Some(chain), Some(definition)) => {
                    let condition = self.chain(chain, scope, Some(definition), true);
                    if condition.is_logical() {
                        Some(condition)
                    } else {
                        let actual = condition.data_type();
                        self.mismatch(&DataType::boolean(), &actual, "selection condition".into(), chain.span);
                        None
                    }
                }
                _ => None,
            };
            match ResultObject::new(symbol, condition, object.span) {
                Ok(result) => objects.push(result),
                Err(error) => self.rejected(error, object.span),
            }
        }
        SelectionExpression::new(objects, syntax.span)
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    /// Builds and folds an operator chain. With `object`, bare names may
    /// refer to its entries; with `positional` as well, plain values stand
    /// for successive key columns.
    fn chain(
        &mut self,
        syntax: &ChainSyntax,
        scope: ScopeId,
        object: Option<&Arc<ObjectDefinition>>,
        positional: bool,
    ) -> Expression {
        let ops: Vec<Op> = syntax.rest.iter().map(|(op, _)| op.op).collect();
        for (op, _) in &syntax.rest {
            if !self.tree.has_operator(scope, &CanonicalName::new(op.op.name())) {
                self.error(
                    ErrorKind::UnknownOperator {
                        symbol: op.op.symbol().to_string(),
                    },
                    op.span,
                );
            }
        }

        let mut key = 1;
        let mut operands = Vec::with_capacity(ops.len() + 1);
        for (index, operand) in syntax.operands().enumerate() {
            let mut expression = self.term(&operand.term, scope, object);
            let before = index.checked_sub(1).map(|i| ops[i]);
            let after = ops.get(index).copied();
            let is_key = positional
                && operand.negations == 0
                && !matches!(operand.term, TermSyntax::Group(_))
                && [before, after]
                    .iter()
                    .flatten()
                    .all(|op| op.category() == OperatorCategory::Logical)
                && !expression.is_logical();
            if let (true, Some(definition)) = (is_key, object) {
                expression = self.key_condition(definition, key, expression, operand.span);
                if after.is_some_and(Op::is_conjunctive) {
                    key += 1;
                }
            }
            operands.push(FoldOperand::new(expression, operand.negations));
        }

        match fold(operands, &ops) {
            Ok(expression) => {
                self.check_types(&expression, syntax.span);
                expression
            }
            Err(error) => {
                self.rejected(error, syntax.span);
                placeholder(syntax.span)
            }
        }
    }

    /// `value` compared with the object's key column `ordinal`.
    fn key_condition(
        &mut self,
        definition: &ObjectDefinition,
        ordinal: usize,
        value: Expression,
        span: Span,
    ) -> Expression {
        let Some(entry) = definition.key(ordinal) else {
            self.error(
                ErrorKind::MissingKey {
                    object: definition.object_name().to_string(),
                    ordinal,
                },
                span,
            );
            return placeholder(span);
        };
        let column = Expression::Entry(DataObjectEntrySymbol::resolved(entry, span));
        Expression::compare(Op::Eq, column, value).unwrap_or_else(|error| {
            self.rejected(error, span);
            placeholder(span)
        })
    }

    /// Operand types of the nodes a fold produced. Parenthesized groups were
    /// checked when they were built.
    fn check_types(&mut self, expression: &Expression, span: Span) {
        match expression {
            Expression::Compare(b) | Expression::Operation(b) | Expression::Logical(b) if !b.parenthesized => {
                self.check_types(&b.left, span);
                self.check_types(&b.right, span);
                let (left, right) = (b.left.data_type(), b.right.data_type());
                let context = format!("operator '{}'", b.op);
                match expression {
                    Expression::Compare(_) if !left.comparable_with(&right) => {
                        self.mismatch(&left, &right, context, span);
                    }
                    Expression::Operation(_) if !arithmetic_accepts(b.op, &left, &right) => {
                        self.mismatch(&DataType::number(), &right, context, span);
                    }
                    _ => {}
                }
            }
            Expression::Not(n) if !n.parenthesized => self.check_types(&n.operand, span),
            _ => {}
        }
    }

    fn term(&mut self, syntax: &TermSyntax, scope: ScopeId, object: Option<&Arc<ObjectDefinition>>) -> Expression {
        match syntax {
            TermSyntax::Literal(literal) => Expression::Literal(Literal::infer(literal.value.clone(), literal.span)),
            TermSyntax::Name { name, span } => self.name(name, *span, scope, object),
            TermSyntax::Call { name, args, span } => {
                let args: Vec<Expression> = args.iter().map(|arg| self.chain(arg, scope, object, false)).collect();
                let Some(function) = self.tree.get_function(scope, &CanonicalName::new(name)) else {
                    self.error(
                        ErrorKind::UnknownFunction {
                            name: CanonicalName::new(name).to_string(),
                        },
                        *span,
                    );
                    return placeholder(*span);
                };
                for (position, (arg, expected)) in args.iter().zip(function.parameters()).enumerate() {
                    if !expected.accepts(&arg.data_type()) {
                        let context = format!("argument {} of '{}'", position + 1, function.name());
                        self.mismatch(expected, &arg.data_type(), context, *span);
                    }
                }
                Expression::call(&function, args, *span).unwrap_or_else(|error| {
                    self.rejected(error, *span);
                    placeholder(*span)
                })
            }
            TermSyntax::Group(chain) => self.chain(chain, scope, object, false).parenthesize(),
        }
    }

    /// Symbols first, then entries of the object under selection. Qualified
    /// names are always entries.
    fn name(&mut self, name: &str, span: Span, scope: ScopeId, object: Option<&Arc<ObjectDefinition>>) -> Expression {
        let canonical = CanonicalName::new(name);
        if canonical.len() > 1 {
            let entry = DataObjectEntrySymbol::new(EntryName::parse(name), span);
            return match entry.resolve(self.tree, scope) {
                Ok(_) => Expression::Entry(entry),
                Err(error) => {
                    self.error(error.kind, span);
                    placeholder(span)
                }
            };
        }
        match self.symbol(name, span, scope) {
            SymbolLookup::Visible(symbol) => {
                return Expression::Variable(VariableRef::new(
                    symbol.name().clone(),
                    symbol.data_type().clone(),
                    symbol.kind(),
                    span,
                ));
            }
            SymbolLookup::Later => {
                self.used_before_declaration(name, span, scope);
                return placeholder(span);
            }
            SymbolLookup::Missing => {}
        }
        if let Some(entry) = object.and_then(|definition| definition.entry(canonical.id())) {
            return Expression::Entry(DataObjectEntrySymbol::resolved(entry, span));
        }
        self.undefined(name, span, scope);
        placeholder(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::declarator::declare;
    use crate::errors::SourceContext;
    use crate::memory::InMemoryEngine;
    use crate::syntax::parse;
    use crate::types::Value;

    fn fixture() -> ScopeTree {
        let tree = ScopeTree::new();
        catalog::install(tree.global());
        let engine = InMemoryEngine::new("memory");
        engine.define(
            ObjectDefinition::new(ObjectName::parse("projects.deliverables"))
                .with_entry("id", DataType::integer(), Some(1))
                .with_entry("rev", DataType::integer(), Some(2))
                .with_entry("title", DataType::text(), None),
        );
        engine.define(
            ObjectDefinition::new(ObjectName::parse("projects.milestones"))
                .with_entry("id", DataType::integer(), Some(1)),
        );
        tree.global().register_data_engine(Arc::new(engine));
        tree
    }

    fn build(source: &str, config: &EngineConfig) -> Unit {
        let mut tree = fixture();
        let context = SourceContext::from_file("test.sel", source);
        let syntax = parse(context.clone());
        let declarations = declare(&mut tree, &syntax, &PhaseContext::new(context.clone(), "declare"), config);
        generate(&tree, &syntax, &declarations, &PhaseContext::new(context, "generate"), config)
    }

    fn texts(unit: &Unit) -> Vec<String> {
        unit.messages().into_iter().map(|m| m.text).collect()
    }

    fn condition(unit: &Unit, rule: &str) -> Expression {
        unit.rule(rule).unwrap().header().objects[0]
            .condition
            .clone()
            .unwrap()
    }

    fn key_compare(expression: &Expression) -> (String, Value) {
        match expression {
            Expression::Compare(b) => match (b.left.as_ref(), b.right.as_ref()) {
                (Expression::Entry(entry), Expression::Literal(literal)) => {
                    (entry.entry().to_string(), literal.value().clone())
                }
                other => panic!("unexpected operands {:?}", other),
            },
            other => panic!("expected a comparison, got {}", other),
        }
    }

    #[test]
    fn successive_values_bind_to_successive_keys() {
        let unit = build("selection s as deliverables[100, 2];", &EngineConfig::default());
        assert!(unit.messages().is_empty(), "{:?}", texts(&unit));
        match condition(&unit, "s") {
            Expression::Logical(b) => {
                assert_eq!(b.op, Op::And);
                assert_eq!(key_compare(&b.left), ("ID".into(), Value::Number(100.0)));
                assert_eq!(key_compare(&b.right), ("REV".into(), Value::Number(2.0)));
            }
            other => panic!("expected a conjunction, got {}", other),
        }
    }

    #[test]
    fn disjunctions_stay_on_the_same_key() {
        let unit = build("selection s as deliverables[100 or 200];", &EngineConfig::default());
        match condition(&unit, "s") {
            Expression::Logical(b) => {
                assert_eq!(b.op, Op::Or);
                assert_eq!(key_compare(&b.left).0, "ID");
                assert_eq!(key_compare(&b.right).0, "ID");
            }
            other => panic!("expected a disjunction, got {}", other),
        }
    }

    #[test]
    fn named_entries_are_not_positional() {
        let unit = build("selection s as deliverables[100, title = 'x'];", &EngineConfig::default());
        assert!(unit.messages().is_empty(), "{:?}", texts(&unit));
        match condition(&unit, "s") {
            Expression::Logical(b) => {
                assert_eq!(key_compare(&b.left).0, "ID");
                assert_eq!(key_compare(&b.right).0, "TITLE");
            }
            other => panic!("expected a conjunction, got {}", other),
        }
    }

    #[test]
    fn too_many_positional_values_report_the_missing_key() {
        let unit = build("selection s as deliverables[1, 2, 3];", &EngineConfig::default());
        let texts = texts(&unit);
        assert_eq!(texts.len(), 1, "{:?}", texts);
        assert!(texts[0].contains("no key column 3"));
    }

    #[test]
    fn undefined_names_keep_the_tree() {
        let unit = build(
            "selection s as deliverables { x := 1; return deliverables; }",
            &EngineConfig::default(),
        );
        assert_eq!(unit.rules.len(), 1);
        let texts = texts(&unit);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("'X'"));
        assert!(texts[0].contains("S.BLOCK1"));
    }

    #[test]
    fn variables_are_unknown_above_their_declaration() {
        let unit = build(
            "selection s as deliverables { v := 1; var v as number; var w as number := w; return deliverables; }",
            &EngineConfig::default(),
        );
        let texts = texts(&unit);
        assert_eq!(texts.len(), 2, "{:?}", texts);
        assert!(texts.iter().all(|t| t.contains("used before its declaration")));
        assert!(texts[0].contains("'V'") && texts[0].contains("S.BLOCK1"));
        assert!(texts[1].contains("'W'"));
    }

    #[test]
    fn outer_symbols_stay_visible_until_shadowed() {
        let unit = build(
            "selection s (p as number) as deliverables { var q as number := p; var p as text := 'a'; return deliverables[q]; }",
            &EngineConfig::default(),
        );
        assert!(unit.messages().is_empty(), "{:?}", texts(&unit));
    }

    #[test]
    fn returns_must_match_the_header() {
        let unit = build(
            "selection s as deliverables { return milestones; }",
            &EngineConfig::default(),
        );
        assert!(texts(&unit).iter().any(|t| t.contains("declares [PROJECTS.DELIVERABLES]")));
    }

    #[test]
    fn bodies_need_a_return() {
        let unit = build("selection s as deliverables { }", &EngineConfig::default());
        assert!(texts(&unit).iter().any(|t| t.contains("never returns")));
    }

    #[test]
    fn unused_parameters_warn_unless_disabled() {
        let source = "selection s (p as number, q as number) as deliverables[p];";
        let unit = build(source, &EngineConfig::default());
        let messages = unit.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].severity, Severity::Warning);
        assert!(messages[0].text.contains("'Q'"));

        let quiet = EngineConfig {
            warn_unused_parameters: false,
            ..EngineConfig::default()
        };
        assert!(build(source, &quiet).messages().is_empty());
    }

    #[test]
    fn incompatible_operands_are_reported() {
        let unit = build("selection s as deliverables[title = 1];", &EngineConfig::default());
        assert!(texts(&unit).iter().any(|t| t.contains("type mismatch")));

        let unit = build("selection s as deliverables[upper(title, 1) = 'A'];", &EngineConfig::default());
        assert!(texts(&unit).iter().any(|t| t.contains("expects 1 argument")));
    }

    #[test]
    fn unknown_objects_and_functions_are_reported() {
        let unit = build("selection s as nowhere[frobnicate(1) = 2];", &EngineConfig::default());
        assert!(texts(&unit).iter().any(|t| t.contains("'NOWHERE'")));

        let unit = build("selection s as deliverables[frobnicate(1) = 2];", &EngineConfig::default());
        assert!(texts(&unit).iter().any(|t| t.contains("unknown function 'FROBNICATE'")));
    }

    #[test]
    fn defaults_are_checked_and_placed_first() {
        let unit = build(
            "selection s (p as number default 'x') as deliverables[p];",
            &EngineConfig::default(),
        );
        assert!(texts(&unit).iter().any(|t| t.contains("default of 'P'")));
        let rule = unit.rule("s").unwrap();
        assert!(matches!(rule.body().statements[0], Statement::IfThenElse(_)));
    }
}
