//! Concrete syntax for the selection-rule language.
//!
//! The parser turns source text into the plain data types below. They carry
//! byte spans but no meaning: names are unresolved strings and operator chains
//! are flat. The declarator consumes them through the [`Listener`] protocol;
//! the generator walks them directly to build the expression tree.

use serde::{Deserialize, Serialize};

use crate::catalog::Op;
use crate::errors::SelError;
use crate::types::Value;

pub mod parser;

pub use parser::parse;

/// Represents a span in the source code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn shifted(self, base: usize) -> Self {
        Self {
            start: self.start + base,
            end: self.end + base,
        }
    }

    /// Smallest span covering both.
    pub fn cover(self, other: Span) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A parsed source file. Items that failed to parse are missing from `items`
/// and have an entry in `errors`.
#[derive(Debug, Clone, Default)]
pub struct UnitSyntax {
    pub items: Vec<ItemSyntax>,
    pub errors: Vec<SelError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemSyntax {
    Module(ModuleSyntax),
    Rule(RuleSyntax),
}

/// `module a.b;` places the rules that follow in scope `A.B`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSyntax {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleSyntax {
    pub name: String,
    pub name_span: Span,
    pub params: Vec<ParamSyntax>,
    pub selection: SelectionSyntax,
    pub body: Option<BlockSyntax>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSyntax {
    pub name: String,
    pub type_name: String,
    pub default: Option<ChainSyntax>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSyntax {
    pub objects: Vec<ObjectRefSyntax>,
    pub span: Span,
}

/// `object[condition]`; the brackets are optional.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRefSyntax {
    pub name: String,
    pub name_span: Span,
    pub condition: Option<ChainSyntax>,
    pub span: Span,
}

/// A flat `operand (op operand)*` sequence, before priority folding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSyntax {
    pub first: OperandSyntax,
    pub rest: Vec<(OpSyntax, OperandSyntax)>,
    pub span: Span,
}

impl ChainSyntax {
    pub fn operands(&self) -> impl Iterator<Item = &OperandSyntax> {
        std::iter::once(&self.first).chain(self.rest.iter().map(|(_, operand)| operand))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpSyntax {
    pub op: Op,
    pub span: Span,
}

/// A term with any number of leading `not`s.
#[derive(Debug, Clone, PartialEq)]
pub struct OperandSyntax {
    pub negations: usize,
    pub term: TermSyntax,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermSyntax {
    Literal(LiteralSyntax),
    Name { name: String, span: Span },
    Call {
        name: String,
        args: Vec<ChainSyntax>,
        span: Span,
    },
    Group(Box<ChainSyntax>),
}

impl TermSyntax {
    pub fn span(&self) -> Span {
        match self {
            TermSyntax::Literal(literal) => literal.span,
            TermSyntax::Name { span, .. } | TermSyntax::Call { span, .. } => *span,
            TermSyntax::Group(chain) => chain.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralSyntax {
    pub value: Value,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockSyntax {
    pub statements: Vec<StatementSyntax>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementSyntax {
    Var {
        name: String,
        type_name: String,
        init: Option<ChainSyntax>,
        span: Span,
    },
    Assign {
        target: String,
        value: ChainSyntax,
        span: Span,
    },
    If {
        condition: ChainSyntax,
        then_branch: Box<StatementSyntax>,
        else_branch: Option<Box<StatementSyntax>>,
        span: Span,
    },
    Return(SelectionSyntax),
    Block(BlockSyntax),
}

impl StatementSyntax {
    pub fn span(&self) -> Span {
        match self {
            StatementSyntax::Var { span, .. }
            | StatementSyntax::Assign { span, .. }
            | StatementSyntax::If { span, .. } => *span,
            StatementSyntax::Return(selection) => selection.span,
            StatementSyntax::Block(block) => block.span,
        }
    }
}

// ============================================================================
// LISTENER PROTOCOL
// ============================================================================

/// Paired enter/exit callbacks, one pair per production that opens a scope.
pub trait Listener {
    fn enter_unit(&mut self, _unit: &UnitSyntax) {}
    fn exit_unit(&mut self, _unit: &UnitSyntax) {}
    fn enter_module(&mut self, _module: &ModuleSyntax) {}
    fn enter_rule(&mut self, _rule: &RuleSyntax) {}
    fn exit_rule(&mut self, _rule: &RuleSyntax) {}
    fn enter_param(&mut self, _param: &ParamSyntax) {}
    fn enter_block(&mut self, _block: &BlockSyntax) {}
    fn exit_block(&mut self, _block: &BlockSyntax) {}
    fn enter_statement(&mut self, _statement: &StatementSyntax) {}
    fn exit_statement(&mut self, _statement: &StatementSyntax) {}
}

/// Depth-first walk over a unit, in source order.
pub fn walk<L: Listener + ?Sized>(unit: &UnitSyntax, listener: &mut L) {
    listener.enter_unit(unit);
    for item in &unit.items {
        match item {
            ItemSyntax::Module(module) => listener.enter_module(module),
            ItemSyntax::Rule(rule) => {
                listener.enter_rule(rule);
                for param in &rule.params {
                    listener.enter_param(param);
                }
                if let Some(body) = &rule.body {
                    walk_block(body, listener);
                }
                listener.exit_rule(rule);
            }
        }
    }
    listener.exit_unit(unit);
}

fn walk_block<L: Listener + ?Sized>(block: &BlockSyntax, listener: &mut L) {
    listener.enter_block(block);
    for statement in &block.statements {
        walk_statement(statement, listener);
    }
    listener.exit_block(block);
}

fn walk_statement<L: Listener + ?Sized>(statement: &StatementSyntax, listener: &mut L) {
    listener.enter_statement(statement);
    match statement {
        StatementSyntax::Block(block) => walk_block(block, listener),
        StatementSyntax::If {
            then_branch,
            else_branch,
            ..
        } => {
            walk_statement(then_branch, listener);
            if let Some(else_branch) = else_branch {
                walk_statement(else_branch, listener);
            }
        }
        _ => {}
    }
    listener.exit_statement(statement);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceContext;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl Listener for Recorder {
        fn enter_module(&mut self, module: &ModuleSyntax) {
            self.0.push(format!("module {}", module.name));
        }
        fn enter_rule(&mut self, rule: &RuleSyntax) {
            self.0.push(format!("enter {}", rule.name));
        }
        fn exit_rule(&mut self, rule: &RuleSyntax) {
            self.0.push(format!("exit {}", rule.name));
        }
        fn enter_param(&mut self, param: &ParamSyntax) {
            self.0.push(format!("param {}", param.name));
        }
        fn enter_block(&mut self, _block: &BlockSyntax) {
            self.0.push("{".into());
        }
        fn exit_block(&mut self, _block: &BlockSyntax) {
            self.0.push("}".into());
        }
    }

    #[test]
    fn walk_visits_in_source_order() {
        let text = "module m; selection s (p as number) as o[p] { if p > 1 then { return o; } }";
        let unit = parse(SourceContext::from_file("t.sel", text));
        assert!(unit.errors.is_empty(), "{:?}", unit.errors);
        let mut recorder = Recorder::default();
        walk(&unit, &mut recorder);
        assert_eq!(
            recorder.0,
            ["module m", "enter s", "param p", "{", "{", "}", "}", "exit s"]
        );
    }

    #[test]
    fn spans_cover_and_shift() {
        let span = Span::new(2, 4).cover(Span::new(6, 9));
        assert_eq!(span, Span::new(2, 9));
        assert_eq!(span.shifted(10), Span::new(12, 19));
    }
}
