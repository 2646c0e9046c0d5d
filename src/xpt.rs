//! The expression tree (XPT).
//!
//! Nodes are plain enums and structs built bottom-up through smart
//! constructors: a node can only be created with children of the right
//! capability, so a built tree is structurally valid by construction. A
//! constructor that receives the wrong kind of child returns a structural
//! [`SelError`](crate::errors::SelError).
//!
//! Name resolution happens while the generator builds the tree, except for
//! data-object and entry references, which resolve lazily and cache the
//! outcome (see [`symbol`]).

use serde::Serialize;

use crate::errors::Message;
use crate::syntax::Span;

pub mod expression;
pub mod fold;
pub mod literal;
pub mod rule;
pub mod statement;
pub mod symbol;

pub use expression::{Binary, CallExpression, Expression, NotExpression, ResultObject, SelectionExpression};
pub use fold::{fold, FoldOperand, Shape};
pub use literal::Literal;
pub use rule::{NodeRef, Parameter, SelectionRule, Unit};
pub use statement::{Assignment, Declare, IfThenElse, Return, Statement, StatementBlock};
pub use symbol::{DataObjectEntrySymbol, DataObjectSymbol, Validity, VariableRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    Literal,
    Variable,
    DataObject,
    DataObjectEntry,
    Operation,
    Logical,
    Compare,
    Not,
    Call,
    Selection,
    ResultObject,
    Assignment,
    Declare,
    IfThenElse,
    Return,
    StatementBlock,
    Parameter,
    SelectionRule,
    Unit,
}

impl NodeKind {
    pub fn is_expression(self) -> bool {
        matches!(
            self,
            NodeKind::Literal
                | NodeKind::Variable
                | NodeKind::DataObject
                | NodeKind::DataObjectEntry
                | NodeKind::Operation
                | NodeKind::Logical
                | NodeKind::Compare
                | NodeKind::Not
                | NodeKind::Call
                | NodeKind::Selection
        )
    }

    pub fn is_statement(self) -> bool {
        matches!(
            self,
            NodeKind::Assignment
                | NodeKind::Declare
                | NodeKind::IfThenElse
                | NodeKind::Return
                | NodeKind::StatementBlock
        )
    }
}

/// Position and collected messages of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Meta {
    pub span: Span,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
}

impl Meta {
    pub fn new(span: Span) -> Self {
        Self {
            span,
            messages: Vec::new(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages.extend(messages);
        self
    }
}
