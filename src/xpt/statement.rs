use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::errors::{ErrorKind, SelError};
use crate::names::CanonicalName;
use crate::types::DataType;
use crate::xpt::{Expression, Meta, NodeKind, SelectionExpression, VariableRef};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Statement {
    Assignment(Assignment),
    Declare(Declare),
    IfThenElse(IfThenElse),
    Return(Return),
    Block(StatementBlock),
}

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub target: VariableRef,
    pub value: Expression,
    pub meta: Meta,
}

#[derive(Debug, Clone, Serialize)]
pub struct Declare {
    pub variable: VariableRef,
    pub init: Option<Expression>,
    pub meta: Meta,
}

#[derive(Debug, Clone, Serialize)]
pub struct IfThenElse {
    pub condition: Expression,
    pub then_branch: Box<Statement>,
    pub else_branch: Option<Box<Statement>>,
    pub meta: Meta,
}

#[derive(Debug, Clone, Serialize)]
pub struct Return {
    pub selection: SelectionExpression,
    pub meta: Meta,
}

fn invalid_child(parent: NodeKind, position: usize, expected: &str, found: NodeKind) -> SelError {
    SelError::structural(ErrorKind::InvalidChild {
        parent: format!("{:?}", parent),
        position,
        expected: expected.to_string(),
        found: format!("{:?}", found),
    })
}

impl Statement {
    pub fn assignment(target: VariableRef, value: Expression, meta: Meta) -> Result<Self, SelError> {
        if !value.is_value() {
            return Err(invalid_child(NodeKind::Assignment, 1, "value expression", value.kind()));
        }
        Ok(Statement::Assignment(Assignment {
            target,
            value,
            meta,
        }))
    }

    pub fn declare(variable: VariableRef, init: Option<Expression>, meta: Meta) -> Result<Self, SelError> {
        if let Some(init) = &init {
            if !init.is_value() {
                return Err(invalid_child(NodeKind::Declare, 1, "value expression", init.kind()));
            }
        }
        Ok(Statement::Declare(Declare {
            variable,
            init,
            meta,
        }))
    }

    pub fn if_then_else(
        condition: Expression,
        then_branch: Statement,
        else_branch: Option<Statement>,
        meta: Meta,
    ) -> Result<Self, SelError> {
        if !condition.is_logical() {
            return Err(invalid_child(NodeKind::IfThenElse, 0, "logical expression", condition.kind()));
        }
        Ok(Statement::IfThenElse(IfThenElse {
            condition,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
            meta,
        }))
    }

    /// Only a selection can be returned.
    pub fn return_of(expression: Expression, meta: Meta) -> Result<Self, SelError> {
        match expression {
            Expression::Selection(selection) => Ok(Statement::Return(Return { selection, meta })),
            other => Err(invalid_child(NodeKind::Return, 0, "selection expression", other.kind())),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Statement::Assignment(_) => NodeKind::Assignment,
            Statement::Declare(_) => NodeKind::Declare,
            Statement::IfThenElse(_) => NodeKind::IfThenElse,
            Statement::Return(_) => NodeKind::Return,
            Statement::Block(_) => NodeKind::StatementBlock,
        }
    }

    pub fn meta(&self) -> &Meta {
        match self {
            Statement::Assignment(s) => &s.meta,
            Statement::Declare(s) => &s.meta,
            Statement::IfThenElse(s) => &s.meta,
            Statement::Return(s) => &s.meta,
            Statement::Block(s) => &s.meta,
        }
    }

    /// The first returned selection, depth first.
    fn first_return(&self) -> Option<&SelectionExpression> {
        match self {
            Statement::Return(r) => Some(&r.selection),
            Statement::Block(block) => block.first_return(),
            Statement::IfThenElse(s) => s
                .then_branch
                .first_return()
                .or_else(|| s.else_branch.as_ref().and_then(|e| e.first_return())),
            _ => None,
        }
    }
}

/// A `{ ... }` body. `id` is the name of the block's scope.
#[derive(Debug, Clone, Serialize)]
pub struct StatementBlock {
    pub id: CanonicalName,
    pub statements: Vec<Statement>,
    pub meta: Meta,
    #[serde(skip)]
    result: OnceCell<Option<DataType>>,
}

impl StatementBlock {
    pub fn new(id: CanonicalName, statements: Vec<Statement>, meta: Meta) -> Self {
        Self {
            id,
            statements,
            meta,
            result: OnceCell::new(),
        }
    }

    fn first_return(&self) -> Option<&SelectionExpression> {
        self.statements.iter().find_map(Statement::first_return)
    }

    pub fn returned_selection(&self) -> Option<&SelectionExpression> {
        self.first_return()
    }

    /// Shape of what the block returns, computed once.
    pub fn result(&self) -> Option<&DataType> {
        self.result
            .get_or_init(|| self.first_return().map(SelectionExpression::data_type))
            .as_ref()
    }

    pub fn has_return(&self) -> bool {
        self.first_return().is_some()
    }
}
