use serde::Serialize;
use std::fmt;

use crate::catalog::{FunctionDef, Op, OperatorCategory, PRIORITY_NOT, PRIORITY_PARENTHESIZED};
use crate::errors::{ErrorKind, SelError};
use crate::names::{CanonicalName, ObjectName};
use crate::signature::Signed;
use crate::syntax::Span;
use crate::types::{DataType, TypeCategory, Value};
use crate::xpt::{DataObjectEntrySymbol, DataObjectSymbol, Literal, NodeKind, VariableRef};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expression {
    Literal(Literal),
    Variable(VariableRef),
    DataObject(DataObjectSymbol),
    Entry(DataObjectEntrySymbol),
    Operation(Binary),
    Logical(Binary),
    Compare(Binary),
    Not(NotExpression),
    Call(CallExpression),
    Selection(SelectionExpression),
}

/// Shared shape of arithmetic, logical and comparison nodes.
#[derive(Debug, Clone, Serialize)]
pub struct Binary {
    pub op: Op,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub parenthesized: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotExpression {
    pub operand: Box<Expression>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub parenthesized: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallExpression {
    pub function: CanonicalName,
    pub args: Vec<Expression>,
    pub returns: DataType,
    pub span: Span,
}

fn invalid_child(parent: NodeKind, position: usize, expected: &str, found: &Expression) -> SelError {
    SelError::structural(ErrorKind::InvalidChild {
        parent: format!("{:?}", parent),
        position,
        expected: expected.to_string(),
        found: format!("{:?}", found.kind()),
    })
}

fn require(
    parent: NodeKind,
    position: usize,
    capability: &str,
    child: &Expression,
    ok: bool,
) -> Result<(), SelError> {
    if ok {
        Ok(())
    } else {
        Err(invalid_child(parent, position, capability, child))
    }
}

impl Expression {
    // ------------------------------------------------------------------------
    // Smart constructors
    // ------------------------------------------------------------------------

    /// Builds the node matching the operator's category.
    pub fn binary(op: Op, left: Expression, right: Expression) -> Result<Self, SelError> {
        match op.category() {
            OperatorCategory::Logical => Self::logical(op, left, right),
            OperatorCategory::Compare => Self::compare(op, left, right),
            OperatorCategory::Arithmetic => Self::operation(op, left, right),
        }
    }

    fn check_binary(
        kind: NodeKind,
        op: Op,
        category: OperatorCategory,
        left: &Expression,
        right: &Expression,
        operand_ok: fn(&Expression) -> bool,
        capability: &str,
    ) -> Result<(), SelError> {
        if op.category() != category || op.arity() != 2 {
            return Err(SelError::structural(ErrorKind::OperatorCategory {
                operator: op.name().to_string(),
                expected: category.to_string(),
            }));
        }
        require(kind, 0, capability, left, operand_ok(left))?;
        require(kind, 1, capability, right, operand_ok(right))
    }

    pub fn logical(op: Op, left: Expression, right: Expression) -> Result<Self, SelError> {
        Self::check_binary(
            NodeKind::Logical,
            op,
            OperatorCategory::Logical,
            &left,
            &right,
            Expression::is_logical,
            "logical expression",
        )?;
        Ok(Expression::Logical(Binary::new(op, left, right)))
    }

    pub fn compare(op: Op, left: Expression, right: Expression) -> Result<Self, SelError> {
        Self::check_binary(
            NodeKind::Compare,
            op,
            OperatorCategory::Compare,
            &left,
            &right,
            Expression::is_value,
            "value expression",
        )?;
        Ok(Expression::Compare(Binary::new(op, left, right)))
    }

    pub fn operation(op: Op, left: Expression, right: Expression) -> Result<Self, SelError> {
        Self::check_binary(
            NodeKind::Operation,
            op,
            OperatorCategory::Arithmetic,
            &left,
            &right,
            Expression::is_value,
            "value expression",
        )?;
        Ok(Expression::Operation(Binary::new(op, left, right)))
    }

    pub fn not(operand: Expression) -> Result<Self, SelError> {
        require(NodeKind::Not, 0, "logical expression", &operand, operand.is_logical())?;
        Ok(Expression::Not(NotExpression {
            operand: Box::new(operand),
            parenthesized: false,
        }))
    }

    pub fn call(function: &FunctionDef, args: Vec<Expression>, span: Span) -> Result<Self, SelError> {
        if args.len() != function.parameters().len() {
            return Err(SelError::new(
                ErrorKind::ArgumentCount {
                    name: function.name().to_string(),
                    expected: function.parameters().len(),
                    actual: args.len(),
                },
                "xpt",
            ));
        }
        for (position, arg) in args.iter().enumerate() {
            require(NodeKind::Call, position, "value expression", arg, arg.is_value())?;
        }
        Ok(Expression::Call(CallExpression {
            function: function.name().clone(),
            args,
            returns: function.returns().clone(),
            span,
        }))
    }

    /// Marks a group written in parentheses so folding never regroups it.
    pub fn parenthesize(mut self) -> Self {
        match &mut self {
            Expression::Operation(b) | Expression::Logical(b) | Expression::Compare(b) => {
                b.parenthesized = true
            }
            Expression::Not(n) => n.parenthesized = true,
            _ => {}
        }
        self
    }

    // ------------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------------

    pub fn kind(&self) -> NodeKind {
        match self {
            Expression::Literal(_) => NodeKind::Literal,
            Expression::Variable(_) => NodeKind::Variable,
            Expression::DataObject(_) => NodeKind::DataObject,
            Expression::Entry(_) => NodeKind::DataObjectEntry,
            Expression::Operation(_) => NodeKind::Operation,
            Expression::Logical(_) => NodeKind::Logical,
            Expression::Compare(_) => NodeKind::Compare,
            Expression::Not(_) => NodeKind::Not,
            Expression::Call(_) => NodeKind::Call,
            Expression::Selection(_) => NodeKind::Selection,
        }
    }

    /// Can appear where a single value is expected.
    pub fn is_value(&self) -> bool {
        !matches!(self, Expression::Selection(_) | Expression::DataObject(_))
    }

    /// Can appear where a truth value is expected.
    pub fn is_logical(&self) -> bool {
        match self {
            Expression::Logical(_) | Expression::Compare(_) | Expression::Not(_) => true,
            Expression::Literal(literal) => {
                matches!(literal.value(), Value::Boolean(_) | Value::Null)
            }
            Expression::Operation(_) | Expression::Selection(_) | Expression::DataObject(_) => false,
            other => matches!(
                other.data_type().category(),
                TypeCategory::Boolean | TypeCategory::Any
            ),
        }
    }

    /// Priority used while folding. Leaves and parenthesized groups never
    /// regroup.
    pub fn priority(&self) -> u8 {
        match self {
            Expression::Operation(b) | Expression::Logical(b) | Expression::Compare(b) => {
                if b.parenthesized {
                    PRIORITY_PARENTHESIZED
                } else {
                    b.op.priority()
                }
            }
            Expression::Not(n) if !n.parenthesized => PRIORITY_NOT,
            _ => PRIORITY_PARENTHESIZED,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expression::Literal(literal) => literal.data_type().clone(),
            Expression::Variable(variable) => variable.data_type().clone(),
            Expression::DataObject(object) => object.data_type(),
            Expression::Entry(entry) => entry.data_type(),
            Expression::Operation(b) => {
                let (left, right) = (b.left.data_type(), b.right.data_type());
                if b.op == Op::Add
                    && (left.category() == TypeCategory::Text || right.category() == TypeCategory::Text)
                {
                    DataType::text()
                } else if left.category() == TypeCategory::Integer
                    && right.category() == TypeCategory::Integer
                    && b.op != Op::Div
                {
                    DataType::integer()
                } else {
                    DataType::number()
                }
            }
            Expression::Logical(_) | Expression::Compare(_) | Expression::Not(_) => DataType::boolean(),
            Expression::Call(call) => call.returns.clone(),
            Expression::Selection(selection) => selection.data_type(),
        }
    }

    /// Direct sub-expressions, left to right.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Operation(b) | Expression::Logical(b) | Expression::Compare(b) => {
                vec![b.left.as_ref(), b.right.as_ref()]
            }
            Expression::Not(n) => vec![n.operand.as_ref()],
            Expression::Call(call) => call.args.iter().collect(),
            Expression::Selection(selection) => selection
                .objects
                .iter()
                .filter_map(|o| o.condition.as_ref())
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl Binary {
    fn new(op: Op, left: Expression, right: Expression) -> Self {
        Self {
            op,
            left: Box::new(left),
            right: Box::new(right),
            parenthesized: false,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(literal) => write!(f, "{}", literal),
            Expression::Variable(variable) => write!(f, "{}", variable),
            Expression::DataObject(object) => write!(f, "{}", object),
            Expression::Entry(entry) => write!(f, "{}", entry),
            Expression::Operation(b) | Expression::Logical(b) | Expression::Compare(b) => {
                write!(f, "({} {} {})", b.left, b.op, b.right)
            }
            Expression::Not(n) => write!(f, "(not {})", n.operand),
            Expression::Call(call) => {
                let args: Vec<_> = call.args.iter().map(ToString::to_string).collect();
                write!(f, "{}({})", call.function, args.join(", "))
            }
            Expression::Selection(selection) => write!(f, "{}", selection),
        }
    }
}

// ============================================================================
// SELECTIONS
// ============================================================================

/// One object of a selection, with the condition its records must meet.
#[derive(Debug, Clone, Serialize)]
pub struct ResultObject {
    pub object: DataObjectSymbol,
    pub condition: Option<Expression>,
    pub span: Span,
}

impl ResultObject {
    pub fn new(object: DataObjectSymbol, condition: Option<Expression>, span: Span) -> Result<Self, SelError> {
        if let Some(condition) = &condition {
            require(
                NodeKind::ResultObject,
                1,
                "logical expression",
                condition,
                condition.is_logical(),
            )?;
        }
        Ok(Self {
            object,
            condition,
            span,
        })
    }
}

impl fmt::Display for ResultObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.condition {
            Some(condition) => write!(f, "{}[{}]", self.object, condition),
            None => write!(f, "{}", self.object),
        }
    }
}

/// `object[condition], ...`: the value shape a rule returns.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionExpression {
    pub objects: Vec<ResultObject>,
    pub span: Span,
}

impl SelectionExpression {
    pub fn new(objects: Vec<ResultObject>, span: Span) -> Self {
        Self { objects, span }
    }

    pub fn object_names(&self) -> Vec<ObjectName> {
        self.objects.iter().map(|o| o.object.qualified_name()).collect()
    }

    pub fn data_type(&self) -> DataType {
        DataType::selection(&self.object_names())
    }
}

impl fmt::Display for SelectionExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<_> = self.objects.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SymbolKind;

    fn number(n: f64) -> Expression {
        Expression::Literal(Literal::infer(Value::Number(n), Span::default()))
    }

    fn flag(name: &str) -> Expression {
        Expression::Variable(VariableRef::new(
            CanonicalName::new(name),
            DataType::boolean(),
            SymbolKind::Variable,
            Span::default(),
        ))
    }

    #[test]
    fn binary_dispatches_on_category() {
        let sum = Expression::binary(Op::Add, number(1.0), number(2.0)).unwrap();
        assert_eq!(sum.kind(), NodeKind::Operation);
        let cmp = Expression::binary(Op::Lt, sum, number(3.0)).unwrap();
        assert_eq!(cmp.kind(), NodeKind::Compare);
        let both = Expression::binary(Op::And, cmp, flag("b")).unwrap();
        assert_eq!(both.kind(), NodeKind::Logical);
        assert_eq!(both.to_string(), "(((1 + 2) < 3) and B)");
        assert_eq!(both.data_type(), DataType::boolean());
    }

    #[test]
    fn wrong_category_is_structural() {
        let err = Expression::logical(Op::Add, flag("a"), flag("b")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::OperatorCategory { .. }));
        assert_eq!(err.category(), crate::errors::ErrorCategory::Structural);
    }

    #[test]
    fn logical_operands_must_be_logical() {
        let err = Expression::logical(Op::And, number(1.0), flag("b")).unwrap_err();
        match err.kind {
            ErrorKind::InvalidChild { position, .. } => assert_eq!(position, 0),
            other => panic!("unexpected {:?}", other),
        }
        assert!(Expression::not(number(1.0)).is_err());
        assert!(Expression::not(flag("a")).is_ok());
    }

    #[test]
    fn selections_are_not_values() {
        let selection = Expression::Selection(SelectionExpression::new(vec![], Span::default()));
        assert!(Expression::compare(Op::Eq, selection, number(1.0)).is_err());
    }

    #[test]
    fn parentheses_lift_priority() {
        let sum = Expression::binary(Op::Add, number(1.0), number(2.0)).unwrap();
        assert_eq!(sum.priority(), Op::Add.priority());
        assert_eq!(sum.parenthesize().priority(), PRIORITY_PARENTHESIZED);
    }

    #[test]
    fn call_checks_arity() {
        let upper = FunctionDef::new("UPPER", vec![DataType::text()], DataType::text());
        let err = Expression::call(&upper, vec![], Span::default()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ArgumentCount { expected: 1, actual: 0, .. }));
        let ok = Expression::call(&upper, vec![number(1.0)], Span::default()).unwrap();
        assert_eq!(ok.data_type(), DataType::text());
    }
}
