//! Tree-walking evaluation of expressions and statements against a
//! [`Context`], used by the code the in-memory engine generates.

use chrono::Local;
use std::cmp::Ordering;

use crate::catalog::Op;
use crate::context::Context;
use crate::errors::{ErrorKind, SelError};
use crate::repository::Record;
use crate::types::Value;
use crate::xpt::{Binary, Expression, SelectionExpression, Statement, StatementBlock};

fn failure(message: impl Into<String>) -> SelError {
    SelError::runtime(ErrorKind::Evaluation {
        message: message.into(),
    })
}

/// Where evaluation reads names from: the context heap, plus the record
/// under test while a condition is evaluated.
#[derive(Clone, Copy)]
pub(crate) struct Frame<'a> {
    pub context: &'a Context,
    pub record: Option<&'a Record>,
}

impl<'a> Frame<'a> {
    pub fn new(context: &'a Context) -> Self {
        Self {
            context,
            record: None,
        }
    }

    pub fn with_record(self, record: &'a Record) -> Self {
        Self {
            record: Some(record),
            ..self
        }
    }
}

/// `NULL` counts as false; any other non-boolean is an error.
pub(crate) fn truth(value: &Value) -> Result<bool, SelError> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(failure(format!("expected a truth value, got {}", other.type_name()))),
    }
}

pub(crate) fn evaluate(expression: &Expression, frame: Frame<'_>) -> Result<Value, SelError> {
    match expression {
        Expression::Literal(literal) => Ok(literal.value().clone()),
        Expression::Variable(variable) => frame
            .context
            .get(variable.name().full_id())
            .cloned()
            .ok_or_else(|| failure(format!("'{}' is not bound", variable.name()))),
        Expression::Entry(entry) => {
            let record = frame
                .record
                .ok_or_else(|| failure(format!("entry '{}' used outside a condition", entry)))?;
            Ok(record.get(entry.entry()).cloned().unwrap_or(Value::Null))
        }
        Expression::Logical(b) => logical(b, frame),
        Expression::Compare(b) => {
            let left = evaluate(&b.left, frame)?;
            let right = evaluate(&b.right, frame)?;
            Ok(Value::Boolean(compare(b.op, &left, &right)))
        }
        Expression::Operation(b) => {
            let left = evaluate(&b.left, frame)?;
            let right = evaluate(&b.right, frame)?;
            arithmetic(b.op, left, right)
        }
        Expression::Not(n) => Ok(Value::Boolean(!truth(&evaluate(&n.operand, frame)?)?)),
        Expression::Call(call) => {
            let args = call
                .args
                .iter()
                .map(|arg| evaluate(arg, frame))
                .collect::<Result<Vec<_>, _>>()?;
            apply(call.function.full_id(), args)
        }
        Expression::DataObject(_) | Expression::Selection(_) => {
            Err(failure(format!("'{}' is not a single value", expression)))
        }
    }
}

fn logical(b: &Binary, frame: Frame<'_>) -> Result<Value, SelError> {
    let left = truth(&evaluate(&b.left, frame)?)?;
    let result = match b.op {
        Op::And => left && truth(&evaluate(&b.right, frame)?)?,
        Op::Or => left || truth(&evaluate(&b.right, frame)?)?,
        other => return Err(failure(format!("'{}' is not a logical operator", other))),
    };
    Ok(Value::Boolean(result))
}

fn compare(op: Op, left: &Value, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        let both = left.is_null() && right.is_null();
        return match op {
            Op::Eq => both,
            Op::Ne => !both,
            _ => false,
        };
    }
    match left.compare(right) {
        Some(ordering) => match op {
            Op::Eq => ordering == Ordering::Equal,
            Op::Ne => ordering != Ordering::Equal,
            Op::Lt => ordering == Ordering::Less,
            Op::Le => ordering != Ordering::Greater,
            Op::Gt => ordering == Ordering::Greater,
            Op::Ge => ordering != Ordering::Less,
            _ => false,
        },
        None => op == Op::Ne,
    }
}

fn arithmetic(op: Op, left: Value, right: Value) -> Result<Value, SelError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if op == Op::Add && (left.as_text().is_some() || right.as_text().is_some()) {
        return Ok(Value::Text(format!("{}{}", left, right)));
    }
    let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
        return Err(failure(format!(
            "cannot apply '{}' to {} and {}",
            op,
            left.type_name(),
            right.type_name()
        )));
    };
    let value = match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div | Op::Mod if b == 0.0 => return Err(failure("division by zero")),
        Op::Div => a / b,
        Op::Mod => a % b,
        other => return Err(failure(format!("'{}' is not an arithmetic operator", other))),
    };
    Ok(Value::Number(value))
}

/// Built-in function bodies.
fn apply(function: &str, args: Vec<Value>) -> Result<Value, SelError> {
    let mut args = args.into_iter();
    let mut next = || args.next().unwrap_or(Value::Null);
    match function {
        "UPPER" => Ok(match next() {
            Value::Text(t) => Value::Text(t.to_uppercase()),
            other => other,
        }),
        "LOWER" => Ok(match next() {
            Value::Text(t) => Value::Text(t.to_lowercase()),
            other => other,
        }),
        "LENGTH" => Ok(match next() {
            Value::Text(t) => Value::Number(t.chars().count() as f64),
            Value::List(items) => Value::Number(items.len() as f64),
            _ => Value::Null,
        }),
        "ABS" => Ok(match next() {
            Value::Number(n) => Value::Number(n.abs()),
            _ => Value::Null,
        }),
        "COALESCE" => {
            let first = next();
            Ok(if first.is_null() { next() } else { first })
        }
        "TODAY" => Ok(Value::Date(Local::now().date_naive())),
        other => Err(failure(format!("no implementation for function '{}'", other))),
    }
}

// ============================================================================
// STATEMENTS
// ============================================================================

/// Outcome of running a statement: carry on, or the selection a `return`
/// produced.
pub(crate) enum Flow<'r> {
    Next,
    Return(&'r SelectionExpression),
}

/// Runs `block` in its own frame. A `return` keeps the frame open: the
/// returned selection is evaluated against the bindings visible there.
pub(crate) fn run_block<'r>(block: &'r StatementBlock, context: &mut Context) -> Result<Flow<'r>, SelError> {
    context.enter();
    for statement in &block.statements {
        if let Flow::Return(selection) = run_statement(statement, context)? {
            return Ok(Flow::Return(selection));
        }
    }
    context.leave();
    Ok(Flow::Next)
}

fn run_statement<'r>(statement: &'r Statement, context: &mut Context) -> Result<Flow<'r>, SelError> {
    match statement {
        Statement::Declare(s) => {
            let value = match &s.init {
                Some(init) => evaluate(init, Frame::new(context))?,
                None => Value::Null,
            };
            let value = s.variable.data_type().convert(value)?;
            context.declare(s.variable.name().full_id(), value);
            Ok(Flow::Next)
        }
        Statement::Assignment(s) => {
            let value = evaluate(&s.value, Frame::new(context))?;
            let value = s.target.data_type().convert(value)?;
            context.bind(s.target.name().full_id(), value);
            Ok(Flow::Next)
        }
        Statement::IfThenElse(s) => {
            if truth(&evaluate(&s.condition, Frame::new(context))?)? {
                run_statement(&s.then_branch, context)
            } else if let Some(else_branch) = &s.else_branch {
                run_statement(else_branch, context)
            } else {
                Ok(Flow::Next)
            }
        }
        Statement::Return(s) => Ok(Flow::Return(&s.selection)),
        Statement::Block(block) => run_block(block, context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::CanonicalName;
    use crate::repository::SymbolKind;
    use crate::syntax::Span;
    use crate::types::DataType;
    use crate::xpt::{Literal, VariableRef};

    fn number(n: f64) -> Expression {
        Expression::Literal(Literal::infer(Value::Number(n), Span::default()))
    }

    fn variable(name: &str) -> Expression {
        Expression::Variable(VariableRef::new(
            CanonicalName::new(name),
            DataType::number(),
            SymbolKind::Parameter,
            Span::default(),
        ))
    }

    #[test]
    fn arithmetic_and_comparison() {
        let mut context = Context::default();
        context.add("p", Value::Number(4.0));
        let sum = Expression::binary(Op::Add, variable("p"), number(2.0)).unwrap();
        let cmp = Expression::binary(Op::Gt, sum.clone(), number(5.0)).unwrap();
        assert_eq!(evaluate(&sum, Frame::new(&context)).unwrap(), Value::Number(6.0));
        assert_eq!(evaluate(&cmp, Frame::new(&context)).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn nulls_propagate_and_compare_equal_to_null_only() {
        assert_eq!(arithmetic(Op::Mul, Value::Null, Value::Number(1.0)).unwrap(), Value::Null);
        assert!(compare(Op::Eq, &Value::Null, &Value::Null));
        assert!(!compare(Op::Eq, &Value::Null, &Value::Number(1.0)));
        assert!(compare(Op::Ne, &Value::Null, &Value::Number(1.0)));
        assert!(!compare(Op::Lt, &Value::Null, &Value::Number(1.0)));
    }

    #[test]
    fn division_by_zero_fails() {
        let err = arithmetic(Op::Div, Value::Number(1.0), Value::Number(0.0)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Evaluation { .. }));
    }

    #[test]
    fn unbound_variables_fail() {
        let context = Context::default();
        assert!(evaluate(&variable("missing"), Frame::new(&context)).is_err());
    }

    #[test]
    fn builtin_functions() {
        assert_eq!(apply("UPPER", vec![Value::Text("ab".into())]).unwrap(), Value::Text("AB".into()));
        assert_eq!(apply("LENGTH", vec![Value::Text("abc".into())]).unwrap(), Value::Number(3.0));
        assert_eq!(
            apply("COALESCE", vec![Value::Null, Value::Number(2.0)]).unwrap(),
            Value::Number(2.0)
        );
        assert!(matches!(apply("TODAY", vec![]).unwrap(), Value::Date(_)));
    }
}
