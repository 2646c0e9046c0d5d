//! Priority folding of flat operator chains.
//!
//! The parser hands over `operand (op operand)*` without grouping. Folding
//! first computes a [`Shape`] over operand positions, then builds the
//! expression through the smart constructors:
//!
//! - keep a running tree; for each `op operand`, when the running tree's
//!   priority is at least `op`'s, it becomes the left operand of a new node;
//!   otherwise the pair is grafted into the running tree's right operand;
//! - operands (including parenthesized groups) have maximum priority and are
//!   never split;
//! - `not` prefixes are applied afterwards, at their source position, to the
//!   largest sub-tree starting at that operand that binds tighter than `not`.

use std::fmt;

use crate::catalog::{Op, PRIORITY_NOT, PRIORITY_PARENTHESIZED};
use crate::errors::{ErrorKind, SelError};
use crate::xpt::Expression;

/// Tree of operand positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Leaf(usize),
    Binary {
        op: Op,
        left: Box<Shape>,
        right: Box<Shape>,
    },
    Not(Box<Shape>),
}

impl Shape {
    /// Folds `ops.len() + 1` operands; `negations[i]` counts the `not`s in
    /// front of operand `i`.
    pub fn build(ops: &[Op], negations: &[usize]) -> Shape {
        let mut running = Shape::Leaf(0);
        for (index, op) in ops.iter().enumerate() {
            running = running.graft(*op, index + 1);
        }
        for (position, count) in negations.iter().enumerate() {
            if *count > 0 {
                running = running.negate(position, *count);
            }
        }
        running
    }

    pub fn priority(&self) -> u8 {
        match self {
            Shape::Leaf(_) => PRIORITY_PARENTHESIZED,
            Shape::Binary { op, .. } => op.priority(),
            Shape::Not(_) => PRIORITY_NOT,
        }
    }

    fn first_leaf(&self) -> usize {
        match self {
            Shape::Leaf(index) => *index,
            Shape::Binary { left, .. } => left.first_leaf(),
            Shape::Not(inner) => inner.first_leaf(),
        }
    }

    fn last_leaf(&self) -> usize {
        match self {
            Shape::Leaf(index) => *index,
            Shape::Binary { right, .. } => right.last_leaf(),
            Shape::Not(inner) => inner.last_leaf(),
        }
    }

    fn graft(self, op: Op, leaf: usize) -> Shape {
        if self.priority() >= op.priority() {
            return Shape::Binary {
                op,
                left: Box::new(self),
                right: Box::new(Shape::Leaf(leaf)),
            };
        }
        match self {
            Shape::Binary {
                op: top,
                left,
                right,
            } => Shape::Binary {
                op: top,
                left,
                right: Box::new(right.graft(op, leaf)),
            },
            other => Shape::Binary {
                op,
                left: Box::new(other),
                right: Box::new(Shape::Leaf(leaf)),
            },
        }
    }

    fn negate(self, position: usize, count: usize) -> Shape {
        if self.first_leaf() == position && self.priority() > PRIORITY_NOT {
            return (0..count).fold(self, |inner, _| Shape::Not(Box::new(inner)));
        }
        match self {
            Shape::Binary { op, left, right } => {
                if position <= left.last_leaf() {
                    Shape::Binary {
                        op,
                        left: Box::new(left.negate(position, count)),
                        right,
                    }
                } else {
                    Shape::Binary {
                        op,
                        left,
                        right: Box::new(right.negate(position, count)),
                    }
                }
            }
            Shape::Not(inner) => Shape::Not(Box::new(inner.negate(position, count))),
            leaf => (0..count).fold(leaf, |inner, _| Shape::Not(Box::new(inner))),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Leaf(index) => write!(f, "{}", index),
            Shape::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Shape::Not(inner) => write!(f, "(not {})", inner),
        }
    }
}

/// One operand of a chain: a built expression and the `not`s written before it.
#[derive(Debug, Clone)]
pub struct FoldOperand {
    pub expression: Expression,
    pub negations: usize,
}

impl FoldOperand {
    pub fn new(expression: Expression, negations: usize) -> Self {
        Self {
            expression,
            negations,
        }
    }
}

/// Folds a chain into one expression. `ops.len()` must be one less than
/// `operands.len()`.
pub fn fold(operands: Vec<FoldOperand>, ops: &[Op]) -> Result<Expression, SelError> {
    if operands.len() != ops.len() + 1 {
        return Err(SelError::structural(ErrorKind::InvalidChild {
            parent: "operator chain".into(),
            position: operands.len(),
            expected: format!("{} operands", ops.len() + 1),
            found: format!("{} operands", operands.len()),
        }));
    }
    let negations: Vec<usize> = operands.iter().map(|o| o.negations).collect();
    let shape = Shape::build(ops, &negations);
    let mut slots: Vec<Option<Expression>> =
        operands.into_iter().map(|o| Some(o.expression)).collect();
    assemble(&shape, &mut slots)
}

fn assemble(shape: &Shape, slots: &mut [Option<Expression>]) -> Result<Expression, SelError> {
    match shape {
        Shape::Leaf(index) => slots
            .get_mut(*index)
            .and_then(Option::take)
            .ok_or_else(|| {
                SelError::structural(ErrorKind::InvalidChild {
                    parent: "operator chain".into(),
                    position: *index,
                    expected: "operand".into(),
                    found: "nothing".into(),
                })
            }),
        Shape::Binary { op, left, right } => {
            let left = assemble(left, slots)?;
            let right = assemble(right, slots)?;
            Expression::binary(*op, left, right)
        }
        Shape::Not(inner) => Expression::not(assemble(inner, slots)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Span;
    use crate::types::Value;
    use crate::xpt::Literal;

    fn shape(ops: &[Op]) -> String {
        Shape::build(ops, &[]).to_string()
    }

    #[test]
    fn tighter_operators_group_right() {
        assert_eq!(shape(&[Op::Add, Op::Mul]), "(0 + (1 * 2))");
        assert_eq!(shape(&[Op::Mul, Op::Add]), "((0 * 1) + 2)");
    }

    #[test]
    fn equal_priorities_associate_left() {
        assert_eq!(shape(&[Op::Sub, Op::Sub]), "((0 - 1) - 2)");
        assert_eq!(shape(&[Op::And, Op::And, Op::And]), "(((0 and 1) and 2) and 3)");
    }

    #[test]
    fn mixed_chain() {
        assert_eq!(
            shape(&[Op::Or, Op::And, Op::Eq]),
            "(0 or (1 and (2 = 3)))"
        );
        assert_eq!(
            shape(&[Op::Eq, Op::And, Op::Gt, Op::Or, Op::Lt]),
            "(((0 = 1) and (2 > 3)) or (4 < 5))"
        );
    }

    #[test]
    fn not_binds_to_the_comparison_that_starts_at_it() {
        let shape = Shape::build(&[Op::Eq, Op::And, Op::Eq], &[1, 0, 0, 0]);
        assert_eq!(shape.to_string(), "((not (0 = 1)) and (2 = 3))");

        let shape = Shape::build(&[Op::And], &[1, 0]);
        assert_eq!(shape.to_string(), "((not 0) and 1)");

        let shape = Shape::build(&[Op::Or, Op::Eq], &[0, 2, 0]);
        assert_eq!(shape.to_string(), "(0 or (not (not (1 = 2))))");
    }

    #[test]
    fn not_inside_a_comparison_stays_on_its_operand() {
        let shape = Shape::build(&[Op::Eq], &[0, 1]);
        assert_eq!(shape.to_string(), "(0 = (not 1))");
    }

    #[test]
    fn fold_builds_expressions() {
        let n = |v: f64| FoldOperand::new(Expression::Literal(Literal::infer(Value::Number(v), Span::default())), 0);
        let expr = fold(vec![n(1.0), n(2.0), n(3.0)], &[Op::Add, Op::Mul]).unwrap();
        assert_eq!(expr.to_string(), "(1 + (2 * 3))");

        let grouped = fold(vec![n(1.0), n(2.0)], &[Op::Add]).unwrap().parenthesize();
        let expr = fold(
            vec![FoldOperand::new(grouped, 0), n(3.0)],
            &[Op::Mul],
        )
        .unwrap();
        assert_eq!(expr.to_string(), "((1 + 2) * 3)");
    }

    #[test]
    fn fold_rejects_mismatched_chains() {
        let err = fold(Vec::new(), &[Op::Add]).unwrap_err();
        assert_eq!(err.category(), crate::errors::ErrorCategory::Structural);
    }
}
