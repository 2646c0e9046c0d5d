//! Property-based tests for names and operator folding.

use proptest::prelude::*;
use selrule::catalog::Op;
use selrule::syntax::Span;
use selrule::xpt::{fold, Expression, FoldOperand, Literal};
use selrule::{CanonicalName, Value};

// ===== Strategies =====

fn arb_segment() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_]{0,6}"
}

fn arb_segments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_segment(), 1..5)
}

fn arb_arithmetic_chain() -> impl Strategy<Value = (Vec<u32>, Vec<Op>)> {
    prop::collection::vec(0u32..20, 1..8).prop_flat_map(|values| {
        let ops = prop::collection::vec(prop_oneof![Just(Op::Add), Just(Op::Mul)], values.len() - 1);
        (Just(values), ops)
    })
}

fn arb_arithmetic_op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Add), Just(Op::Mul)]
}

fn arb_logical_ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(prop_oneof![Just(Op::And), Just(Op::Or)], 1..8)
}

// ===== Helpers =====

fn number(n: u32) -> FoldOperand {
    FoldOperand::new(
        Expression::Literal(Literal::infer(Value::Number(f64::from(n)), Span::default())),
        0,
    )
}

fn truth(b: bool) -> FoldOperand {
    FoldOperand::new(
        Expression::Literal(Literal::infer(Value::Boolean(b), Span::default())),
        0,
    )
}

fn evaluate(expression: &Expression) -> f64 {
    match expression {
        Expression::Literal(literal) => literal.value().as_number().unwrap(),
        Expression::Operation(b) => match b.op {
            Op::Add => evaluate(&b.left) + evaluate(&b.right),
            Op::Mul => evaluate(&b.left) * evaluate(&b.right),
            other => panic!("unexpected operator {}", other),
        },
        other => panic!("unexpected node {}", other),
    }
}

fn apply(op: Op, left: f64, right: f64) -> f64 {
    match op {
        Op::Mul => left * right,
        _ => left + right,
    }
}

/// `op` at the top, with a parenthesized binary node on the given side.
fn grouped_side(expression: &Expression, op: Op, left_side: bool) -> Option<Op> {
    let Expression::Operation(top) = expression else {
        return None;
    };
    if top.op != op || top.parenthesized {
        return None;
    }
    let (group, other) = if left_side {
        (top.left.as_ref(), top.right.as_ref())
    } else {
        (top.right.as_ref(), top.left.as_ref())
    };
    match (group, other) {
        (Expression::Operation(inner), Expression::Literal(_)) if inner.parenthesized => Some(inner.op),
        _ => None,
    }
}

/// Sum of products, the usual reading of `+` and `*`.
fn reference(values: &[u32], ops: &[Op]) -> f64 {
    let mut sum = 0.0;
    let mut product = f64::from(values[0]);
    for (op, value) in ops.iter().zip(&values[1..]) {
        match op {
            Op::Mul => product *= f64::from(*value),
            _ => {
                sum += product;
                product = f64::from(*value);
            }
        }
    }
    sum + product
}

// ===== Properties =====

proptest! {
    #[test]
    fn names_ignore_case(segments in arb_segments()) {
        let dotted = segments.join(".");
        prop_assert_eq!(
            CanonicalName::new(&dotted.to_lowercase()),
            CanonicalName::new(&dotted.to_uppercase())
        );
        prop_assert_eq!(CanonicalName::new(&dotted).len(), segments.len());
        prop_assert!(CanonicalName::new(&dotted).is_well_formed());
    }

    #[test]
    fn push_and_pop_are_inverse(segments in arb_segments(), id in arb_segment()) {
        let name = CanonicalName::new(&segments.join("."));
        let (module, popped) = name.push(&id).pop_id();
        prop_assert_eq!(module, name);
        prop_assert_eq!(popped, Some(id.to_uppercase()));
    }

    #[test]
    fn reduce_undoes_join(prefix in arb_segments(), tail in arb_segments()) {
        let prefix = CanonicalName::new(&prefix.join("."));
        let tail = CanonicalName::new(&tail.join("."));
        let joined = prefix.join(&tail);
        prop_assert!(joined.starts_with(&prefix));
        prop_assert_eq!(joined.reduce(&prefix), Some(tail));
    }

    #[test]
    fn reduce_respects_segment_boundaries(segments in arb_segments(), extra in "[a-z0-9]{1,3}") {
        let name = CanonicalName::new(&segments.join("."));
        let longer = CanonicalName::new(&format!("{}{}", segments.join("."), extra));
        prop_assert_eq!(longer.reduce(&name), None);
        prop_assert!(!longer.starts_with(&name));
    }

    #[test]
    fn folding_follows_arithmetic_precedence((values, ops) in arb_arithmetic_chain()) {
        let operands = values.iter().copied().map(number).collect();
        let folded = fold(operands, &ops).unwrap();
        prop_assert_eq!(evaluate(&folded), reference(&values, &ops));
    }

    #[test]
    fn left_groups_are_never_regrouped(a in 0u32..20, b in 0u32..20, c in 0u32..20, inner in arb_arithmetic_op(), outer in arb_arithmetic_op()) {
        let group = fold(vec![number(a), number(b)], &[inner]).unwrap().parenthesize();
        let folded = fold(vec![FoldOperand::new(group, 0), number(c)], &[outer]).unwrap();
        prop_assert_eq!(grouped_side(&folded, outer, true), Some(inner));
        let expected = apply(outer, apply(inner, f64::from(a), f64::from(b)), f64::from(c));
        prop_assert_eq!(evaluate(&folded), expected);
    }

    #[test]
    fn right_groups_are_never_regrouped(a in 0u32..20, b in 0u32..20, c in 0u32..20, outer in arb_arithmetic_op(), inner in arb_arithmetic_op()) {
        let group = fold(vec![number(b), number(c)], &[inner]).unwrap().parenthesize();
        let folded = fold(vec![number(a), FoldOperand::new(group, 0)], &[outer]).unwrap();
        prop_assert_eq!(grouped_side(&folded, outer, false), Some(inner));
        let expected = apply(outer, f64::from(a), apply(inner, f64::from(b), f64::from(c)));
        prop_assert_eq!(evaluate(&folded), expected);
    }

    #[test]
    fn disjunction_binds_loosest(ops in arb_logical_ops()) {
        let operands = (0..=ops.len()).map(|i| truth(i % 2 == 0)).collect();
        let folded = fold(operands, &ops).unwrap();
        let top = match &folded {
            Expression::Logical(b) => b.op,
            other => panic!("expected a logical node, got {}", other),
        };
        if ops.contains(&Op::Or) {
            prop_assert_eq!(top, Op::Or);
        } else {
            prop_assert_eq!(top, Op::And);
        }
    }
}
