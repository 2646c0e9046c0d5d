//! Operator and function catalogs.
//!
//! Both are ordinary declarations: the engine stores them in the global scope
//! repository at start-up and the generator resolves them through the scope
//! tree like any other name.

use serde::Serialize;
use std::fmt;

use crate::names::CanonicalName;
use crate::repository::Repository;
use crate::signature::{Signature, Signed};
use crate::types::DataType;

/// Priority given to parenthesized groups so folding never regroups them.
pub const PRIORITY_PARENTHESIZED: u8 = u8::MAX;
/// `NOT` binds looser than comparisons and tighter than `AND`.
pub const PRIORITY_NOT: u8 = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum OperatorCategory {
    Logical,
    Compare,
    Arithmetic,
}

impl fmt::Display for OperatorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorCategory::Logical => write!(f, "logical"),
            OperatorCategory::Compare => write!(f, "comparison"),
            OperatorCategory::Arithmetic => write!(f, "arithmetic"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Op {
    Or,
    And,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Op {
    pub const ALL: [Op; 14] = [
        Op::Or,
        Op::And,
        Op::Not,
        Op::Eq,
        Op::Ne,
        Op::Lt,
        Op::Le,
        Op::Gt,
        Op::Ge,
        Op::Add,
        Op::Sub,
        Op::Mul,
        Op::Div,
        Op::Mod,
    ];

    /// Maps a source token to its operator. The `,` of selection conditions
    /// is a conjunction.
    pub fn from_token(token: &str) -> Option<Op> {
        let op = match token.trim().to_uppercase().as_str() {
            "OR" | "||" => Op::Or,
            "AND" | "&&" | "," => Op::And,
            "NOT" | "!" => Op::Not,
            "=" | "==" => Op::Eq,
            "<>" | "!=" => Op::Ne,
            "<" => Op::Lt,
            "<=" => Op::Le,
            ">" => Op::Gt,
            ">=" => Op::Ge,
            "+" => Op::Add,
            "-" => Op::Sub,
            "*" => Op::Mul,
            "/" => Op::Div,
            "%" => Op::Mod,
            _ => return None,
        };
        Some(op)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Op::Or => "OR",
            Op::And => "AND",
            Op::Not => "NOT",
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::Lt => "LT",
            Op::Le => "LE",
            Op::Gt => "GT",
            Op::Ge => "GE",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Mod => "MOD",
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Op::Or => "or",
            Op::And => "and",
            Op::Not => "not",
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
        }
    }

    pub const fn category(self) -> OperatorCategory {
        match self {
            Op::Or | Op::And | Op::Not => OperatorCategory::Logical,
            Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => OperatorCategory::Compare,
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod => OperatorCategory::Arithmetic,
        }
    }

    pub const fn priority(self) -> u8 {
        match self {
            Op::Or => 10,
            Op::And => 20,
            Op::Not => PRIORITY_NOT,
            Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => 30,
            Op::Add | Op::Sub => 40,
            Op::Mul | Op::Div | Op::Mod => 50,
        }
    }

    pub const fn arity(self) -> usize {
        match self {
            Op::Not => 1,
            _ => 2,
        }
    }

    /// Members of the logical AND family.
    pub const fn is_conjunctive(self) -> bool {
        matches!(self, Op::And)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// An operator declaration as stored in a repository.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Operator {
    op: Op,
    name: CanonicalName,
}

impl Operator {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            name: CanonicalName::new(op.name()),
        }
    }

    pub fn op(&self) -> Op {
        self.op
    }
}

impl Signed for Operator {
    fn signature(&self) -> Signature {
        Signature::structured("OPERATOR", false, &[Signature::from(&self.name)])
    }

    fn name(&self) -> &CanonicalName {
        &self.name
    }
}

pub fn builtin_operators() -> Vec<Operator> {
    Op::ALL.iter().copied().map(Operator::new).collect()
}

/// A function declaration: parameter types and a return type. Bodies belong
/// to whichever data engine executes the generated code.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionDef {
    name: CanonicalName,
    parameters: Vec<DataType>,
    returns: DataType,
}

impl FunctionDef {
    pub fn new(name: &str, parameters: Vec<DataType>, returns: DataType) -> Self {
        Self {
            name: CanonicalName::new(name),
            parameters,
            returns,
        }
    }

    pub fn parameters(&self) -> &[DataType] {
        &self.parameters
    }

    pub fn returns(&self) -> &DataType {
        &self.returns
    }
}

impl Signed for FunctionDef {
    fn signature(&self) -> Signature {
        let params: Vec<_> = self.parameters.iter().map(Signed::signature).collect();
        Signature::structured(self.name.full_id(), false, &params)
    }

    fn name(&self) -> &CanonicalName {
        &self.name
    }
}

pub fn builtin_functions() -> Vec<FunctionDef> {
    vec![
        FunctionDef::new("UPPER", vec![DataType::text()], DataType::text()),
        FunctionDef::new("LOWER", vec![DataType::text()], DataType::text()),
        FunctionDef::new("LENGTH", vec![DataType::text()], DataType::integer()),
        FunctionDef::new("ABS", vec![DataType::number()], DataType::number()),
        FunctionDef::new(
            "COALESCE",
            vec![DataType::any(), DataType::any()],
            DataType::any(),
        ),
        FunctionDef::new("TODAY", vec![], DataType::date()),
    ]
}

/// Declares the built-in types, operators and functions in `repository`.
pub fn install(repository: &Repository) {
    for data_type in DataType::builtins() {
        repository.add_as(data_type);
    }
    for operator in builtin_operators() {
        repository.add_as(operator);
    }
    for function in builtin_functions() {
        repository.add_as(function);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_map_to_operators() {
        assert_eq!(Op::from_token("and"), Some(Op::And));
        assert_eq!(Op::from_token(","), Some(Op::And));
        assert_eq!(Op::from_token("||"), Some(Op::Or));
        assert_eq!(Op::from_token("<>"), Some(Op::Ne));
        assert_eq!(Op::from_token("^"), None);
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(Op::Or.priority() < Op::And.priority());
        assert!(Op::And.priority() < PRIORITY_NOT);
        assert!(PRIORITY_NOT < Op::Eq.priority());
        assert!(Op::Eq.priority() < Op::Add.priority());
        assert!(Op::Add.priority() < Op::Mul.priority());
        assert!(Op::Mul.priority() < PRIORITY_PARENTHESIZED);
    }

    #[test]
    fn catalog_signatures_are_distinct() {
        let mut sigs: Vec<_> = builtin_operators().iter().map(Signed::signature).collect();
        sigs.extend(builtin_functions().iter().map(Signed::signature));
        let count = sigs.len();
        sigs.sort();
        sigs.dedup();
        assert_eq!(sigs.len(), count);
        assert_eq!(
            FunctionDef::new("upper", vec![DataType::text()], DataType::text())
                .signature()
                .uid(),
            "UPPER<TEXT>"
        );
    }
}
