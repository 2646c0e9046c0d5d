use serde::Serialize;
use std::sync::Arc;

use crate::catalog::Op;
use crate::errors::{Message, SelError};
use crate::names::CanonicalName;
use crate::repository::SymbolKind;
use crate::types::DataType;
use crate::xpt::{
    Expression, Literal, Meta, NodeKind, ResultObject, SelectionExpression, Statement,
    StatementBlock, VariableRef,
};

#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: CanonicalName,
    pub data_type: DataType,
    pub default: Option<Expression>,
    pub meta: Meta,
}

impl Parameter {
    pub fn variable(&self) -> VariableRef {
        VariableRef::new(
            self.name.clone(),
            self.data_type.clone(),
            SymbolKind::Parameter,
            self.meta.span,
        )
    }
}

/// A named rule: parameters, the declared result shape, and a body.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionRule {
    name: CanonicalName,
    parameters: Vec<Parameter>,
    header: SelectionExpression,
    body: StatementBlock,
    pub meta: Meta,
}

impl SelectionRule {
    /// Builds the rule. Every parameter default becomes
    /// `if P = NULL then P := default` at the top of the body, in parameter order.
    pub fn new(
        name: CanonicalName,
        parameters: Vec<Parameter>,
        header: SelectionExpression,
        body: StatementBlock,
        meta: Meta,
    ) -> Result<Self, SelError> {
        let mut prologue = Vec::new();
        for parameter in &parameters {
            let Some(default) = &parameter.default else {
                continue;
            };
            let span = parameter.meta.span;
            let is_null = Expression::compare(
                Op::Eq,
                Expression::Variable(parameter.variable()),
                Expression::Literal(Literal::null(span)),
            )?;
            let assign = Statement::assignment(parameter.variable(), default.clone(), Meta::new(span))?;
            prologue.push(Statement::if_then_else(is_null, assign, None, Meta::new(span))?);
        }

        let body = if prologue.is_empty() {
            body
        } else {
            let StatementBlock {
                id,
                statements,
                meta,
                ..
            } = body;
            prologue.extend(statements);
            StatementBlock::new(id, prologue, meta)
        };

        Ok(Self {
            name,
            parameters,
            header,
            body,
            meta,
        })
    }

    /// Full name, module included.
    pub fn name(&self) -> &CanonicalName {
        &self.name
    }

    pub fn id(&self) -> &str {
        self.name.id()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub fn header(&self) -> &SelectionExpression {
        &self.header
    }

    pub fn body(&self) -> &StatementBlock {
        &self.body
    }

    /// What the rule returns: the shape of the body's return.
    pub fn result(&self) -> Option<&DataType> {
        self.body.result()
    }
}

/// Everything built from one source text.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Unit {
    pub source: String,
    pub rules: Vec<Arc<SelectionRule>>,
    pub meta: Meta,
}

impl Unit {
    /// Every message in the tree, in source order.
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        walk(NodeRef::Unit(self), &mut |node, _parent| {
            messages.extend(node.messages().iter().cloned());
        });
        messages.sort_by(|a, b| (a.line, a.column).cmp(&(b.line, b.column)));
        messages
    }

    pub fn has_errors(&self) -> bool {
        self.messages().iter().any(Message::is_error)
    }

    pub fn rule(&self, id: &str) -> Option<&Arc<SelectionRule>> {
        self.rules.iter().find(|r| r.id().eq_ignore_ascii_case(id))
    }
}

// ============================================================================
// TRAVERSAL
// ============================================================================

/// A borrowed view of any node, for generic traversal.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Unit(&'a Unit),
    Rule(&'a SelectionRule),
    Parameter(&'a Parameter),
    Block(&'a StatementBlock),
    Statement(&'a Statement),
    Expression(&'a Expression),
    ResultObject(&'a ResultObject),
}

impl<'a> NodeRef<'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRef::Unit(_) => NodeKind::Unit,
            NodeRef::Rule(_) => NodeKind::SelectionRule,
            NodeRef::Parameter(_) => NodeKind::Parameter,
            NodeRef::Block(_) => NodeKind::StatementBlock,
            NodeRef::Statement(s) => s.kind(),
            NodeRef::Expression(e) => e.kind(),
            NodeRef::ResultObject(_) => NodeKind::ResultObject,
        }
    }

    pub fn messages(&self) -> &'a [Message] {
        match self {
            NodeRef::Unit(u) => &u.meta.messages,
            NodeRef::Rule(r) => &r.meta.messages,
            NodeRef::Parameter(p) => &p.meta.messages,
            NodeRef::Block(b) => &b.meta.messages,
            NodeRef::Statement(s) => &s.meta().messages,
            NodeRef::Expression(_) | NodeRef::ResultObject(_) => &[],
        }
    }

    pub fn children(&self) -> Vec<NodeRef<'a>> {
        match *self {
            NodeRef::Unit(unit) => unit.rules.iter().map(|r| NodeRef::Rule(r)).collect(),
            NodeRef::Rule(rule) => rule
                .parameters
                .iter()
                .map(NodeRef::Parameter)
                .chain(rule.header.objects.iter().map(NodeRef::ResultObject))
                .chain(std::iter::once(NodeRef::Block(&rule.body)))
                .collect(),
            NodeRef::Parameter(parameter) => parameter.default.iter().map(NodeRef::Expression).collect(),
            NodeRef::Block(block) => block.statements.iter().map(NodeRef::Statement).collect(),
            NodeRef::Statement(statement) => match statement {
                Statement::Assignment(s) => vec![NodeRef::Expression(&s.value)],
                Statement::Declare(s) => s.init.iter().map(NodeRef::Expression).collect(),
                Statement::IfThenElse(s) => {
                    let mut children = vec![
                        NodeRef::Expression(&s.condition),
                        NodeRef::Statement(&s.then_branch),
                    ];
                    if let Some(else_branch) = &s.else_branch {
                        children.push(NodeRef::Statement(else_branch));
                    }
                    children
                }
                Statement::Return(s) => s.selection.objects.iter().map(NodeRef::ResultObject).collect(),
                Statement::Block(block) => block.statements.iter().map(NodeRef::Statement).collect(),
            },
            NodeRef::Expression(Expression::Selection(selection)) => {
                selection.objects.iter().map(NodeRef::ResultObject).collect()
            }
            NodeRef::Expression(expression) => {
                expression.children().into_iter().map(NodeRef::Expression).collect()
            }
            NodeRef::ResultObject(object) => object.condition.iter().map(NodeRef::Expression).collect(),
        }
    }
}

/// Pre-order walk; the callback receives each node with its parent.
pub fn walk<'a, F>(root: NodeRef<'a>, f: &mut F)
where
    F: FnMut(NodeRef<'a>, Option<NodeRef<'a>>),
{
    fn visit<'a, F>(node: NodeRef<'a>, parent: Option<NodeRef<'a>>, f: &mut F)
    where
        F: FnMut(NodeRef<'a>, Option<NodeRef<'a>>),
    {
        f(node, parent);
        for child in node.children() {
            visit(child, Some(node), f);
        }
    }
    visit(root, None, f);
}

/// Names of the variables and parameters read anywhere under `root`.
pub fn referenced_variables(root: NodeRef<'_>) -> Vec<CanonicalName> {
    let mut names = Vec::new();
    walk(root, &mut |node, _| {
        if let NodeRef::Expression(Expression::Variable(variable)) = node {
            names.push(variable.name().clone());
        }
    });
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::ObjectName;
    use crate::syntax::Span;
    use crate::types::Value;
    use crate::xpt::DataObjectSymbol;

    fn header() -> SelectionExpression {
        let object = DataObjectSymbol::new(ObjectName::parse("o"), Span::default());
        SelectionExpression::new(
            vec![ResultObject::new(object, None, Span::default()).unwrap()],
            Span::default(),
        )
    }

    fn parameter(name: &str, default: Option<f64>) -> Parameter {
        Parameter {
            name: CanonicalName::new(name),
            data_type: DataType::number(),
            default: default.map(|v| Expression::Literal(Literal::infer(Value::Number(v), Span::default()))),
            meta: Meta::default(),
        }
    }

    fn body() -> StatementBlock {
        let ret = Statement::return_of(Expression::Selection(header()), Meta::default()).unwrap();
        StatementBlock::new(CanonicalName::new("s.block1"), vec![ret], Meta::default())
    }

    #[test]
    fn defaults_become_leading_conditional_assignments() {
        let rule = SelectionRule::new(
            CanonicalName::new("s"),
            vec![parameter("p1", Some(5.0)), parameter("p2", None), parameter("p3", Some(7.0))],
            header(),
            body(),
            Meta::default(),
        )
        .unwrap();
        let statements = &rule.body().statements;
        assert_eq!(statements.len(), 3);
        for (statement, (param, value)) in statements.iter().zip([("P1", "5"), ("P3", "7")]) {
            match statement {
                Statement::IfThenElse(s) => {
                    assert_eq!(s.condition.to_string(), format!("({} = NULL)", param));
                    match s.then_branch.as_ref() {
                        Statement::Assignment(a) => {
                            assert_eq!(a.target.name().full_id(), param);
                            assert_eq!(a.value.to_string(), value);
                        }
                        other => panic!("expected assignment, got {:?}", other),
                    }
                    assert!(s.else_branch.is_none());
                }
                other => panic!("expected if, got {:?}", other),
            }
        }
        assert!(matches!(statements[2], Statement::Return(_)));
        assert_eq!(rule.result().unwrap().to_string(), "SELECTION<OBJECT<O>>");
    }

    #[test]
    fn walk_reports_parents() {
        let rule = SelectionRule::new(
            CanonicalName::new("s"),
            vec![parameter("p1", Some(1.0))],
            header(),
            body(),
            Meta::default(),
        )
        .unwrap();
        let mut pairs = Vec::new();
        walk(NodeRef::Rule(&rule), &mut |node, parent| {
            pairs.push((node.kind(), parent.map(|p| p.kind())));
        });
        assert_eq!(pairs[0], (NodeKind::SelectionRule, None));
        assert!(pairs.contains(&(NodeKind::IfThenElse, Some(NodeKind::StatementBlock))));
        assert!(pairs.contains(&(NodeKind::Assignment, Some(NodeKind::IfThenElse))));
        assert!(pairs.contains(&(NodeKind::Variable, Some(NodeKind::Compare))));
        assert_eq!(referenced_variables(NodeRef::Rule(&rule)), vec![CanonicalName::new("p1")]);
    }
}
