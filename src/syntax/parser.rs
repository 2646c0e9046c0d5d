//! Selrule Parser
//!
//! Converts source text into [`UnitSyntax`]. Items (`module` declarations and
//! `selection` rules) are parsed one at a time; when an item fails, the error
//! is recorded and parsing resumes after the next `;` or `}` at nesting depth
//! zero. This parser is purely syntactic.

use chrono::NaiveDate;
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use tracing::debug;

use crate::catalog::Op;
use crate::errors::{to_source_span, ErrorKind, ErrorReporting, PhaseContext, SelError, SourceContext};
use crate::syntax::{
    BlockSyntax, ChainSyntax, ItemSyntax, LiteralSyntax, ModuleSyntax, ObjectRefSyntax,
    OpSyntax, OperandSyntax, ParamSyntax, RuleSyntax, SelectionSyntax, Span, StatementSyntax,
    TermSyntax, UnitSyntax,
};
use crate::types::{Value, DATE_FORMAT};

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct SelParser;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parse a source file. Never fails as a whole: broken items are reported in
/// [`UnitSyntax::errors`].
pub fn parse(source: SourceContext) -> UnitSyntax {
    let reporter = PhaseContext::new(source, "parse");
    let text = reporter.source.content.as_str();
    let mut unit = UnitSyntax::default();
    let mut offset = 0;

    while offset < text.len() {
        let remaining = &text[offset..];
        if SelParser::parse(Rule::rest, remaining).is_ok() {
            break;
        }
        match SelParser::parse(Rule::item, remaining) {
            Ok(mut pairs) => {
                let Some(item) = pairs.next() else { break };
                let consumed = item.as_span().end();
                let builder = Builder {
                    reporter: &reporter,
                    base: offset,
                };
                match builder.item(item) {
                    Ok(item) => unit.items.push(item),
                    Err(error) => unit.errors.push(error),
                }
                offset += consumed.max(1);
            }
            Err(error) => {
                let position = offset
                    + match error.location {
                        InputLocation::Pos(pos) => pos,
                        InputLocation::Span((start, _)) => start,
                    };
                let message = error
                    .renamed_rules(|rule| rule_label(*rule).to_string())
                    .variant
                    .message()
                    .into_owned();
                unit.errors.push(reporter.syntax(
                    &message,
                    to_source_span(Span::new(position, position)),
                ));
                offset = resync(text, offset, position);
            }
        }
    }

    debug!(
        source = %reporter.source.name,
        items = unit.items.len(),
        errors = unit.errors.len(),
        "parsed unit"
    );
    unit
}

/// Offset just past the first `;` or closing `}` at depth zero at or after
/// `error_at`, scanning from the start of the failed item.
fn resync(text: &str, start: usize, error_at: usize) -> usize {
    let mut depth = 0usize;
    let mut quote = None;
    for (index, ch) in text[start..].char_indices() {
        let at = start + index;
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => {
                depth = depth.saturating_sub(1);
                if ch == '}' && depth == 0 && at >= error_at {
                    return at + 1;
                }
            }
            ';' if depth == 0 && at >= error_at => return at + 1,
            _ => {}
        }
    }
    text.len()
}

fn rule_label(rule: Rule) -> &'static str {
    match rule {
        Rule::kw_selection => "'selection'",
        Rule::kw_module => "'module'",
        Rule::kw_as => "'as'",
        Rule::kw_default => "'default'",
        Rule::kw_var => "'var'",
        Rule::kw_if => "'if'",
        Rule::kw_then => "'then'",
        Rule::kw_else => "'else'",
        Rule::kw_return => "'return'",
        Rule::kw_not => "'not'",
        Rule::ident => "identifier",
        Rule::name => "name",
        Rule::number => "number",
        Rule::text => "text",
        Rule::date => "date",
        Rule::boolean => "boolean",
        Rule::null => "null",
        Rule::literal => "literal",
        Rule::operator => "operator",
        Rule::cond_sep => "','",
        Rule::expression | Rule::operand | Rule::term | Rule::group => "expression",
        Rule::call => "function call",
        Rule::condition | Rule::cond_operand | Rule::cond_group => "condition",
        Rule::selection | Rule::object_ref => "data object",
        Rule::block => "block",
        Rule::var_stmt | Rule::assign_stmt | Rule::if_stmt | Rule::return_stmt => "statement",
        Rule::param | Rule::params => "parameter",
        Rule::rule_decl => "selection rule",
        Rule::module_decl => "module declaration",
        _ => "input",
    }
}

// ============================================================================
// CST BUILDERS
// ============================================================================

struct Builder<'a> {
    reporter: &'a PhaseContext,
    /// Offset of the parsed slice within the whole source.
    base: usize,
}

impl Builder<'_> {
    fn item(&self, pair: Pair<Rule>) -> Result<ItemSyntax, SelError> {
        let span = self.span(&pair);
        let decl = self.expect(&mut pair.into_inner(), "declaration", span)?;
        let span = self.span(&decl);
        match decl.as_rule() {
            Rule::module_decl => {
                let name = self.expect(&mut significant(decl), "module name", span)?;
                Ok(ItemSyntax::Module(ModuleSyntax {
                    name: name.as_str().to_string(),
                    span,
                }))
            }
            Rule::rule_decl => self.rule(decl).map(ItemSyntax::Rule),
            other => Err(self.unexpected(other, span)),
        }
    }

    fn rule(&self, pair: Pair<Rule>) -> Result<RuleSyntax, SelError> {
        let span = self.span(&pair);
        let mut inner = significant(pair);
        let ident = self.expect(&mut inner, "rule name", span)?;

        let mut params = Vec::new();
        let mut next = self.expect(&mut inner, "selection", span)?;
        if next.as_rule() == Rule::params {
            params = next
                .into_inner()
                .map(|param| self.param(param))
                .collect::<Result<_, _>>()?;
            next = self.expect(&mut inner, "selection", span)?;
        }
        let selection = self.selection(next)?;

        let body = match inner.next() {
            Some(block) if block.as_rule() == Rule::block => Some(self.block(block)?),
            _ => None,
        };

        Ok(RuleSyntax {
            name: ident.as_str().to_string(),
            name_span: self.span(&ident),
            params,
            selection,
            body,
            span,
        })
    }

    fn param(&self, pair: Pair<Rule>) -> Result<ParamSyntax, SelError> {
        let span = self.span(&pair);
        let mut inner = significant(pair);
        let name = self.expect(&mut inner, "parameter name", span)?;
        let type_name = self.expect(&mut inner, "parameter type", span)?;
        let default = inner.next().map(|expr| self.chain(expr)).transpose()?;
        Ok(ParamSyntax {
            name: name.as_str().to_string(),
            type_name: type_name.as_str().to_string(),
            default,
            span,
        })
    }

    fn selection(&self, pair: Pair<Rule>) -> Result<SelectionSyntax, SelError> {
        let span = self.span(&pair);
        let objects = pair
            .into_inner()
            .map(|object| self.object_ref(object))
            .collect::<Result<_, _>>()?;
        Ok(SelectionSyntax { objects, span })
    }

    fn object_ref(&self, pair: Pair<Rule>) -> Result<ObjectRefSyntax, SelError> {
        let span = self.span(&pair);
        let mut inner = pair.into_inner();
        let name = self.expect(&mut inner, "data object name", span)?;
        let condition = inner.next().map(|cond| self.chain(cond)).transpose()?;
        Ok(ObjectRefSyntax {
            name: name.as_str().to_string(),
            name_span: self.span(&name),
            condition,
            span,
        })
    }

    /// Builds an `expression` or a `condition` as a flat chain.
    fn chain(&self, pair: Pair<Rule>) -> Result<ChainSyntax, SelError> {
        let span = self.span(&pair);
        let mut inner = pair.into_inner();
        let first = self.operand(self.expect(&mut inner, "operand", span)?)?;
        let mut rest = Vec::new();
        while let Some(token) = inner.next() {
            let op = self.op(&token)?;
            let operand = self.operand(self.expect(&mut inner, "operand", span)?)?;
            rest.push((op, operand));
        }
        Ok(ChainSyntax { first, rest, span })
    }

    fn op(&self, pair: &Pair<Rule>) -> Result<OpSyntax, SelError> {
        let span = self.span(pair);
        let op = Op::from_token(pair.as_str()).ok_or_else(|| {
            self.reporter.report(
                ErrorKind::UnknownOperator {
                    symbol: pair.as_str().to_string(),
                },
                to_source_span(span),
            )
        })?;
        Ok(OpSyntax { op, span })
    }

    fn operand(&self, pair: Pair<Rule>) -> Result<OperandSyntax, SelError> {
        let span = self.span(&pair);
        let mut negations = 0;
        let mut term = None;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::kw_not => negations += 1,
                _ => term = Some(part),
            }
        }
        let term = term.ok_or_else(|| self.missing("operand", span))?;
        Ok(OperandSyntax {
            negations,
            term: self.term(term)?,
            span,
        })
    }

    fn term(&self, pair: Pair<Rule>) -> Result<TermSyntax, SelError> {
        let span = self.span(&pair);
        match pair.as_rule() {
            Rule::term => {
                let inner = self.expect(&mut pair.into_inner(), "term", span)?;
                self.term(inner)
            }
            Rule::literal => self.literal(pair).map(TermSyntax::Literal),
            Rule::group | Rule::cond_group => {
                let inner = self.expect(&mut pair.into_inner(), "expression", span)?;
                Ok(TermSyntax::Group(Box::new(self.chain(inner)?)))
            }
            Rule::call => {
                let mut inner = pair.into_inner();
                let name = self.expect(&mut inner, "function name", span)?;
                let args = inner
                    .map(|arg| self.chain(arg))
                    .collect::<Result<_, _>>()?;
                Ok(TermSyntax::Call {
                    name: name.as_str().to_string(),
                    args,
                    span,
                })
            }
            Rule::name => Ok(TermSyntax::Name {
                name: pair.as_str().to_string(),
                span,
            }),
            other => Err(self.unexpected(other, span)),
        }
    }

    fn literal(&self, pair: Pair<Rule>) -> Result<LiteralSyntax, SelError> {
        let span = self.span(&pair);
        let token = self.expect(&mut pair.into_inner(), "literal", span)?;
        let raw = token.as_str();
        let invalid = |literal_type: &str| {
            self.reporter.report(
                ErrorKind::InvalidLiteral {
                    literal_type: literal_type.into(),
                    value: raw.into(),
                },
                to_source_span(span),
            )
        };
        let value = match token.as_rule() {
            Rule::number => Value::Number(raw.parse::<f64>().map_err(|_| invalid("number"))?),
            Rule::text => Value::Text(raw[1..raw.len() - 1].to_string()),
            Rule::date => {
                let date = NaiveDate::parse_from_str(raw.trim_matches('#'), DATE_FORMAT)
                    .map_err(|_| invalid("date"))?;
                Value::Date(date)
            }
            Rule::boolean => Value::Boolean(raw.eq_ignore_ascii_case("true")),
            Rule::null => Value::Null,
            other => return Err(self.unexpected(other, span)),
        };
        Ok(LiteralSyntax { value, span })
    }

    fn block(&self, pair: Pair<Rule>) -> Result<BlockSyntax, SelError> {
        let span = self.span(&pair);
        let statements = pair
            .into_inner()
            .map(|statement| self.statement(statement))
            .collect::<Result<_, _>>()?;
        Ok(BlockSyntax { statements, span })
    }

    fn statement(&self, pair: Pair<Rule>) -> Result<StatementSyntax, SelError> {
        let span = self.span(&pair);
        match pair.as_rule() {
            Rule::var_stmt => {
                let mut inner = significant(pair);
                let name = self.expect(&mut inner, "variable name", span)?;
                let type_name = self.expect(&mut inner, "variable type", span)?;
                let init = inner.next().map(|expr| self.chain(expr)).transpose()?;
                Ok(StatementSyntax::Var {
                    name: name.as_str().to_string(),
                    type_name: type_name.as_str().to_string(),
                    init,
                    span,
                })
            }
            Rule::assign_stmt => {
                let mut inner = pair.into_inner();
                let target = self.expect(&mut inner, "assignment target", span)?;
                let value = self.chain(self.expect(&mut inner, "expression", span)?)?;
                Ok(StatementSyntax::Assign {
                    target: target.as_str().to_string(),
                    value,
                    span,
                })
            }
            Rule::if_stmt => {
                let mut inner = significant(pair);
                let condition = self.chain(self.expect(&mut inner, "condition", span)?)?;
                let then_branch = self.statement(self.expect(&mut inner, "statement", span)?)?;
                let else_branch = inner
                    .next()
                    .map(|stmt| self.statement(stmt).map(Box::new))
                    .transpose()?;
                Ok(StatementSyntax::If {
                    condition,
                    then_branch: Box::new(then_branch),
                    else_branch,
                    span,
                })
            }
            Rule::return_stmt => {
                let selection = self.expect(&mut significant(pair), "selection", span)?;
                self.selection(selection).map(StatementSyntax::Return)
            }
            Rule::block => self.block(pair).map(StatementSyntax::Block),
            other => Err(self.unexpected(other, span)),
        }
    }

    // ------------------------------------------------------------------------

    fn span(&self, pair: &Pair<Rule>) -> Span {
        let span = pair.as_span();
        Span::new(span.start(), span.end()).shifted(self.base)
    }

    fn expect<'i>(
        &self,
        pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
        what: &str,
        span: Span,
    ) -> Result<Pair<'i, Rule>, SelError> {
        pairs.next().ok_or_else(|| self.missing(what, span))
    }

    fn missing(&self, what: &str, span: Span) -> SelError {
        self.reporter
            .syntax(&format!("missing {}", what), to_source_span(span))
    }

    fn unexpected(&self, rule: Rule, span: Span) -> SelError {
        self.reporter.syntax(
            &format!("unexpected {}", rule_label(rule)),
            to_source_span(span),
        )
    }
}

/// Inner pairs without keyword tokens.
fn significant(pair: Pair<Rule>) -> impl Iterator<Item = Pair<Rule>> {
    pair.into_inner().filter(|p| {
        !matches!(
            p.as_rule(),
            Rule::kw_selection
                | Rule::kw_module
                | Rule::kw_as
                | Rule::kw_default
                | Rule::kw_var
                | Rule::kw_if
                | Rule::kw_then
                | Rule::kw_else
                | Rule::kw_return
        )
    })
}
