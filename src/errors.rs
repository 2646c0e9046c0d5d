//! Selrule Error Handling
//!
//! Two families of problems flow through the pipeline:
//!
//! - **Fatal errors** are [`SelError`] values returned through `Result`. Structural
//!   construction errors (a tree-building bug) and runtime errors (invocation
//!   failures) always take this route.
//! - **Collected problems** are [`Message`] values. Syntax and name-resolution
//!   problems are reported as messages so one pass can surface all of them.
//!
//! A `SelError` can always be turned into a `Message` once a [`SourceContext`]
//! is available to compute line and column.

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// A named piece of source text plus a line index for offset conversion.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
    line_starts: Vec<usize>,
}

impl SourceContext {
    /// Create a source context from real file content
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let line_starts = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            content,
            line_starts,
        }
    }

    /// Create a fallback when real source is unavailable
    pub fn fallback(context: &str) -> Self {
        Self::from_file("fallback", format!("// {}", context))
    }

    /// Convert to NamedSource for use with miette error reporting
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }

    /// 1-based line and column of a byte offset. Offsets past the end clamp to
    /// the last position.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.content.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let column = self.content[self.line_starts[line]..offset].chars().count();
        (line + 1, column + 1)
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::fallback("default context")
    }
}

// ============================================================================
// ERROR KINDS
// ============================================================================

/// What went wrong. The display text of each kind is the user-facing message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorKind {
    // Syntax errors
    #[error("syntax error: {message}")]
    Syntax { message: String },
    #[error("invalid {literal_type} literal '{value}'")]
    InvalidLiteral { literal_type: String, value: String },

    // Semantic errors
    #[error("unknown identifier '{symbol}' in block '{block}'")]
    UndefinedSymbol { symbol: String, block: String },
    #[error("'{symbol}' is used before its declaration in block '{block}'")]
    UsedBeforeDeclaration { symbol: String, block: String },
    #[error("unknown type '{name}'")]
    UnknownType { name: String },
    #[error("data object '{name}' not found in any registered data engine")]
    UnknownObject { name: String },
    #[error("entry '{entry}' not found on data object '{object}'")]
    UnknownEntry { object: String, entry: String },
    #[error("malformed qualified name '{name}'")]
    MalformedName { name: String },
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },
    #[error("unknown operator '{symbol}'")]
    UnknownOperator { symbol: String },
    #[error("'{name}' is already defined in scope '{scope}'")]
    Redefinition { name: String, scope: String },
    #[error("'{name}' expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        context: String,
    },
    #[error("cannot convert '{value}' to {target}")]
    Conversion { value: String, target: String },
    #[error("data object '{object}' has no key column {ordinal}")]
    MissingKey { object: String, ordinal: usize },
    #[error("rule '{rule}' returns [{actual}] but declares [{expected}]")]
    ResultMismatch {
        rule: String,
        expected: String,
        actual: String,
    },
    #[error("block '{block}' never returns a selection")]
    MissingReturn { block: String },
    #[error("parameter '{name}' of rule '{rule}' is never used")]
    UnusedParameter { name: String, rule: String },
    #[error("compilation of '{unit}' failed with {} message(s)", .messages.len())]
    CompilationFailed { unit: String, messages: Vec<Message> },

    // Structural construction errors
    #[error("{parent} expects {expected} at position {position}, found {found}")]
    InvalidChild {
        parent: String,
        position: usize,
        expected: String,
        found: String,
    },
    #[error("operator '{operator}' is not a {expected} operator")]
    OperatorCategory { operator: String, expected: String },
    #[error("rule '{rule}' cannot move from state {from} back to {to}")]
    StateRegression {
        rule: String,
        from: String,
        to: String,
    },

    // Runtime errors
    #[error("parameter stack underflow")]
    StackUnderflow,
    #[error("parameter stack overflow (limit {limit})")]
    StackOverflow { limit: usize },
    #[error("no generated code registered for handle '{handle}'")]
    MissingCode { handle: String },
    #[error("no registered data engine can serve rule '{rule}'")]
    NoDataEngine { rule: String },
    #[error("invalid number of arguments for rule '{rule}': expected {expected}, got {actual}")]
    InvalidArgumentCount {
        rule: String,
        expected: usize,
        actual: usize,
    },
    #[error("unknown selection rule '{name}'")]
    UnknownRule { name: String },
    #[error("evaluation failed: {message}")]
    Evaluation { message: String },
    #[error("invocation of rule '{rule}' failed")]
    InvocationFailed { rule: String },

    // Environment errors
    #[error("i/o failure on '{path}': {message}")]
    Io { path: String, message: String },
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

/// Coarse classification used for propagation policy and test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    Syntax,
    Semantic,
    Structural,
    Runtime,
    Io,
}

impl ErrorKind {
    /// Get the error category for test assertions
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Syntax { .. } | Self::InvalidLiteral { .. } => ErrorCategory::Syntax,

            Self::UndefinedSymbol { .. }
            | Self::UsedBeforeDeclaration { .. }
            | Self::UnknownType { .. }
            | Self::UnknownObject { .. }
            | Self::UnknownEntry { .. }
            | Self::MalformedName { .. }
            | Self::UnknownFunction { .. }
            | Self::UnknownOperator { .. }
            | Self::Redefinition { .. }
            | Self::ArgumentCount { .. }
            | Self::TypeMismatch { .. }
            | Self::Conversion { .. }
            | Self::MissingKey { .. }
            | Self::ResultMismatch { .. }
            | Self::MissingReturn { .. }
            | Self::UnusedParameter { .. }
            | Self::CompilationFailed { .. } => ErrorCategory::Semantic,

            Self::InvalidChild { .. }
            | Self::OperatorCategory { .. }
            | Self::StateRegression { .. } => ErrorCategory::Structural,

            Self::StackUnderflow
            | Self::StackOverflow { .. }
            | Self::MissingCode { .. }
            | Self::NoDataEngine { .. }
            | Self::InvalidArgumentCount { .. }
            | Self::UnknownRule { .. }
            | Self::Evaluation { .. }
            | Self::InvocationFailed { .. } => ErrorCategory::Runtime,

            Self::Io { .. } | Self::Config { .. } => ErrorCategory::Io,
        }
    }

    /// Get error code suffix for diagnostic codes
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "syntax",
            Self::InvalidLiteral { .. } => "invalid_literal",
            Self::UndefinedSymbol { .. } => "undefined_symbol",
            Self::UsedBeforeDeclaration { .. } => "used_before_declaration",
            Self::UnknownType { .. } => "unknown_type",
            Self::UnknownObject { .. } => "unknown_object",
            Self::UnknownEntry { .. } => "unknown_entry",
            Self::MalformedName { .. } => "malformed_name",
            Self::UnknownFunction { .. } => "unknown_function",
            Self::UnknownOperator { .. } => "unknown_operator",
            Self::Redefinition { .. } => "redefinition",
            Self::ArgumentCount { .. } => "argument_count",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::Conversion { .. } => "conversion",
            Self::MissingKey { .. } => "missing_key",
            Self::ResultMismatch { .. } => "result_mismatch",
            Self::MissingReturn { .. } => "missing_return",
            Self::UnusedParameter { .. } => "unused_parameter",
            Self::CompilationFailed { .. } => "compilation_failed",
            Self::InvalidChild { .. } => "invalid_child",
            Self::OperatorCategory { .. } => "operator_category",
            Self::StateRegression { .. } => "state_regression",
            Self::StackUnderflow => "stack_underflow",
            Self::StackOverflow { .. } => "stack_overflow",
            Self::MissingCode { .. } => "missing_code",
            Self::NoDataEngine { .. } => "no_data_engine",
            Self::InvalidArgumentCount { .. } => "invalid_argument_count",
            Self::UnknownRule { .. } => "unknown_rule",
            Self::Evaluation { .. } => "evaluation",
            Self::InvocationFailed { .. } => "invocation_failed",
            Self::Io { .. } => "io",
            Self::Config { .. } => "config",
        }
    }

    fn primary_label(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Syntax => "syntax error here",
            ErrorCategory::Semantic => "cannot resolve this",
            ErrorCategory::Structural => "invalid tree node",
            ErrorCategory::Runtime => "failed here",
            ErrorCategory::Io => "here",
        }
    }
}

// ============================================================================
// THE ERROR TYPE
// ============================================================================

/// Context-specific source information
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Option<Arc<NamedSource<String>>>,
    pub primary_span: SourceSpan,
    pub phase: String,
}

/// Diagnostic enhancement data
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub error_code: String,
}

/// The single error type of the crate.
#[derive(Debug, Clone)]
pub struct SelError {
    /// What went wrong (type-specific data)
    pub kind: ErrorKind,
    /// Where it happened
    pub source_info: SourceInfo,
    /// Diagnostic code
    pub diagnostic_info: DiagnosticInfo,
    /// The error this one wraps, if any
    pub cause: Option<Box<SelError>>,
}

impl SelError {
    /// An error not tied to source text.
    pub fn new(kind: ErrorKind, phase: &str) -> Self {
        let error_code = format!("selrule::{}::{}", phase, kind.code_suffix());
        Self {
            kind,
            source_info: SourceInfo {
                source: None,
                primary_span: unspanned(),
                phase: phase.to_string(),
            },
            diagnostic_info: DiagnosticInfo { error_code },
            cause: None,
        }
    }

    /// A tree-construction error. These indicate a bug in whoever builds the tree.
    pub fn structural(kind: ErrorKind) -> Self {
        Self::new(kind, "xpt")
    }

    pub fn runtime(kind: ErrorKind) -> Self {
        Self::new(kind, "runtime")
    }

    pub fn with_cause(mut self, cause: SelError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn span(&self) -> SourceSpan {
        self.source_info.primary_span
    }
}

impl std::error::Error for SelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for SelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl Diagnostic for SelError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.source_info.source.as_ref()?;
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.kind.primary_label().to_string()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source_info
            .source
            .as_deref()
            .map(|s| s as &dyn miette::SourceCode)
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        self.cause.as_deref().map(|c| c as &dyn Diagnostic)
    }
}

// ============================================================================
// CONTEXT-AWARE ERROR CREATION
// ============================================================================

/// Context-aware error creation - each context knows how to create appropriate errors
pub trait ErrorReporting {
    /// Create an error with context-appropriate enhancements
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> SelError;

    fn syntax(&self, message: &str, span: SourceSpan) -> SelError {
        self.report(
            ErrorKind::Syntax {
                message: message.into(),
            },
            span,
        )
    }
}

/// General-purpose error creation context for one pass over one source.
#[derive(Debug, Clone)]
pub struct PhaseContext {
    pub source: SourceContext,
    pub phase: String,
}

impl PhaseContext {
    pub fn new(source: SourceContext, phase: impl Into<String>) -> Self {
        Self {
            source,
            phase: phase.into(),
        }
    }

    /// Converts an error into a collected message, computing its position.
    pub fn message(&self, error: &SelError, severity: Severity) -> Message {
        let (line, column) = self.source.position(error.span().offset());
        Message {
            severity,
            line,
            column,
            code: error.diagnostic_info.error_code.clone(),
            text: error.kind.to_string(),
        }
    }
}

impl ErrorReporting for PhaseContext {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> SelError {
        let error_code = format!("selrule::{}::{}", self.phase, kind.code_suffix());

        SelError {
            kind,
            source_info: SourceInfo {
                source: Some(self.source.to_named_source()),
                primary_span: span,
                phase: self.phase.clone(),
            },
            diagnostic_info: DiagnosticInfo { error_code },
            cause: None,
        }
    }
}

// ============================================================================
// COLLECTED MESSAGES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A non-fatal problem attached to a tree, tagged with its source position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub severity: Severity,
    pub line: usize,
    pub column: usize,
    pub code: String,
    pub text: String,
}

impl Message {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {} [{}]",
            self.line, self.column, self.severity, self.text, self.code
        )
    }
}

// ============================================================================
// UTILITIES
// ============================================================================

/// Placeholder span for errors not tied to a source location.
pub fn unspanned() -> SourceSpan {
    SourceSpan::from(0..0)
}

/// Converts a syntax Span to a miette SourceSpan.
pub fn to_source_span(span: crate::syntax::Span) -> SourceSpan {
    SourceSpan::from(span.start..span.end)
}

/// Prints a SelError with full miette diagnostics
pub fn print_error(error: SelError) {
    use miette::Report;
    let report = Report::new(error);
    eprintln!("{report:?}");
}
