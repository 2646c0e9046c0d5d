use serde::Serialize;
use std::fmt;

use crate::errors::SelError;
use crate::syntax::Span;
use crate::types::{DataType, Value};

/// A constant with its resolved type. The value has already been converted
/// to that type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Literal {
    value: Value,
    data_type: DataType,
    span: Span,
}

impl Literal {
    /// Converts `value` into `data_type`; fails when it does not convert.
    pub fn new(value: Value, data_type: DataType, span: Span) -> Result<Self, SelError> {
        let value = data_type.convert(value)?;
        Ok(Self {
            value,
            data_type,
            span,
        })
    }

    /// A literal typed by its own value.
    pub fn infer(value: Value, span: Span) -> Self {
        Self {
            data_type: value.data_type(),
            value,
            span,
        }
    }

    pub fn null(span: Span) -> Self {
        Self::infer(Value::Null, span)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::Null => write!(f, "NULL"),
            Value::Text(text) => write!(f, "'{}'", text),
            Value::Date(_) => write!(f, "#{}#", self.value),
            other => write!(f, "{}", other),
        }
    }
}
