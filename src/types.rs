//! Data types and runtime values.
//!
//! The type system is a small catalog: primitive categories (numbers, text,
//! dates, booleans, `ANY`) and composites (lists, tuples, data objects and
//! selection shapes). Symbol resolution only cares about categories and
//! signatures; [`DataType::convert`] is the one place values are coerced.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::errors::{ErrorKind, SelError};
use crate::names::{CanonicalName, ObjectName};
use crate::signature::{Signature, Signed};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TypeCategory {
    Numeric,
    Integer,
    Text,
    Date,
    Boolean,
    Any,
    List,
    Tuple,
    Object,
    Selection,
}

impl TypeCategory {
    pub fn is_primitive(self) -> bool {
        !matches!(
            self,
            Self::List | Self::Tuple | Self::Object | Self::Selection
        )
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Numeric | Self::Integer)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataType {
    name: CanonicalName,
    category: TypeCategory,
    nullable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    members: Vec<DataType>,
}

impl DataType {
    fn primitive(name: &str, category: TypeCategory) -> Self {
        Self {
            name: CanonicalName::new(name),
            category,
            nullable: false,
            members: Vec::new(),
        }
    }

    pub fn number() -> Self {
        Self::primitive("NUMBER", TypeCategory::Numeric)
    }

    pub fn integer() -> Self {
        Self::primitive("INTEGER", TypeCategory::Integer)
    }

    pub fn text() -> Self {
        Self::primitive("TEXT", TypeCategory::Text)
    }

    pub fn date() -> Self {
        Self::primitive("DATE", TypeCategory::Date)
    }

    pub fn boolean() -> Self {
        Self::primitive("BOOLEAN", TypeCategory::Boolean)
    }

    pub fn any() -> Self {
        Self::primitive("ANY", TypeCategory::Any)
    }

    pub fn list_of(member: DataType) -> Self {
        Self {
            name: CanonicalName::new("LIST"),
            category: TypeCategory::List,
            nullable: false,
            members: vec![member],
        }
    }

    pub fn tuple(members: Vec<DataType>) -> Self {
        Self {
            name: CanonicalName::new("TUPLE"),
            category: TypeCategory::Tuple,
            nullable: false,
            members,
        }
    }

    pub fn object(name: &ObjectName) -> Self {
        Self {
            name: name.canonical().clone(),
            category: TypeCategory::Object,
            nullable: false,
            members: Vec::new(),
        }
    }

    /// The shape produced by a selection over `objects`, in order.
    pub fn selection(objects: &[ObjectName]) -> Self {
        Self {
            name: CanonicalName::new("SELECTION"),
            category: TypeCategory::Selection,
            nullable: false,
            members: objects.iter().map(DataType::object).collect(),
        }
    }

    /// The primitive types every engine declares in its global scope.
    pub fn builtins() -> Vec<DataType> {
        vec![
            Self::number(),
            Self::integer(),
            Self::text(),
            Self::date(),
            Self::boolean(),
            Self::any(),
        ]
    }

    /// Looks a primitive up by name, ignoring case. A trailing `?` marks it
    /// nullable.
    pub fn builtin(name: &str) -> Option<DataType> {
        let (base, nullable) = match name.trim().strip_suffix('?') {
            Some(base) => (base, true),
            None => (name.trim(), false),
        };
        let found = Self::builtins()
            .into_iter()
            .find(|t| t.name.full_id().eq_ignore_ascii_case(base))?;
        Some(if nullable { found.nullable() } else { found })
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn category(&self) -> TypeCategory {
        self.category
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn members(&self) -> &[DataType] {
        &self.members
    }

    pub fn is_boolean(&self) -> bool {
        self.category == TypeCategory::Boolean
    }

    /// Whether a value of type `other` may be stored where `self` is expected.
    pub fn accepts(&self, other: &DataType) -> bool {
        use TypeCategory::*;
        match (self.category, other.category) {
            (Any, _) | (_, Any) => true,
            (a, b) if a.is_numeric() && b.is_numeric() => true,
            (a, b) if a.is_primitive() && b.is_primitive() => a == b,
            _ => self.structural_signature() == other.structural_signature(),
        }
    }

    /// Whether values of the two types can be compared.
    pub fn comparable_with(&self, other: &DataType) -> bool {
        self.accepts(other) || other.accepts(self)
    }

    /// Coerces `value` into this type.
    pub fn convert(&self, value: Value) -> Result<Value, SelError> {
        let fail = |value: &Value| {
            SelError::new(
                ErrorKind::Conversion {
                    value: value.to_string(),
                    target: self.signature().to_string(),
                },
                "types",
            )
        };
        match (self.category, value) {
            (_, Value::Null) => Ok(Value::Null),
            (TypeCategory::Any, value) => Ok(value),
            (TypeCategory::Numeric, Value::Number(n)) => Ok(Value::Number(n)),
            (TypeCategory::Numeric, Value::Text(t)) => t
                .trim()
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| fail(&Value::Text(t))),
            (TypeCategory::Integer, Value::Number(n)) if n.fract() == 0.0 => Ok(Value::Number(n)),
            (TypeCategory::Integer, Value::Text(t)) => t
                .trim()
                .parse::<i64>()
                .map(|i| Value::Number(i as f64))
                .map_err(|_| fail(&Value::Text(t))),
            (TypeCategory::Text, Value::Text(t)) => Ok(Value::Text(t)),
            (TypeCategory::Text, v @ (Value::Number(_) | Value::Date(_) | Value::Boolean(_))) => {
                Ok(Value::Text(v.to_string()))
            }
            (TypeCategory::Date, Value::Date(d)) => Ok(Value::Date(d)),
            (TypeCategory::Date, Value::Text(t)) => NaiveDate::parse_from_str(t.trim(), DATE_FORMAT)
                .map(Value::Date)
                .map_err(|_| fail(&Value::Text(t))),
            (TypeCategory::Boolean, Value::Boolean(b)) => Ok(Value::Boolean(b)),
            (TypeCategory::Boolean, Value::Text(t)) => match t.to_lowercase().as_str() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(fail(&Value::Text(t))),
            },
            (TypeCategory::List, Value::List(items)) => {
                let member = self.members.first().cloned().unwrap_or_else(DataType::any);
                items
                    .into_iter()
                    .map(|item| member.convert(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }
            (TypeCategory::Tuple, Value::List(items)) if items.len() == self.members.len() => items
                .into_iter()
                .zip(&self.members)
                .map(|(item, member)| member.convert(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (_, value) => Err(fail(&value)),
        }
    }

    fn structural_signature(&self) -> Signature {
        let members: Vec<_> = self.members.iter().map(|m| m.structural_signature()).collect();
        match self.category {
            TypeCategory::Object => Signature::structured("OBJECT", false, &[Signature::from(&self.name)]),
            c if c.is_primitive() => Signature::type_tag(self.name.full_id(), false),
            _ => Signature::structured(self.name.full_id(), false, &members),
        }
    }
}

impl Signed for DataType {
    fn signature(&self) -> Signature {
        let members: Vec<_> = self.members.iter().map(Signed::signature).collect();
        match self.category {
            TypeCategory::Object => Signature::structured(
                "OBJECT",
                self.nullable,
                &[Signature::from(&self.name)],
            ),
            c if c.is_primitive() => Signature::type_tag(self.name.full_id(), self.nullable),
            _ => Signature::structured(self.name.full_id(), self.nullable, &members),
        }
    }

    fn name(&self) -> &CanonicalName {
        &self.name
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

// ============================================================================
// VALUES
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    Text(String),
    Date(NaiveDate),
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Number(_) => "NUMBER",
            Value::Text(_) => "TEXT",
            Value::Date(_) => "DATE",
            Value::List(_) => "LIST",
        }
    }

    /// The narrowest catalog type this value belongs to.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::any().nullable(),
            Value::Boolean(_) => DataType::boolean(),
            Value::Number(_) => DataType::number(),
            Value::Text(_) => DataType::text(),
            Value::Date(_) => DataType::date(),
            Value::List(_) => DataType::list_of(DataType::any()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Ordering between values of the same kind. `None` across kinds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(t) => write!(f, "{}", t),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::List(items) => {
                let parts: Vec<_> = items.iter().map(Value::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_signatures() {
        assert_eq!(DataType::number().signature().uid(), "NUMBER");
        assert_eq!(DataType::text().nullable().signature().uid(), "TEXT?");
        assert_eq!(
            DataType::list_of(DataType::date()).signature().uid(),
            "LIST<DATE>"
        );
        assert_eq!(
            DataType::selection(&[ObjectName::parse("p.deliverables")])
                .signature()
                .uid(),
            "SELECTION<OBJECT<P.DELIVERABLES>>"
        );
    }

    #[test]
    fn structurally_identical_composites_share_a_signature() {
        let a = DataType::tuple(vec![DataType::number(), DataType::text()]);
        let b = DataType::tuple(vec![DataType::number(), DataType::text()]);
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn conversions() {
        assert_eq!(
            DataType::number().convert(Value::Text("12.5".into())).unwrap(),
            Value::Number(12.5)
        );
        assert!(DataType::integer().convert(Value::Number(1.5)).is_err());
        assert_eq!(
            DataType::date().convert(Value::Text("2024-02-29".into())).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert!(DataType::date().convert(Value::Text("2023-02-29".into())).is_err());
        assert_eq!(DataType::boolean().convert(Value::Null).unwrap(), Value::Null);
        assert_eq!(
            DataType::text().convert(Value::Number(3.0)).unwrap(),
            Value::Text("3".into())
        );
        let err = DataType::boolean().convert(Value::Number(1.0)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Conversion { .. }));
    }

    #[test]
    fn assignability() {
        assert!(DataType::number().accepts(&DataType::integer()));
        assert!(DataType::any().accepts(&DataType::date()));
        assert!(!DataType::text().accepts(&DataType::number()));
        assert!(DataType::text().comparable_with(&DataType::any()));
    }

    #[test]
    fn values_from_json() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 1.5, "x", [1]]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Boolean(true),
                Value::Number(1.5),
                Value::Text("x".into()),
                Value::List(vec![Value::Number(1.0)]),
            ]
        );
    }
}
