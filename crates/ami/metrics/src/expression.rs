//! Value expressions evaluated against events.
//!
//! An expression starting with `$` names an event attribute; anything else
//! is a literal. Evaluation never fails: a missing attribute degrades to
//! the reference text itself, and numeric coercion of an unparsable string
//! yields `0`. Both cases are logged.

use std::fmt;

use ami_protocol::Event;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::error;

/// Prefix marking an attribute reference.
pub const REFERENCE_SIGIL: char = '$';

/// A literal value or a reference to an event attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueExpr {
    Literal(String),
    Reference(String),
}

impl ValueExpr {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(REFERENCE_SIGIL) {
            Some(attribute) => ValueExpr::Reference(attribute.to_string()),
            None => ValueExpr::Literal(raw.to_string()),
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        ValueExpr::Literal(value.into())
    }

    pub fn reference(attribute: impl Into<String>) -> Self {
        ValueExpr::Reference(attribute.into())
    }

    /// Evaluate to a string.
    pub fn evaluate(&self, event: &Event) -> String {
        match self {
            ValueExpr::Literal(value) => value.clone(),
            ValueExpr::Reference(attribute) => match event.get(attribute) {
                Some(value) => value.to_string(),
                None => {
                    error!(
                        event = event.name(),
                        attribute = %attribute,
                        "Event attribute not found"
                    );
                    self.to_string()
                }
            },
        }
    }

    /// Evaluate and coerce to a number.
    pub fn evaluate_number(&self, event: &Event) -> f64 {
        parse_number(&self.evaluate(event))
    }
}

/// Parse a metric value, ignoring surrounding whitespace. Unparsable input is `0`.
pub fn parse_number(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) => value,
        Err(e) => {
            error!(value = %raw, error = %e, "Unable to parse metric value, using 0");
            0.0
        }
    }
}

impl fmt::Display for ValueExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpr::Literal(value) => write!(f, "{}", value),
            ValueExpr::Reference(attribute) => write!(f, "{}{}", REFERENCE_SIGIL, attribute),
        }
    }
}

impl From<&str> for ValueExpr {
    fn from(raw: &str) -> Self {
        ValueExpr::parse(raw)
    }
}

impl Serialize for ValueExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// Configuration files write literals as bare numbers as often as strings.
impl<'de> Deserialize<'de> for ValueExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ExprVisitor;

        impl<'de> Visitor<'de> for ExprVisitor {
            type Value = ValueExpr;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, a number or a $attribute reference")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ValueExpr, E> {
                Ok(ValueExpr::parse(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ValueExpr, E> {
                Ok(ValueExpr::Literal(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ValueExpr, E> {
                Ok(ValueExpr::Literal(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<ValueExpr, E> {
                Ok(ValueExpr::Literal(v.to_string()))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<ValueExpr, E> {
                Ok(ValueExpr::Literal(v.to_string()))
            }
        }

        deserializer.deserialize_any(ExprVisitor)
    }
}
