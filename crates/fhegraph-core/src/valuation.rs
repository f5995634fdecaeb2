//! Scheme-agnostic plaintext values at the API boundary.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One caller-facing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlainValue {
    F64(f64),
    F64Vec(Vec<f64>),
    I64(i64),
    I64Vec(Vec<i64>),
    Byte(u8),
}

impl PlainValue {
    /// Vector length, or `None` for scalars (which broadcast).
    pub fn vector_len(&self) -> Option<usize> {
        match self {
            PlainValue::F64Vec(values) => Some(values.len()),
            PlainValue::I64Vec(values) => Some(values.len()),
            PlainValue::F64(_) | PlainValue::I64(_) | PlainValue::Byte(_) => None,
        }
    }

    pub fn as_f64_vec(&self) -> Option<&[f64]> {
        match self {
            PlainValue::F64Vec(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_i64_vec(&self) -> Option<&[i64]> {
        match self {
            PlainValue::I64Vec(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Option<u8> {
        match self {
            PlainValue::Byte(value) => Some(*value),
            _ => None,
        }
    }
}

/// Named plaintext values: the inputs handed to `encrypt` or the outputs
/// returned by `decrypt`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Valuation {
    values: IndexMap<String, PlainValue>,
}

impl Valuation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the one it replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: PlainValue) -> Option<PlainValue> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&PlainValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PlainValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, PlainValue)> for Valuation {
    fn from_iter<I: IntoIterator<Item = (K, PlainValue)>>(iter: I) -> Self {
        Valuation {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_have_no_vector_len() {
        assert_eq!(PlainValue::F64(1.0).vector_len(), None);
        assert_eq!(PlainValue::Byte(1).vector_len(), None);
        assert_eq!(PlainValue::I64Vec(vec![1, 2]).vector_len(), Some(2));
    }

    #[test]
    fn valuation_keeps_insertion_order() {
        let valuation: Valuation = [
            ("b", PlainValue::I64(1)),
            ("a", PlainValue::I64(2)),
        ]
        .into_iter()
        .collect();
        let names: Vec<&String> = valuation.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn valuation_serializes_as_a_plain_map() {
        let mut valuation = Valuation::new();
        valuation.insert("x", PlainValue::F64Vec(vec![1.0, 2.0]));
        let json = serde_json::to_string(&valuation).unwrap();
        assert_eq!(json, r#"{"x":{"F64Vec":[1.0,2.0]}}"#);
        let back: Valuation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, valuation);
    }
}
