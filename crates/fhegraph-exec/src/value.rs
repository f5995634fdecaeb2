//! Scheme-native values flowing through an execution.

use std::fmt;

use indexmap::IndexMap;

use fhegraph_core::types::DataType;

use crate::error::ExecError;
use crate::scheme::Scheme;

/// One value, classified the same way the type lattice classifies nodes.
pub enum SchemeValue<S: Scheme> {
    Cipher(S::Ciphertext),
    Plain(S::Plaintext),
    /// Cleartext slots, `vec_width` long.
    Raw(Vec<S::Scalar>),
}

impl<S: Scheme> SchemeValue<S> {
    pub fn data_type(&self) -> DataType {
        match self {
            SchemeValue::Cipher(_) => DataType::Cipher,
            SchemeValue::Plain(_) => DataType::Plain,
            SchemeValue::Raw(_) => DataType::Raw,
        }
    }

    pub fn as_cipher(&self) -> Option<&S::Ciphertext> {
        match self {
            SchemeValue::Cipher(cipher) => Some(cipher),
            _ => None,
        }
    }
}

impl<S: Scheme> Clone for SchemeValue<S> {
    fn clone(&self) -> Self {
        match self {
            SchemeValue::Cipher(cipher) => SchemeValue::Cipher(cipher.clone()),
            SchemeValue::Plain(plain) => SchemeValue::Plain(plain.clone()),
            SchemeValue::Raw(values) => SchemeValue::Raw(values.clone()),
        }
    }
}

impl<S: Scheme> fmt::Debug for SchemeValue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeValue::Cipher(cipher) => f.debug_tuple("Cipher").field(cipher).finish(),
            SchemeValue::Plain(plain) => f.debug_tuple("Plain").field(plain).finish(),
            SchemeValue::Raw(values) => f.debug_tuple("Raw").field(values).finish(),
        }
    }
}

/// How [`SchemeValuation::merge`] treats names present on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    Disjoint,
    Replace,
}

/// Named scheme values: encrypted inputs or execution outputs.
pub struct SchemeValuation<S: Scheme> {
    values: IndexMap<String, SchemeValue<S>>,
}

impl<S: Scheme> SchemeValuation<S> {
    pub fn new() -> Self {
        SchemeValuation {
            values: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: SchemeValue<S>) -> Option<SchemeValue<S>> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&SchemeValue<S>> {
        self.values.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<SchemeValue<S>> {
        self.values.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SchemeValue<S>)> {
        self.values.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Moves every entry of `other` into `self`.
    pub fn merge(&mut self, other: SchemeValuation<S>, policy: MergePolicy) -> Result<(), ExecError> {
        if policy == MergePolicy::Disjoint {
            if let Some(name) = other.names().find(|name| self.contains(name)) {
                return Err(ExecError::config(format!(
                    "value '{name}' is supplied by more than one party"
                )));
            }
        }
        self.values.extend(other.values);
        Ok(())
    }

    /// The entries named in `names`, cloned; absent names are skipped.
    pub fn subset<'n>(&self, names: impl IntoIterator<Item = &'n str>) -> Self {
        names
            .into_iter()
            .filter_map(|name| {
                self.values
                    .get(name)
                    .map(|value| (name.to_string(), value.clone()))
            })
            .collect()
    }
}

impl<S: Scheme> Default for SchemeValuation<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scheme> Clone for SchemeValuation<S> {
    fn clone(&self) -> Self {
        SchemeValuation {
            values: self.values.clone(),
        }
    }
}

impl<S: Scheme> fmt::Debug for SchemeValuation<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl<S: Scheme, K: Into<String>> FromIterator<(K, SchemeValue<S>)> for SchemeValuation<S> {
    fn from_iter<I: IntoIterator<Item = (K, SchemeValue<S>)>>(iter: I) -> Self {
        SchemeValuation {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl<S: Scheme> IntoIterator for SchemeValuation<S> {
    type Item = (String, SchemeValue<S>);
    type IntoIter = indexmap::map::IntoIter<String, SchemeValue<S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::Ckks;

    fn raw(value: f64) -> SchemeValue<Ckks> {
        SchemeValue::Raw(vec![value])
    }

    #[test]
    fn disjoint_merge_rejects_shared_names() {
        let mut alice: SchemeValuation<Ckks> = [("x", raw(1.0))].into_iter().collect();
        let bob: SchemeValuation<Ckks> = [("x", raw(2.0)), ("y", raw(3.0))].into_iter().collect();
        assert!(matches!(
            alice.merge(bob.clone(), MergePolicy::Disjoint),
            Err(ExecError::Configuration { .. })
        ));
        assert_eq!(alice.len(), 1);

        alice.merge(bob, MergePolicy::Replace).unwrap();
        assert_eq!(alice.len(), 2);
        assert!(matches!(alice.get("x"), Some(SchemeValue::Raw(v)) if v == &vec![2.0]));
    }

    #[test]
    fn subsets_skip_absent_names() {
        let all: SchemeValuation<Ckks> = [("a", raw(1.0)), ("b", raw(2.0))].into_iter().collect();
        let some = all.subset(["b", "z"]);
        assert_eq!(some.names().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(some.get("b").unwrap().data_type(), DataType::Raw);
    }
}
