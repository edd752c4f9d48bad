//! Typed parameter values and the keyed collections built from them.
//!
//! A [`ParamMap`] is the identity of one integration run inside a batch: it is
//! hashed and compared by content, so two maps built in different insertion
//! orders address the same tree. A [`ParamCollection`] describes the grid a
//! batch expands, one homogeneous [`ParamValues`] sequence per parameter name.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{QuadError, Result};

/// The tag of a [`ParamValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKind {
    Int,
    Real,
    Text,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamKind::Int => "integer",
            ParamKind::Real => "real",
            ParamKind::Text => "text",
        })
    }
}

/// A single integer, real or text parameter value.
///
/// Equality, ordering and hashing never promote between tags: `Int(2)` and
/// `Real(2.0)` are different values. Values of different tags are ordered by
/// tag rank (`Int < Real < Text`). Reals use IEEE total ordering so the order
/// is total even for `NaN` and signed zeros.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Real(f64),
    Text(String),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Real(_) => ParamKind::Real,
            ParamValue::Text(_) => ParamKind::Text,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            ParamValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric view of the value: integers are widened, text yields `None`.
    ///
    /// Integrands use this to accept either tag for a numeric parameter.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Real(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    /// The string used as an object key in batch documents.
    ///
    /// Reals use the shortest decimal form that parses back to the same bits
    /// and always carry a decimal point, so [`ParamValue::from_key_str`]
    /// recovers the tag.
    pub fn to_key_string(&self) -> String {
        match self {
            ParamValue::Int(v) => v.to_string(),
            ParamValue::Real(v) => {
                let mut s = v.to_string();
                if v.is_finite() && !s.contains('.') {
                    s.push_str(".0");
                }
                s
            }
            ParamValue::Text(v) => v.clone(),
        }
    }

    /// Classifies a document key by lexical inspection.
    ///
    /// An optional leading `-` followed by digits is an integer; digits with
    /// exactly one decimal point are a real; anything else is text.
    pub fn from_key_str(key: &str) -> Self {
        let body = key.strip_prefix('-').unwrap_or(key);
        let lexically_numeric = body.bytes().any(|b| b.is_ascii_digit())
            && body.bytes().all(|b| b.is_ascii_digit() || b == b'.');
        if lexically_numeric {
            match body.bytes().filter(|&b| b == b'.').count() {
                0 => {
                    if let Ok(v) = key.parse::<i64>() {
                        return ParamValue::Int(v);
                    }
                }
                1 => {
                    if let Ok(v) = key.parse::<f64>() {
                        return ParamValue::Real(v);
                    }
                }
                _ => {}
            }
        }
        ParamValue::Text(key.to_owned())
    }
}

impl Ord for ParamValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ParamValue::Int(a), ParamValue::Int(b)) => a.cmp(b),
            (ParamValue::Real(a), ParamValue::Real(b)) => a.total_cmp(b),
            (ParamValue::Text(a), ParamValue::Text(b)) => a.cmp(b),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

impl PartialOrd for ParamValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ParamValue {}

impl Hash for ParamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            ParamValue::Int(v) => v.hash(state),
            ParamValue::Real(v) => v.to_bits().hash(state),
            ParamValue::Text(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key_string())
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Real(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

/// One fully specified set of named parameter values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamMap(BTreeMap<String, ParamValue>);

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Numeric lookup, see [`ParamValue::to_f64`].
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::to_f64)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Orders two maps by walking `keys` in order and comparing the first
    /// differing value. A missing key sorts before any present value.
    pub fn cmp_by_keys(&self, other: &Self, keys: &[String]) -> Ordering {
        keys.iter()
            .map(|key| self.get(key).cmp(&other.get(key)))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParamMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ParamMap(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for ParamMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str(" }")
    }
}

/// The ordered, homogeneous value sequence of one grid parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValues {
    Int(Vec<i64>),
    Real(Vec<f64>),
    Text(Vec<String>),
}

impl ParamValues {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValues::Int(_) => ParamKind::Int,
            ParamValues::Real(_) => ParamKind::Real,
            ParamValues::Text(_) => ParamKind::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ParamValues::Int(v) => v.len(),
            ParamValues::Real(v) => v.len(),
            ParamValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<ParamValue> {
        match self {
            ParamValues::Int(v) => v.get(index).copied().map(ParamValue::Int),
            ParamValues::Real(v) => v.get(index).copied().map(ParamValue::Real),
            ParamValues::Text(v) => v.get(index).cloned().map(ParamValue::Text),
        }
    }

    pub fn values(&self) -> Vec<ParamValue> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }

    pub fn contains(&self, value: &ParamValue) -> bool {
        (0..self.len()).any(|i| self.get(i).as_ref() == Some(value))
    }

    /// Appends `value` if it has this sequence's tag. Returns `false` on a tag
    /// mismatch and leaves the sequence unchanged.
    pub fn push(&mut self, value: ParamValue) -> bool {
        match (self, value) {
            (ParamValues::Int(v), ParamValue::Int(x)) => v.push(x),
            (ParamValues::Real(v), ParamValue::Real(x)) => v.push(x),
            (ParamValues::Text(v), ParamValue::Text(x)) => v.push(x),
            _ => return false,
        }
        true
    }

    /// Appends every value of `other` not already present, keeping this
    /// sequence's order. Returns `false` (and changes nothing) when the tags
    /// differ.
    pub fn union_with(&mut self, other: &ParamValues) -> bool {
        if self.kind() != other.kind() {
            return false;
        }
        for value in other.values() {
            if !self.contains(&value) {
                self.push(value);
            }
        }
        true
    }

    /// Builds a sequence from loose values, all of which must share one tag.
    pub fn from_values(values: Vec<ParamValue>) -> Result<Self> {
        let Some(first) = values.first() else {
            return Err(QuadError::malformed("parameter has no values"));
        };
        let mut out = match first.kind() {
            ParamKind::Int => ParamValues::Int(Vec::with_capacity(values.len())),
            ParamKind::Real => ParamValues::Real(Vec::with_capacity(values.len())),
            ParamKind::Text => ParamValues::Text(Vec::with_capacity(values.len())),
        };
        for value in values {
            let kind = value.kind();
            if !out.push(value) {
                return Err(QuadError::malformed(format!(
                    "parameter mixes {} and {} values",
                    out.kind(),
                    kind
                )));
            }
        }
        Ok(out)
    }
}

impl From<Vec<i64>> for ParamValues {
    fn from(v: Vec<i64>) -> Self {
        ParamValues::Int(v)
    }
}

impl From<Vec<i32>> for ParamValues {
    fn from(v: Vec<i32>) -> Self {
        ParamValues::Int(v.into_iter().map(i64::from).collect())
    }
}

impl From<Vec<f64>> for ParamValues {
    fn from(v: Vec<f64>) -> Self {
        ParamValues::Real(v)
    }
}

impl From<Vec<String>> for ParamValues {
    fn from(v: Vec<String>) -> Self {
        ParamValues::Text(v)
    }
}

impl From<Vec<&str>> for ParamValues {
    fn from(v: Vec<&str>) -> Self {
        ParamValues::Text(v.into_iter().map(str::to_owned).collect())
    }
}

/// The grid of a batch: parameter name to the values it ranges over.
///
/// Names are kept in lexicographic order, which is the canonical key order
/// used for combination sorting and document nesting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamCollection(BTreeMap<String, ParamValues>);

impl ParamCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, values: impl Into<ParamValues>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        values: impl Into<ParamValues>,
    ) -> Option<ParamValues> {
        self.0.insert(name.into(), values.into())
    }

    pub fn get(&self, name: &str) -> Option<&ParamValues> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ParamValues> {
        self.0.get_mut(name)
    }

    /// Parameter names in canonical (lexicographic) order.
    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValues)> {
        self.0.iter()
    }

    /// Number of combinations the grid expands to.
    pub fn combination_count(&self) -> usize {
        self.0.values().map(ParamValues::len).product()
    }
}

impl<K: Into<String>, V: Into<ParamValues>> FromIterator<(K, V)> for ParamCollection {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ParamCollection(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
