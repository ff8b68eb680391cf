//! Snapshot codec: lowers an engine's observable output to plain JSON.
//!
//! Engines describe one tick of output as a [`SnapshotValue`]. Two of its
//! shapes have no native JSON form, numeric arrays and sets, so the codec
//! rewrites them before anything reaches the state file:
//!   - a numeric array becomes nested sequences matching its own shape
//!   - a set becomes a sequence (element order carries no meaning)
//!   - a mapping keeps its keys and their order, values converted recursively
//!   - a sequence is converted element by element
//!   - scalars pass through unchanged
//!
//! RULE: conversion is pure. The same input always yields the same output,
//! and nothing here touches the filesystem.

use crate::error::{HostError, HostResult};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde_json::{Number, Value};
use std::collections::BTreeSet;

/// One tick of observable simulation state.
///
/// The value is a tree; cycles cannot be expressed, so conversion always
/// terminates.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(NumericArray),
    Set(BTreeSet<SetElement>),
    Seq(Vec<SnapshotValue>),
    Map(IndexMap<String, SnapshotValue>),
}

/// A hashable scalar that may appear as a set member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SetElement {
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
}

/// Backing storage of a [`NumericArray`], row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
}

/// Most empty sequences a data-less array may expand into, e.g. the
/// outer `4096` of shape `[4096, 0]`.
pub const MAX_EMPTY_EXPANSION: usize = 1 << 16;

/// An n-dimensional numeric array with an explicit shape.
///
/// A zero-dimensional array (empty shape) holds exactly one element and
/// encodes as a bare scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    shape: Vec<usize>,
    data:  ArrayData,
}

// ── Conversion ─────────────────────────────────────────────────

/// Convert a snapshot into a JSON-only value.
pub fn to_json_value(value: &SnapshotValue) -> Value {
    match value {
        SnapshotValue::Null       => Value::Null,
        SnapshotValue::Bool(b)    => Value::Bool(*b),
        SnapshotValue::Int(i)     => Value::from(*i),
        SnapshotValue::Float(f)   => float_to_json(*f),
        SnapshotValue::Str(s)     => Value::String(s.clone()),
        SnapshotValue::Array(a)   => a.to_json(),
        SnapshotValue::Set(items) => Value::Array(items.iter().map(SetElement::to_json).collect()),
        SnapshotValue::Seq(items) => Value::Array(items.iter().map(to_json_value).collect()),
        SnapshotValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_json_value(v)))
                .collect(),
        ),
    }
}

/// JSON has no NaN or infinity; those encode as null.
fn float_to_json(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

impl SnapshotValue {
    pub fn to_json(&self) -> Value {
        to_json_value(self)
    }

    /// Build a mapping, keeping the iteration order of `entries`.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, SnapshotValue)>,
    {
        SnapshotValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn set<E, I>(elements: I) -> Self
    where
        E: Into<SetElement>,
        I: IntoIterator<Item = E>,
    {
        SnapshotValue::Set(elements.into_iter().map(Into::into).collect())
    }
}

impl SetElement {
    fn to_json(&self) -> Value {
        match self {
            SetElement::Bool(b)  => Value::Bool(*b),
            SetElement::Int(i)   => Value::from(*i),
            SetElement::Float(f) => float_to_json(f.into_inner()),
            SetElement::Str(s)   => Value::String(s.clone()),
        }
    }
}

// ── Numeric arrays ─────────────────────────────────────────────

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Int(v)   => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Bool(v)  => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn element(&self, index: usize) -> Value {
        match self {
            ArrayData::Int(v)   => Value::from(v[index]),
            ArrayData::Float(v) => float_to_json(v[index]),
            ArrayData::Bool(v)  => Value::Bool(v[index]),
        }
    }
}

impl NumericArray {
    /// Wrap row-major `data` with `shape`. Fails when the element count
    /// does not match the product of the dimensions, or when the shape
    /// would expand into more nested sequences than can be encoded.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> HostResult<Self> {
        let Some(expected) = encodable_volume(&shape) else {
            return Err(HostError::ShapeTooLarge { shape });
        };
        if expected != data.len() {
            return Err(HostError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional float array.
    pub fn from_floats(values: Vec<f64>) -> Self {
        Self { shape: vec![values.len()], data: ArrayData::Float(values) }
    }

    /// One-dimensional integer array.
    pub fn from_ints(values: Vec<i64>) -> Self {
        Self { shape: vec![values.len()], data: ArrayData::Int(values) }
    }

    /// Two-dimensional float array from equal-length rows.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> HostResult<Self> {
        let cols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        if let Some(ragged) = rows.iter().find(|r| r.as_ref().len() != cols) {
            return Err(HostError::ShapeMismatch {
                shape:    vec![rows.len(), cols],
                expected: cols,
                actual:   ragged.as_ref().len(),
            });
        }
        let data: Vec<f64> = rows
            .iter()
            .flat_map(|r| r.as_ref().iter().copied())
            .collect();
        Self::new(vec![rows.len(), cols], ArrayData::Float(data))
    }

    /// Zero-dimensional array holding a single float.
    pub fn scalar(value: f64) -> Self {
        Self { shape: Vec::new(), data: ArrayData::Float(vec![value]) }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Nested JSON sequences mirroring the array's shape.
    pub fn to_json(&self) -> Value {
        nest(&self.shape, &self.data, 0)
    }
}

/// Element count of `shape`, or `None` when encoding it is not possible.
///
/// Dimensions in front of the first zero-length one are still expanded
/// into empty sequences, so their product is bounded by
/// [`MAX_EMPTY_EXPANSION`] even though the array holds no data.
fn encodable_volume(shape: &[usize]) -> Option<usize> {
    let mut outer: usize = 1;
    for &dim in shape {
        if dim == 0 {
            return (outer <= MAX_EMPTY_EXPANSION).then_some(0);
        }
        outer = outer.checked_mul(dim)?;
    }
    Some(outer)
}

fn nest(shape: &[usize], data: &ArrayData, offset: usize) -> Value {
    match shape.split_first() {
        None => data.element(offset),
        Some((&0, _)) => Value::Array(Vec::new()),
        Some((&dim, rest)) => {
            let stride: usize = rest.iter().product();
            Value::Array(
                (0..dim)
                    .map(|i| nest(rest, data, offset + i * stride))
                    .collect(),
            )
        }
    }
}

// ── From impls ─────────────────────────────────────────────────

impl From<bool> for SnapshotValue {
    fn from(b: bool) -> Self { SnapshotValue::Bool(b) }
}

impl From<i64> for SnapshotValue {
    fn from(i: i64) -> Self { SnapshotValue::Int(i) }
}

impl From<u64> for SnapshotValue {
    fn from(u: u64) -> Self {
        i64::try_from(u).map(SnapshotValue::Int).unwrap_or(SnapshotValue::Float(u as f64))
    }
}

impl From<f64> for SnapshotValue {
    fn from(f: f64) -> Self { SnapshotValue::Float(f) }
}

impl From<&str> for SnapshotValue {
    fn from(s: &str) -> Self { SnapshotValue::Str(s.to_string()) }
}

impl From<String> for SnapshotValue {
    fn from(s: String) -> Self { SnapshotValue::Str(s) }
}

impl From<NumericArray> for SnapshotValue {
    fn from(a: NumericArray) -> Self { SnapshotValue::Array(a) }
}

impl From<Vec<SnapshotValue>> for SnapshotValue {
    fn from(items: Vec<SnapshotValue>) -> Self { SnapshotValue::Seq(items) }
}

impl From<BTreeSet<SetElement>> for SnapshotValue {
    fn from(items: BTreeSet<SetElement>) -> Self { SnapshotValue::Set(items) }
}

impl From<IndexMap<String, SnapshotValue>> for SnapshotValue {
    fn from(entries: IndexMap<String, SnapshotValue>) -> Self { SnapshotValue::Map(entries) }
}

/// Engines that already speak JSON can hand their output over unchanged.
impl From<Value> for SnapshotValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null      => SnapshotValue::Null,
            Value::Bool(b)   => SnapshotValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SnapshotValue::Int(i),
                None    => SnapshotValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SnapshotValue::Str(s),
            Value::Array(items) => {
                SnapshotValue::Seq(items.into_iter().map(SnapshotValue::from).collect())
            }
            Value::Object(entries) => SnapshotValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, SnapshotValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for SetElement {
    fn from(b: bool) -> Self { SetElement::Bool(b) }
}

impl From<i64> for SetElement {
    fn from(i: i64) -> Self { SetElement::Int(i) }
}

impl From<usize> for SetElement {
    fn from(u: usize) -> Self {
        i64::try_from(u).map(SetElement::Int).unwrap_or(SetElement::Float(OrderedFloat(u as f64)))
    }
}

impl From<f64> for SetElement {
    fn from(f: f64) -> Self { SetElement::Float(OrderedFloat(f)) }
}

impl From<&str> for SetElement {
    fn from(s: &str) -> Self { SetElement::Str(s.to_string()) }
}

impl From<String> for SetElement {
    fn from(s: String) -> Self { SetElement::Str(s) }
}
