//! Dictionary value model.
//!
//! The file format is a sequence of `key value;` and `key { ... }` entries
//! where values may be scalars, parenthesized lists, nested dictionaries, or
//! one of a handful of solver-specific tagged forms (fields, dimensioned
//! quantities). Key order is significant and preserved for round-trip
//! serialization.

use std::fmt;

/// A single parsed value in a dictionary entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    /// Switch value; serialized as `on`/`off`. Only produced by explicit
    /// construction (the parser keeps `on`/`true` as bare words).
    Bool(bool),
    /// Bare word token. Solver keywords may embed punctuation, e.g.
    /// `laplacian(nuEff,U)`.
    Word(String),
    /// Quoted string; stored without the surrounding quotes.
    Str(String),
    /// Macro reference such as `$p` or `$:a`. Passed through verbatim; the
    /// external solver performs the substitution.
    Macro(String),
    /// Multi-token right-hand side, e.g. `Gauss linear corrected`.
    Multi(Vec<Value>),
    /// Heterogeneous ordered list.
    List(Vec<Value>),
    /// Homogeneous integer list stored densely.
    IntList(Vec<i64>),
    /// Homogeneous numeric list stored densely.
    FloatList(Vec<f64>),
    Dict(Dictionary),
    Field(Field),
    Dimensions(Dimensions),
    /// Dimensioned quantity: `nu nu [0 2 -1 0 0 0 0] 1e-5;`
    DimValue {
        name: String,
        dims: Dimensions,
        value: Box<Value>,
    },
    /// Keyword-less directive entry preserved verbatim, e.g.
    /// `#includeEtc "caseDicts/setConstraintTypes"`.
    Directive { name: String, arg: Box<Value> },
}

impl Value {
    /// Word or quoted-string content, if this value is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Word(s) | Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Word(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Field declaration type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Uniform,
    Nonuniform,
}

/// A `uniform`/`nonuniform` field declaration.
///
/// Uniform fields carry a scalar or a short vector payload; non-uniform
/// fields carry a per-element list, optionally tagged with the element type
/// (`List<vector>` and friends).
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub ftype: FieldType,
    /// `List<T>` tag for non-uniform fields, when present in the input.
    pub list_type: Option<String>,
    pub value: Box<Value>,
}

impl Field {
    pub fn uniform(value: Value) -> Self {
        Field {
            ftype: FieldType::Uniform,
            list_type: None,
            value: Box::new(value),
        }
    }

    pub fn nonuniform(list_type: Option<String>, value: Value) -> Self {
        Field {
            ftype: FieldType::Nonuniform,
            list_type,
            value: Box::new(value),
        }
    }
}

/// Dimensional units of a quantity.
#[derive(Debug, Clone, PartialEq)]
pub enum Dimensions {
    /// Powers of the seven fundamental units (mass, length, time,
    /// temperature, quantity, current, luminous intensity). Five-entry
    /// inputs are zero-padded.
    Units([i64; 7]),
    /// Symbolic unit string, e.g. `[J/kg/K]`.
    Tag(String),
}

impl Dimensions {
    pub fn from_units(units: &[i64]) -> Self {
        let mut out = [0i64; 7];
        for (slot, uval) in out.iter_mut().zip(units.iter()) {
            *slot = *uval;
        }
        Dimensions::Units(out)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimensions::Units(units) => {
                write!(f, "[")?;
                for (i, uval) in units.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", uval)?;
                }
                write!(f, "]")
            }
            Dimensions::Tag(tag) => write!(f, "[{}]", tag),
        }
    }
}

/// Insertion-ordered mapping from keyword to value.
///
/// Duplicate keys are rejected within one scope; `insert` on an existing key
/// replaces the value in place so the original position survives a
/// read-modify-write cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: Vec<(String, Value)>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_dict(&self, key: &str) -> Option<&Dictionary> {
        self.get(key).and_then(Value::as_dict)
    }

    /// Insert a value, replacing an existing entry in place.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.get_mut(&key) {
            *slot = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Insert a keyword-less entry (directive or standalone macro) under a
    /// generated `<prefix>_NNN` key that does not collide with existing keys.
    pub fn insert_generated(&mut self, prefix: &str, value: Value) -> String {
        let mut idx = 0usize;
        loop {
            let key = format!("{}_{:03}", prefix, idx);
            if !self.contains_key(&key) {
                self.entries.push((key.clone(), value));
                return key;
            }
            idx += 1;
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Deep-merge entries from another dictionary into this one. Nested
    /// dictionaries merge recursively; any other value is replaced.
    pub fn merge(&mut self, other: &Dictionary) {
        for (key, value) in other.iter() {
            match (self.get_mut(key), value) {
                (Some(Value::Dict(mine)), Value::Dict(theirs)) => mine.merge(theirs),
                _ => self.insert(key, value.clone()),
            }
        }
    }
}

impl IntoIterator for Dictionary {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, Value)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut dict = Dictionary::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_preserves_position() {
        let mut dict = Dictionary::new();
        dict.insert("a", Value::Int(1));
        dict.insert("b", Value::Int(2));
        dict.insert("c", Value::Int(3));
        dict.insert("b", Value::Int(20));
        let keys: Vec<_> = dict.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(dict.get("b"), Some(&Value::Int(20)));
    }

    #[test]
    fn merge_is_recursive() {
        let mut base = Dictionary::new();
        let mut inner = Dictionary::new();
        inner.insert("solver", Value::from("PCG"));
        inner.insert("relTol", Value::Float(0.05));
        base.insert("p", Value::Dict(inner));

        let mut edit_inner = Dictionary::new();
        edit_inner.insert("relTol", Value::Float(0.0));
        let mut edits = Dictionary::new();
        edits.insert("p", Value::Dict(edit_inner));

        base.merge(&edits);
        let p = base.get_dict("p").unwrap();
        assert_eq!(p.get("solver").unwrap().as_str(), Some("PCG"));
        assert_eq!(p.get("relTol"), Some(&Value::Float(0.0)));
    }

    #[test]
    fn generated_keys_do_not_collide() {
        let mut dict = Dictionary::new();
        let k0 = dict.insert_generated("directive", Value::from("a"));
        let k1 = dict.insert_generated("directive", Value::from("b"));
        assert_eq!(k0, "directive_000");
        assert_eq!(k1, "directive_001");
    }
}
