// used to order and compare literals of mixed types
use std::cmp::Ordering;
// used to print out readable forms of a data type
use std::fmt;
// used to indicate that data types need to be hashable
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Any Rust type that can be stored as an opaque literal in a triple.
pub trait DataType {
    // static stuff which needs to be implemented downstream
    const UID: u8;
    const DATA_TYPE: &'static str;
    fn into_literal(self) -> Literal;
}

impl DataType for String {
    const UID: u8 = 1;
    const DATA_TYPE: &'static str = "Text";
    fn into_literal(self) -> Literal {
        Literal::Text(Arc::from(self))
    }
}
impl DataType for &str {
    const UID: u8 = 1;
    const DATA_TYPE: &'static str = "Text";
    fn into_literal(self) -> Literal {
        Literal::Text(Arc::from(self))
    }
}
impl DataType for i64 {
    const UID: u8 = 2;
    const DATA_TYPE: &'static str = "Integer";
    fn into_literal(self) -> Literal {
        Literal::Integer(self)
    }
}
impl DataType for f64 {
    const UID: u8 = 3;
    const DATA_TYPE: &'static str = "Float";
    fn into_literal(self) -> Literal {
        Literal::Float(self)
    }
}
impl DataType for bool {
    const UID: u8 = 4;
    const DATA_TYPE: &'static str = "Boolean";
    fn into_literal(self) -> Literal {
        Literal::Boolean(self)
    }
}

// ------------- Literal -------------
/// An opaque, immutable literal value.
///
/// Floats compare by their IEEE total order so that literals can live in hash
/// sets and be sorted deterministically.
#[derive(Clone, Debug)]
pub enum Literal {
    Text(Arc<str>),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Literal {
    pub fn data_type(&self) -> &'static str {
        match self {
            Literal::Text(_) => <String as DataType>::DATA_TYPE,
            Literal::Integer(_) => <i64 as DataType>::DATA_TYPE,
            Literal::Float(_) => <f64 as DataType>::DATA_TYPE,
            Literal::Boolean(_) => <bool as DataType>::DATA_TYPE,
        }
    }
    pub fn identifier(&self) -> u8 {
        match self {
            Literal::Text(_) => <String as DataType>::UID,
            Literal::Integer(_) => <i64 as DataType>::UID,
            Literal::Float(_) => <f64 as DataType>::UID,
            Literal::Boolean(_) => <bool as DataType>::UID,
        }
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Literal::Text(s) => Some(s),
            _ => None,
        }
    }
    /// Converts a JSON scalar. Objects, arrays and null have no literal form,
    /// and neither do integers outside the `i64` range.
    pub fn from_json(json: &serde_json::Value) -> Option<Literal> {
        match json {
            serde_json::Value::String(s) => Some(Literal::Text(Arc::from(s.as_str()))),
            serde_json::Value::Bool(b) => Some(Literal::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Literal::Integer(i)),
                None if n.is_u64() => None,
                None => n.as_f64().map(Literal::Float),
            },
            _ => None,
        }
    }
    // booleans < numbers < text, with integers and floats compared numerically
    fn rank(&self) -> u8 {
        match self {
            Literal::Boolean(_) => 0,
            Literal::Integer(_) | Literal::Float(_) => 1,
            Literal::Text(_) => 2,
        }
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Literal {}

impl Ord for Literal {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Literal::Text(a), Literal::Text(b)) => a.cmp(b),
            (Literal::Integer(a), Literal::Integer(b)) => a.cmp(b),
            (Literal::Float(a), Literal::Float(b)) => a.total_cmp(b),
            (Literal::Boolean(a), Literal::Boolean(b)) => a.cmp(b),
            // an integer and a float are never equal, even when numerically so
            (Literal::Integer(a), Literal::Float(b)) => {
                (*a as f64).total_cmp(b).then(Ordering::Less)
            }
            (Literal::Float(a), Literal::Integer(b)) => {
                a.total_cmp(&(*b as f64)).then(Ordering::Greater)
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}
impl PartialOrd for Literal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier().hash(state);
        match self {
            Literal::Text(s) => s.hash(state),
            Literal::Integer(i) => i.hash(state),
            Literal::Float(f) => f.to_bits().hash(state),
            Literal::Boolean(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Literal::Text(s) => write!(f, "{}", s),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl Serialize for Literal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Literal::Text(s) => serializer.serialize_str(s),
            Literal::Integer(i) => serializer.serialize_i64(*i),
            Literal::Float(x) => serializer.serialize_f64(*x),
            Literal::Boolean(b) => serializer.serialize_bool(*b),
        }
    }
}

impl<T: DataType> From<T> for Literal {
    fn from(value: T) -> Self {
        value.into_literal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_and_floats_stay_distinct() {
        let one = Literal::from(1i64);
        let one_f = Literal::from(1.0f64);
        assert_ne!(one, one_f);
        assert!(one < one_f);
        assert!(Literal::from(2i64) > one_f);
    }

    #[test]
    fn mixed_types_order_by_rank() {
        let mut literals = vec![
            Literal::from("b"),
            Literal::from(3i64),
            Literal::from(true),
            Literal::from("a"),
        ];
        literals.sort();
        assert_eq!(
            literals,
            vec![
                Literal::from(true),
                Literal::from(3i64),
                Literal::from("a"),
                Literal::from("b")
            ]
        );
    }

    #[test]
    fn json_integers_must_fit_in_i64() {
        use serde_json::json;
        assert_eq!(Literal::from_json(&json!(i64::MAX)), Some(Literal::Integer(i64::MAX)));
        assert_eq!(Literal::from_json(&json!(-7)), Some(Literal::Integer(-7)));
        assert_eq!(Literal::from_json(&json!(2.5)), Some(Literal::Float(2.5)));
        assert_eq!(Literal::from_json(&json!(u64::MAX)), None);
        assert!(crate::fact::Fact::from_json(&json!(["a", "thing:size", u64::MAX])).is_err());
    }
}
