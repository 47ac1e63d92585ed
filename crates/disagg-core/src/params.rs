// Typed model of the per-rule-type parameter records consumed by the
// generated constructors. The translator validates these records before
// shipping them beside the generated code; the envelope fields are
// schema-checked, while rule-specific scalars flatten into an
// order-preserving map and surface as same-named rule parameters.

use indexmap::IndexMap;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{Result, TranslateError};

/// Serialized query descriptor: attribute map, relation map, an opaque
/// hex-encoded predicate blob, and the exact-match flag. The predicate
/// blob is decoded by the generated constructor, never here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QryRecord {
    #[serde(default)]
    pub attr: IndexMap<String, Value>,
    #[serde(default)]
    pub rel: IndexMap<String, Value>,
    #[serde(default)]
    pub cond: String,
    #[serde(default)]
    pub full: bool,
}

/// Temporal gate encodings: absent (unrestricted), a single iteration
/// point, a closed interval whose second bound of zero means "all
/// iterations up to the first bound", or a discrete iteration set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GateSpec {
    #[default]
    Always,
    Point(i64),
    Interval(i64, i64),
    Discrete(Vec<i64>),
}

impl GateSpec {
    /// Decode the JSON encoding: `null`, an integer, a two-element
    /// array, or a longer array. Anything else is a fatal translation
    /// error. A two-element array always reads as an interval; the
    /// serialized form cannot distinguish it from a two-element set.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(GateSpec::Always),
            Value::Number(n) => n
                .as_i64()
                .map(GateSpec::Point)
                .ok_or_else(|| TranslateError::UnknownGate(value.to_string())),
            Value::Array(items) => {
                let ints: Option<Vec<i64>> = items.iter().map(|v| v.as_i64()).collect();
                let ints = ints.ok_or_else(|| TranslateError::UnknownGate(value.to_string()))?;
                if ints.len() == 2 {
                    Ok(GateSpec::Interval(ints[0], ints[1]))
                } else {
                    Ok(GateSpec::Discrete(ints))
                }
            }
            other => Err(TranslateError::UnknownGate(other.to_string())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            GateSpec::Always => Value::Null,
            GateSpec::Point(p) => Value::from(*p),
            GateSpec::Interval(a, b) => Value::from(vec![*a, *b]),
            GateSpec::Discrete(items) => Value::from(items.clone()),
        }
    }

    /// Whether the gate passes at the given iteration; mirrors the
    /// dispatch logic the generated classes run.
    pub fn admits(&self, iteration: i64) -> bool {
        match self {
            GateSpec::Always => true,
            GateSpec::Point(p) => iteration == *p,
            GateSpec::Interval(lo, 0) => iteration <= *lo,
            GateSpec::Interval(lo, hi) => *lo <= iteration && iteration <= *hi,
            GateSpec::Discrete(items) => items.contains(&iteration),
        }
    }
}

impl Serialize for GateSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GateSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        GateSpec::from_value(&value).map_err(D::Error::custom)
    }
}

/// One per-rule-type parameter record, keyed by the rule-type name.
/// Everything outside the typed envelope lands in `params` and becomes a
/// same-named instance field of the rule at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRecord {
    pub rule_type: String,
    #[serde(default)]
    pub group_qry: Option<QryRecord>,
    #[serde(default)]
    pub i: GateSpec,
    #[serde(default)]
    pub t: GateSpec,
    #[serde(flatten)]
    pub params: IndexMap<String, Value>,
}

/// Parse and validate a parameter-record file (a JSON array with one
/// record per rule type).
pub fn load_records(json: &str) -> Result<Vec<ParamRecord>> {
    let records: Vec<ParamRecord> = serde_json::from_str(json)?;
    Ok(records)
}

/// Find the record for a rule type, if any. Base classes routinely have
/// no record of their own.
pub fn find_record<'a>(records: &'a [ParamRecord], rule_type: &str) -> Option<&'a ParamRecord> {
    records.iter().find(|r| r.rule_type == rule_type)
}
