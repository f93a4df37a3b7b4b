//! Parameter definitions and their experimental/computational encodings.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{MfResult, SearchSpaceError};

/// A single parameter dimension of a search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Human-readable parameter name (e.g. "temperature").
    pub name: String,
    /// The kind of range the parameter takes values from.
    #[serde(flatten)]
    pub kind: ParameterKind,
}

/// How categorical levels are encoded for the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalEncoding {
    /// One column per level, 1.0 for the active level.
    #[default]
    OneHot,
    /// A single column holding the level index.
    Integer,
}

/// Describes the values a parameter can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Continuous range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Explicit numerical levels.
    NumericalDiscrete { values: Vec<f64> },
    /// Categorical choices.
    Choice {
        values: Vec<serde_json::Value>,
        #[serde(default)]
        encoding: CategoricalEncoding,
    },
}

/// A concrete parameter value in experimental representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Self::Float(v) => v.is_nan(),
            Self::Int(_) => false,
            Self::Json(v) => v.is_null(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(serde_json::Value::String(s)) => write!(f, "{s}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Json(serde_json::Value::String(v.to_string()))
    }
}

impl ParameterDef {
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        }
    }

    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        }
    }

    pub fn numerical(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::NumericalDiscrete { values },
        }
    }

    pub fn choice(name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Choice {
                values,
                encoding: CategoricalEncoding::OneHot,
            },
        }
    }

    /// Switch a categorical parameter to the given encoding. No-op for others.
    pub fn with_encoding(mut self, encoding: CategoricalEncoding) -> Self {
        if let ParameterKind::Choice { encoding: e, .. } = &mut self.kind {
            *e = encoding;
        }
        self
    }

    /// Whether the parameter belongs to the discrete subspace.
    pub fn is_discrete(&self) -> bool {
        !matches!(self.kind, ParameterKind::FloatRange { .. })
    }

    /// Check that the definition describes a non-empty, finite domain.
    pub fn validate(&self) -> MfResult<()> {
        let invalid = |message: &str| SearchSpaceError::InvalidParameter {
            name: self.name.clone(),
            message: message.to_string(),
        };

        match &self.kind {
            ParameterKind::FloatRange { low, high } => {
                if !low.is_finite() || !high.is_finite() {
                    return Err(invalid("bounds must be finite").into());
                }
                if low > high {
                    return Err(invalid("lower bound exceeds upper bound").into());
                }
            }
            ParameterKind::IntRange { low, high } => {
                if low > high {
                    return Err(invalid("lower bound exceeds upper bound").into());
                }
            }
            ParameterKind::NumericalDiscrete { values } => {
                if values.is_empty() {
                    return Err(invalid("at least one level is required").into());
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(invalid("levels must be finite").into());
                }
            }
            ParameterKind::Choice { values, .. } => {
                if values.is_empty() {
                    return Err(invalid("at least one level is required").into());
                }
                for (i, v) in values.iter().enumerate() {
                    if values[..i].contains(v) {
                        return Err(invalid(&format!("duplicate level {v}")).into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Experimental levels of a discrete parameter (`None` for continuous ones).
    pub fn levels(&self) -> Option<Vec<ParameterValue>> {
        match &self.kind {
            ParameterKind::FloatRange { .. } => None,
            ParameterKind::IntRange { low, high } => {
                Some((*low..=*high).map(ParameterValue::Int).collect())
            }
            ParameterKind::NumericalDiscrete { values } => {
                Some(values.iter().copied().map(ParameterValue::Float).collect())
            }
            ParameterKind::Choice { values, .. } => {
                Some(values.iter().cloned().map(ParameterValue::Json).collect())
            }
        }
    }

    /// Bounds of a continuous parameter.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self.kind {
            ParameterKind::FloatRange { low, high } => Some((low, high)),
            _ => None,
        }
    }

    /// Names of the computational columns this parameter expands into.
    pub fn comp_columns(&self) -> Vec<String> {
        match &self.kind {
            ParameterKind::Choice {
                values,
                encoding: CategoricalEncoding::OneHot,
            } => values
                .iter()
                .map(|v| format!("{}_{}", self.name, ParameterValue::Json(v.clone())))
                .collect(),
            _ => vec![self.name.clone()],
        }
    }

    /// Whether `value` lies in the parameter's domain.
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match &self.kind {
            ParameterKind::FloatRange { low, high } => value
                .as_f64()
                .is_some_and(|v| v >= *low && v <= *high),
            ParameterKind::IntRange { low, high } => value
                .as_f64()
                .is_some_and(|v| v.fract() == 0.0 && v >= *low as f64 && v <= *high as f64),
            ParameterKind::NumericalDiscrete { values } => value
                .as_f64()
                .is_some_and(|v| values.iter().any(|level| *level == v)),
            ParameterKind::Choice { values, .. } => level_index(values, value).is_some(),
        }
    }

    /// Computational representation of a single value.
    pub fn encode(&self, value: &ParameterValue) -> MfResult<Vec<f64>> {
        let reject = || SearchSpaceError::InvalidValue {
            name: self.name.clone(),
            value: value.to_string(),
        };
        if !self.contains(value) {
            return Err(reject().into());
        }

        match &self.kind {
            ParameterKind::Choice { values, encoding } => {
                let idx = level_index(values, value).ok_or_else(reject)?;
                Ok(match encoding {
                    CategoricalEncoding::OneHot => {
                        let mut row = vec![0.0; values.len()];
                        row[idx] = 1.0;
                        row
                    }
                    CategoricalEncoding::Integer => vec![idx as f64],
                })
            }
            _ => Ok(vec![value.as_f64().ok_or_else(reject)?]),
        }
    }
}

/// Position of `value` among categorical `levels`, tolerating numeric
/// representations that differ only in integer/float form.
fn level_index(levels: &[serde_json::Value], value: &ParameterValue) -> Option<usize> {
    levels.iter().position(|level| match value {
        ParameterValue::Json(v) if v == level => true,
        other => match (level.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    })
}
