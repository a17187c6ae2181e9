//! Component rows and their quantity specifications.

use crate::coerce;
use mixlab_uuid::ShardableUuid;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How the quantities of a formulation's rows are expressed.
///
/// A formulation uses exactly one basis for all of its rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityBasis {
    /// Relative weights; percentages are derived from the sum.
    #[default]
    Ratio,
    /// Direct percentages of the batch, each in `[0, 100]`.
    Percentage,
}

impl QuantityBasis {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ratio => "ratio",
            Self::Percentage => "percentage",
        }
    }

    /// Parses `"ratio"`/`"parts"` or `"percentage"`/`"percent"`, case-insensitively.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "ratio" | "parts" => Some(Self::Ratio),
            "percentage" | "percent" | "pct" => Some(Self::Percentage),
            _ => None,
        }
    }

    /// Coerces a loosely-typed quantity into the valid range of this basis.
    pub fn coerce(self, value: &Value) -> f64 {
        match self {
            Self::Ratio => coerce::number(value),
            Self::Percentage => coerce::percentage(value),
        }
    }
}

impl fmt::Display for QuantityBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row's quantity, tagged with the basis it is expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "lowercase")]
pub enum QuantitySpec {
    Ratio { parts: f64 },
    Percentage { value: f64 },
}

impl QuantitySpec {
    pub fn basis(&self) -> QuantityBasis {
        match self {
            Self::Ratio { .. } => QuantityBasis::Ratio,
            Self::Percentage { .. } => QuantityBasis::Percentage,
        }
    }

    /// The raw number regardless of basis.
    pub fn amount(&self) -> f64 {
        match *self {
            Self::Ratio { parts } => parts,
            Self::Percentage { value } => value,
        }
    }
}

/// Opaque, stable identifier of a component row.
///
/// New rows get a canonical UUID. Identifiers read from older records are kept verbatim so
/// references to them keep working; they are never interpreted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn generate() -> Self {
        Self(ShardableUuid::new().to_string())
    }

    /// Wraps an existing identifier, or returns `None` if it is blank.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One component of a formulation.
///
/// `quantity` is interpreted through the owning formulation's [`QuantityBasis`]; use
/// [`ComponentRow::spec`] to get the tagged form.
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentRow {
    pub id: RowId,
    pub name: String,
    pub quantity: f64,
}

impl ComponentRow {
    /// A fresh row with an empty name and zero quantity.
    pub fn blank() -> Self {
        Self {
            id: RowId::generate(),
            name: String::new(),
            quantity: 0.0,
        }
    }

    pub fn new(name: impl Into<String>, quantity: f64) -> Self {
        Self {
            id: RowId::generate(),
            name: name.into(),
            quantity: coerce::non_negative(quantity),
        }
    }

    pub fn spec(&self, basis: QuantityBasis) -> QuantitySpec {
        match basis {
            QuantityBasis::Ratio => QuantitySpec::Ratio {
                parts: self.quantity,
            },
            QuantityBasis::Percentage => QuantitySpec::Percentage {
                value: self.quantity,
            },
        }
    }

    /// Same content under a newly generated identifier.
    pub fn with_fresh_id(&self) -> Self {
        Self {
            id: RowId::generate(),
            name: self.name.clone(),
            quantity: self.quantity,
        }
    }

    pub(crate) fn apply(&mut self, patch: RowPatch, basis: QuantityBasis) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(quantity) = patch.quantity {
            self.quantity = basis.coerce(&quantity);
        }
    }
}

/// Partial update of a row. Absent fields are left untouched.
///
/// The quantity is accepted under `quantity`, `parts`, `percentage` or `value`, and in any JSON
/// shape; it is coerced on application.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowPatch {
    #[serde(default, alias = "materialName", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        alias = "parts",
        alias = "percentage",
        alias = "value",
        skip_serializing_if = "Option::is_none"
    )]
    pub quantity: Option<Value>,
}

impl RowPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            quantity: None,
        }
    }

    pub fn quantity(quantity: impl Into<Value>) -> Self {
        Self {
            name: None,
            quantity: Some(quantity.into()),
        }
    }
}
