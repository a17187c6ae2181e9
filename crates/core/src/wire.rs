//! Stored document schema for formulations and translation to and from the domain.
//!
//! Responsibilities:
//! - Define the document shape persisted by every [`crate::store::FormulationStore`]
//! - Tolerate older documents: missing fields, numbers stored as strings, rows without ids,
//!   and the two historical row schemas (`parts` and `percentage`)
//! - Provide YAML parse/render helpers that report the failing field path
//!
//! Notes:
//! - Every field is optional so that a partial record can be merged into a stored one
//! - Unknown keys are ignored rather than rejected, older clients wrote extra fields

use crate::coerce;
use crate::formulation::{Formulation, FormulationStatus};
use crate::identity::Owner;
use crate::row::{ComponentRow, QuantityBasis, RowId};
use crate::{FormulationError, FormulationId, FormulationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Wire types
// ============================================================================

/// A formulation document as persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_basis: Option<String>,
    #[serde(
        rename = "totalVolume_ml",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_volume_ml: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Vec<IngredientRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One component row as persisted.
///
/// Ratio documents use `parts`, percentage documents use `percentage`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Value>,
}

// ============================================================================
// YAML helpers
// ============================================================================

impl FormulationRecord {
    /// Parse a record from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`FormulationError::RecordSchema`] with the path of the offending field (e.g.
    /// `ingredients[0].materialName`) if the text does not match the document shape.
    pub fn parse_yaml(yaml_text: &str) -> FormulationResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        serde_path_to_error::deserialize::<_, FormulationRecord>(deserializer).map_err(|err| {
            let path = err.path().to_string();
            let path = if path.is_empty() || path == "." {
                "<root>".to_string()
            } else {
                path
            };
            FormulationError::RecordSchema {
                path,
                message: err.into_inner().to_string(),
            }
        })
    }

    pub fn render_yaml(&self) -> FormulationResult<String> {
        serde_yaml::to_string(self).map_err(FormulationError::YamlSerialization)
    }

    /// Overlays every field present in `incoming` onto `self`.
    pub fn merge(self, incoming: FormulationRecord) -> FormulationRecord {
        FormulationRecord {
            id: incoming.id.or(self.id),
            title: incoming.title.or(self.title),
            quantity_basis: incoming.quantity_basis.or(self.quantity_basis),
            total_volume_ml: incoming.total_volume_ml.or(self.total_volume_ml),
            status: incoming.status.or(self.status),
            tags: incoming.tags.or(self.tags),
            note: incoming.note.or(self.note),
            cover_url: incoming.cover_url.or(self.cover_url),
            is_public: incoming.is_public.or(self.is_public),
            ingredients: incoming.ingredients.or(self.ingredients),
            created_by: incoming.created_by.or(self.created_by),
            created_by_name: incoming.created_by_name.or(self.created_by_name),
            created_at: incoming.created_at.or(self.created_at),
            updated_at: incoming.updated_at.or(self.updated_at),
        }
    }

    /// The owner id, if recorded.
    pub fn owner_id(&self) -> Option<&str> {
        self.created_by.as_deref()
    }
}

// ============================================================================
// Translation
// ============================================================================

impl From<&Formulation> for FormulationRecord {
    fn from(f: &Formulation) -> Self {
        let basis = f.basis();
        let ingredients = f
            .rows()
            .iter()
            .map(|row| {
                let quantity = Some(Value::from(row.quantity));
                let (parts, percentage) = match basis {
                    QuantityBasis::Ratio => (quantity, None),
                    QuantityBasis::Percentage => (None, quantity),
                };
                IngredientRecord {
                    id: Some(row.id.to_string()),
                    material_name: Some(row.name.clone()),
                    parts,
                    percentage,
                }
            })
            .collect();

        FormulationRecord {
            id: Some(f.id().to_string()),
            title: Some(f.title().to_string()),
            quantity_basis: Some(basis.as_str().to_string()),
            total_volume_ml: Some(Value::from(f.batch_volume_ml())),
            status: Some(f.status().to_string()),
            tags: Some(f.tags().to_vec()),
            note: Some(f.notes().to_string()),
            cover_url: Some(f.cover_reference().unwrap_or_default().to_string()),
            is_public: Some(f.is_public()),
            ingredients: Some(ingredients),
            created_by: Some(f.owner().id.clone()),
            created_by_name: Some(f.owner().display_name.clone()),
            created_at: Some(f.created_at()),
            updated_at: Some(f.updated_at()),
        }
    }
}

impl FormulationRecord {
    /// Translates a stored record into the domain aggregate.
    ///
    /// Never fails: absent or malformed values fall back to defaults. The batch volume falls
    /// back to `default_batch_volume_ml` only when it is absent or non-numeric.
    pub fn into_formulation(
        self,
        id: FormulationId,
        default_batch_volume_ml: f64,
    ) -> Formulation {
        let ingredients = self.ingredients.unwrap_or_default();
        let basis = resolve_basis(self.quantity_basis.as_deref(), &ingredients);

        let rows = ingredients
            .into_iter()
            .map(|ingredient| {
                let raw = match basis {
                    QuantityBasis::Ratio => ingredient.parts.or(ingredient.percentage),
                    QuantityBasis::Percentage => ingredient.percentage.or(ingredient.parts),
                };
                ComponentRow {
                    id: ingredient
                        .id
                        .as_deref()
                        .and_then(RowId::parse)
                        .unwrap_or_else(RowId::generate),
                    name: ingredient.material_name.unwrap_or_default(),
                    quantity: raw.map(|v| basis.coerce(&v)).unwrap_or(0.0),
                }
            })
            .collect();

        let batch_volume_ml = self
            .total_volume_ml
            .as_ref()
            .and_then(coerce::strict_number)
            .unwrap_or(default_batch_volume_ml);

        let now = Utc::now();
        let created_at = self.created_at.or(self.updated_at).unwrap_or(now);
        let updated_at = self.updated_at.unwrap_or(created_at);

        Formulation {
            id,
            title: self.title.unwrap_or_default(),
            basis,
            rows,
            batch_volume_ml,
            status: self
                .status
                .map(FormulationStatus::from)
                .unwrap_or_default(),
            tags: self
                .tags
                .unwrap_or_default()
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            notes: self.note.unwrap_or_default(),
            is_public: self.is_public.unwrap_or(false),
            cover_reference: self.cover_url.filter(|c| !c.trim().is_empty()),
            owner: Owner {
                id: self.created_by.unwrap_or_default(),
                display_name: self.created_by_name.unwrap_or_default(),
            },
            created_at,
            updated_at,
        }
    }
}

/// Explicit basis wins; otherwise any row with `parts` means ratio, any row with only
/// `percentage` means percentage, and an empty document is ratio.
fn resolve_basis(explicit: Option<&str>, ingredients: &[IngredientRecord]) -> QuantityBasis {
    if let Some(raw) = explicit {
        match QuantityBasis::parse(raw) {
            Some(basis) => return basis,
            None => tracing::warn!("unknown quantity basis '{}', inferring from rows", raw),
        }
    }
    if ingredients.iter().any(|i| i.parts.is_some()) {
        QuantityBasis::Ratio
    } else if ingredients.iter().any(|i| i.percentage.is_some()) {
        QuantityBasis::Percentage
    } else {
        QuantityBasis::Ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_BATCH_VOLUME_ML;
    use crate::row::RowPatch;

    fn record_to_formulation(id: FormulationId, record: FormulationRecord) -> Formulation {
        record.into_formulation(id, DEFAULT_BATCH_VOLUME_ML)
    }

    fn id() -> FormulationId {
        FormulationId::parse("550e8400e29b41d4a716446655440000").unwrap()
    }

    #[test]
    fn test_legacy_parts_document() {
        let yaml = r#"
title: Old Recipe
totalVolume_ml: "250"
status: final
tags: [citrus, " ", fresh]
note: "Keep cool"
isPublic: true
ingredients:
  - id: r-1
    materialName: Bergamot
    parts: "30"
  - materialName: Lemon
    parts: abc
createdBy: u1
createdByName: Ada
"#;
        let f = record_to_formulation(id(), FormulationRecord::parse_yaml(yaml).unwrap());

        assert_eq!(f.title(), "Old Recipe");
        assert_eq!(f.basis(), QuantityBasis::Ratio);
        assert_eq!(f.batch_volume_ml(), 250.0);
        assert_eq!(f.status(), &FormulationStatus::Final);
        assert_eq!(f.tags(), ["citrus", "fresh"]);
        assert!(f.is_public());
        assert_eq!(f.rows()[0].id.as_str(), "r-1");
        assert_eq!(f.rows()[0].quantity, 30.0);
        assert_eq!(f.rows()[1].quantity, 0.0);
        assert!(!f.rows()[1].id.as_str().is_empty());
        assert_eq!(f.owner().id, "u1");
    }

    #[test]
    fn test_percentage_document_is_inferred() {
        let yaml = r#"
ingredients:
  - materialName: Rose
    percentage: 60
  - materialName: Musk
    percentage: 25
"#;
        let f = record_to_formulation(id(), FormulationRecord::parse_yaml(yaml).unwrap());
        assert_eq!(f.basis(), QuantityBasis::Percentage);
        assert_eq!(f.derive().totals.percentage_gap(), Some(15.0));
    }

    #[test]
    fn test_missing_volume_uses_default_and_garbage_too() {
        let f = FormulationRecord::default().into_formulation(id(), 750.0);
        assert_eq!(f.batch_volume_ml(), 750.0);

        let record = FormulationRecord {
            total_volume_ml: Some(Value::from("lots")),
            ..Default::default()
        };
        assert_eq!(record.into_formulation(id(), 500.0).batch_volume_ml(), 500.0);

        let record = FormulationRecord {
            total_volume_ml: Some(Value::from(0)),
            ..Default::default()
        };
        assert_eq!(record.into_formulation(id(), 500.0).batch_volume_ml(), 0.0);
    }

    #[test]
    fn test_empty_record_defaults() {
        let f = record_to_formulation(id(), FormulationRecord::default());
        assert_eq!(f.title(), "");
        assert_eq!(f.status(), &FormulationStatus::Draft);
        assert!(!f.is_public());
        assert_eq!(f.cover_reference(), None);
        assert!(f.rows().is_empty());
    }

    #[test]
    fn test_domain_round_trip_through_yaml() {
        let mut f = Formulation::seeded(Owner {
            id: "u1".into(),
            display_name: "Ada".into(),
        });
        let row = f.rows()[0].id.clone();
        f.update_row(&row, RowPatch::name("Ethanol 96%"));

        let text = FormulationRecord::from(&f).render_yaml().unwrap();
        assert!(text.contains("quantityBasis: ratio"));
        assert!(text.contains("totalVolume_ml: 500.0"));

        let back = record_to_formulation(
            f.id().clone(),
            FormulationRecord::parse_yaml(&text).unwrap(),
        );
        assert_eq!(back, f);
    }

    #[test]
    fn test_schema_mismatch_reports_path() {
        let yaml = "ingredients:\n  - materialName: [1, 2]\n";
        match FormulationRecord::parse_yaml(yaml) {
            Err(FormulationError::RecordSchema { path, .. }) => {
                assert!(path.contains("materialName"), "path was {path}");
            }
            other => panic!("expected RecordSchema error, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_keeps_stored_fields() {
        let stored = FormulationRecord {
            title: Some("Stored".into()),
            created_by: Some("u1".into()),
            note: Some("old".into()),
            ..Default::default()
        };
        let incoming = FormulationRecord {
            note: Some("new".into()),
            ..Default::default()
        };

        let merged = stored.merge(incoming);
        assert_eq!(merged.title.as_deref(), Some("Stored"));
        assert_eq!(merged.note.as_deref(), Some("new"));
        assert_eq!(merged.owner_id(), Some("u1"));
    }
}
