//! Self-contained export snapshots.
//!
//! A snapshot holds everything a renderer needs: no further lookups, no remote references.
//! The cover image, if any, is embedded inline.

use crate::derive::Derivation;
use crate::formulation::Formulation;
use crate::row::QuantityBasis;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

/// Image bytes embedded as base64.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InlineImage {
    pub media_type: String,
    pub data_base64: String,
}

impl InlineImage {
    pub fn new(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            data_base64: STANDARD.encode(bytes),
        }
    }

    /// `data:<media type>;base64,<payload>`
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data_base64)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportRow {
    /// 1-based.
    pub index: usize,
    pub material: String,
    /// Only present for ratio formulations.
    pub parts: Option<f64>,
    pub percentage: f64,
    pub amount_ml: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportTotals {
    pub parts: Option<f64>,
    pub percentage: f64,
    pub amount_ml: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExportFooter {
    pub updated_at_text: Option<String>,
    pub user_email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportSnapshot {
    pub formulation_id: String,
    pub title: String,
    pub basis: QuantityBasis,
    pub batch_volume_ml: f64,
    pub status: String,
    pub tags: Vec<String>,
    pub cover: Option<InlineImage>,
    /// Markdown source, rendered by the consumer.
    pub notes: String,
    pub rows: Vec<ExportRow>,
    pub totals: ExportTotals,
    pub footer: ExportFooter,
}

impl ExportSnapshot {
    /// Builds a snapshot at `volume_ml`, or at the stored batch volume when `None`.
    ///
    /// The caller resolves the cover beforehand; an unavailable cover is passed as `None`.
    pub fn build(
        formulation: &Formulation,
        volume_ml: Option<f64>,
        cover: Option<InlineImage>,
        footer: ExportFooter,
    ) -> Self {
        let derivation = match volume_ml {
            Some(volume) => formulation.derive_at(volume),
            None => formulation.derive(),
        };
        Self::from_derivation(formulation, &derivation, cover, footer)
    }

    fn from_derivation(
        formulation: &Formulation,
        derivation: &Derivation,
        cover: Option<InlineImage>,
        footer: ExportFooter,
    ) -> Self {
        let is_ratio = formulation.basis() == QuantityBasis::Ratio;
        let rows = derivation
            .rows
            .iter()
            .map(|row| ExportRow {
                index: row.position,
                material: row.name.clone(),
                parts: is_ratio.then(|| row.spec.amount()),
                percentage: row.derived_percentage,
                amount_ml: row.derived_volume_ml,
            })
            .collect();

        Self {
            formulation_id: formulation.id().to_string(),
            title: formulation.display_title().to_string(),
            basis: formulation.basis(),
            batch_volume_ml: derivation.batch_volume_ml,
            status: formulation.status().to_string(),
            tags: formulation.tags().to_vec(),
            cover,
            notes: formulation.notes().to_string(),
            rows,
            totals: ExportTotals {
                parts: derivation.totals.total_ratio_parts(),
                percentage: derivation.totals.derived_percentage_total,
                amount_ml: derivation.totals.volume_total_ml,
            },
            footer,
        }
    }
}
