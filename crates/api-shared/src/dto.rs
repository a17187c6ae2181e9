//! Request and response bodies of the public API.

use mixlab_core::{
    coerce, Derivation, EditCommand, EditOutcome, Formulation, MetadataPatch, QuantityBasis,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateFormulationReq {
    #[serde(default)]
    pub title: Option<String>,
    /// `ratio` (default) or `percentage`.
    #[serde(default)]
    pub basis: Option<String>,
    /// Start with the starter rows.
    #[serde(default)]
    pub seeded: bool,
    /// Batch volume in ml; malformed values become `0`.
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub batch_volume_ml: Option<Value>,
}

impl CreateFormulationReq {
    /// The requested basis; unknown values are an error.
    pub fn quantity_basis(&self) -> Result<QuantityBasis, String> {
        match self.basis.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            None => Ok(QuantityBasis::Ratio),
            Some(raw) => QuantityBasis::parse(raw).ok_or_else(|| format!("unknown basis: {raw}")),
        }
    }

    /// The requested batch volume, coerced; `None` when not given.
    pub fn requested_batch_volume(&self) -> Option<f64> {
        coerce::optional_override(self.batch_volume_ml.as_ref())
    }
}

/// A batch of edits applied atomically and then saved.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct EditFormulationReq {
    /// Each command is an object with an `op` of `add_row`, `remove_row`, `update_row`,
    /// `set_batch_volume`, `set_metadata` or `convert_basis`.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub commands: Vec<EditCommand>,
    /// Shorthand for a trailing `set_metadata` command.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<MetadataPatch>,
}

impl EditFormulationReq {
    pub fn into_commands(self) -> Vec<EditCommand> {
        let mut commands = self.commands;
        if let Some(patch) = self.metadata {
            commands.push(EditCommand::SetMetadata { patch });
        }
        commands
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RowRes {
    pub id: String,
    pub position: usize,
    pub name: String,
    /// Parts or percentage, per the formulation's basis.
    pub quantity: f64,
    pub derived_percentage: f64,
    pub derived_volume_ml: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TotalsRes {
    pub basis: String,
    pub total_parts: Option<f64>,
    pub total_percentage: Option<f64>,
    /// Distance from 100 for percentage formulations.
    pub percentage_gap: Option<f64>,
    pub derived_percentage_total: f64,
    pub volume_total_ml: f64,
    pub row_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DerivationRes {
    pub batch_volume_ml: f64,
    pub rows: Vec<RowRes>,
    pub totals: TotalsRes,
}

impl From<&Derivation> for DerivationRes {
    fn from(d: &Derivation) -> Self {
        Self {
            batch_volume_ml: d.batch_volume_ml,
            rows: d
                .rows
                .iter()
                .map(|row| RowRes {
                    id: row.id.to_string(),
                    position: row.position,
                    name: row.name.clone(),
                    quantity: row.spec.amount(),
                    derived_percentage: row.derived_percentage,
                    derived_volume_ml: row.derived_volume_ml,
                })
                .collect(),
            totals: TotalsRes {
                basis: d.totals.basis.to_string(),
                total_parts: d.totals.total_ratio_parts(),
                total_percentage: d.totals.total_percentage(),
                percentage_gap: d.totals.percentage_gap(),
                derived_percentage_total: d.totals.derived_percentage_total,
                volume_total_ml: d.totals.volume_total_ml,
                row_count: d.totals.row_count,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FormulationRes {
    pub id: String,
    pub title: String,
    pub basis: String,
    pub batch_volume_ml: f64,
    pub status: String,
    pub tags: Vec<String>,
    pub notes: String,
    pub is_public: bool,
    pub cover_reference: Option<String>,
    pub cover_url: Option<String>,
    pub owner_id: String,
    pub owner_name: String,
    pub created_at: String,
    pub updated_at: String,
    pub derived: DerivationRes,
}

impl FormulationRes {
    pub fn new(f: &Formulation, cover_url: Option<String>) -> Self {
        Self {
            id: f.id().to_string(),
            title: f.title().to_string(),
            basis: f.basis().to_string(),
            batch_volume_ml: f.batch_volume_ml(),
            status: f.status().to_string(),
            tags: f.tags().to_vec(),
            notes: f.notes().to_string(),
            is_public: f.is_public(),
            cover_reference: f.cover_reference().map(str::to_string),
            cover_url,
            owner_id: f.owner().id.clone(),
            owner_name: f.owner().display_name.clone(),
            created_at: f.created_at().to_rfc3339(),
            updated_at: f.updated_at().to_rfc3339(),
            derived: DerivationRes::from(&f.derive()),
        }
    }
}

/// One entry of a listing.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FormulationSummary {
    pub id: String,
    pub title: String,
    pub status: String,
    pub is_public: bool,
    pub row_count: usize,
    pub tags: Vec<String>,
    pub updated_at: String,
}

impl From<&Formulation> for FormulationSummary {
    fn from(f: &Formulation) -> Self {
        Self {
            id: f.id().to_string(),
            title: f.display_title().to_string(),
            status: f.status().to_string(),
            is_public: f.is_public(),
            row_count: f.rows().len(),
            tags: f.tags().to_vec(),
            updated_at: f.updated_at().to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListFormulationsRes {
    pub formulations: Vec<FormulationSummary>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct EditFormulationRes {
    pub formulation: FormulationRes,
    #[schema(value_type = Vec<Object>)]
    pub outcomes: Vec<EditOutcome>,
}
