//! The formulation aggregate and its edit operations.
//!
//! Every mutating operation is permissive: malformed numbers are coerced, unknown row ids are
//! ignored, and nothing here returns an error. Each mutation refreshes the local `updated_at`;
//! the document store stamps the authoritative value on save.

use crate::constants::{DEFAULT_BATCH_VOLUME_ML, SEED_ROWS, UNTITLED_TITLE};
use crate::derive::{derive, Derivation};
use crate::identity::Owner;
use crate::row::{ComponentRow, QuantityBasis, RowId, RowPatch};
use crate::{coerce, FormulationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle status of a formulation.
///
/// `Draft` and `Final` are the recognised values; anything else read from a record is kept
/// verbatim in `Other`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FormulationStatus {
    #[default]
    Draft,
    Final,
    Other(String),
}

impl FormulationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Draft => "draft",
            Self::Final => "final",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for FormulationStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "draft" => Self::Draft,
            "final" => Self::Final,
            _ => Self::Other(value.trim().to_string()),
        }
    }
}

impl From<&str> for FormulationStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<FormulationStatus> for String {
    fn from(value: FormulationStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FormulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Splits a comma-separated tag list, trimming entries and dropping empty ones.
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Partial update of descriptive fields. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FormulationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    /// `Some(None)` clears the cover.
    #[serde(
        default,
        with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_reference: Option<Option<String>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Option<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

/// A single edit, as sent by an editor client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditCommand {
    /// Appends a row; the optional fields are applied to it straight away.
    AddRow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(
            default,
            alias = "parts",
            alias = "percentage",
            skip_serializing_if = "Option::is_none"
        )]
        quantity: Option<Value>,
    },
    RemoveRow {
        id: RowId,
    },
    UpdateRow {
        id: RowId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(
            default,
            alias = "parts",
            alias = "percentage",
            skip_serializing_if = "Option::is_none"
        )]
        quantity: Option<Value>,
    },
    SetBatchVolume {
        #[serde(alias = "volume_ml")]
        value: Value,
    },
    SetMetadata {
        #[serde(flatten)]
        patch: MetadataPatch,
    },
    ConvertBasis {
        basis: QuantityBasis,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    RowAdded { id: RowId },
    Applied,
    /// The command referenced something that does not exist; nothing changed.
    Ignored,
}

/// The aggregate root: a named, versioned recipe of component rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Formulation {
    pub(crate) id: FormulationId,
    pub(crate) title: String,
    pub(crate) basis: QuantityBasis,
    pub(crate) rows: Vec<ComponentRow>,
    pub(crate) batch_volume_ml: f64,
    pub(crate) status: FormulationStatus,
    pub(crate) tags: Vec<String>,
    pub(crate) notes: String,
    pub(crate) is_public: bool,
    pub(crate) cover_reference: Option<String>,
    pub(crate) owner: Owner,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Formulation {
    /// An empty, private draft owned by `owner`.
    pub fn new(owner: Owner, basis: QuantityBasis) -> Self {
        let now = Utc::now();
        Self {
            id: FormulationId::new(),
            title: String::new(),
            basis,
            rows: Vec::new(),
            batch_volume_ml: DEFAULT_BATCH_VOLUME_ML,
            status: FormulationStatus::Draft,
            tags: Vec::new(),
            notes: String::new(),
            is_public: false,
            cover_reference: None,
            owner,
            created_at: now,
            updated_at: now,
        }
    }

    /// A ratio draft pre-populated with the starter rows.
    pub fn seeded(owner: Owner) -> Self {
        let mut formulation = Self::new(owner, QuantityBasis::Ratio);
        formulation.rows = SEED_ROWS
            .iter()
            .map(|(name, parts)| ComponentRow::new(*name, *parts))
            .collect();
        formulation
    }

    pub fn id(&self) -> &FormulationId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The title as shown to users: blank titles read as "Untitled".
    pub fn display_title(&self) -> &str {
        let trimmed = self.title.trim();
        if trimmed.is_empty() {
            UNTITLED_TITLE
        } else {
            trimmed
        }
    }

    pub fn basis(&self) -> QuantityBasis {
        self.basis
    }

    pub fn rows(&self) -> &[ComponentRow] {
        &self.rows
    }

    pub fn row(&self, id: &RowId) -> Option<&ComponentRow> {
        self.rows.iter().find(|r| &r.id == id)
    }

    pub fn batch_volume_ml(&self) -> f64 {
        self.batch_volume_ml
    }

    pub fn status(&self) -> &FormulationStatus {
        &self.status
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub fn cover_reference(&self) -> Option<&str> {
        self.cover_reference.as_deref()
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Appends a blank row and returns its identifier.
    pub fn add_row(&mut self) -> RowId {
        let row = ComponentRow::blank();
        let id = row.id.clone();
        self.rows.push(row);
        self.touch();
        id
    }

    /// Removes the row with `id`. Returns `false` (and changes nothing) if it does not exist.
    pub fn remove_row(&mut self, id: &RowId) -> bool {
        let before = self.rows.len();
        self.rows.retain(|r| &r.id != id);
        let removed = self.rows.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Applies `patch` to the row with `id`. Returns `false` if no such row exists.
    pub fn update_row(&mut self, id: &RowId, patch: RowPatch) -> bool {
        let basis = self.basis;
        let Some(row) = self.rows.iter_mut().find(|r| &r.id == id) else {
            return false;
        };
        row.apply(patch, basis);
        self.touch();
        true
    }

    /// Sets the batch volume; negative or non-numeric input becomes `0`.
    pub fn set_batch_volume(&mut self, value: impl Into<Value>) {
        self.batch_volume_ml = coerce::number(&value.into());
        self.touch();
    }

    pub fn set_metadata(&mut self, patch: MetadataPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(notes) = patch.notes {
            self.notes = notes;
        }
        if let Some(is_public) = patch.is_public {
            self.is_public = is_public;
        }
        if let Some(cover) = patch.cover_reference {
            self.cover_reference = cover.filter(|c| !c.trim().is_empty());
        }
        self.touch();
    }

    /// Re-expresses every row in `target`, keeping the derived percentages unchanged.
    ///
    /// Ratio to percentage stores each row's derived percentage. Percentage to ratio uses the
    /// percentages as parts.
    pub fn convert_basis(&mut self, target: QuantityBasis) {
        if target == self.basis {
            return;
        }
        if target == QuantityBasis::Percentage {
            let derived = self.derive();
            for (row, shown) in self.rows.iter_mut().zip(derived.rows) {
                row.quantity = shown.derived_percentage;
            }
        }
        self.basis = target;
        self.touch();
    }

    /// Normalisation applied before every save: trims the title (blank becomes "Untitled") and
    /// trims the notes.
    pub fn prepare_for_save(&mut self) {
        self.title = self.display_title().to_string();
        self.notes = self.notes.trim().to_string();
    }

    pub fn derive(&self) -> Derivation {
        derive(&self.rows, self.basis, self.batch_volume_ml)
    }

    /// Derivation at a caller-supplied volume, without touching the stored batch volume.
    pub fn derive_at(&self, batch_volume_ml: f64) -> Derivation {
        derive(&self.rows, self.basis, batch_volume_ml)
    }

    pub fn apply(&mut self, command: EditCommand) -> EditOutcome {
        match command {
            EditCommand::AddRow { name, quantity } => {
                let id = self.add_row();
                if name.is_some() || quantity.is_some() {
                    self.update_row(&id, RowPatch { name, quantity });
                }
                EditOutcome::RowAdded { id }
            }
            EditCommand::RemoveRow { id } => outcome(self.remove_row(&id)),
            EditCommand::UpdateRow { id, name, quantity } => {
                outcome(self.update_row(&id, RowPatch { name, quantity }))
            }
            EditCommand::SetBatchVolume { value } => {
                self.set_batch_volume(value);
                EditOutcome::Applied
            }
            EditCommand::SetMetadata { patch } => {
                self.set_metadata(patch);
                EditOutcome::Applied
            }
            EditCommand::ConvertBasis { basis } => {
                self.convert_basis(basis);
                EditOutcome::Applied
            }
        }
    }

    /// Applies a batch of commands in order.
    ///
    /// The batch is applied to a copy and swapped in at the end, so `self` only ever holds the
    /// state before the batch or after all of it.
    pub fn apply_all(&mut self, commands: Vec<EditCommand>) -> Vec<EditOutcome> {
        let mut working = self.clone();
        let outcomes = commands
            .into_iter()
            .map(|command| working.apply(command))
            .collect();
        *self = working;
        outcomes
    }
}

fn outcome(changed: bool) -> EditOutcome {
    if changed {
        EditOutcome::Applied
    } else {
        EditOutcome::Ignored
    }
}
