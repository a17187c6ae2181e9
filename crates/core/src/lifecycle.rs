//! Status and visibility transitions, and duplication.
//!
//! Status and visibility are independent axes: a draft may be public and a final formulation
//! may stay private.

use crate::constants::COPY_SUFFIX;
use crate::formulation::{Formulation, FormulationStatus};
use crate::identity::{Actor, Owner};
use crate::FormulationId;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    pub fn from_public(is_public: bool) -> Self {
        if is_public {
            Self::Public
        } else {
            Self::Private
        }
    }

    pub fn is_public(self) -> bool {
        self == Self::Public
    }
}

impl Formulation {
    pub fn visibility(&self) -> Visibility {
        Visibility::from_public(self.is_public)
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.is_public = visibility.is_public();
        self.touch();
    }

    pub fn publish(&mut self) {
        self.set_visibility(Visibility::Public);
    }

    pub fn unpublish(&mut self) {
        self.set_visibility(Visibility::Private);
    }

    pub fn set_status(&mut self, status: FormulationStatus) {
        self.status = status;
        self.touch();
    }

    pub fn finalise(&mut self) {
        self.set_status(FormulationStatus::Final);
    }

    pub fn reopen(&mut self) {
        self.set_status(FormulationStatus::Draft);
    }

    /// True if `requester` may read this formulation: it is public, or they own it.
    pub fn is_visible_to(&self, requester: Option<&Actor>) -> bool {
        self.is_public || requester.is_some_and(|actor| actor.owns(&self.owner))
    }

    /// Builds an independent copy owned by `actor`.
    ///
    /// The copy gets a new identifier, a title ending in " (Copy)", draft status, private
    /// visibility and fresh identifiers on every row. Batch volume, tags, notes, cover and
    /// quantities are carried over. The source is not modified.
    pub fn duplicate_for(&self, actor: &Actor) -> Formulation {
        let now = Utc::now();
        Formulation {
            id: FormulationId::new(),
            title: format!("{}{}", self.display_title(), COPY_SUFFIX),
            basis: self.basis,
            rows: self.rows.iter().map(|r| r.with_fresh_id()).collect(),
            batch_volume_ml: self.batch_volume_ml,
            status: FormulationStatus::Draft,
            tags: self.tags.clone(),
            notes: self.notes.trim().to_string(),
            is_public: false,
            cover_reference: self.cover_reference.clone(),
            owner: Owner {
                id: actor.id().to_string(),
                display_name: actor.display_name.clone(),
            },
            created_at: now,
            updated_at: now,
        }
    }
}
