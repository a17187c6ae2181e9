//! Formulation operations with access control.
//!
//! Rules enforced here:
//! - only the owner may edit, save, delete or set a cover
//! - anyone may read a public formulation; a private one only its owner
//! - a missing formulation is reported as not found, an inaccessible one as private, and the
//!   two are never conflated
//!
//! Saves never mutate the caller's copy: the caller gets the stored version back on success
//! and keeps its own state on failure.

use crate::config::CoreConfig;
use crate::constants::COVERS_PREFIX;
use crate::derive::Derivation;
use crate::export::{ExportFooter, ExportSnapshot, InlineImage};
use crate::formulation::{EditCommand, EditOutcome, Formulation, MetadataPatch};
use crate::identity::Actor;
use crate::objects::ObjectStore;
use crate::render::{ExportFormat, RenderedDocument};
use crate::row::QuantityBasis;
use crate::store::{FileFormulationStore, FormulationStore, OrderBy, PutMode};
use crate::wire::FormulationRecord;
use crate::{FormulationError, FormulationId, FormulationResult};
use mixlab_files::FilesService;
use std::sync::Arc;

/// Options for [`FormulationService::create`].
#[derive(Clone, Debug, Default)]
pub struct CreateOptions {
    pub title: Option<String>,
    pub basis: QuantityBasis,
    /// Start with the starter rows (ratio only).
    pub seeded: bool,
    pub batch_volume_ml: Option<f64>,
}

#[derive(Clone)]
pub struct FormulationService {
    cfg: Arc<CoreConfig>,
    store: Arc<dyn FormulationStore>,
    objects: Arc<dyn ObjectStore>,
}

impl FormulationService {
    pub fn new(
        cfg: Arc<CoreConfig>,
        store: Arc<dyn FormulationStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            cfg,
            store,
            objects,
        }
    }

    /// File-backed service rooted at the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns [`FormulationError::DataDir`] if the data directory cannot be created.
    pub fn open(cfg: Arc<CoreConfig>) -> FormulationResult<Self> {
        std::fs::create_dir_all(cfg.data_dir()).map_err(|e| {
            FormulationError::DataDir(format!(
                "cannot create {}: {}",
                cfg.data_dir().display(),
                e
            ))
        })?;
        let store = FileFormulationStore::open(cfg.formulations_dir())?;
        let files = FilesService::new(cfg.data_dir())
            .map_err(|e| FormulationError::DataDir(e.to_string()))?
            .with_max_bytes(cfg.max_cover_bytes());

        Ok(Self::new(cfg, Arc::new(store), Arc::new(files)))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn readiness(&self) -> FormulationResult<()> {
        Ok(self.store.readiness()?)
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    fn fetch(&self, id: &FormulationId) -> FormulationResult<Formulation> {
        let record = self
            .store
            .get(id)?
            .ok_or_else(|| FormulationError::NotFound(id.to_string()))?;
        Ok(record.into_formulation(id.clone(), self.cfg.default_batch_volume_ml()))
    }

    fn persist(&self, formulation: &Formulation, mode: PutMode) -> FormulationResult<Formulation> {
        let stored = self.store.put(
            formulation.id(),
            FormulationRecord::from(formulation),
            mode,
        )?;
        Ok(stored.into_formulation(
            formulation.id().clone(),
            self.cfg.default_batch_volume_ml(),
        ))
    }

    /// Loads a formulation for editing. Only the owner may do this.
    pub fn load_for_edit(
        &self,
        id: &FormulationId,
        actor: &Actor,
    ) -> FormulationResult<Formulation> {
        let formulation = self.fetch(id)?;
        if !actor.owns(formulation.owner()) {
            return Err(FormulationError::NotOwner(id.to_string()));
        }
        Ok(formulation)
    }

    /// Loads a formulation for viewing: public ones for anyone, private ones for the owner.
    pub fn lookup(
        &self,
        id: &FormulationId,
        requester: Option<&Actor>,
    ) -> FormulationResult<Formulation> {
        let formulation = self.fetch(id)?;
        if !formulation.is_visible_to(requester) {
            return Err(FormulationError::Private(id.to_string()));
        }
        Ok(formulation)
    }

    /// Looks up a formulation from free-form user input (an id pasted into a search box).
    pub fn lookup_str(
        &self,
        raw_id: &str,
        requester: Option<&Actor>,
    ) -> FormulationResult<Formulation> {
        let trimmed = raw_id.trim();
        let id = FormulationId::parse(trimmed)
            .map_err(|_| FormulationError::NotFound(trimmed.to_string()))?;
        self.lookup(&id, requester)
    }

    /// The actor's formulations, most recently updated first.
    pub fn list_mine(&self, actor: &Actor) -> FormulationResult<Vec<Formulation>> {
        self.list_mine_ordered(actor, OrderBy::UpdatedAtDesc)
    }

    pub fn list_mine_ordered(
        &self,
        actor: &Actor,
        order: OrderBy,
    ) -> FormulationResult<Vec<Formulation>> {
        let default_volume = self.cfg.default_batch_volume_ml();
        Ok(self
            .store
            .query(actor.id(), order)?
            .into_iter()
            .map(|(id, record)| record.into_formulation(id, default_volume))
            .collect())
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    pub fn create(&self, actor: &Actor, options: CreateOptions) -> FormulationResult<Formulation> {
        let mut formulation = if options.seeded && options.basis == QuantityBasis::Ratio {
            Formulation::seeded(actor.as_owner())
        } else {
            Formulation::new(actor.as_owner(), options.basis)
        };
        formulation.set_batch_volume(
            options
                .batch_volume_ml
                .unwrap_or(self.cfg.default_batch_volume_ml()),
        );
        if let Some(title) = options.title {
            formulation.set_metadata(MetadataPatch {
                title: Some(title),
                ..Default::default()
            });
        }
        formulation.prepare_for_save();

        let stored = self.persist(&formulation, PutMode::Replace)?;
        tracing::info!(
            formulation_id = %stored.id(),
            owner = %actor.id(),
            "created formulation"
        );
        Ok(stored)
    }

    /// Saves the caller's copy and returns the stored version.
    ///
    /// The title is normalised ("Untitled" when blank) and the notes trimmed before writing.
    /// The record is merged into the stored one, which keeps the first `createdAt`.
    pub fn save(&self, actor: &Actor, formulation: &Formulation) -> FormulationResult<Formulation> {
        let existing = self.fetch(formulation.id())?;
        if !actor.owns(existing.owner()) || !actor.owns(formulation.owner()) {
            return Err(FormulationError::NotOwner(formulation.id().to_string()));
        }

        let mut prepared = formulation.clone();
        prepared.prepare_for_save();
        let stored = self.persist(&prepared, PutMode::Merge)?;
        tracing::debug!(formulation_id = %stored.id(), "saved formulation");
        Ok(stored)
    }

    /// Loads, applies `commands` in order and saves, all or nothing.
    pub fn edit(
        &self,
        id: &FormulationId,
        actor: &Actor,
        commands: Vec<EditCommand>,
    ) -> FormulationResult<(Formulation, Vec<EditOutcome>)> {
        let mut formulation = self.load_for_edit(id, actor)?;
        let outcomes = formulation.apply_all(commands);
        let stored = self.save(actor, &formulation)?;
        Ok((stored, outcomes))
    }

    /// Copies a formulation the actor can see into a new private draft they own.
    pub fn duplicate(&self, id: &FormulationId, actor: &Actor) -> FormulationResult<Formulation> {
        let source = self.lookup(id, Some(actor))?;
        let copy = source.duplicate_for(actor);
        let stored = self.persist(&copy, PutMode::Replace)?;
        tracing::info!(
            source_id = %id,
            formulation_id = %stored.id(),
            owner = %actor.id(),
            "duplicated formulation"
        );
        Ok(stored)
    }

    pub fn delete(&self, id: &FormulationId, actor: &Actor) -> FormulationResult<()> {
        self.load_for_edit(id, actor)?;
        self.store.delete(id)?;
        tracing::info!(formulation_id = %id, owner = %actor.id(), "deleted formulation");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Covers
    // ------------------------------------------------------------------

    /// Stores a cover image and points the formulation at it.
    pub fn upload_cover(
        &self,
        id: &FormulationId,
        actor: &Actor,
        file_name: &str,
        bytes: &[u8],
    ) -> FormulationResult<Formulation> {
        let mut formulation = self.load_for_edit(id, actor)?;
        let file_name = sanitise_file_name(file_name);
        let logical_path = format!("{}/{}/{}/{}", COVERS_PREFIX, actor.id(), id, file_name);

        let reference = self.objects.upload(&logical_path, bytes)?;
        formulation.set_metadata(MetadataPatch {
            cover_reference: Some(Some(reference)),
            ..Default::default()
        });
        self.save(actor, &formulation)
    }

    /// URL of the cover, or `None` if there is none or it cannot be resolved.
    pub fn cover_url(&self, formulation: &Formulation) -> Option<String> {
        let reference = formulation.cover_reference()?;
        match self.objects.resolve_url(reference) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(formulation_id = %formulation.id(), "cover unavailable: {}", e);
                None
            }
        }
    }

    fn inline_cover(&self, formulation: &Formulation) -> Option<InlineImage> {
        let reference = formulation.cover_reference()?;
        match self.objects.fetch(reference) {
            Ok(object) => Some(InlineImage::new(
                object
                    .media_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                &object.bytes,
            )),
            Err(e) => {
                tracing::warn!(
                    formulation_id = %formulation.id(),
                    "cover could not be embedded, exporting without it: {}",
                    e
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Derived views and export
    // ------------------------------------------------------------------

    /// Derivation at `volume_ml`, or at the stored batch volume when `None`.
    pub fn derived(
        &self,
        id: &FormulationId,
        requester: Option<&Actor>,
        volume_ml: Option<f64>,
    ) -> FormulationResult<Derivation> {
        let formulation = self.lookup(id, requester)?;
        Ok(match volume_ml {
            Some(volume) => formulation.derive_at(volume),
            None => formulation.derive(),
        })
    }

    /// Builds a self-contained snapshot. A missing cover does not fail the export.
    pub fn snapshot(
        &self,
        id: &FormulationId,
        requester: Option<&Actor>,
        volume_ml: Option<f64>,
    ) -> FormulationResult<ExportSnapshot> {
        let formulation = self.lookup(id, requester)?;
        let footer = ExportFooter {
            updated_at_text: Some(
                formulation
                    .updated_at()
                    .format("%Y-%m-%d %H:%M UTC")
                    .to_string(),
            ),
            user_email: requester
                .and_then(|actor| actor.email.as_ref())
                .map(|email| email.as_str().to_string()),
        };
        let cover = self.inline_cover(&formulation);
        Ok(ExportSnapshot::build(&formulation, volume_ml, cover, footer))
    }

    pub fn export(
        &self,
        id: &FormulationId,
        requester: Option<&Actor>,
        volume_ml: Option<f64>,
        format: ExportFormat,
    ) -> FormulationResult<RenderedDocument> {
        let snapshot = self.snapshot(id, requester, volume_ml)?;
        format.renderer().render_document(&snapshot)
    }
}

fn sanitise_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "cover".to_string()
    } else {
        cleaned
    }
}
