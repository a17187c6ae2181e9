//! Editor session state with a stale-load guard.
//!
//! Loads are asynchronous from the editor's point of view: a load may complete after the user
//! has already moved to another formulation. Each load is issued a [`LoadTicket`]; completing a
//! load whose ticket is no longer current is discarded as [`LoadOutcome::Stale`].

use crate::formulation::{EditCommand, EditOutcome, Formulation};
use crate::{FormulationError, FormulationId, FormulationResult};

/// Token tying a load completion to the request that started it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    id: FormulationId,
}

impl LoadTicket {
    pub fn id(&self) -> &FormulationId {
        &self.id
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// The load failed; the message is kept on the session and prior state is untouched.
    Failed,
    /// A newer load or a close superseded this one; nothing changed.
    Stale,
}

#[derive(Debug, Default)]
pub struct EditorSession {
    generation: u64,
    pending: Option<FormulationId>,
    current: Option<Formulation>,
    last_error: Option<String>,
}

impl EditorSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts loading `id`, invalidating any load still in flight.
    pub fn begin_load(&mut self, id: FormulationId) -> LoadTicket {
        self.generation += 1;
        self.pending = Some(id.clone());
        LoadTicket {
            generation: self.generation,
            id,
        }
    }

    /// Delivers the result of a load.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: FormulationResult<Formulation>,
    ) -> LoadOutcome {
        if ticket.generation != self.generation || self.pending.as_ref() != Some(&ticket.id) {
            tracing::debug!("discarding stale load of formulation {}", ticket.id);
            return LoadOutcome::Stale;
        }
        self.pending = None;

        match result {
            Ok(formulation) => {
                self.current = Some(formulation);
                self.last_error = None;
                LoadOutcome::Applied
            }
            Err(err) => {
                self.last_error = Some(describe(&err));
                LoadOutcome::Failed
            }
        }
    }

    /// Leaves the editor: pending loads become stale and the open formulation is dropped.
    pub fn close(&mut self) {
        self.generation += 1;
        self.pending = None;
        self.current = None;
        self.last_error = None;
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn formulation(&self) -> Option<&Formulation> {
        self.current.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Applies an edit to the open formulation. `None` if nothing is open.
    pub fn edit(&mut self, command: EditCommand) -> Option<EditOutcome> {
        self.current.as_mut().map(|f| f.apply(command))
    }

    /// Replaces the open formulation with the saved version returned by the store.
    pub fn accept_saved(&mut self, saved: Formulation) {
        if self.current.as_ref().map(Formulation::id) == Some(saved.id()) {
            self.current = Some(saved);
        }
    }

    /// Records a failed save without touching the open formulation.
    pub fn record_error(&mut self, err: &FormulationError) {
        self.last_error = Some(describe(err));
    }
}

fn describe(err: &FormulationError) -> String {
    match err {
        FormulationError::NotFound(_) => "This formulation does not exist.".to_string(),
        FormulationError::Private(_) => "This formulation is private.".to_string(),
        FormulationError::NotOwner(_) => "Only the owner can edit this formulation.".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Owner;

    fn formulation() -> Formulation {
        Formulation::seeded(Owner {
            id: "u1".into(),
            display_name: "Ada".into(),
        })
    }

    #[test]
    fn test_load_applies_when_current() {
        let mut session = EditorSession::new();
        let f = formulation();
        let ticket = session.begin_load(f.id().clone());
        assert!(session.is_loading());

        assert_eq!(session.complete_load(ticket, Ok(f.clone())), LoadOutcome::Applied);
        assert_eq!(session.formulation(), Some(&f));
        assert!(!session.is_loading());
    }

    #[test]
    fn test_superseded_load_is_stale() {
        let mut session = EditorSession::new();
        let a = formulation();
        let b = formulation();

        let ticket_a = session.begin_load(a.id().clone());
        let ticket_b = session.begin_load(b.id().clone());

        assert_eq!(session.complete_load(ticket_a, Ok(a)), LoadOutcome::Stale);
        assert_eq!(session.formulation(), None);
        assert_eq!(session.complete_load(ticket_b, Ok(b.clone())), LoadOutcome::Applied);
        assert_eq!(session.formulation().map(Formulation::id), Some(b.id()));
    }

    #[test]
    fn test_load_after_close_is_discarded() {
        let mut session = EditorSession::new();
        let f = formulation();
        let ticket = session.begin_load(f.id().clone());
        session.close();

        assert_eq!(session.complete_load(ticket, Ok(f)), LoadOutcome::Stale);
        assert!(session.formulation().is_none());
    }

    #[test]
    fn test_failed_load_keeps_prior_state() {
        let mut session = EditorSession::new();
        let f = formulation();
        let ticket = session.begin_load(f.id().clone());
        session.complete_load(ticket, Ok(f.clone()));

        let other = FormulationId::new();
        let ticket = session.begin_load(other.clone());
        let outcome = session.complete_load(
            ticket,
            Err(FormulationError::Private(other.to_string())),
        );

        assert_eq!(outcome, LoadOutcome::Failed);
        assert_eq!(session.formulation(), Some(&f));
        assert_eq!(session.last_error(), Some("This formulation is private."));
    }

    #[test]
    fn test_edit_open_formulation() {
        let mut session = EditorSession::new();
        assert!(session.edit(EditCommand::SetBatchVolume { value: 100.into() }).is_none());

        let f = formulation();
        let row = f.rows()[0].id.clone();
        let ticket = session.begin_load(f.id().clone());
        session.complete_load(ticket, Ok(f));

        session.edit(EditCommand::UpdateRow {
            id: row.clone(),
            name: None,
            quantity: Some("abc".into()),
        });
        assert_eq!(
            session.formulation().and_then(|f| f.row(&row)).map(|r| r.quantity),
            Some(0.0)
        );
    }
}
