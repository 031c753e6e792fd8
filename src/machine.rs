//! Lifecycle state machine for the console's per-entity screens.
//!
//! `transition` is the whole policy: a pure function from (phase, event) to the next
//! phase, `None` meaning the event is ignored in that phase. `Controller` drives it
//! against a `Backend`, running the side effect that belongs to each accepted event.

use async_trait::async_trait;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Creating,
    Editing(Uuid),
    Deleting(Uuid),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Fetch,
    Done,
    Create,
    Edit(Uuid),
    Save,
    Delete(Uuid),
    Failed(String),
    Retry,
    Cancel,
}

/// transition
///
/// Returns the phase `event` leads to from `phase`, or `None` when the pair is not
/// part of the lifecycle. There is no terminal phase.
pub fn transition(phase: &Phase, event: &Event) -> Option<Phase> {
    use Event as E;
    use Phase as P;

    match (phase, event) {
        (P::Idle, E::Fetch) => Some(P::Loading),
        (P::Idle, E::Create) => Some(P::Creating),
        (P::Idle, E::Edit(id)) => Some(P::Editing(*id)),
        (P::Idle, E::Delete(id)) => Some(P::Deleting(*id)),

        (P::Loading, E::Done) => Some(P::Idle),
        (P::Loading, E::Failed(message)) => Some(P::Error(message.clone())),

        (P::Creating | P::Editing(_), E::Save) => Some(P::Loading),
        (P::Creating | P::Editing(_), E::Cancel) => Some(P::Idle),

        (P::Deleting(_), E::Done) => Some(P::Idle),
        (P::Deleting(_), E::Failed(message)) => Some(P::Error(message.clone())),

        (P::Error(_), E::Retry) => Some(P::Loading),
        (P::Error(_), E::Cancel) => Some(P::Idle),

        _ => None,
    }
}

/// Backend
///
/// The remote collection a screen manages. Implemented over HTTP by
/// `client::ResourceClient`; tests substitute an in-process double.
#[async_trait]
pub trait Backend: Send + Sync {
    type Item: Clone + Send + Sync;
    type Draft: Send + Sync;
    type Error: fmt::Display + Send;

    async fn list(&self) -> Result<Vec<Self::Item>, Self::Error>;
    async fn create(&self, draft: &Self::Draft) -> Result<Self::Item, Self::Error>;
    async fn update(&self, id: Uuid, draft: &Self::Draft) -> Result<Self::Item, Self::Error>;
    async fn delete(&self, id: Uuid) -> Result<(), Self::Error>;
}

/// Controller
///
/// Holds the current phase and the last fetched items. Every public operation first
/// offers its event to `transition`; operations whose event is ignored return
/// `false` and touch nothing.
pub struct Controller<B: Backend> {
    backend: B,
    phase: Phase,
    items: Vec<B::Item>,
}

impl<B: Backend> Controller<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            phase: Phase::Idle,
            items: Vec::new(),
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn items(&self) -> &[B::Item] {
        &self.items
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Applies `event` if the current phase accepts it.
    pub fn dispatch(&mut self, event: Event) -> bool {
        match transition(&self.phase, &event) {
            Some(next) => {
                tracing::trace!(from = ?self.phase, to = ?next, ?event, "phase change");
                self.phase = next;
                true
            }
            None => {
                tracing::debug!(phase = ?self.phase, ?event, "event ignored");
                false
            }
        }
    }

    /// idle → loading → idle (or error).
    pub async fn fetch(&mut self) -> bool {
        if !self.dispatch(Event::Fetch) {
            return false;
        }
        self.reload().await;
        true
    }

    pub fn begin_create(&mut self) -> bool {
        self.dispatch(Event::Create)
    }

    pub fn begin_edit(&mut self, id: Uuid) -> bool {
        self.dispatch(Event::Edit(id))
    }

    pub fn cancel(&mut self) -> bool {
        self.dispatch(Event::Cancel)
    }

    /// save
    ///
    /// Submits `draft` as a new item (from `creating`) or as the edited item (from
    /// `editing`), then refreshes the list. A failed write lands in `error`.
    pub async fn save(&mut self, draft: &B::Draft) -> bool {
        let editing = match self.phase {
            Phase::Editing(id) => Some(id),
            _ => None,
        };
        if !self.dispatch(Event::Save) {
            return false;
        }

        let written = match editing {
            Some(id) => self.backend.update(id, draft).await.map(|_| ()),
            None => self.backend.create(draft).await.map(|_| ()),
        };
        match written {
            Ok(()) => self.reload().await,
            Err(e) => {
                self.dispatch(Event::Failed(e.to_string()));
            }
        }
        true
    }

    /// idle → deleting(id) → idle, then refetches. A failed delete lands in `error`.
    pub async fn delete(&mut self, id: Uuid) -> bool {
        if !self.dispatch(Event::Delete(id)) {
            return false;
        }
        match self.backend.delete(id).await {
            Ok(()) => {
                self.dispatch(Event::Done);
                self.fetch().await;
            }
            Err(e) => {
                self.dispatch(Event::Failed(e.to_string()));
            }
        }
        true
    }

    /// error → loading → idle (or back to error).
    pub async fn retry(&mut self) -> bool {
        if !self.dispatch(Event::Retry) {
            return false;
        }
        self.reload().await;
        true
    }

    // Runs in `loading`; settles the phase.
    async fn reload(&mut self) {
        match self.backend.list().await {
            Ok(items) => {
                self.items = items;
                self.dispatch(Event::Done);
            }
            Err(e) => {
                self.dispatch(Event::Failed(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_transitions() {
        let id = Uuid::new_v4();
        let cases = [
            (Phase::Idle, Event::Fetch, Phase::Loading),
            (Phase::Loading, Event::Done, Phase::Idle),
            (Phase::Idle, Event::Create, Phase::Creating),
            (Phase::Creating, Event::Save, Phase::Loading),
            (Phase::Idle, Event::Edit(id), Phase::Editing(id)),
            (Phase::Editing(id), Event::Save, Phase::Loading),
            (Phase::Idle, Event::Delete(id), Phase::Deleting(id)),
            (Phase::Deleting(id), Event::Done, Phase::Idle),
            (Phase::Loading, Event::Failed("x".into()), Phase::Error("x".into())),
            (Phase::Deleting(id), Event::Failed("x".into()), Phase::Error("x".into())),
            (Phase::Error("x".into()), Event::Retry, Phase::Loading),
            (Phase::Error("x".into()), Event::Cancel, Phase::Idle),
            (Phase::Creating, Event::Cancel, Phase::Idle),
            (Phase::Editing(id), Event::Cancel, Phase::Idle),
        ];
        for (from, event, to) in cases {
            assert_eq!(transition(&from, &event), Some(to), "{:?} on {:?}", from, event);
        }
    }

    #[test]
    fn everything_else_is_ignored() {
        let id = Uuid::new_v4();
        assert_eq!(transition(&Phase::Idle, &Event::Done), None);
        assert_eq!(transition(&Phase::Idle, &Event::Save), None);
        assert_eq!(transition(&Phase::Idle, &Event::Cancel), None);
        assert_eq!(transition(&Phase::Loading, &Event::Fetch), None);
        assert_eq!(transition(&Phase::Loading, &Event::Cancel), None);
        assert_eq!(transition(&Phase::Creating, &Event::Failed("x".into())), None);
        assert_eq!(transition(&Phase::Editing(id), &Event::Delete(id)), None);
        assert_eq!(transition(&Phase::Deleting(id), &Event::Cancel), None);
        assert_eq!(transition(&Phase::Error("x".into()), &Event::Fetch), None);
    }

    #[test]
    fn starts_idle() {
        assert_eq!(Phase::default(), Phase::Idle);
    }
}
