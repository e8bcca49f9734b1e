//! Patient context store.
//!
//! Single source of truth for the current [`CanonicalPatient`]. The store is an injectable handle
//! (cheap to clone) rather than ambient global state. Writes always replace the whole record
//! behind an `Arc`, so a reader holds either the previous record or the new one, never a mix.

use crate::reconcile::CanonicalPatient;
use std::sync::Arc;
use tokio::sync::watch;

/// Current patient as seen by readers; `None` when no patient is in context.
pub type PatientSnapshot = Option<Arc<CanonicalPatient>>;

#[derive(Clone, Debug)]
pub struct PatientContextStore {
    current: Arc<watch::Sender<PatientSnapshot>>,
}

impl Default for PatientContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PatientContextStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            current: Arc::new(sender),
        }
    }

    /// The current patient, if any.
    pub fn current(&self) -> PatientSnapshot {
        self.current.borrow().clone()
    }

    /// Replace the current patient and return the stored record.
    pub fn set(&self, patient: CanonicalPatient) -> Arc<CanonicalPatient> {
        let patient = Arc::new(patient);
        self.current.send_replace(Some(Arc::clone(&patient)));
        patient
    }

    /// Remove the current patient (logout / reset).
    pub fn clear(&self) {
        self.current.send_replace(None);
    }

    /// Receive every replacement, including clears.
    pub fn subscribe(&self) -> watch::Receiver<PatientSnapshot> {
        self.current.subscribe()
    }
}
