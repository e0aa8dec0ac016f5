//! Stream registry: callback id -> registration.
//!
//! Populated at startup, read on every request. Passed explicitly to the
//! endpoint; there is no process-global instance.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::callback::{CallbackDescriptor, CallbackRegistration};
use crate::callback_id::CallbackId;

#[derive(Default)]
pub struct StreamRegistry {
    entries: RwLock<HashMap<CallbackId, Arc<CallbackRegistration>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Last write wins; the replaced entry is returned.
    pub fn upsert(&self, registration: CallbackRegistration) -> Option<Arc<CallbackRegistration>> {
        let id = registration.id.clone();
        let identity = registration.identity.clone();
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Arc::new(registration));

        if previous.is_some() {
            info!(callback_id = %id, callback = %identity, "Replaced streaming callback registration");
        } else {
            debug!(callback_id = %id, callback = %identity, "Registered streaming callback");
        }
        previous
    }

    pub fn get(&self, id: &CallbackId) -> Option<Arc<CallbackRegistration>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<CallbackId> {
        let mut ids: Vec<CallbackId> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Client-facing summaries, sorted by id.
    pub fn descriptors(&self) -> Vec<CallbackDescriptor> {
        let mut descriptors: Vec<CallbackDescriptor> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|r| r.descriptor())
            .collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }
}
