//! Persona/context store.
//!
//! The persona is a string→string map (role, expertise, tone, context,
//! disclaimer) that shapes prompts and is returned to clients as
//! `legal_context`. [`PersonaStore`] is its only owner: callers read
//! snapshots and merge updates through it; nothing else holds a mutable
//! handle.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::info;

use crate::error::{LegalRagError, Result};

/// Key whose value is embedded in prompts and appended to every answer.
pub const DISCLAIMER_KEY: &str = "disclaimer";

pub type Persona = BTreeMap<String, String>;

#[derive(Debug, Default)]
pub struct PersonaStore {
    inner: RwLock<Persona>,
}

impl PersonaStore {
    pub fn new(initial: Persona) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Returns a snapshot of the current persona.
    ///
    /// Later updates do not affect the returned map.
    pub fn get(&self) -> Persona {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Merges `new_values` into the persona, overwriting existing keys.
    ///
    /// Keys not mentioned keep their values; there is no removal. An empty
    /// update is rejected and leaves the persona untouched.
    pub fn update(&self, new_values: Persona) -> Result<()> {
        if new_values.is_empty() {
            return Err(LegalRagError::InvalidInput(
                "legal_context must not be empty".to_string(),
            ));
        }

        let keys: Vec<&str> = new_values.keys().map(String::as_str).collect();
        info!(keys = ?keys, "updating persona");

        let mut persona = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        persona.extend(new_values);
        Ok(())
    }

    /// The current disclaimer, or an empty string if none was ever set.
    pub fn disclaimer(&self) -> String {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(DISCLAIMER_KEY)
            .cloned()
            .unwrap_or_default()
    }
}
