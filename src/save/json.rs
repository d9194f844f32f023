//! Serde-backed entity
//!
//! `JsonSave<T>` persists any `Serialize + DeserializeOwned + Default` value
//! inside a small versioned envelope:
//!
//! ```json
//! { "version": 1, "saved_at": "2026-01-01T12:00:00+01:00", "data": { ... } }
//! ```

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

use super::saveable::Save;
use super::types::{CURRENT_SAVE_VERSION, SaveError};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    saved_at: DateTime<Local>,
    data: T,
}

/// Entity persisted as pretty-printed JSON
#[derive(Debug, Default, Clone)]
pub struct JsonSave<T> {
    pub value: T,
    /// Timestamp of the envelope last loaded, if any
    pub saved_at: Option<DateTime<Local>>,
}

impl<T> JsonSave<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            saved_at: None,
        }
    }
}

impl<T> Save for JsonSave<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn reset(&mut self) {
        self.value = T::default();
        self.saved_at = None;
    }

    fn to_bytes(&self) -> Result<Vec<u8>, SaveError> {
        let envelope = Envelope {
            version: CURRENT_SAVE_VERSION,
            saved_at: Local::now(),
            data: &self.value,
        };
        Ok(serde_json::to_vec_pretty(&envelope)?)
    }

    fn from_bytes(&mut self, data: &[u8]) -> Result<(), SaveError> {
        // Check the version before touching `data`, so a newer layout reports
        // InvalidVersion rather than a field mismatch.
        #[derive(Deserialize)]
        struct VersionOnly {
            version: u32,
        }

        let header: VersionOnly = serde_json::from_slice(data)?;
        if header.version > CURRENT_SAVE_VERSION {
            return Err(SaveError::InvalidVersion(header.version));
        }

        let envelope: Envelope<T> = serde_json::from_slice(data)?;
        self.value = envelope.data;
        self.saved_at = Some(envelope.saved_at);
        Ok(())
    }
}

impl<T> Deref for JsonSave<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for JsonSave<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}
