//! Turn log and context integrity hashing
//!
//! Every completed turn is recorded for diagnostics and replay; context
//! snapshots are hashed so a stored session can be integrity-checked.

use crate::models::{SessionContext, TurnOutcome};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Turn outcome storage
pub struct TurnLog {
    records: Arc<RwLock<HashMap<Uuid, TurnOutcome>>>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store a turn outcome
    pub async fn record(&self, outcome: TurnOutcome) -> Uuid {
        let turn_id = outcome.turn_id;
        let mut records = self.records.write().await;
        records.insert(turn_id, outcome);
        turn_id
    }

    /// Retrieve an outcome by turn ID
    pub async fn get(&self, turn_id: Uuid) -> Option<TurnOutcome> {
        let records = self.records.read().await;
        records.get(&turn_id).cloned()
    }

    /// List all turn IDs for a session (sorted by created_at)
    pub async fn list_for_session(&self, session_id: &str) -> Vec<Uuid> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records
            .iter()
            .filter(|(_, outcome)| outcome.session_id == session_id)
            .map(|(id, outcome)| (*id, outcome.created_at))
            .collect();

        items.sort_by_key(|(_, created_at)| *created_at);

        items.into_iter().map(|(id, _)| id).collect()
    }
}

impl Default for TurnLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute SHA256 hash of a session context for integrity verification
/// Uses zero-copy streaming serialization into hasher
pub fn compute_context_hash(context: &SessionContext) -> String {
    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    if serde_json::to_writer(&mut HashWriter(&mut hasher), context).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
