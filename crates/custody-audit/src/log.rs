use std::io::{BufRead, Write};

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{AuditError, Result};
use crate::event::{AuditEvent, AuditEventType, GENESIS_HASH};
use crate::integrity::{self, ChainVerification};

/// Append-only, hash-chained audit log.
///
/// Appends are serialized under one lock so sequence numbers stay gapless and
/// every event links to its predecessor. Existing entries are never rewritten.
#[derive(Debug, Default)]
pub struct AuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Returns a copy of the sealed entry.
    pub fn append(&self, event_type: AuditEventType, payload: serde_json::Value) -> AuditEvent {
        let mut events = self.events.lock();
        let sequence = events.len() as u64;
        let prev_hash = events
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let event = AuditEvent::seal(sequence, Utc::now(), event_type, payload, prev_hash);
        tracing::debug!(
            sequence,
            event_type = %event_type,
            hash = %event.hash,
            "Audit event appended"
        );
        events.push(event.clone());
        event
    }

    /// Verify the in-memory chain.
    pub fn verify_chain(&self) -> ChainVerification {
        integrity::verify(&self.events.lock())
    }

    /// Verify an externally held copy of a chain.
    pub fn verify_events(events: &[AuditEvent]) -> ChainVerification {
        integrity::verify(events)
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn events_by_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn count_of(&self, event_type: AuditEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Hash of the newest event, or the genesis hash for an empty log.
    pub fn head_hash(&self) -> String {
        self.events
            .lock()
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }

    /// Write the chain as ordered JSON lines. Returns the number of lines written.
    pub fn export_jsonl<W: Write>(&self, mut writer: W) -> Result<usize> {
        let events = self.events();
        for event in &events {
            serde_json::to_writer(&mut writer, event)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(events.len())
    }

    /// Parse JSON lines written by [`AuditLog::export_jsonl`]. Blank lines are skipped.
    pub fn import_jsonl<R: BufRead>(reader: R) -> Result<Vec<AuditEvent>> {
        let mut events = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line).map_err(|e| AuditError::Malformed {
                line: idx + 1,
                reason: e.to_string(),
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Import and verify an exported chain in one step.
    pub fn verify_jsonl<R: BufRead>(reader: R) -> Result<ChainVerification> {
        let events = Self::import_jsonl(reader)?;
        Ok(integrity::verify(&events))
    }
}
