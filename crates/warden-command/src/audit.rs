//! Bounded trail of recent commands and state changes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Directive,
    Broadcast,
    Workflow,
    ModuleRegistered,
    ModuleUnregistered,
    StateChange,
    Lockdown,
    LockdownLifted,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Directive => "directive",
            AuditEventType::Broadcast => "broadcast",
            AuditEventType::Workflow => "workflow",
            AuditEventType::ModuleRegistered => "module_registered",
            AuditEventType::ModuleUnregistered => "module_unregistered",
            AuditEventType::StateChange => "state_change",
            AuditEventType::Lockdown => "lockdown",
            AuditEventType::LockdownLifted => "lockdown_lifted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub event_id: Uuid,
    pub ts: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub actor: String,
    pub payload: Value,
}

#[derive(Debug)]
pub struct AuditTrail {
    capacity: usize,
    records: Mutex<VecDeque<AuditRecord>>,
    total: AtomicU64,
}

impl AuditTrail {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            total: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AuditRecord>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.records.is_poisoned()
    }

    /// Append a record, evicting the oldest once full
    pub fn record(&self, event_type: AuditEventType, actor: &str, payload: Value) -> Uuid {
        let record = AuditRecord {
            event_id: Uuid::new_v4(),
            ts: Utc::now(),
            event_type,
            actor: actor.to_string(),
            payload,
        };
        let id = record.event_id;

        let mut records = self.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        self.total.fetch_add(1, Ordering::Relaxed);
        id
    }

    /// Most recent first
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn recent_of(&self, event_type: AuditEventType, limit: usize) -> Vec<AuditRecord> {
        self.recent_where(limit, |r| r.event_type == event_type)
    }

    pub fn recent_where<P>(&self, limit: usize, mut predicate: P) -> Vec<AuditRecord>
    where
        P: FnMut(&AuditRecord) -> bool,
    {
        self.lock()
            .iter()
            .rev()
            .filter(|r| predicate(r))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records ever appended, including evicted ones
    pub fn total_recorded(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
