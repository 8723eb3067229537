//! Application connection records and the enumeration cursor.

use crate::error::{BrokerError, BrokerResult};
use crate::protocol::{ConditionCode, Identity};

use super::source::SourceRecord;
use super::MAX_SOURCES;

/// Connection state machine for one application.
///
/// Only advances `PreConnected → Registered → Active`, and only regresses
/// `Active → Registered` on an explicit disconnect. No source may remain
/// loaded across a regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    /// Slot reserved, connect handshake not started.
    #[default]
    PreConnected,
    /// Identity registered, connect handshake not finished.
    Registered,
    /// Fully connected; source management operations are permitted.
    Active,
}

/// Source-enumeration cursor for GetFirst/GetNext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EnumCursor {
    /// GetFirst has not been issued; GetNext is a sequence error.
    #[default]
    Unstarted,
    At(usize),
    /// Walked past the last entry; GetNext keeps reporting end-of-list and
    /// a fresh GetFirst restarts.
    Exhausted,
}

/// One connected application and everything it owns.
#[derive(Debug)]
pub struct AppRecord {
    pub identity: Identity,
    pub state: ConnState,

    /// Opaque UI-owner reference supplied by the host, if any.
    pub ui_owner: Option<u64>,

    condition: ConditionCode,
    sources: Vec<SourceRecord>,
    cursor: EnumCursor,
}

impl AppRecord {
    pub(crate) fn new(identity: Identity) -> Self {
        Self {
            identity,
            state: ConnState::Registered,
            ui_owner: None,
            condition: ConditionCode::Success,
            sources: Vec::new(),
            cursor: EnumCursor::Unstarted,
        }
    }

    /// Read the condition slot, resetting it to `Success` (single-read
    /// semantics).
    pub fn take_condition(&mut self) -> ConditionCode {
        std::mem::take(&mut self.condition)
    }

    pub fn set_condition(&mut self, code: ConditionCode) {
        self.condition = code;
    }

    pub fn source(&self, index: usize) -> Option<&SourceRecord> {
        self.sources.get(index)
    }

    pub fn source_mut(&mut self, index: usize) -> Option<&mut SourceRecord> {
        self.sources.get_mut(index)
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceRecord> {
        self.sources.iter()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Whether any source module is currently resident.
    pub fn any_open(&self) -> bool {
        self.sources.iter().any(|s| s.is_open())
    }

    pub fn find_source_by_name(&self, product_name: &str) -> Option<usize> {
        self.sources
            .iter()
            .position(|s| s.identity.product_name == product_name)
    }

    /// Append a discovered source at the next free slot. The record's
    /// identity id becomes 1 + its slot index.
    pub(crate) fn add_source(&mut self, mut record: SourceRecord) -> BrokerResult<usize> {
        if self.sources.len() >= MAX_SOURCES {
            return Err(BrokerError::CapacityExceeded(format!(
                "source table full ({} entries)",
                MAX_SOURCES
            )));
        }
        let index = self.sources.len();
        record.identity.id = (index + 1) as u32;
        self.sources.push(record);
        Ok(index)
    }

    /// Drop all discovered sources and reset the cursor. Used when a
    /// connection repopulates its table; discovery is never cached across
    /// connections.
    pub(crate) fn reset_sources(&mut self) {
        self.sources.clear();
        self.cursor = EnumCursor::Unstarted;
    }

    /// Restart enumeration. `None` means the table is empty (end-of-list).
    pub(crate) fn first_source(&mut self) -> Option<&SourceRecord> {
        if self.sources.is_empty() {
            self.cursor = EnumCursor::Exhausted;
            None
        } else {
            self.cursor = EnumCursor::At(0);
            self.sources.first()
        }
    }

    /// Advance enumeration. `Ok(None)` means end-of-list; GetNext without a
    /// prior GetFirst is a sequence error.
    pub(crate) fn next_source(&mut self) -> BrokerResult<Option<&SourceRecord>> {
        match self.cursor {
            EnumCursor::Unstarted => Err(BrokerError::sequence(
                "GetNext issued without a prior GetFirst",
            )),
            EnumCursor::At(i) if i + 1 < self.sources.len() => {
                self.cursor = EnumCursor::At(i + 1);
                Ok(self.sources.get(i + 1))
            }
            EnumCursor::At(_) | EnumCursor::Exhausted => {
                self.cursor = EnumCursor::Exhausted;
                Ok(None)
            }
        }
    }
}
