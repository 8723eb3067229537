//! Fixed-capacity identity registry.
//!
//! Connected applications live in an arena addressed by a dense integer
//! handle (1..=[`MAX_APPS`]; 0 is reserved invalid). Handles are assigned
//! lowest-free-first, and raw addresses never cross the entry boundary —
//! sources only ever receive private copies of identity data.

pub mod app;
pub mod source;

pub use app::{AppRecord, ConnState};
pub use source::{CallbackRecord, SourceRecord};

use crate::error::{BrokerError, BrokerResult};
use crate::protocol::{ConditionCode, Identity};

/// Maximum concurrently connected applications.
pub const MAX_APPS: usize = 16;

/// Maximum discovered sources per application connection.
pub const MAX_SOURCES: usize = 50;

/// Stable integer handle for a connected application.
pub type AppHandle = u32;

/// Arena of application records with an explicit free scan.
#[derive(Debug, Default)]
pub struct AppRegistry {
    slots: Vec<Option<AppRecord>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_APPS);
        slots.resize_with(MAX_APPS, || None);
        Self { slots }
    }

    /// Register an application identity and assign the lowest free handle.
    ///
    /// Fails with `InvalidArgument` for an empty product name,
    /// `DuplicateName` when the name is already registered, and
    /// `CapacityExceeded` when no slot is free. A rejected registration
    /// leaves the registry untouched.
    pub fn register(&mut self, mut identity: Identity) -> BrokerResult<AppHandle> {
        if identity.product_name.is_empty() {
            return Err(BrokerError::invalid_argument(
                "application product name must not be empty",
            ));
        }
        if self.find_by_name(&identity.product_name).is_some() {
            return Err(BrokerError::DuplicateName(identity.product_name));
        }
        let free = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                BrokerError::CapacityExceeded(format!(
                    "connection table full ({} applications)",
                    MAX_APPS
                ))
            })?;
        let handle = (free + 1) as AppHandle;
        identity.id = handle;
        self.slots[free] = Some(AppRecord::new(identity));
        Ok(handle)
    }

    /// Scrub an application record and free its source table.
    ///
    /// Refused unless the application is `Active` with no source open.
    pub fn deregister(&mut self, handle: AppHandle) -> BrokerResult<()> {
        let app = self.get(handle)?;
        if app.state != ConnState::Active {
            return Err(BrokerError::sequence(
                "disconnect requires a completed connect",
            ));
        }
        if app.any_open() {
            return Err(BrokerError::sequence(
                "disconnect refused while a source is open",
            ));
        }
        self.slots[(handle - 1) as usize] = None;
        Ok(())
    }

    pub fn validate(&self, handle: AppHandle) -> bool {
        self.slot(handle)
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    pub fn validate_pair(&self, handle: AppHandle, source_index: usize) -> bool {
        self.get(handle)
            .map(|app| app.source(source_index).is_some())
            .unwrap_or(false)
    }

    pub fn get(&self, handle: AppHandle) -> BrokerResult<&AppRecord> {
        self.slot(handle)
            .and_then(Option::as_ref)
            .ok_or_else(|| unknown_handle(handle))
    }

    pub fn get_mut(&mut self, handle: AppHandle) -> BrokerResult<&mut AppRecord> {
        match self.slot_index(handle) {
            Some(i) => self.slots[i].as_mut().ok_or_else(|| unknown_handle(handle)),
            None => Err(unknown_handle(handle)),
        }
    }

    pub fn state(&self, handle: AppHandle) -> BrokerResult<ConnState> {
        Ok(self.get(handle)?.state)
    }

    pub fn set_state(&mut self, handle: AppHandle, state: ConnState) -> BrokerResult<()> {
        self.get_mut(handle)?.state = state;
        Ok(())
    }

    pub fn condition(&mut self, handle: AppHandle) -> BrokerResult<ConditionCode> {
        Ok(self.get_mut(handle)?.take_condition())
    }

    pub fn set_condition(&mut self, handle: AppHandle, code: ConditionCode) -> BrokerResult<()> {
        self.get_mut(handle)?.set_condition(code);
        Ok(())
    }

    pub fn find_by_name(&self, product_name: &str) -> Option<AppHandle> {
        self.slots.iter().enumerate().find_map(|(i, slot)| {
            slot.as_ref()
                .filter(|app| app.identity.product_name == product_name)
                .map(|_| (i + 1) as AppHandle)
        })
    }

    /// Number of live connections. Acts as the construct/teardown reference
    /// count for the broker context.
    pub fn connection_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.connection_count() == 0
    }

    fn slot(&self, handle: AppHandle) -> Option<&Option<AppRecord>> {
        self.slot_index(handle).map(|i| &self.slots[i])
    }

    fn slot_index(&self, handle: AppHandle) -> Option<usize> {
        if handle == 0 || handle as usize > MAX_APPS {
            None
        } else {
            Some((handle - 1) as usize)
        }
    }
}

fn unknown_handle(handle: AppHandle) -> BrokerError {
    BrokerError::invalid_argument(format!("unknown application handle {}", handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DataGroups, ProtocolVersion};

    fn identity(name: &str) -> Identity {
        Identity::new(
            name,
            "Vendor",
            ProtocolVersion::CURRENT,
            DataGroups::IMAGE,
        )
    }

    #[test]
    fn test_register_assigns_lowest_free_handle() {
        let mut reg = AppRegistry::new();
        let a = reg.register(identity("a")).unwrap();
        let b = reg.register(identity("b")).unwrap();
        assert_eq!((a, b), (1, 2));

        reg.set_state(a, ConnState::Active).unwrap();
        reg.deregister(a).unwrap();
        // Slot 1 is free again and reused before a new slot.
        let c = reg.register(identity("c")).unwrap();
        assert_eq!(c, 1);
    }

    #[test]
    fn test_register_duplicate_name() {
        let mut reg = AppRegistry::new();
        let first = reg.register(identity("a")).unwrap();
        let err = reg.register(identity("a")).unwrap_err();
        assert!(matches!(err, BrokerError::DuplicateName(_)));
        // The first registration is unaffected.
        assert!(reg.validate(first));
        assert_eq!(reg.state(first).unwrap(), ConnState::Registered);
    }

    #[test]
    fn test_register_empty_name() {
        let mut reg = AppRegistry::new();
        assert!(matches!(
            reg.register(identity("")),
            Err(BrokerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_register_capacity() {
        let mut reg = AppRegistry::new();
        for i in 0..MAX_APPS {
            reg.register(identity(&format!("app{}", i))).unwrap();
        }
        assert!(matches!(
            reg.register(identity("one-too-many")),
            Err(BrokerError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_deregister_requires_active() {
        let mut reg = AppRegistry::new();
        let h = reg.register(identity("a")).unwrap();
        assert!(matches!(
            reg.deregister(h),
            Err(BrokerError::SequenceError(_))
        ));
        reg.set_state(h, ConnState::Active).unwrap();
        reg.deregister(h).unwrap();
        assert!(!reg.validate(h));
    }

    #[test]
    fn test_validate_bounds() {
        let reg = AppRegistry::new();
        assert!(!reg.validate(0));
        assert!(!reg.validate(1));
        assert!(!reg.validate((MAX_APPS + 1) as AppHandle));
    }

    #[test]
    fn test_condition_round_trip() {
        let mut reg = AppRegistry::new();
        let h = reg.register(identity("a")).unwrap();
        reg.set_condition(h, ConditionCode::SequenceError).unwrap();
        assert_eq!(reg.condition(h).unwrap(), ConditionCode::SequenceError);
        assert_eq!(reg.condition(h).unwrap(), ConditionCode::Success);
    }

    #[test]
    fn test_validate_pair_unknown_source() {
        let mut reg = AppRegistry::new();
        let h = reg.register(identity("a")).unwrap();
        assert!(!reg.validate_pair(h, 0));
        assert!(!reg.validate_pair(99, 0));
    }
}
