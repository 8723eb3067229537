//! Host-injected platform hooks.

use crate::error::BrokerResult;

/// Out-of-band nudge for an application event loop that is not actively
/// polling. Fire-and-forget: a failed wake is logged by the bridge, never
/// escalated.
pub trait Wake {
    fn wake(&self) -> BrokerResult<()>;
}

/// Default wake for platforms where applications poll instead.
#[derive(Debug, Default)]
pub struct NoopWake;

impl Wake for NoopWake {
    fn wake(&self) -> BrokerResult<()> {
        Ok(())
    }
}

/// Handle for an installed loader override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideHandle(pub u64);

/// Legacy loader-override collaborator.
///
/// While installed for a source, any attempt by that source to resolve the
/// broker under its superseded name transparently receives the current
/// entry point instead. Engaged only when opening a source that does not
/// advertise the modern capability group; disengaged when it is closed.
pub trait LoaderOverride {
    fn install(&mut self, source_key: &str) -> BrokerResult<OverrideHandle>;
    fn uninstall(&mut self, handle: OverrideHandle) -> BrokerResult<()>;
}

/// Default override for platforms without the legacy redirection shim.
#[derive(Debug, Default)]
pub struct NoopLoaderOverride {
    next: u64,
}

impl LoaderOverride for NoopLoaderOverride {
    fn install(&mut self, _source_key: &str) -> BrokerResult<OverrideHandle> {
        self.next += 1;
        Ok(OverrideHandle(self.next))
    }

    fn uninstall(&mut self, _handle: OverrideHandle) -> BrokerResult<()> {
        Ok(())
    }
}
