//! The identity-probe handshake used by both discovery and final open.

use std::path::Path;

use crate::error::{firewall, BrokerError, BrokerResult};
use crate::protocol::{Dat, DataGroups, Identity, Msg, Payload, ResultCode};

use super::traits::{LoadedModule, ModuleLoader, SourceEntry, SourceHost};

/// Outcome of a probe against one candidate module. `module`/`entry` are
/// present only for `keep_open` probes.
pub(crate) struct ProbeOutcome {
    pub identity: Identity,
    pub module: Option<Box<dyn LoadedModule>>,
    pub entry: Option<Box<dyn SourceEntry>>,
}

impl std::fmt::Debug for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeOutcome")
            .field("identity", &self.identity)
            .field("module", &self.module.as_ref().map(|_| ".."))
            .field("entry", &self.entry.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Sources must not raise notifications while being interrogated.
struct ProbeHost;

impl SourceHost for ProbeHost {
    fn notify(&mut self, msg: Msg) -> ResultCode {
        log::warn!("source raised {:?} during identity probe; ignored", msg);
        ResultCode::Failure
    }
}

/// Load the module at `path`, perform the identity-probe handshake, and
/// check capability overlap against `requested`.
///
/// In browse mode (`keep_open` false) the module is unloaded as soon as the
/// identity is captured: discovery must not leave every matching module
/// resident. With `keep_open` the module is unloaded and immediately
/// reloaded — the probe call is the module's only well-defined place to
/// tear down state from static initialization, so probe-then-open has to
/// look like two independent loads from the module's perspective. Failure
/// to re-resolve the entry symbol on reload is fatal to the open.
pub(crate) fn probe_or_open(
    loader: &dyn ModuleLoader,
    requested: DataGroups,
    path: &Path,
    keep_open: bool,
) -> BrokerResult<ProbeOutcome> {
    let identity = {
        let module = loader.load(path)?;
        let mut entry = module.entry()?;

        let mut payload = Payload::Identity(Identity::default());
        let rc = firewall("source identity probe", || {
            entry.call(
                &mut ProbeHost,
                None,
                DataGroups::CONTROL,
                Dat::Identity,
                Msg::Get,
                &mut payload,
            )
        })?;
        if rc != ResultCode::Success {
            return Err(BrokerError::operation(format!(
                "identity probe of {:?} returned {:?}",
                path, rc
            )));
        }
        match payload {
            Payload::Identity(identity) => identity,
            _ => {
                return Err(BrokerError::operation(format!(
                    "identity probe of {:?} did not produce an identity",
                    path
                )))
            }
        }
        // entry and module drop here: the probe is a complete
        // load/unload cycle regardless of mode.
    };

    if !requested.compatible_with(identity.supported_groups) {
        return Err(BrokerError::operation(format!(
            "source '{}' shares no capability group with the application",
            identity.product_name
        )));
    }

    if !keep_open {
        return Ok(ProbeOutcome {
            identity,
            module: None,
            entry: None,
        });
    }

    let module = loader.load(path)?;
    let entry = module.entry()?;
    Ok(ProbeOutcome {
        identity,
        module: Some(module),
        entry: Some(entry),
    })
}
