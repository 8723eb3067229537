//! The protocol dispatcher: connection state machine, triplet routing, and
//! the forwarding firewall.
//!
//! [`Broker`] is an explicit, constructed context object — there is no
//! global state. One triplet is processed start-to-finish before the next
//! is accepted; the only reentrancy the broker tolerates is a source
//! raising a notification while its own call is on the stack, which is why
//! each source record carries an in-flight flag.

use crate::bridge::{self, BridgeHost};
use crate::config::BrokerConfig;
use crate::error::{firewall, BrokerError, BrokerResult};
use crate::hooks::{LoaderOverride, NoopLoaderOverride, NoopWake, Wake};
use crate::protocol::{
    CallbackReg, ConditionCode, Dat, DataGroups, Identity, Msg, Payload, ResultCode,
};
use crate::registry::{AppHandle, AppRecord, AppRegistry, ConnState, SourceRecord};
use crate::source::defaults::{self, DefaultStore};
use crate::source::discovery;
use crate::source::probe::probe_or_open;
use crate::source::ModuleLoader;

/// The broker context. Owns the identity registry and the injected
/// platform collaborators.
pub struct Broker {
    config: BrokerConfig,
    registry: AppRegistry,
    loader: Box<dyn ModuleLoader>,
    store: Box<dyn DefaultStore>,
    wake: Box<dyn Wake>,
    override_hook: Box<dyn LoaderOverride>,
    /// Condition slot used when no application context can be established.
    global_condition: ConditionCode,
}

impl Broker {
    /// Broker with the native module loader and the per-user default store.
    #[cfg(feature = "dynamic-sources")]
    pub fn new(config: BrokerConfig) -> Self {
        Self::with_parts(
            config,
            Box::new(crate::source::NativeLoader),
            Box::new(crate::source::FileDefaultStore::new()),
            Box::new(NoopWake),
            Box::new(NoopLoaderOverride::default()),
        )
    }

    /// Broker with an injected loader and defaults for the remaining
    /// collaborators. The usual constructor for tests and embedded hosts.
    pub fn with_loader(config: BrokerConfig, loader: Box<dyn ModuleLoader>) -> Self {
        Self::with_parts(
            config,
            loader,
            Box::new(crate::source::MemoryDefaultStore::default()),
            Box::new(NoopWake),
            Box::new(NoopLoaderOverride::default()),
        )
    }

    /// Fully injected construction.
    pub fn with_parts(
        config: BrokerConfig,
        loader: Box<dyn ModuleLoader>,
        store: Box<dyn DefaultStore>,
        wake: Box<dyn Wake>,
        override_hook: Box<dyn LoaderOverride>,
    ) -> Self {
        Self {
            config,
            registry: AppRegistry::new(),
            loader,
            store,
            wake,
            override_hook,
            global_condition: ConditionCode::Success,
        }
    }

    /// Number of live application connections.
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Attach an opaque UI-owner reference to a connected application.
    pub fn set_ui_owner(&mut self, handle: AppHandle, owner: u64) -> BrokerResult<()> {
        self.registry.get_mut(handle)?.ui_owner = Some(owner);
        Ok(())
    }

    /// The single entry point.
    ///
    /// Classifies the triplet, enforces the connection state machine, and
    /// routes to a local handler or the addressed source's entry point.
    /// Failures are folded into `ResultCode::Failure` plus a condition code
    /// on the owning application (or the global slot).
    pub fn dispatch(
        &mut self,
        origin: Option<&Identity>,
        dest: Option<&Identity>,
        group: DataGroups,
        dat: Dat,
        msg: Msg,
        payload: &mut Payload,
    ) -> ResultCode {
        // Notification pattern: the wire-level origin is the source, but
        // broker bookkeeping always keys on the application.
        let (origin, dest, reversed) = if dat == Dat::Null {
            (dest, origin, true)
        } else {
            (origin, dest, false)
        };

        match self.route(origin, dest, group, dat, msg, payload, reversed) {
            Ok(rc) => rc,
            Err(e) => {
                self.record_failure(origin, &e);
                ResultCode::Failure
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn route(
        &mut self,
        origin: Option<&Identity>,
        dest: Option<&Identity>,
        group: DataGroups,
        dat: Dat,
        msg: Msg,
        payload: &mut Payload,
        reversed: bool,
    ) -> BrokerResult<ResultCode> {
        if reversed {
            return self.handle_notification(origin, dest, group, dat, msg);
        }

        // Pending-event short circuit: an explicit "process event" consults
        // the bridge first; only when nothing is buffered does the message
        // continue toward the source.
        if dat == Dat::Event && msg == Msg::ProcessEvent {
            if !matches!(payload, Payload::Event(_)) {
                return Err(BrokerError::invalid_argument("event payload required"));
            }
            let handle = self.active_app(origin)?;
            let index = self.addressed_source(handle, dest)?;
            let app = self.registry.get_mut(handle)?;
            if let Some(verb) = bridge::try_deliver_pending(app, index)? {
                if let Payload::Event(ev) = payload {
                    ev.message = Some(verb);
                }
                return Ok(ResultCode::SourceEvent);
            }
            return self.forward(handle, index, group, dat, msg, payload);
        }

        // Callback registration is addressed at a source but serviced here.
        if dat == Dat::Callback && msg == Msg::RegisterCallback {
            return self.register_callback(origin, dest, payload);
        }

        if dest.is_none() {
            return self.handle_local(origin, group, dat, msg, payload);
        }

        let handle = self.handle_from(origin)?;
        let index = self.addressed_source(handle, dest)?;
        self.forward(handle, index, group, dat, msg, payload)
    }

    // ------------------------------------------------------------------
    // Local handlers
    // ------------------------------------------------------------------

    fn handle_local(
        &mut self,
        origin: Option<&Identity>,
        group: DataGroups,
        dat: Dat,
        msg: Msg,
        payload: &mut Payload,
    ) -> BrokerResult<ResultCode> {
        if group != DataGroups::CONTROL {
            return Err(BrokerError::BadProtocol { group, dat, msg });
        }
        match (dat, msg) {
            (Dat::Parent, Msg::OpenBroker) => self.open_broker(origin, payload),
            (Dat::Parent, Msg::CloseBroker) => self.close_broker(origin),
            (Dat::Status, Msg::Get) => self.get_status(origin, payload),
            (Dat::Identity, Msg::GetFirst) => self.get_first(origin, payload),
            (Dat::Identity, Msg::GetNext) => self.get_next(origin, payload),
            (Dat::Identity, Msg::GetDefault) => self.get_default(origin, payload),
            (Dat::Identity, Msg::SetDefault) => self.set_default(origin, payload),
            (Dat::Identity, Msg::OpenSource) => self.open_source(origin, payload),
            (Dat::Identity, Msg::CloseSource) => self.close_source(origin, payload),
            _ => Err(BrokerError::BadProtocol { group, dat, msg }),
        }
    }

    fn open_broker(
        &mut self,
        origin: Option<&Identity>,
        payload: &mut Payload,
    ) -> BrokerResult<ResultCode> {
        let identity = match payload.as_identity() {
            Some(id) => id.clone(),
            None => origin.cloned().ok_or_else(|| {
                BrokerError::invalid_argument("connect requires an application identity")
            })?,
        };
        let handle = self.registry.register(identity)?;

        // Discovery repopulates the source table on every connect; nothing
        // is cached across connections.
        let roots = self.config.scan_roots();
        let app = self.registry.get_mut(handle)?;
        app.reset_sources();
        let mut found = 0;
        for root in &roots {
            found += discovery::discover(app, &*self.loader, root);
        }
        app.state = ConnState::Active;
        let registered = app.identity.clone();

        log::info!(
            "application '{}' connected as handle {} ({} sources discovered)",
            registered.product_name,
            handle,
            found
        );
        if let Some(out) = payload.identity_mut() {
            *out = registered;
        }
        Ok(ResultCode::Success)
    }

    fn close_broker(&mut self, origin: Option<&Identity>) -> BrokerResult<ResultCode> {
        let handle = self.handle_from(origin)?;
        self.registry.deregister(handle)?;
        log::info!("application handle {} disconnected", handle);
        if self.registry.is_empty() {
            log::debug!("last application disconnected; broker idle");
        }
        Ok(ResultCode::Success)
    }

    fn get_status(
        &mut self,
        origin: Option<&Identity>,
        payload: &mut Payload,
    ) -> BrokerResult<ResultCode> {
        let code = match origin {
            Some(o) if self.registry.validate(o.id) => self.registry.condition(o.id)?,
            _ => std::mem::take(&mut self.global_condition),
        };
        match payload {
            Payload::Status(slot) => *slot = code,
            other => *other = Payload::Status(code),
        }
        Ok(ResultCode::Success)
    }

    fn get_first(
        &mut self,
        origin: Option<&Identity>,
        payload: &mut Payload,
    ) -> BrokerResult<ResultCode> {
        require_identity_payload(payload)?;
        let handle = self.active_app(origin)?;
        let app = self.registry.get_mut(handle)?;
        match app.first_source() {
            Some(src) => {
                let identity = src.identity.clone();
                put_identity(payload, identity);
                Ok(ResultCode::Success)
            }
            None => Ok(ResultCode::EndOfList),
        }
    }

    fn get_next(
        &mut self,
        origin: Option<&Identity>,
        payload: &mut Payload,
    ) -> BrokerResult<ResultCode> {
        require_identity_payload(payload)?;
        let handle = self.active_app(origin)?;
        let app = self.registry.get_mut(handle)?;
        match app.next_source()? {
            Some(src) => {
                let identity = src.identity.clone();
                put_identity(payload, identity);
                Ok(ResultCode::Success)
            }
            None => Ok(ResultCode::EndOfList),
        }
    }

    fn get_default(
        &mut self,
        origin: Option<&Identity>,
        payload: &mut Payload,
    ) -> BrokerResult<ResultCode> {
        require_identity_payload(payload)?;
        let handle = self.active_app(origin)?;
        let app = self.registry.get(handle)?;
        let index = defaults::resolve(app, &*self.store)?;
        let identity = app
            .source(index)
            .map(|s| s.identity.clone())
            .ok_or_else(|| BrokerError::bad_destination("default source vanished"))?;
        put_identity(payload, identity);
        Ok(ResultCode::Success)
    }

    fn set_default(
        &mut self,
        origin: Option<&Identity>,
        payload: &mut Payload,
    ) -> BrokerResult<ResultCode> {
        let handle = self.active_app(origin)?;
        let requested = payload
            .as_identity()
            .ok_or_else(|| BrokerError::invalid_argument("identity payload required"))?
            .clone();
        let app = self.registry.get(handle)?;
        let index = select_source(app, &requested, None)?;
        let path = app
            .source(index)
            .map(|s| s.path.to_string_lossy().into_owned())
            .ok_or_else(|| BrokerError::bad_destination("unknown source"))?;
        self.store.write(&path)?;
        log::info!("default source set to {:?}", path);
        Ok(ResultCode::Success)
    }

    fn open_source(
        &mut self,
        origin: Option<&Identity>,
        payload: &mut Payload,
    ) -> BrokerResult<ResultCode> {
        let handle = self.active_app(origin)?;
        let requested = payload
            .as_identity()
            .ok_or_else(|| BrokerError::invalid_argument("identity payload required"))?
            .clone();

        let app = self.registry.get(handle)?;
        let index = select_source(app, &requested, Some(&*self.store))?;
        let src = app
            .source(index)
            .ok_or_else(|| BrokerError::bad_destination("unknown source"))?;
        if src.is_open() {
            return Err(BrokerError::sequence("source is already open"));
        }
        let path = src.path.clone();
        let groups = app.identity.supported_groups;

        let outcome = probe_or_open(&*self.loader, groups, &path, true)?;

        // Sources that do not advertise the modern protocol get the legacy
        // loader override for the lifetime of this open.
        let override_handle = if !outcome.identity.supported_groups.contains(DataGroups::MODERN) {
            Some(self.override_hook.install(&path.to_string_lossy())?)
        } else {
            None
        };

        // Commit only after every fallible step has passed.
        let app = self.registry.get_mut(handle)?;
        let id = (index + 1) as u32;
        let src = app
            .source_mut(index)
            .ok_or_else(|| BrokerError::bad_destination("unknown source"))?;
        src.identity = outcome.identity;
        src.identity.id = id;
        src.entry = outcome.entry;
        src.module = outcome.module;
        src.override_handle = override_handle;
        let opened = src.identity.clone();

        log::info!(
            "opened source '{}' (slot {}) for application handle {}",
            opened.product_name,
            index,
            handle
        );
        put_identity(payload, opened);
        Ok(ResultCode::Success)
    }

    fn close_source(
        &mut self,
        origin: Option<&Identity>,
        payload: &mut Payload,
    ) -> BrokerResult<ResultCode> {
        let handle = self.active_app(origin)?;
        let requested = payload
            .as_identity()
            .ok_or_else(|| BrokerError::invalid_argument("identity payload required"))?
            .clone();
        let app = self.registry.get(handle)?;
        let index = select_source(app, &requested, None)?;

        let app = self.registry.get_mut(handle)?;
        let src = app
            .source_mut(index)
            .ok_or_else(|| BrokerError::bad_destination("unknown source"))?;
        if !src.is_open() {
            return Err(BrokerError::sequence("source is not open"));
        }
        if src.in_flight {
            return Err(BrokerError::sequence(
                "cannot close a source with a call in flight",
            ));
        }
        let override_handle = src.override_handle.take();
        let name = src.identity.product_name.clone();
        src.close();

        if let Some(h) = override_handle {
            if let Err(e) = self.override_hook.uninstall(h) {
                log::warn!("loader override uninstall for '{}' failed: {}", name, e);
            }
        }
        log::info!("closed source '{}' for application handle {}", name, handle);
        Ok(ResultCode::Success)
    }

    fn register_callback(
        &mut self,
        origin: Option<&Identity>,
        dest: Option<&Identity>,
        payload: &mut Payload,
    ) -> BrokerResult<ResultCode> {
        let handle = self.active_app(origin)?;
        let index = self.addressed_source(handle, dest)?;
        let reg = match payload {
            Payload::Callback(reg) => CallbackReg {
                callback: reg.callback.take(),
                token: reg.token,
            },
            _ => {
                return Err(BrokerError::invalid_argument(
                    "callback payload required",
                ))
            }
        };
        let app = self.registry.get_mut(handle)?;
        let src = app
            .source_mut(index)
            .ok_or_else(|| BrokerError::bad_destination("unknown source"))?;
        if !src.is_open() {
            return Err(BrokerError::sequence(
                "callback registration requires an open source",
            ));
        }
        bridge::register_callback(app, index, reg)?;
        Ok(ResultCode::Success)
    }

    // ------------------------------------------------------------------
    // Notification and forwarding paths
    // ------------------------------------------------------------------

    fn handle_notification(
        &mut self,
        origin: Option<&Identity>,
        dest: Option<&Identity>,
        group: DataGroups,
        dat: Dat,
        msg: Msg,
    ) -> BrokerResult<ResultCode> {
        if !msg.is_notification() {
            return Err(BrokerError::BadProtocol { group, dat, msg });
        }
        let handle = self.handle_from(origin)?;
        let index = self.addressed_source(handle, dest)?;

        let wake = &*self.wake;
        let app = self.registry.get_mut(handle)?;
        let app_identity = app.identity.clone();
        let src = app
            .source_mut(index)
            .ok_or_else(|| BrokerError::bad_destination("unknown source"))?;
        let src_identity = src.identity.clone();
        bridge::deliver(&mut src.callback, &src_identity, &app_identity, msg, wake)
    }

    /// Forward a triplet into the addressed source's entry point.
    ///
    /// The entry point is invoked synchronously with a private copy of the
    /// application's identity, guarded by the in-flight flag and the panic
    /// firewall. Calls may block for an unbounded time (a source may show
    /// its own UI); cancellation policy belongs to the caller.
    fn forward(
        &mut self,
        handle: AppHandle,
        index: usize,
        group: DataGroups,
        dat: Dat,
        msg: Msg,
        payload: &mut Payload,
    ) -> BrokerResult<ResultCode> {
        let app = self.registry.get(handle)?;
        if app.state != ConnState::Active {
            return Err(BrokerError::sequence("application is not connected"));
        }
        let legacy = app.identity.version.is_legacy();
        let app_identity = app.identity.clone();

        let wake = &*self.wake;
        let app = self.registry.get_mut(handle)?;
        let src = app
            .source_mut(index)
            .ok_or_else(|| BrokerError::bad_destination("unknown source"))?;
        if src.entry.is_none() {
            return Err(BrokerError::bad_destination("source is not open"));
        }
        if src.in_flight {
            if legacy {
                // Documented leniency: pre-2.0 applications were allowed to
                // re-enter a source mid-call.
                log::warn!(
                    "legacy application '{}' re-entered source '{}' mid-call",
                    app_identity.product_name,
                    src.identity.product_name
                );
            } else {
                return Err(BrokerError::sequence(
                    "a call to this source is already in flight",
                ));
            }
        }
        src.in_flight = true;
        let src_identity = src.identity.clone();

        let result = {
            let SourceRecord {
                entry, callback, ..
            } = src;
            match entry.as_mut() {
                Some(entry) => {
                    let mut host = BridgeHost {
                        record: callback,
                        source_identity: &src_identity,
                        app_identity: &app_identity,
                        wake,
                    };
                    firewall("source entry point", || {
                        entry.call(&mut host, Some(&app_identity), group, dat, msg, payload)
                    })
                }
                None => Err(BrokerError::bad_destination("source is not open")),
            }
        };

        src.in_flight = false;
        result
    }

    // ------------------------------------------------------------------
    // Validation helpers
    // ------------------------------------------------------------------

    fn handle_from(&self, origin: Option<&Identity>) -> BrokerResult<AppHandle> {
        let id = origin
            .ok_or_else(|| BrokerError::invalid_argument("missing origin identity"))?
            .id;
        if self.registry.validate(id) {
            Ok(id)
        } else {
            Err(BrokerError::invalid_argument(format!(
                "unknown application handle {}",
                id
            )))
        }
    }

    /// Validate origin and require a completed connect.
    fn active_app(&self, origin: Option<&Identity>) -> BrokerResult<AppHandle> {
        let handle = self.handle_from(origin)?;
        if self.registry.state(handle)? != ConnState::Active {
            return Err(BrokerError::sequence("application is not connected"));
        }
        Ok(handle)
    }

    /// Resolve a destination identity to a validated source index.
    fn addressed_source(
        &self,
        handle: AppHandle,
        dest: Option<&Identity>,
    ) -> BrokerResult<usize> {
        let dest = dest
            .ok_or_else(|| BrokerError::invalid_argument("missing source destination"))?;
        let index = (dest.id as usize)
            .checked_sub(1)
            .ok_or_else(|| BrokerError::bad_destination("source id 0 is invalid"))?;
        if !self.registry.validate_pair(handle, index) {
            return Err(BrokerError::bad_destination(format!(
                "no source with id {} for application handle {}",
                dest.id, handle
            )));
        }
        Ok(index)
    }

    fn record_failure(&mut self, origin: Option<&Identity>, err: &BrokerError) {
        let condition = err.condition();
        log::debug!("dispatch failed: {}", err);
        if let Some(o) = origin {
            if self.registry.validate(o.id) {
                let _ = self.registry.set_condition(o.id, condition);
                return;
            }
        }
        self.global_condition = condition;
    }
}

/// Pick the source slot a request names: by assigned id, by product name,
/// or (when a store is supplied) by default resolution for a blank
/// identity.
fn select_source(
    app: &AppRecord,
    requested: &Identity,
    store: Option<&dyn DefaultStore>,
) -> BrokerResult<usize> {
    if requested.id != 0 {
        let index = (requested.id - 1) as usize;
        if app.source(index).is_some() {
            return Ok(index);
        }
        return Err(BrokerError::bad_destination(format!(
            "no source with id {}",
            requested.id
        )));
    }
    if !requested.product_name.is_empty() {
        return app
            .find_source_by_name(&requested.product_name)
            .ok_or_else(|| {
                BrokerError::bad_destination(format!(
                    "no source named '{}'",
                    requested.product_name
                ))
            });
    }
    match store {
        Some(store) => defaults::resolve(app, store),
        None => Err(BrokerError::invalid_argument(
            "source identity required",
        )),
    }
}

fn require_identity_payload(payload: &Payload) -> BrokerResult<()> {
    match payload {
        Payload::Identity(_) => Ok(()),
        _ => Err(BrokerError::invalid_argument("identity payload required")),
    }
}

fn put_identity(payload: &mut Payload, identity: Identity) {
    if let Payload::Identity(out) = payload {
        *out = identity;
    }
}
