//! Callback registration and source-to-application notification delivery.
//!
//! A source pushes notifications (transfer-ready, close-requested, ...) to
//! its owning application through here, either mid-call via the
//! [`SourceHost`] handed to its entry point or as a top-level dispatch with
//! the roles reversed on the wire.

use crate::error::{firewall, BrokerError, BrokerResult};
use crate::hooks::Wake;
use crate::protocol::{CallbackReg, Dat, Identity, Msg, ResultCode};
use crate::registry::{AppRecord, CallbackRecord};
use crate::source::SourceHost;

/// Store an application's callback registration on a source record.
pub(crate) fn register_callback(
    app: &mut AppRecord,
    index: usize,
    reg: CallbackReg,
) -> BrokerResult<()> {
    let src = app
        .source_mut(index)
        .ok_or_else(|| BrokerError::bad_destination("unknown source"))?;
    src.callback.callback = reg.callback;
    src.callback.token = reg.token;
    Ok(())
}

/// Deliver one notification verb to the owning application.
///
/// With a registered callback the call is synchronous and role-reversed:
/// the source is the logical origin, the application the destination, and
/// there is no payload. A fault inside the callback becomes a failure plus
/// a `Bummer` condition, never a crash.
///
/// Without a callback the verb is buffered for the event pump. An
/// undelivered previous verb is overwritten — last write wins, and the loss
/// is observable only in the log. Buffering ends with a fire-and-forget
/// wake of the application.
pub(crate) fn deliver(
    record: &mut CallbackRecord,
    source_identity: &Identity,
    app_identity: &Identity,
    msg: Msg,
    wake: &dyn Wake,
) -> BrokerResult<ResultCode> {
    if let Some(cb) = record.callback.as_mut() {
        return firewall("application callback", || {
            cb(source_identity, app_identity, Dat::Null, msg)
        });
    }

    if record.delivery_pending {
        log::warn!(
            "overwriting undelivered notification {:?} from source '{}'",
            record.pending,
            source_identity.product_name
        );
    }
    record.pending = Some(msg);
    record.delivery_pending = true;

    if let Err(e) = wake.wake() {
        log::warn!(
            "wake of application '{}' failed: {}",
            app_identity.product_name,
            e
        );
    }
    Ok(ResultCode::Success)
}

/// Take the buffered notification for one source, if any.
pub(crate) fn try_deliver_pending(app: &mut AppRecord, index: usize) -> BrokerResult<Option<Msg>> {
    let src = app
        .source_mut(index)
        .ok_or_else(|| BrokerError::bad_destination("unknown source"))?;
    if src.callback.delivery_pending {
        src.callback.delivery_pending = false;
        Ok(src.callback.pending.take())
    } else {
        Ok(None)
    }
}

/// The [`SourceHost`] handed to a source entry point for the duration of a
/// forwarded call. Borrows only the callback side of the source record, so
/// a source may raise notifications while its own call is on the stack.
pub(crate) struct BridgeHost<'a> {
    pub record: &'a mut CallbackRecord,
    pub source_identity: &'a Identity,
    pub app_identity: &'a Identity,
    pub wake: &'a dyn Wake,
}

impl SourceHost for BridgeHost<'_> {
    fn notify(&mut self, msg: Msg) -> ResultCode {
        if !msg.is_notification() {
            log::warn!(
                "source '{}' raised non-notification verb {:?}",
                self.source_identity.product_name,
                msg
            );
            return ResultCode::Failure;
        }
        match deliver(
            self.record,
            self.source_identity,
            self.app_identity,
            msg,
            self.wake,
        ) {
            Ok(rc) => rc,
            Err(e) => {
                log::warn!(
                    "notification {:?} from '{}' failed: {}",
                    msg,
                    self.source_identity.product_name,
                    e
                );
                ResultCode::Failure
            }
        }
    }
}
