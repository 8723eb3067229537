//! Typed message payloads carried alongside a triplet.

use std::fmt;

use super::{ConditionCode, Dat, Identity, Msg, ResultCode};

/// Application callback invoked for source notifications, in the reversed
/// role: the source is the logical origin, the application the destination.
/// Notifications carry no payload.
pub type CallbackFn = Box<dyn FnMut(&Identity, &Identity, Dat, Msg) -> ResultCode + Send>;

/// Callback registration data for `Dat::Callback` / `Msg::RegisterCallback`.
///
/// `callback` may be absent: legacy applications register only a token and
/// poll for buffered notifications through the event pump.
#[derive(Default)]
pub struct CallbackReg {
    pub callback: Option<CallbackFn>,
    /// Opaque correlation token echoed back to the application.
    pub token: u32,
}

impl fmt::Debug for CallbackReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackReg")
            .field(
                "callback",
                &if self.callback.is_some() { "<fn>" } else { "<none>" },
            )
            .field("token", &self.token)
            .finish()
    }
}

/// Event pump payload for `Dat::Event` / `Msg::ProcessEvent`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPayload {
    /// The platform event being pumped. Opaque to the broker; forwarded
    /// untouched when the event is not a buffered source notification.
    pub raw: Vec<u8>,

    /// Set to the buffered notification verb when dispatch reports
    /// `ResultCode::SourceEvent`.
    pub message: Option<Msg>,
}

/// The opaque payload slot of the entry surface, given typed shape.
#[derive(Debug, Default)]
pub enum Payload {
    #[default]
    None,
    Identity(Identity),
    Status(ConditionCode),
    Event(EventPayload),
    Callback(CallbackReg),
    /// Source-specific data forwarded without interpretation.
    Raw(Vec<u8>),
}

impl Payload {
    pub fn as_identity(&self) -> Option<&Identity> {
        match self {
            Payload::Identity(id) => Some(id),
            _ => None,
        }
    }

    pub fn identity_mut(&mut self) -> Option<&mut Identity> {
        match self {
            Payload::Identity(id) => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_reg_debug_hides_closure() {
        let reg = CallbackReg {
            callback: Some(Box::new(|_, _, _, _| ResultCode::Success)),
            token: 7,
        };
        let dbg = format!("{:?}", reg);
        assert!(dbg.contains("<fn>"));
        assert!(dbg.contains('7'));
    }

    #[test]
    fn test_payload_accessors() {
        let mut p = Payload::Identity(Identity::default());
        assert!(p.as_identity().is_some());
        p.identity_mut().unwrap().id = 3;
        assert_eq!(p.as_identity().unwrap().id, 3);
        assert!(Payload::None.as_identity().is_none());
    }
}
