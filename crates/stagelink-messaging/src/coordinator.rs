use stagelink_core::{InboundMessage, SceneEvent};

/// A unit that owns a slice of the client protocol.
///
/// The controller registers `outgoing` names on the bus, routes inbound
/// messages named in `incoming`, and fans every scene event out to every
/// coordinator. Handlers run to completion on the host thread; anything that
/// has to wait for later frames is spawned on the coordinator's context.
pub trait Coordinator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Message names this coordinator sends.
    fn outgoing(&self) -> &'static [&'static str];

    /// Message names this coordinator handles.
    fn incoming(&self) -> &'static [&'static str];

    fn on_message(&self, message: &InboundMessage);

    fn on_scene_event(&self, event: &SceneEvent);

    /// Cancel suspended work and drop per-document state.
    fn shutdown(&self);
}
