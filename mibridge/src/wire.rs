/// Target-wire boundary
///
/// The bridge core never builds or serializes client-side wire packets.
/// It hands classified events to an `EventTranslator`, which owns packet
/// construction, and transmits whatever the translator returns.

use thiserror::Error;

use crate::events::MiEvent;

#[derive(Error, Debug)]
pub enum TranslatorError {
    #[error("failed to transmit outbound packet: {0}")]
    Send(String),
    #[error("wire connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TranslatorError>;

/// A fully built outbound packet. Sending consumes it; this layer never
/// retries or buffers a packet.
pub trait OutboundPacket: Send {
    fn send(self: Box<Self>) -> Result<()>;
}

/// Converts events into outbound wire packets for the client connection.
pub trait EventTranslator: Send + Sync {
    /// Translate a run-control event. `None` means the event has no
    /// outbound representation; it is dropped after classification.
    fn translate(&self, event: &MiEvent) -> Option<Box<dyn OutboundPacket>>;

    /// Translate a notification originating from the debuggee's runtime
    /// rather than the MI stream.
    fn translate_vm(&self, notification: &VmNotification) -> Option<Box<dyn OutboundPacket>>;
}

/// Notifications delivered on the debugger channel that belong to the
/// monitored process's runtime, not to the MI protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum VmNotification {
    ClassPrepare {
        thread_id: u64,
        signature: String,
    },
}
