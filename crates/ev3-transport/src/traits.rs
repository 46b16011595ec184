use crate::Result;
use std::sync::{Arc, Mutex};

/// Callback invoked once per complete inbound frame. Reassembly of partial
/// frames is the backend's job; handlers always see whole frames.
pub type DataHandler = Box<dyn FnMut(&[u8]) + Send>;

/// A transport shared between the API front end and the monitoring task.
pub type SharedTransport = Arc<Mutex<dyn Transport + Send>>;

/// Fire-and-forget byte pipe to an EV3 brick.
///
/// `send` never waits for an acknowledgement; the only way a caller learns
/// the effect of a command is through a later response frame delivered to
/// the registered data handler.
pub trait Transport {
    /// Send one encoded command buffer.
    fn send(&mut self, buffer: &[u8]) -> Result<()>;

    /// Register the handler invoked for every inbound frame. Replaces any
    /// previously registered handler.
    fn set_data_handler(&mut self, handler: DataHandler);

    /// Whether the underlying link is currently usable.
    fn is_connected(&self) -> bool;
}
