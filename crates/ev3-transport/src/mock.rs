use crate::{DataHandler, Result, Transport, TransportError};

/// In-process transport for tests and demos. Outgoing buffers are recorded,
/// inbound frames are injected by hand.
pub struct MockTransport {
    connected: bool,
    sent: Vec<Vec<u8>>,
    handler: Option<DataHandler>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            connected: true,
            sent: Vec::new(),
            handler: None,
        }
    }

    /// Simulate link loss; subsequent sends fail with `NotConnected`.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Deliver one inbound frame to the registered data handler, as the
    /// real backend would after reassembly.
    pub fn inject(&mut self, frame: &[u8]) {
        if let Some(handler) = self.handler.as_mut() {
            handler(frame);
        } else {
            tracing::debug!("dropping injected frame, no data handler installed");
        }
    }

    /// Buffers recorded by `send`, oldest first.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Drain and return the recorded buffers.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn send(&mut self, buffer: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.sent.push(buffer.to_vec());
        Ok(())
    }

    fn set_data_handler(&mut self, handler: DataHandler) {
        self.handler = Some(handler);
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
