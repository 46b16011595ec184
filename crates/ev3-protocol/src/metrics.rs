use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct ProtocolMetrics {
    pub tx_buffers: IntCounter,
    pub rx_frames: IntCounter,
    pub decode_errors: IntCounter,
    pub devices_attached: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub protocol: ProtocolMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let tx_buffers = IntCounter::new("ev3_tx_buffers", "Total command buffers sent")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let rx_frames = IntCounter::new("ev3_rx_frames", "Total response frames received")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let decode_errors =
            IntCounter::new("ev3_decode_errors", "Response frames that failed to decode")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let devices_attached =
            IntGauge::new("ev3_devices_attached", "Devices currently in the registry")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let protocol = ProtocolMetrics {
            tx_buffers,
            rx_frames,
            decode_errors,
            devices_attached,
        };
        let _ = registry.register(Box::new(protocol.tx_buffers.clone()));
        let _ = registry.register(Box::new(protocol.rx_frames.clone()));
        let _ = registry.register(Box::new(protocol.decode_errors.clone()));
        let _ = registry.register(Box::new(protocol.devices_attached.clone()));
        Ok(Self { registry, protocol })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
