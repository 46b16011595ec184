//! ev3-protocol: LEGO Mindstorms EV3 direct-command encoding, response
//! decoding, device discovery and monitoring

mod error;
pub use error::{ProtocolError, Result};

mod ports;
pub use ports::{InputPort, OutputPorts};

mod opcode;
pub use opcode::{CallbackType, LedColor, LedMode, Opcode};

mod types;
pub use types::*;

mod encode;
pub use encode::CommandBuffer;

mod cache;
pub use cache::CommandCache;

mod commands;
pub use commands::Commands;

mod resolve;
pub use resolve::{Resolution, TypeResolver};

mod registry;
pub use registry::{DeviceRegistry, ValueUpdate};

mod events;
pub use events::{value_event, DeviceEvent, EventBus};

mod metrics;
pub use metrics::{MetricsHub, ProtocolMetrics};

mod decode;
pub use decode::{BrickState, Decoded, PendingReads, ResponseDecoder};

mod monitoring;
pub use monitoring::{load_config_file, Monitoring, MonitoringConfig, Poller};

mod api;
pub use api::{ConnectionState, Ev3Api};
