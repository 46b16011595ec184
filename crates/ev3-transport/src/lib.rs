//! ev3-transport: transport abstractions for the EV3 brick
//!
//! This crate provides the trait and types for shipping raw byte buffers to a
//! LEGO Mindstorms EV3 brick and receiving response frames back. The actual
//! link layer (Bluetooth RFCOMM pairing, socket handling, frame reassembly)
//! lives behind the [`Transport`] trait; the default build enables a `mock`
//! backend so binaries and tests compile on any host without a Bluetooth
//! stack.

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{DataHandler, SharedTransport, Transport};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::MockTransport;
