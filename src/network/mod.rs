//! Network subsystem
//!
//! The TCP channel to the call-relay server, split into directional halves
//! consumed by the session pump.

pub mod relay;

pub use relay::{
    RelayConnector, RelayPair, RelayRead, RelayRx, RelayTx, SendStatus, TcpRelayConnector,
};
