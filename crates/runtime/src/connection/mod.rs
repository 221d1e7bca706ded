//! Duplex connections: per-connection correlation and lifecycle management.

mod correlator;
mod manager;

pub use correlator::Correlator;
pub use manager::{
    Connection, ConnectionConfig, ConnectionId, ConnectionInfo, ConnectionManager,
    ConnectionState, DEFAULT_CLOSE_GRACE, DEFAULT_MAX_IN_FLIGHT, DEFAULT_QUEUE_CAPACITY,
};
