//! Capstan wire protocol.
//!
//! Types shared by the server and its clients: the duplex frames exchanged
//! over a WebSocket connection, correlation identifiers, declared parameter
//! schemas and the public listing of a tool.
//!
//! # Example
//!
//! ```
//! use protocol::{ClientFrame, CorrelationId};
//!
//! let text = r#"{"type":"invoke","correlationId":"c-1","tool":"file_search","parameters":{}}"#;
//! let frame = ClientFrame::parse(text, protocol::MAX_FRAME_BYTES)?;
//! if let ClientFrame::Invoke { correlation_id, tool, .. } = frame {
//!     assert_eq!(correlation_id, CorrelationId::from("c-1"));
//!     assert_eq!(tool, "file_search");
//! }
//! # Ok::<(), protocol::Error>(())
//! ```

mod error;
mod frame;
mod schema;

pub use error::{Error, Result};
pub use frame::{
    ClientFrame, CorrelationId, ErrorBody, FailureKind, Outcome, ServerFrame, ToolListing,
};
pub use schema::{ParamSpec, ParamType, ParameterSchema};

/// Default maximum inbound frame size (1MB).
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;
