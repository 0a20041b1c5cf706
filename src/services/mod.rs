//! Services module - the network side of the sync engine.
//!
//! Everything here runs on tokio worker tasks and never calls into the host
//! directly. Results reach the main thread through the store (model swaps),
//! the pending-write flag, and the deferred effect queue.
//!
//! # Components
//!
//! - [`RemoteSyncClient`]: Long-lived connect/receive/reconnect loop with a
//!   fixed backoff and a single cancellation signal
//! - [`MessageAssembler`]: Joins partial frames into one payload at the
//!   message boundary, enforcing the size limit
//! - [`RemoteMessageHandler`]: Decodes payloads and dispatches on the
//!   message `type` (`init`, `update`, `popup`)
//! - [`Connector`]: Transport seam. [`WebSocketConnector`] is the production
//!   implementation; tests plug in scripted connectors
//!
//! # Usage Example
//!
//! ```ignore
//! use shadersync::services::{RemoteSyncClient, WebSocketConnector};
//!
//! let client = RemoteSyncClient::new(
//!     &settings,
//!     Arc::new(WebSocketConnector::new()),
//!     handler,
//!     effects,
//!     metrics,
//!     runtime.handle().clone(),
//! );
//! client.start();
//! // ...
//! client.shutdown();
//! ```

pub mod assembler;
pub mod handler;
pub mod remote;
pub mod transport;

pub use assembler::MessageAssembler;
pub use handler::{HandleOutcome, RemoteMessageHandler};
pub use remote::{ConnectionState, RemoteSyncClient};
pub use transport::{Connector, Frame, FrameStream, TransportError, WebSocketConnector};
