//! Gateway Server
//!
//! Accepts client connections, decrypts the destination address from the
//! handshake, dials the backend ("agent") and relays bytes both ways.
//!
//! Per connection:
//!
//! ```text
//! accept -> borrow read buffer -> handshake (binary | text frame) -> decrypt
//!        -> dial (retry on timeout) -> bootstrap (preamble + pipelined bytes)
//!        -> return read buffer -> "200" -> relay until either side closes
//! ```
//!
//! Every failure stays local to its connection: the client gets one status
//! token (when a token applies) and both sockets are closed.

pub mod accept;
pub mod bootstrap;
pub mod config;
pub mod diagnostics;
pub mod dial;
pub mod handler;
pub mod handshake;
pub mod pool;
pub mod relay;
pub mod server;
pub mod stats;

pub use accept::{AcceptBackoff, Acceptor};
pub use bootstrap::BootstrapError;
pub use config::{ConfigError, DialPolicy, GatewayConfig};
pub use dial::{Connector, DialError, TcpConnector};
pub use handler::{install_panic_hook, ConnectionError, ConnectionHandler};
pub use handshake::{HandshakeError, HandshakeResult};
pub use pool::{PoolStats, PooledBuffer, ReaderPool};
pub use relay::RelayEnd;
pub use server::{bind_listener, Gateway, GatewayError};
pub use stats::{GatewayStats, StatsSnapshot};
