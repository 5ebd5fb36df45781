//! Gateway Wire Protocol
//!
//! Client-facing handshake frames, the 3-digit status tokens written back to
//! clients, and the preamble sent to backends before relaying starts.
//!
//! ```text
//! Binary frame:  0x00 | N | N ciphertext bytes
//! Text frame:    base64(ciphertext) '\n'          (first byte != 0x00)
//! Status token:  "200" | "400" | "401" | "502" | "503"
//! Preamble:      L | L bytes of client "ip:port"  (then pipelined client bytes)
//! ```

pub mod frame;
pub mod preamble;
pub mod reader;
pub mod status;

pub use frame::{Frame, FrameError};
pub use preamble::{Preamble, PreambleError};
pub use reader::BufferedReader;
pub use status::StatusToken;

/// First byte selecting the binary framing
pub const BINARY_MARKER: u8 = 0x00;

/// Largest ciphertext a binary frame can carry (one length byte)
pub const MAX_CIPHERTEXT_LEN: usize = u8::MAX as usize;

/// Largest client address the backend preamble can carry (one length byte)
pub const MAX_PREAMBLE_ADDR_LEN: usize = u8::MAX as usize;

/// Default read-ahead buffer size; also bounds the text frame line length
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;
