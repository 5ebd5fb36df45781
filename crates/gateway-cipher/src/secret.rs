use crate::CipherError;
use std::fmt;
use std::sync::Arc;

/// Shared secret loaded once at startup and read-only afterwards
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(Arc<[u8]>);

impl SharedSecret {
    /// Wrap secret bytes, rejecting an empty secret
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, CipherError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(CipherError::EmptySecret);
        }
        Ok(Self(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([redacted; {} bytes])", self.0.len())
    }
}
