//! Gateway configuration, fixed at startup and shared read-only

use gateway_cipher::AddressCipher;
use gateway_proto::DEFAULT_READ_BUFFER_SIZE;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DIAL_RETRY: u32 = 1;
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Dial retry count must be at least 1")]
    InvalidRetryCount,

    #[error("Dial timeout must be greater than zero")]
    InvalidDialTimeout,

    #[error("Read buffer size must be at least {min} bytes, got {0}", min = MIN_READ_BUFFER_SIZE)]
    InvalidBufferSize(usize),
}

/// Smallest read buffer that still fits a full binary frame
pub const MIN_READ_BUFFER_SIZE: usize = 2 + gateway_proto::MAX_CIPHERTEXT_LEN;

/// How the dial manager reaches a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialPolicy {
    retry_count: u32,
    dial_timeout: Duration,
}

impl DialPolicy {
    pub fn new(retry_count: u32, dial_timeout: Duration) -> Result<Self, ConfigError> {
        if retry_count == 0 {
            return Err(ConfigError::InvalidRetryCount);
        }
        if dial_timeout.is_zero() {
            return Err(ConfigError::InvalidDialTimeout);
        }
        Ok(Self {
            retry_count,
            dial_timeout,
        })
    }

    /// Build from operator-supplied values where `0` means "use the default"
    pub fn normalized(retry_count: u32, dial_timeout_secs: u64) -> Self {
        let retry_count = if retry_count == 0 {
            DEFAULT_DIAL_RETRY
        } else {
            retry_count
        };
        let dial_timeout = if dial_timeout_secs == 0 {
            DEFAULT_DIAL_TIMEOUT
        } else {
            Duration::from_secs(dial_timeout_secs)
        };
        Self {
            retry_count,
            dial_timeout,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }
}

impl Default for DialPolicy {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_DIAL_RETRY,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

/// Everything a connection handler needs, built once and passed explicitly
#[derive(Clone)]
pub struct GatewayConfig {
    cipher: Arc<dyn AddressCipher>,
    dial_policy: DialPolicy,
    read_buffer_size: usize,
}

impl GatewayConfig {
    pub fn new(cipher: impl AddressCipher + 'static, dial_policy: DialPolicy) -> Self {
        Self {
            cipher: Arc::new(cipher),
            dial_policy,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Result<Self, ConfigError> {
        if size < MIN_READ_BUFFER_SIZE {
            return Err(ConfigError::InvalidBufferSize(size));
        }
        self.read_buffer_size = size;
        Ok(self)
    }

    pub fn cipher(&self) -> &dyn AddressCipher {
        self.cipher.as_ref()
    }

    pub fn dial_policy(&self) -> &DialPolicy {
        &self.dial_policy
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("dial_policy", &self.dial_policy)
            .field("read_buffer_size", &self.read_buffer_size)
            .finish_non_exhaustive()
    }
}
