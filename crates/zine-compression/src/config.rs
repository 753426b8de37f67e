//! Construction-time configuration for a [`CompressionClient`].
//!
//! [`CompressionClient`]: crate::CompressionClient

use crate::error::{Error, Result};

/// Number of workers spawned when no explicit size is given.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Pool configuration.
///
/// The pool size doubles as the admission limit: at most `pool_size` requests
/// are in flight at any instant, the rest wait in a FIFO queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pool_size: usize,
}

impl PoolConfig {
    /// Creates a configuration with `pool_size` workers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `pool_size` is zero.
    pub fn new(pool_size: usize) -> Result<Self> {
        if pool_size == 0 {
            return Err(Error::InvalidConfig {
                reason: "pool size must be greater than 0".to_string(),
            });
        }
        Ok(Self { pool_size })
    }

    pub const fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_has_four_workers() {
        assert_eq!(PoolConfig::default().pool_size(), 4);
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(matches!(
            PoolConfig::new(0),
            Err(Error::InvalidConfig { .. })
        ));
        assert_eq!(PoolConfig::new(7).map(|c| c.pool_size()), Ok(7));
    }
}
