// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Errors returned by pool operations.

use std::fmt::{Display, Formatter};

/// Error type for all fallible pool operations.
///
/// Configuration errors (`Invalid*`) are detected synchronously at
/// construction and no partial pool is returned. Capacity and lifecycle
/// errors ([`PoolOverload`](PoolError::PoolOverload),
/// [`PoolClosed`](PoolError::PoolClosed)) are fully recoverable: the caller
/// decides whether to retry, drop the task, or reboot the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The requested pool capacity is invalid in a context that requires a
    /// positive capacity.
    InvalidPoolSize,
    /// Pre-allocation of the idle-worker queue was requested together with an
    /// unbounded capacity, which has no fixed size to pre-allocate.
    InvalidPreallocSize,
    /// The operation targets a pool that has been released.
    PoolClosed,
    /// The pool is saturated and no worker could be acquired, either because
    /// non-blocking mode is set or because the blocking-submitter limit was
    /// reached.
    PoolOverload,
    /// The pool did not quiesce before the shutdown deadline.
    ReleaseTimeout,
    /// A multi-pool needs at least one shard.
    InvalidMultiPoolSize,
    /// A per-shard accessor was called with an out-of-range shard index.
    InvalidPoolIndex,
    /// One or more shards of a multi-pool failed to release within the
    /// timeout. Each entry carries the shard index and the error it reported.
    ShardRelease(Vec<(usize, PoolError)>),
}

impl Display for PoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::InvalidPoolSize => write!(f, "pool capacity must be positive"),
            PoolError::InvalidPreallocSize => {
                write!(f, "pre-allocation requires a bounded capacity")
            }
            PoolError::PoolClosed => write!(f, "the pool has been closed"),
            PoolError::PoolOverload => {
                write!(f, "the pool is at capacity and no worker is available")
            }
            PoolError::ReleaseTimeout => {
                write!(f, "the pool failed to quiesce before the timeout")
            }
            PoolError::InvalidMultiPoolSize => {
                write!(f, "a multi-pool needs at least one shard")
            }
            PoolError::InvalidPoolIndex => write!(f, "shard index out of range"),
            PoolError::ShardRelease(failures) => {
                write!(f, "failed to release shards:")?;
                for (index, error) in failures {
                    write!(f, " [shard {index}: {error}]")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for PoolError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_shard_release() {
        let error = PoolError::ShardRelease(vec![
            (0, PoolError::ReleaseTimeout),
            (2, PoolError::ReleaseTimeout),
        ]);
        assert_eq!(
            error.to_string(),
            "failed to release shards: [shard 0: the pool failed to quiesce before the timeout] \
             [shard 2: the pool failed to quiesce before the timeout]"
        );
    }
}
