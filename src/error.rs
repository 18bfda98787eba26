use std::io;

use thiserror::Error;

use crate::constants::{MAX_LOAD, MIN_LOAD};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("compute load {value} is outside {min}..={max}", min = MIN_LOAD, max = MAX_LOAD)]
    LoadOutOfRange { value: i64 },

    #[error("grid size {size} is too small, need at least 3")]
    GridTooSmall { size: usize },

    #[error("tick period must be non-zero and the slow period must not be shorter than the fast one")]
    InvalidPeriod,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComputeError {
    #[error("grid size {size} is too small for a 3x3 stencil")]
    GridTooSmall { size: usize },

    #[error("input grid is {actual}x{actual}, engine expects {expected}x{expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to spawn the compute loop thread")]
    SpawnFailed(#[source] io::Error),

    #[error("compute loop terminated by a fault")]
    LoopPanicked,
}
