//! Core math modules.

pub mod beta;
pub mod distance;
pub mod error;
pub mod kernel;
pub mod stable;
pub mod summary;
pub mod transform;
