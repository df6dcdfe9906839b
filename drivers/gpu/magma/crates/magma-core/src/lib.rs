//! # MAGMA Core
//!
//! Foundational types shared by the MAGMA query-result core.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      magma-core                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Error     │  │   Types     │  │   Configuration     │  │
//! │  │  (Result,   │  │ (GpuAddr,   │  │     Result          │  │
//! │  │   Display)  │  │  ByteSize)  │  │  (sticky, first     │  │
//! │  │             │  │             │  │   error wins)       │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(any(feature = "std", test))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod config;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use config::ConfigurationResult;
pub use error::{Error, Result};
pub use types::*;
