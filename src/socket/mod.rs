//! Reconnecting socket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  Command   ┌──────────────────────────────┐
//! │ ReconnectingSocket   │──────────►│ Controller task              │
//! │ (cloneable handle)   │           │  - current transport (gen N)  │
//! └──────────────────────┘           │  - user-closed flag           │
//!            ▲                       │  - retry count / timer        │
//!            │ listeners             │  - buffer, backoff            │
//!            └───────────────────────│◄── TransportEvent (gen N)     │
//!                                    └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`ReconnectingSocket`] handle and public API |
//! | `controller` | Lifecycle state machine (internal) |
//! | `builder` | [`SocketBuilder`] and [`SocketConfig`] |

// ============================================================================
// Submodules
// ============================================================================

/// Builder and serializable configuration.
pub mod builder;

/// Connection lifecycle controller.
mod controller;

/// Socket handle.
pub mod core;

#[cfg(test)]
mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{SocketBuilder, SocketConfig};
pub use core::{Listener, ReconnectingSocket};
