//! Connection events and listener dispatch.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | [`Event`], [`EventKind`] and payload types |
//! | `dispatcher` | Listener registry with `once` support |

// ============================================================================
// Submodules
// ============================================================================

/// Event and payload types.
pub mod event;

/// Listener registry and fan-out.
pub mod dispatcher;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::{Callback, Dispatcher, ListenerOptions, ListenerTable, listener};
pub use event::{CloseEvent, Event, EventKind, RetryEvent};
