// Connection lifecycle state machine for broker handlers
//
// The handler moves through disconnected -> connecting -> ready once; the
// readiness gate owns that state together with the queue of callbacks waiting
// for ready.

pub mod readiness_gate;
pub mod states;

// Re-export main types for convenient access
pub use readiness_gate::{ReadinessGate, ReadyCallback};
pub use states::{transition, ConnectionState, LifecycleEvent};
