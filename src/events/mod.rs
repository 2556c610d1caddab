pub mod registry;
pub mod types;

// Re-export key types for convenience
pub use registry::{EventRegistry, ListenerSet, Subscription};
pub use types::{ErrorListener, HandlerFuture, IntentionListener, ReadyListener};
