//! Controller integration tests
//!
//! # Test Organization
//!
//! - `convergence`: Stories about one NVIDIADriver moving from not ready to
//!   ready, failing and recovering, or disappearing mid-flight
//! - `routing`: Stories about watch events turning into reconcile requests
//! - `scheduling`: Stories about coalescing, superseded requeues and the
//!   one-pass-at-a-time guarantee
//!
//! Time-sensitive tests run with a paused tokio clock.

mod convergence;
mod scheduling;
