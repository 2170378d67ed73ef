//! baton - leader/follower rendezvous over a single TCP address.
//!
//! Every process contends for one address. Whoever binds it leads and
//! heartbeats all connected followers; everyone else follows, and takes
//! over when the leader goes silent.

mod runtime;

#[doc(hidden)]
pub use baton_core;
#[doc(hidden)]
pub use baton_runtime;

pub use runtime::{shutdown_signal, Baton, BatonBuilder};
