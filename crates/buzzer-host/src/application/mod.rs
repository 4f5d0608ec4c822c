//! Application layer: use cases written against [`transport::BuzzerTransport`].
//!
//! - [`lifecycle`] drives a transport from "device present" to "connected".
//! - [`peer_sync`] keeps the live peer view.
//! - [`commands`] sends commands to peers and reads/writes gateway settings.
//! - [`errors`] is the single funnel every failure goes through.

pub mod commands;
pub mod errors;
pub mod lifecycle;
pub mod peer_sync;
pub mod transport;
