//! Observing resources (RFC7641)
//!
//! A client registers interest in a resource by sending a GET with
//! `Observe: 0`, and the server keeps sending the resource's state
//! (notifications) with the registration's token until either side is
//! no longer interested.
//!
//! - [`Observation`] is the client side of this
//! - [`Subject`] is the server side, one per registered client

/// Observations of remote resources
pub mod client;

/// Remote observers of local resources
pub mod server;

#[doc(inline)]
pub use client::Observation;
#[doc(inline)]
pub use server::Subject;
