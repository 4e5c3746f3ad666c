//! `newt` is a CoAP messaging engine built on [`newt_msg`].
//!
//! ## CoAP
//! CoAP is an application-level network protocol that copies the semantics of HTTP
//! to an environment conducive to **constrained** devices. (weak hardware, small battery capacity, etc.)
//!
//! Because UDP is a "connectionless" protocol, it offers no guarantee of "conversation"
//! between traditional client and server roles. CoAP endpoints are expected to perform both
//! client and server roles, so a single [`Core`](crate::core::Core) drives both.
//!
//! ## Layers
//! Outbound messages flow from the application API down through the protocol layers:
//!
//! ```text
//! client / server / blocking
//!          |
//! block (RFC7959)   observe (RFC7641)
//!          |
//!      transaction
//!          |
//!      transmission  (CON retransmission, ACK caching)
//!          |
//!        core        (dispatch, timers, socket)
//! ```
//!
//! Inbound datagrams are decoded by [`Core::recv`](crate::core::Core::recv) and routed to exactly
//! one listener, chosen by [`CorrelationId`](crate::core::CorrelationId) priority.
//!
//! ## Example
//! ```no_run
//! use newt::client::Client;
//! use newt::req::Method;
//!
//! let (core, _runtime) = newt::std::start("0.0.0.0:0", Default::default()).unwrap();
//! let client = Client::new(core);
//!
//! client.request(Method::GET, "coap://127.0.0.1/hello", None, None, |_, resp| {
//!         println!("{:?}", resp.map(|r| r.data().payload_str().map(String::from)));
//!       })
//!       .unwrap();
//! ```

// x-release-please-start-version
#![doc(html_root_url = "https://docs.rs/newt/0.1.0")]
// x-release-please-end
#![cfg_attr(any(docsrs, feature = "docs"), feature(doc_cfg))]
// -
// style
#![allow(clippy::unused_unit)]
// -
// deny
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![deny(missing_copy_implementations)]
#![cfg_attr(not(test), deny(unsafe_code))]
// -
// warnings
#![cfg_attr(not(test), warn(unreachable_pub))]


pub(crate) mod logging;

/// Blocking CoAP client
pub mod blocking;

/// Blockwise transfers (RFC7959)
pub mod block;

/// CoAP client
pub mod client;

/// configuring runtime behavior
pub mod config;

/// low-level coap behavior
pub mod core;

/// network abstractions
pub mod net;

/// Observe (RFC7641)
pub mod observe;

/// platform configuration
pub mod platform;

/// requests
pub mod req;

/// responses
pub mod resp;

/// customizable retrying of fallible operations
pub mod retry;

/// CoAP server
pub mod server;

/// `std`-only newt stuff
pub mod std;

/// time abstractions
pub mod time;

/// Request / response exchanges
pub mod transaction;

/// Reliable (confirmable) message transmission & reception
pub mod transmission;

macro_rules! code {
  (rfc7252($section:literal) $name:ident = $c:literal * $d:literal) => {
    #[doc = toad_macros::rfc_7252_doc!($section)]
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: newt_msg::Code = newt_msg::Code::new($c, $d);
  };
  (rfc7252($section:literal) $name:ident = $newtype:tt($c:literal * $d:literal)) => {
    #[doc = toad_macros::rfc_7252_doc!($section)]
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: $newtype = $newtype(newt_msg::Code::new($c, $d));
  };
  (#[doc = $doc:expr] $name:ident = $c:literal * $d:literal) => {
    #[doc = $doc]
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: newt_msg::Code = newt_msg::Code::new($c, $d);
  };
}

pub(crate) use code;
