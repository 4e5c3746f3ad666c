/// Client side of a request / response exchange
pub mod client;

/// Server side of a request / response exchange
pub mod server;

#[doc(inline)]
pub use client::{Response, TransactionClient};
#[doc(inline)]
pub use server::TransactionServer;
