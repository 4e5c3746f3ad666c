/// Blocking CoAP client
pub mod client;

#[doc(inline)]
pub use client::{Client, ClientResultExt};
