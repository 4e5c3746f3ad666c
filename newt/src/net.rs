use std::net::SocketAddr;

/// A message (or some other piece of data) paired with the address
/// of the peer it came from or is going to
#[derive(PartialEq, PartialOrd, Eq, Ord, Hash, Debug, Clone, Copy)]
pub struct Addrd<T>(pub T, pub SocketAddr);

impl<T> Addrd<T> {
  /// Borrow the data, keeping the address
  pub fn as_ref(&self) -> Addrd<&T> {
    Addrd(self.data(), self.addr())
  }

  /// Throw away the address
  pub fn unwrap(self) -> T {
    self.0
  }

  /// Transform the data, keeping the address
  pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Addrd<R> {
    Addrd(f(self.0), self.1)
  }

  /// Borrow the data
  pub fn data(&self) -> &T {
    &self.0
  }

  /// Mutably borrow the data
  pub fn data_mut(&mut self) -> &mut T {
    &mut self.0
  }

  /// The peer's address
  pub fn addr(&self) -> SocketAddr {
    self.1
  }
}

/// The datagram transport a [`Core`](crate::core::Core) sends and receives through
///
/// Implemented for [`std::net::UdpSocket`] in [`crate::std`].
pub trait Socket: Sized {
  /// The error yielded by socket operations
  type Error: core::fmt::Debug + Send + Sync + 'static;

  /// The address this socket is bound to
  fn local_addr(&self) -> SocketAddr;

  /// Send one datagram to `msg.addr()`
  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error>;

  /// Pull one datagram from the socket into `buffer`, yielding
  /// its length and the address of the sender.
  ///
  /// Yields [`nb::Error::WouldBlock`] when nothing has arrived.
  /// Bytes of a datagram that don't fit in `buffer` are dropped.
  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error>;
}
