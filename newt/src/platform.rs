use core::fmt::Debug;
use core::marker::PhantomData;

use crate::net::Socket;
use crate::time::Clock;

/// Types needed to run a [`Core`](crate::core::Core)
///
/// The runtime is generic over the clock and socket
/// so that it can be driven by mocks in tests
/// (or by something other than `std` in the future.)
pub trait PlatformTypes: Sized + 'static + Debug + Send + Sync {
  /// What type should we use to keep track of time?
  type Clock: Clock + Debug + Send + Sync;

  /// What should we use for networking?
  type Socket: Socket + Debug + Send + Sync;
}

/// Error yielded by the socket of a [`PlatformTypes`]
pub type SocketError<P> = <<P as PlatformTypes>::Socket as Socket>::Error;

/// Implementor of [`PlatformTypes`] parameterized
/// by a clock and a socket
#[derive(Clone, Copy)]
pub struct Alloc<Clk, Sock>(PhantomData<(Clk, Sock)>)
  where Clk: Clock + Debug + Send + Sync + 'static,
        Sock: Socket + Debug + Send + Sync + 'static;

impl<Clk, Sock> Debug for Alloc<Clk, Sock>
  where Clk: Clock + Debug + Send + Sync + 'static,
        Sock: Socket + Debug + Send + Sync + 'static
{
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "Alloc::<_, _>(_)")
  }
}

impl<Clk, Sock> PlatformTypes for Alloc<Clk, Sock>
  where Clk: Clock + Debug + Send + Sync + 'static,
        Sock: Socket + Debug + Send + Sync + 'static
{
  type Clock = Clk;
  type Socket = Sock;
}

/// [`PlatformTypes`] for platforms with `std`
pub type Std = Alloc<crate::std::Clock, std::net::UdpSocket>;
