use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_time::rate::Fraction;

use crate::config::Config;
use crate::core::Core;
use crate::net::{Addrd, Socket};
use crate::platform::{PlatformTypes, Std};

/// How long [`Runtime`]'s thread waits for a datagram
/// before checking its timers again
pub const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Implement [`embedded_time::Clock`] using [`std::time`] primitives
#[derive(Debug, Clone, Copy)]
pub struct Clock(std::time::Instant);

impl Default for Clock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock {
  /// Create a new clock
  pub fn new() -> Self {
    Self(std::time::Instant::now())
  }
}

impl embedded_time::Clock for Clock {
  type T = u64;

  // microseconds
  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

  fn try_now(&self) -> Result<embedded_time::Instant<Self>, embedded_time::clock::Error> {
    let elapsed = std::time::Instant::now().duration_since(self.0);
    Ok(embedded_time::Instant::new(elapsed.as_micros() as u64))
  }
}

/// A socket read timing out is no different from nothing being there
fn io_to_nb(err: io::Error) -> nb::Error<io::Error> {
  match err.kind() {
    | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => nb::Error::WouldBlock,
    | _ => nb::Error::Other(err),
  }
}

impl Socket for UdpSocket {
  type Error = io::Error;

  fn local_addr(&self) -> SocketAddr {
    UdpSocket::local_addr(self).unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
  }

  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error> {
    self.send_to(msg.data(), msg.addr())
        .map(|_| ())
        .map_err(io_to_nb)
  }

  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    self.recv_from(buffer)
        .map(|(n, addr)| Addrd(n, addr))
        .map_err(io_to_nb)
  }
}

/// A thread driving a [`Core`]: receiving datagrams and firing timers
///
/// The thread stops when the runtime is dropped.
#[derive(Debug)]
pub struct Runtime {
  stop: Arc<AtomicBool>,
  thread: Option<JoinHandle<()>>,
}

impl Runtime {
  /// Drive `core` on a new thread.
  ///
  /// The core's socket should block on reads for a short while
  /// (like the one created by [`start`]) otherwise this will spin.
  pub fn spawn<P: PlatformTypes>(core: Arc<Core<P>>) -> Self {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_thread = stop.clone();

    let thread = thread::spawn(move || {
      while !stop_thread.load(Ordering::Relaxed) {
        match core.poll() {
          | Ok(()) | Err(nb::Error::WouldBlock) => (),
          | Err(nb::Error::Other(e)) => log::error!("{}", e),
        }

        if let Err(e) = core.tick() {
          log::error!("{}", e);
        }
      }
    });

    Self { stop,
           thread: Some(thread) }
  }

  /// Stop the runtime, waiting for its thread to exit
  pub fn stop(self) {}
}

impl Drop for Runtime {
  fn drop(&mut self) {
    self.stop.store(true, Ordering::Relaxed);
    if let Some(thread) = self.thread.take() {
      if thread.join().is_err() {
        log::error!("runtime thread panicked");
      }
    }
  }
}

/// Bind a UDP socket to `addr` and start driving a [`Core`] with it
///
/// ```no_run
/// use newt::net::Socket;
///
/// let (core, runtime) = newt::std::start("0.0.0.0:5683", Default::default()).unwrap();
/// println!("listening on {}", Socket::local_addr(core.socket()));
/// runtime.stop();
/// ```
pub fn start<A: ToSocketAddrs>(addr: A, config: Config) -> io::Result<(Arc<Core<Std>>, Runtime)> {
  let sock = UdpSocket::bind(addr)?;
  sock.set_read_timeout(Some(READ_TIMEOUT))?;

  let core = Arc::new(Core::new_config(config, Clock::new(), sock));
  let runtime = Runtime::spawn(core.clone());
  Ok((core, runtime))
}

#[cfg(test)]
mod tests {
  use newt_msg::{Code, Id, Message, MessageOptions, TryFromBytes, TryIntoBytes, Type};

  use super::*;
  use crate::test;

  #[test]
  fn clock_counts_up_in_micros() {
    let clock = Clock::new();
    let a = embedded_time::Clock::try_now(&clock).unwrap();
    thread::sleep(Duration::from_millis(2));
    let b = embedded_time::Clock::try_now(&clock).unwrap();

    let elapsed = crate::time::millis_since_epoch(b).unwrap()
                  - crate::time::millis_since_epoch(a).unwrap();
    assert!(elapsed >= 1);
  }

  #[test]
  fn udp_socket_reads_time_out_as_would_block() {
    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    sock.set_read_timeout(Some(Duration::from_millis(1))).unwrap();

    let mut buf = [0u8; 16];
    assert!(matches!(Socket::recv(&sock, &mut buf), Err(nb::Error::WouldBlock)));
  }

  #[test]
  fn runtime_answers_unknown_requests() {
    let (core, runtime) = start("127.0.0.1:0", Config::default()).unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut req = Message::new(Type::Con, Code::new(0, 1), Id(7), test::token(1));
    req.set_path("nobody/home");
    peer.send_to(&req.try_into_bytes().unwrap(), Socket::local_addr(core.socket()))
        .unwrap();

    let mut buf = [0u8; 64];
    let (n, _) = peer.recv_from(&mut buf).unwrap();
    let rst = Message::try_from_bytes(&buf[..n]).unwrap();
    assert_eq!((rst.ty, rst.id), (Type::Reset, Id(7)));

    runtime.stop();
  }
}
