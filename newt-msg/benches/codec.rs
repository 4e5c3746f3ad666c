use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use newt_msg::*;

#[derive(Debug, PartialEq, PartialOrd, Ord, Eq)]
struct TestInput {
  tkl: u8,
  n_opts: u16,
  opt_size: usize,
  payload_size: usize,
}

impl TestInput {
  fn message(&self) -> Message {
    let token = core::iter::repeat(1u8).take(self.tkl as _)
                                       .collect::<tinyvec::ArrayVec<[_; 8]>>();

    let mut msg = Message::new(Type::Non, Code::new(2, 5), Id(1), Token(token));
    (0..self.n_opts).for_each(|n| {
                      msg.add(OptNumber(n * 3), OptValue(vec![1; self.opt_size]));
                    });
    msg.payload = Payload(vec![1; self.payload_size]);
    msg
  }

  fn bytes(&self) -> Vec<u8> {
    self.message().try_into_bytes().unwrap()
  }
}

fn inputs() -> Vec<TestInput> {
  vec![TestInput { tkl: 0,
                   n_opts: 0,
                   opt_size: 0,
                   payload_size: 0 },
       TestInput { tkl: 4,
                   n_opts: 4,
                   opt_size: 8,
                   payload_size: 16 },
       TestInput { tkl: 8,
                   n_opts: 8,
                   opt_size: 64,
                   payload_size: 128 },
       TestInput { tkl: 8,
                   n_opts: 16,
                   opt_size: 64,
                   payload_size: 1024 },
       TestInput { tkl: 8,
                   n_opts: 32,
                   opt_size: 512,
                   payload_size: 4096 },]
}

fn message_to_bytes(c: &mut Criterion) {
  let mut group = c.benchmark_group("msg/to_bytes");
  group.measurement_time(std::time::Duration::from_secs(5));

  for inp in inputs().iter() {
    group.bench_with_input(BenchmarkId::new("newt_msg/size", inp.bytes().len()),
                           inp,
                           |b, inp| {
                             b.iter_batched(|| inp.message(),
                                            |m| m.try_into_bytes().unwrap(),
                                            BatchSize::SmallInput)
                           });
  }
  group.finish();
}

fn message_from_bytes(c: &mut Criterion) {
  let mut group = c.benchmark_group("msg/from_bytes");
  group.measurement_time(std::time::Duration::from_secs(5));

  for inp in inputs().iter() {
    let bytes = inp.bytes();
    group.bench_with_input(BenchmarkId::new("newt_msg/size", bytes.len()),
                           &bytes,
                           |b, bytes| b.iter(|| Message::try_from_bytes(bytes).unwrap()));
  }
  group.finish();
}

criterion_group!(benches, message_to_bytes, message_from_bytes);
criterion_main!(benches);
