use bencher::{benchmark_group, benchmark_main, Bencher};
use spindle_pool::{Options, ThreadPool};

fn pooled_launch_join(b: &mut Bencher) {
    let pool = ThreadPool::new();
    let io = pool.io();
    b.iter(|| {
        let mut fut = io.launch(|_| 1u64);
        *fut.join(io)
    });
}

fn inline_launch_join(b: &mut Bencher) {
    let pool = ThreadPool::with_options(Options::new().with_async_limit(0));
    let io = pool.io();
    b.iter(|| {
        let mut fut = io.launch(|_| 1u64);
        *fut.join(io)
    });
}

fn concurrent_launch_join(b: &mut Bencher) {
    let pool = ThreadPool::new();
    let io = pool.io();
    b.iter(|| {
        let mut fut = io.launch_concurrent(|_| 1u64).unwrap();
        *fut.join(io)
    });
}

benchmark_group!(
    benches,
    pooled_launch_join,
    inline_launch_join,
    concurrent_launch_join
);
benchmark_main!(benches);
