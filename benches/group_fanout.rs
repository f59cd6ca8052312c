use bencher::{benchmark_group, benchmark_main, Bencher};
use spindle_group::Group;
use spindle_pool::ThreadPool;

fn fanout_64(b: &mut Bencher) {
    let pool = ThreadPool::new();
    let io = pool.io();
    b.iter(|| {
        let mut group = Group::new();
        for _ in 0..64 {
            group.launch(io, |_| ());
        }
        group.wait(io);
    });
}

fn fanout_64_warm(b: &mut Bencher) {
    let pool = ThreadPool::with_options(
        spindle_pool::Options::new()
            .with_async_limit(4)
            .with_initial_workers(4),
    );
    let io = pool.io();
    b.iter(|| {
        let mut group = Group::new();
        for _ in 0..64 {
            group.launch(io, |_| ());
        }
        group.wait(io);
    });
}

benchmark_group!(benches, fanout_64, fanout_64_warm);
benchmark_main!(benches);
