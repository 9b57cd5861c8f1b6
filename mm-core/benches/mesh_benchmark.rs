use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use num::complex::Complex64;

use mm_core::context::ComputeContext;
use mm_core::mandel::Mandel;
use mm_core::mesh::{Mesh, RequestAll};
use mm_core::server::PixelServer;
use mm_core::{Control, Size};

fn full_view(max_iterations: u32) -> Mandel {
    Mandel::new(
        Complex64::new(-0.6, 0.0),
        Size { x: 560, y: 420 },
        2.5,
        0.0,
        max_iterations,
    )
    .unwrap()
}

fn bench_algorithms(c: &mut Criterion) {
    let ctx = ComputeContext::auto();
    let mut group = c.benchmark_group("whole-set view");
    for max_iterations in [100u32, 1000] {
        let view = full_view(max_iterations);
        group.bench_with_input(
            BenchmarkId::new("mesh", max_iterations),
            &view,
            |b, view| {
                b.iter(|| {
                    let mut server = PixelServer::new(&ctx, view, None);
                    Mesh::new(&mut server).run(&mut |_: f64| Control::Continue)
                })
            },
        );
        group.bench_with_input(
            BenchmarkId::new("request-all", max_iterations),
            &view,
            |b, view| {
                b.iter(|| {
                    let mut server = PixelServer::new(&ctx, view, None);
                    RequestAll::new(&mut server).run(&mut |_: f64| Control::Continue)
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_algorithms);
criterion_main!(benches);
