//! Benchmarks for tplot operations.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tplot::cidr::CidrMap;
use tplot::hilbert::{self, HilbertOrder};
use tplot::mapper::IpMapper;
use tplot::render::gradient;
use tplot::timebin::TimeBinManager;

fn benchmark_hilbert_round_trip(c: &mut Criterion) {
    let order = HilbertOrder::new(12).unwrap();

    c.bench_function("hilbert_xy_of", |b| {
        b.iter(|| hilbert::xy_of(black_box(8_675_309), order))
    });

    c.bench_function("hilbert_round_trip", |b| {
        b.iter(|| {
            let (x, y) = hilbert::xy_of(black_box(8_675_309), order);
            hilbert::index_of(x, y, order)
        })
    });
}

fn benchmark_ip_mapping(c: &mut Criterion) {
    let order = HilbertOrder::new(12).unwrap();

    let mut direct = IpMapper::new(order, CidrMap::empty());
    c.bench_function("to_coord_direct", |b| {
        b.iter(|| direct.to_coord(black_box(0x2D37_F72B)))
    });

    // A small banded map exercises the cache-hit path.
    let dir = std::env::temp_dir().join("tplot_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("cidr_map.txt");
    std::fs::write(
        &path,
        "10.0.0.0/8 -5 0 512\n45.0.0.0/8 1 512 1024\n91.0.0.0/8 2 1024 2048\n",
    )
    .unwrap();
    let map = CidrMap::load(&path, order.dimension()).unwrap();
    let mut banded = IpMapper::new(order, map);

    c.bench_function("to_coord_banded_cached", |b| {
        b.iter(|| banded.to_coord(black_box(0x2D37_F72B)))
    });
}

fn benchmark_event_processing(c: &mut Criterion) {
    // Throughput of the hot path: map one address and route it into
    // the live bin. Mixed source addresses keep the decay cache busy.
    let order = HilbertOrder::new(10).unwrap();
    let mut mapper = IpMapper::new(order, CidrMap::empty());
    let mut manager = TimeBinManager::new(60, order, 3_600).unwrap();

    let ips: Vec<u32> = (0..4096u32).map(|i| 0x2D00_0000 | (i * 97)).collect();
    let mut cursor = 0usize;

    c.bench_function("process_event", |b| {
        b.iter(|| {
            let ip = ips[cursor & 4095];
            cursor += 1;
            let (x, y) = mapper.to_coord(black_box(ip));
            manager.process(1_700_000_000, x, y).unwrap()
        })
    });
}

fn benchmark_gradient(c: &mut Criterion) {
    c.bench_function("gradient", |b| {
        b.iter(|| gradient(black_box(137), black_box(1000)))
    });
}

fn benchmark_frame_compose(c: &mut Criterion) {
    use tplot::render::FrameRenderer;

    let order = HilbertOrder::new(8).unwrap();
    let mut mapper = IpMapper::new(order, CidrMap::empty());
    let mut manager = TimeBinManager::new(60, order, 3_600).unwrap();

    for i in 0..10_000u32 {
        let (x, y) = mapper.to_coord(i.wrapping_mul(0x9E37_79B9));
        manager.process(1_700_000_001, x, y).unwrap();
    }
    let bin = manager.finish().unwrap();

    let dim = order.dimension();
    let mask = vec![0u8; (dim * dim) as usize];
    let renderer = FrameRenderer::new(640, 360, false);

    c.bench_function("compose_frame_640x360", |b| {
        b.iter(|| renderer.compose(black_box(&bin), manager.residue(), &mask))
    });
}

criterion_group!(
    benches,
    benchmark_hilbert_round_trip,
    benchmark_ip_mapping,
    benchmark_event_processing,
    benchmark_gradient,
    benchmark_frame_compose,
);

criterion_main!(benches);
