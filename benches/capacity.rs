use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kdthree::{random_points, BoundingBox, BucketedKdTree};

// Test for a given number of points and a range of leaf capacities
const N_POINTS: usize = 100_000;
const CAPACITIES: [usize; 8] = [4, 8, 16, 32, 64, 128, 256, 512];

fn benchmark_capacity(c: &mut Criterion) {
    let bounds = BoundingBox::new([0.0; 3], [100.0; 3]);
    let points = random_points(N_POINTS, &bounds, 1);
    let queries = random_points(1_000, &bounds, 2);

    let mut group = c.benchmark_group(format!("capacity_{}k", N_POINTS / 1000));
    group.sample_size(20);

    for &cap in &CAPACITIES {
        group.bench_with_input(BenchmarkId::new("insert", cap), &cap, |b, &cap| {
            b.iter(|| {
                let mut tree = BucketedKdTree::with_capacity(cap).unwrap();
                for p in &points {
                    tree.insert(*p);
                }
                tree
            })
        });

        let tree = BucketedKdTree::from_points(points.clone(), cap).unwrap();
        println!("Cap: {}, leaves: {}, depth: {}", cap, tree.leaf_count(), tree.depth());

        group.bench_with_input(BenchmarkId::new("nearest", cap), &cap, |b, _| {
            b.iter(|| {
                for q in &queries {
                    black_box(tree.nearest(q));
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_capacity);
criterion_main!(benches);
