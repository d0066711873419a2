use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fast_nnls::splits::asplit::ASplit;
use fast_nnls::utils::{compute_least_squares_fit, induced_distances};

/// A random arc of the identity cycle, so the system stays circular.
fn make_random_circular_split(ntax: usize, rng: &mut StdRng) -> ASplit {
    let start = rng.gen_range(1..ntax);
    let end = rng.gen_range(start..ntax);
    let taxa: Vec<usize> = (start..=end).collect();
    ASplit::from_taxa(&taxa, ntax, rng.gen_range(0.1..2.0))
}

fn bench_least_squares_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("least_squares_fit");
    group.sample_size(10);
    for &ntax in &[50usize, 100, 200] {
        let mut rng = StdRng::seed_from_u64(7);
        let splits: Vec<ASplit> = (0..ntax * 2)
            .map(|_| make_random_circular_split(ntax, &mut rng))
            .collect();
        let mut distances = induced_distances(ntax, &splits);
        for i in 0..ntax {
            for j in (i + 1)..ntax {
                let v = distances[[i, j]] + rng.gen_range(0.0..0.5);
                distances[[i, j]] = v;
                distances[[j, i]] = v;
            }
        }

        group.bench_with_input(BenchmarkId::new("fit", ntax), &distances, |b, d| {
            b.iter(|| compute_least_squares_fit(black_box(d), black_box(&splits)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_least_squares_fit);
criterion_main!(benches);
