//! Benchmarks for kernel evaluation, fold fitting and ensemble scoring

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spare_scores::core::{Sample, SvmMode};
use spare_scores::data::{TabularDataset, Value};
use spare_scores::pipeline::apply_model;
use spare_scores::{
    Kernel, KernelKind, LinearKernel, ParamGrid, ParamName, RBFKernel, SVMOptimizer, SpareTrainer,
};

fn features(n: usize, dim: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| {
            (0..dim)
                .map(|j| (((i * 31 + j * 17) % 97) as f64) / 97.0 - 0.5)
                .collect()
        })
        .collect()
}

fn bench_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernels");
    for dim in [10, 100, 1000] {
        let rows = features(2, dim);
        group.bench_with_input(BenchmarkId::new("linear", dim), &rows, |b, rows| {
            b.iter(|| LinearKernel.compute(black_box(&rows[0]), black_box(&rows[1])))
        });
        let rbf = RBFKernel::new(1.0 / dim as f64);
        group.bench_with_input(BenchmarkId::new("rbf", dim), &rows, |b, rows| {
            b.iter(|| rbf.compute(black_box(&rows[0]), black_box(&rows[1])))
        });
    }
    group.finish();
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(20);
    for n in [100, 300] {
        let samples: Vec<Sample> = features(n, 20)
            .into_iter()
            .map(|x| {
                let label = if x[0] + x[1] > 0.0 { 1.0 } else { -1.0 };
                Sample::new(x, label)
            })
            .collect();
        for kernel in [KernelKind::Linear, KernelKind::Rbf { gamma: 0.05 }] {
            let optimizer = SVMOptimizer::with_kernel(kernel);
            group.bench_with_input(
                BenchmarkId::new(kernel.kernel_type().to_string(), n),
                &samples,
                |b, samples| b.iter(|| optimizer.train_samples(samples, SvmMode::Classification)),
            );
        }
    }
    group.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let n = 200;
    let rows: Vec<Vec<Value>> = features(n, 5)
        .into_iter()
        .enumerate()
        .map(|(i, x)| {
            let group = if x[0] + 0.3 * x[1] > 0.0 { "AD" } else { "CN" };
            let mut row = vec![Value::Text(format!("s{i}")), Value::Number(60.0 + (i % 25) as f64)];
            row.extend(x.into_iter().map(Value::Number));
            row.push(Value::from(group));
            row
        })
        .collect();
    let mut columns = vec!["PTID".to_string(), "Age".to_string()];
    let predictors: Vec<String> = (0..5).map(|j| format!("ROI_{j}")).collect();
    columns.extend(predictors.iter().cloned());
    columns.push("Dx".to_string());
    let table = TabularDataset::new(columns, rows).expect("valid table");

    let outcome = SpareTrainer::new()
        .with_positive_group("AD")
        .with_param_grid(ParamGrid::new().with(ParamName::C, vec![1.0]))
        .train(&table, &predictors, "Dx")
        .expect("training should succeed");

    c.bench_function("score_200_rows_25_folds", |b| {
        b.iter(|| apply_model(black_box(&table), &outcome.artifact))
    });
}

criterion_group!(benches, bench_kernels, bench_fit, bench_scoring);
criterion_main!(benches);
