//! Criterion benchmarks for u-choice.
//!
//! Measures the MNL simulator on flat utility batches and the joint
//! scheduler on synthetic households.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use u_choice::mnl::{simulate, ChoiceBlocks, RandomChannels};
use u_choice::models::{AlternativeSet, SpecTerm, Table, TourGroup, UtilitySpec};
use u_choice::scheduler::JointTourScheduler;
use u_choice::timetable::Timetable;
use u_choice::ChoiceConfig;

fn bench_mnl(c: &mut Criterion) {
    let mut group = c.benchmark_group("mnl_simulate");
    for &(choosers, alts) in &[(1_000, 10), (10_000, 10), (1_000, 190)] {
        let utilities: Vec<f64> = (0..choosers * alts)
            .map(|i| ((i * 7919) % 101) as f64 / 25.0)
            .collect();
        let blocks = ChoiceBlocks::uniform(choosers, alts);
        let draws = RandomChannels::new(1).draws(&(0..choosers as i64).collect::<Vec<_>>());
        group.bench_with_input(
            BenchmarkId::new(format!("c{choosers}_a{alts}"), choosers * alts),
            &(utilities, blocks, draws),
            |b, (u, bl, d)| b.iter(|| simulate(black_box(u), bl, d)),
        );
    }
    group.finish();
}

fn bench_joint_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("joint_scheduler");
    group.sample_size(10);

    let spec = UtilitySpec::shared()
        .with_term(SpecTerm::new("duration", 0.15))
        .with_term(SpecTerm::new("@(start < 8) * adults", -0.4));
    let alternatives = AlternativeSet::tdd(19).unwrap();

    for &households in &[100usize, 1_000] {
        let persons: Vec<i64> = (0..households as i64 * 3).collect();
        let groups: Vec<TourGroup> = (0..households as i64)
            .flat_map(|h| {
                [
                    TourGroup::new(h * 2, vec![h * 3, h * 3 + 1]).with_household(h),
                    TourGroup::new(h * 2 + 1, vec![h * 3 + 1, h * 3 + 2]).with_household(h),
                ]
            })
            .collect();
        let ids: Vec<i64> = groups.iter().map(|g| g.chooser_id).collect();
        let adults: Vec<f64> = ids.iter().map(|i| (i % 3) as f64).collect();
        let tours = Table::new("tour_id", ids)
            .unwrap()
            .with_column("adults", adults)
            .unwrap();
        let scheduler = JointTourScheduler::new(
            &spec,
            alternatives.clone(),
            ChoiceConfig::default().with_chunk_size(50_000),
        )
        .unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(households),
            &(tours, groups, persons),
            |b, (t, g, p)| {
                b.iter(|| {
                    let mut tt = Timetable::new(p.iter().copied(), 19).unwrap();
                    scheduler.schedule(black_box(t), g, &mut tt).unwrap()
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_mnl, bench_joint_scheduler);
criterion_main!(benches);
