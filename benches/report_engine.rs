use articles_updates_report::{
    config::ReportConfig,
    engine::ReportEngine,
    params::ReportParameters,
    store::{InMemoryStore, PageRecord, RevisionRecord, RevisionStore},
};
use chrono::{NaiveDate, TimeDelta, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};

const EDITORS: usize = 200;
const BOT_EVERY: usize = 10;

fn generate_store(revisions: u64) -> InMemoryStore {
    // generate inputs from fixed seeds
    let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(revisions); /* define specific algorithm to ensure reproducibility */
    let mut store = InMemoryStore::new();

    let pages = (revisions / 20).max(1) as i32;
    for id in 1..=pages {
        store.insert_page(PageRecord {
            id,
            namespace: if rng.gen_bool(0.8) { 0 } else { 1 },
            title: format!("Page {id}").into(),
            is_redirect: rng.gen_bool(0.05),
        });
        if rng.gen_bool(0.3) {
            let key = store
                .resolve_category_key("Category:Sampled")
                .expect("valid category");
            store.add_category_link(id, key);
        }
    }

    let actors: Vec<_> = (0..EDITORS)
        .map(|i| {
            let actor = store.ensure_actor(&format!("Editor {i}"), Some(i as i32 + 1));
            if i % BOT_EVERY == 0 {
                store
                    .add_group_membership(actor, "automaton")
                    .expect("actor exists");
            }
            actor
        })
        .collect();

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for id in 1..=revisions as i32 {
        let comment = match rng.gen_range(0..20) {
            0 => "Text replacement - \"colour\" to \"color\"".to_owned(),
            n => format!("edit {n}"),
        };
        store
            .insert_revision(RevisionRecord {
                id,
                parent_id: if rng.gen_bool(0.1) { None } else { Some(id - 1) },
                timestamp: start + TimeDelta::minutes(rng.gen_range(0..60 * 24 * 365)),
                page_id: rng.gen_range(1..=pages),
                actor_id: actors[rng.gen_range(0..actors.len())],
                comment: Some(comment.into()),
            })
            .expect("page and actor exist");
    }

    store
}

fn march() -> ReportParameters {
    ReportParameters::new(
        NaiveDate::from_ymd_opt(2024, 3, 1),
        NaiveDate::from_ymd_opt(2024, 3, 31),
    )
}

fn bench_count_distinct_updated_pages(c: &mut Criterion) {
    let mut group = c.benchmark_group("count_distinct_updated_pages");
    for revisions in [1_000u64, 10_000u64, 100_000u64].into_iter() {
        let engine = ReportEngine::new(generate_store(revisions), &ReportConfig::default())
            .expect("default config is valid");
        let params = march();
        group.bench_with_input(BenchmarkId::new("All", revisions), &params, |b, p| {
            b.iter(|| engine.count_distinct_updated_pages(p));
        });
        let params = march().with_category("Sampled");
        group.bench_with_input(BenchmarkId::new("Category", revisions), &params, |b, p| {
            b.iter(|| engine.count_distinct_updated_pages(p));
        });
    }
}

fn bench_partition_editors(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_editors");
    for revisions in [1_000u64, 10_000u64, 100_000u64].into_iter() {
        let engine = ReportEngine::new(generate_store(revisions), &ReportConfig::default())
            .expect("default config is valid");
        let params = march();
        group.bench_with_input(BenchmarkId::new("Month", revisions), &params, |b, p| {
            b.iter(|| engine.partition_editors(p));
        });
    }
}

criterion_group!(
    benches,
    bench_count_distinct_updated_pages,
    bench_partition_editors
);
criterion_main!(benches);
