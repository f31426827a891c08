//! Bankroll ledger benchmarks.
//!
//! Run: cargo bench --bench ledger_benchmarks
//!
//! Measures deposit and transfer throughput through the full ledger core
//! (validation, version-checked commit, journal) on the memory and ReDB
//! backends.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tokio::runtime::Runtime;

use bankroll::{AccountStore, AccountType, Ledger, MemoryStore, NewAccount, PersistentStore};

fn account(name: &str, balance: f64) -> NewAccount {
    NewAccount {
        name: name.to_string(),
        account_type: AccountType::Bank,
        website: None,
        balance,
        owner: None,
        color: None,
        notes: None,
        bonus_bets: None,
        bonus_expiry: None,
    }
}

/// Ledger with two funded accounts; returns their ids.
fn setup(rt: &Runtime, store: Arc<dyn AccountStore>) -> (Ledger, String, String) {
    let ledger = Ledger::new(store);
    rt.block_on(async {
        let a = ledger.create_account(account("Alpha", 1e12)).await.expect("create");
        let b = ledger.create_account(account("Beta", 1e12)).await.expect("create");
        (ledger, a.id, b.id)
    })
}

// ============================================================================
// MEMORY BACKEND
// ============================================================================

fn bench_memory(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let (ledger, a, b) = setup(&rt, Arc::new(MemoryStore::new()));
    let (ledger, a, b) = (&ledger, a.as_str(), b.as_str());

    let mut group = c.benchmark_group("memory");
    group.throughput(Throughput::Elements(1));

    group.bench_function("deposit", |bench| {
        bench.to_async(&rt).iter(move || async move {
            black_box(ledger.deposit(a, Some(1.0), None).await.expect("deposit"))
        });
    });

    group.bench_function("transfer", |bench| {
        bench.to_async(&rt).iter(move || async move {
            black_box(ledger.transfer(a, b, 1.0).await.expect("transfer"))
        });
    });

    group.finish();
}

// ============================================================================
// REDB BACKEND
// ============================================================================

fn bench_redb(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().to_str().expect("utf-8 path").to_string();
    let store = PersistentStore::open(&path).expect("open redb");
    let (ledger, a, b) = setup(&rt, Arc::new(store));
    let (ledger, a, b) = (&ledger, a.as_str(), b.as_str());

    let mut group = c.benchmark_group("redb");
    group.throughput(Throughput::Elements(1));
    group.sample_size(20);

    group.bench_function("deposit", |bench| {
        bench.to_async(&rt).iter(move || async move {
            black_box(ledger.deposit(a, Some(1.0), None).await.expect("deposit"))
        });
    });

    group.bench_function("transfer", |bench| {
        bench.to_async(&rt).iter(move || async move {
            black_box(ledger.transfer(a, b, 1.0).await.expect("transfer"))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_memory, bench_redb);
criterion_main!(benches);
