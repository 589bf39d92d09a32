use common::{TradeId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Item, TradeOffer, TradeStatus};
use trade_store::{InMemoryTradeRepository, Pagination, TradeRepository};

fn make_trade(owner: &str) -> TradeOffer {
    TradeOffer::create(
        TradeId::new(),
        UserId::new(owner),
        UserId::new("bob"),
        vec![Item::new("sword", 1).unwrap()],
        vec![Item::new("shield", 1).unwrap()],
    )
    .unwrap()
}

fn populated_repository(rt: &tokio::runtime::Runtime, count: usize) -> InMemoryTradeRepository {
    let repo = InMemoryTradeRepository::new();
    rt.block_on(async {
        for i in 0..count {
            let owner = if i % 2 == 0 { "alice" } else { "carol" };
            repo.insert(&make_trade(owner)).await.unwrap();
        }
    });
    repo
}

fn bench_first_page(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let repo = populated_repository(&rt, 1_000);
    let alice = UserId::new("alice");

    c.bench_function("trade_store/first_page", |b| {
        b.iter(|| {
            rt.block_on(async {
                let page = repo.get(&alice, &Pagination::new()).await.unwrap();
                assert_eq!(page.trades.len(), 10);
            });
        });
    });
}

fn bench_walk_all_pages(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let repo = populated_repository(&rt, 1_000);
    let alice = UserId::new("alice");

    c.bench_function("trade_store/walk_all_pages", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut pagination = Pagination::new().page_size(50);
                let mut seen = 0;
                loop {
                    let page = repo.get(&alice, &pagination).await.unwrap();
                    seen += page.trades.len();
                    match page.next_token {
                        Some(token) => pagination = Pagination::new().after(token).page_size(50),
                        None => break,
                    }
                }
                assert_eq!(seen, 500);
            });
        });
    });
}

fn bench_get_by_status(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let repo = populated_repository(&rt, 1_000);

    c.bench_function("trade_store/get_by_status", |b| {
        b.iter(|| {
            rt.block_on(async {
                repo.get_by_status(TradeStatus::Created).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_first_page,
    bench_walk_all_pages,
    bench_get_by_status,
);
criterion_main!(benches);
