use std::sync::Arc;

use common::{AggregateId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Aggregate, CartService, Money, NewProduct, Product, ProductEvent, ProductService,
    SystemClock,
};
use domain::product::ProductCreatedData;
use event_store::{AppendOptions, EventEnvelope, InMemoryEventStore, Version, store::EventStore};

fn make_envelope(aggregate_id: AggregateId, version: i64, event: &ProductEvent) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Product")
        .event_type(domain::DomainEvent::event_type(event))
        .version(Version::new(version))
        .payload(event)
        .unwrap()
        .build()
        .unwrap()
}

fn lamp(quantity: u32) -> NewProduct {
    NewProduct {
        name: "Bench Lamp".to_string(),
        sku: "LAMP-BENCH".to_string(),
        price: Money::from_cents(2999),
        image: None,
        seller: None,
        quantity,
        low_stock_threshold: None,
    }
}

fn bench_reserve_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = ProductService::new(InMemoryEventStore::new(), Arc::new(SystemClock));
    let product_id = rt.block_on(async {
        service
            .create_product(lamp(1_000))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap()
    });

    c.bench_function("domain/reserve_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                service.reserve_stock(product_id, 1).await.unwrap();
                service.release_stock(product_id, 1).await.unwrap();
            });
        });
    });
}

fn bench_cart_pricing(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = CartService::new(InMemoryEventStore::new(), Arc::new(SystemClock));
    let user = UserId::new();
    rt.block_on(async {
        for cents in 1..=20 {
            service
                .add_item(user, AggregateId::new(), 2, None, Money::from_cents(cents * 100))
                .await
                .unwrap();
        }
    });

    c.bench_function("domain/cart_load_and_total", |b| {
        b.iter(|| {
            rt.block_on(async {
                let cart = service.get_cart(user).await.unwrap();
                criterion::black_box(cart.total());
            });
        });
    });
}

fn bench_product_reconstruction(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let product_id = AggregateId::new();

    // 1 create + 99 reserve events
    rt.block_on(async {
        let created = ProductEvent::ProductCreated(ProductCreatedData {
            product_id,
            name: "Lamp".to_string(),
            sku: "LAMP-1".to_string(),
            price: Money::from_cents(2999),
            image: None,
            seller: None,
            quantity: 1_000,
            low_stock_threshold: 10,
            created_at: chrono::Utc::now(),
        });
        let mut events = vec![make_envelope(product_id, 1, &created)];
        for v in 2..=100 {
            events.push(make_envelope(
                product_id,
                v,
                &ProductEvent::StockReserved { quantity: 1 },
            ));
        }
        store.append(events, AppendOptions::new()).await.unwrap();
    });

    c.bench_function("domain/reconstruct_100_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.get_events_for_aggregate(product_id).await.unwrap();
                let mut product = Product::default();
                for event in &events {
                    let domain_event: ProductEvent = event.decode().unwrap();
                    product.apply(domain_event);
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_release,
    bench_cart_pricing,
    bench_product_reconstruction,
);
criterion_main!(benches);
