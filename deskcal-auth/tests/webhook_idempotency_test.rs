mod common;

use std::sync::Arc;

use common::MemoryWebhookStore;
use deskcal_auth::models::WebhookEventStatus;
use deskcal_auth::services::WebhookGuardService;

const PROVIDER: &str = "paypal";
const EVENT: &str = "WH-2WR32451HC0233532";
const BODY: &str = r#"{"id":"WH-2WR32451HC0233532","event_type":"PAYMENT.SALE.COMPLETED"}"#;

fn guard(store: Arc<MemoryWebhookStore>) -> WebhookGuardService {
    WebhookGuardService::new(store)
}

#[tokio::test]
async fn first_claim_wins_second_loses() {
    let store = Arc::new(MemoryWebhookStore::new());
    let guard = guard(store.clone());

    assert!(guard
        .try_claim(PROVIDER, EVENT, "PAYMENT.SALE.COMPLETED", BODY)
        .await
        .unwrap());
    assert!(!guard
        .try_claim(PROVIDER, EVENT, "PAYMENT.SALE.COMPLETED", BODY)
        .await
        .unwrap());
    assert_eq!(
        store.status(PROVIDER, EVENT),
        Some(WebhookEventStatus::Processing)
    );
}

#[tokio::test]
async fn concurrent_deliveries_elect_exactly_one_winner() {
    let store = Arc::new(MemoryWebhookStore::new());
    let guard = Arc::new(guard(store));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let guard = guard.clone();
        handles.push(tokio::spawn(async move {
            guard
                .try_claim(PROVIDER, EVENT, "PAYMENT.SALE.COMPLETED", BODY)
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn completed_event_stays_claimed_forever() {
    let store = Arc::new(MemoryWebhookStore::new());
    let guard = guard(store.clone());

    assert!(guard
        .try_claim(PROVIDER, EVENT, "PAYMENT.SALE.COMPLETED", BODY)
        .await
        .unwrap());
    guard.mark_completed(PROVIDER, EVENT).await.unwrap();

    assert!(!guard
        .try_claim(PROVIDER, EVENT, "PAYMENT.SALE.COMPLETED", BODY)
        .await
        .unwrap());
    assert_eq!(
        store.status(PROVIDER, EVENT),
        Some(WebhookEventStatus::Completed)
    );
}

#[tokio::test]
async fn release_reopens_the_event_for_a_retry() {
    let store = Arc::new(MemoryWebhookStore::new());
    let guard = guard(store.clone());

    assert!(guard
        .try_claim(PROVIDER, EVENT, "PAYMENT.SALE.COMPLETED", BODY)
        .await
        .unwrap());
    guard.release(PROVIDER, EVENT).await.unwrap();

    assert!(guard
        .try_claim(PROVIDER, EVENT, "PAYMENT.SALE.COMPLETED", BODY)
        .await
        .unwrap());
}

#[tokio::test]
async fn release_never_touches_a_completed_event() {
    let store = Arc::new(MemoryWebhookStore::new());
    let guard = guard(store.clone());

    guard
        .try_claim(PROVIDER, EVENT, "PAYMENT.SALE.COMPLETED", BODY)
        .await
        .unwrap();
    guard.mark_completed(PROVIDER, EVENT).await.unwrap();
    guard.release(PROVIDER, EVENT).await.unwrap();

    // Still completed, still deduplicating.
    assert_eq!(
        store.status(PROVIDER, EVENT),
        Some(WebhookEventStatus::Completed)
    );
    assert!(!guard
        .try_claim(PROVIDER, EVENT, "PAYMENT.SALE.COMPLETED", BODY)
        .await
        .unwrap());
}

#[tokio::test]
async fn events_are_keyed_per_provider() {
    let store = Arc::new(MemoryWebhookStore::new());
    let guard = guard(store);

    assert!(guard
        .try_claim("paypal", EVENT, "PAYMENT.SALE.COMPLETED", BODY)
        .await
        .unwrap());
    assert!(guard
        .try_claim("stripe", EVENT, "PAYMENT.SALE.COMPLETED", BODY)
        .await
        .unwrap());
}
