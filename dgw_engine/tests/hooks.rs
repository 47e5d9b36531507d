use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use dgw_engine::{
    events::{EventHandlers, EventHooks},
    order_objects::StartOrderRequest,
    test_utils::{test_catalog, test_options, FixtureChain, ScriptedProvider, TestStack},
    FileStore,
    OrderFlowApi,
};
use futures_util::FutureExt;
use log::*;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

async fn wait_for(hook: &HookCalled, count: i32) {
    for _ in 0..50 {
        if hook.count() >= count {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn paid_and_annulled_hooks() {
    dgw_engine::test_utils::prepare_test_env();
    let paid = HookCalled::default();
    let annulled = HookCalled::default();
    let mut hooks = EventHooks::default();
    let paid_copy = paid.clone();
    let annulled_copy = annulled.clone();
    hooks
        .on_order_paid(move |ev| {
            info!("🪝️ Paid: {}", ev.order.order_id);
            paid_copy.called();
            async {}.boxed()
        })
        .on_order_annulled(move |ev| {
            info!("🪝️ Annulled: {} ({})", ev.order.order_id, ev.status);
            annulled_copy.called();
            async {}.boxed()
        });
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("data")).await.unwrap();
    let catalog = test_catalog(&dir).await;
    let provider = ScriptedProvider::default();
    let api = OrderFlowApi::<TestStack>::new(
        store,
        provider.clone(),
        FixtureChain::new(1),
        catalog,
        test_options(),
        producers,
    )
    .unwrap();

    // Simulated invoices settle on the first poll. Polling again must not fire the hook twice.
    let first = api.start_order(StartOrderRequest::new("prod-1")).await.unwrap();
    api.check_order(&first.order_id).await.unwrap();
    api.check_order(&first.order_id).await.unwrap();

    provider.set_status(Some("failed"));
    let second = api.start_order(StartOrderRequest::new("prod-2")).await.unwrap();
    api.check_order(&second.order_id).await.unwrap();

    provider.set_status(Some("waiting"));
    let third = api.start_order(StartOrderRequest::new("prod-2")).await.unwrap();
    api.expire_orders_older_than(chrono::Duration::zero()).await.unwrap();
    let status = api.check_order(&third.order_id).await.unwrap().status;
    assert_eq!(status.to_string(), "expired");

    wait_for(&paid, 1).await;
    wait_for(&annulled, 2).await;
    assert_eq!(paid.count(), 1);
    assert_eq!(annulled.count(), 2);
    info!("🪝️ test complete");
}
