//! Shared harness for the behavioral specs.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wr_adapters::{FakeNotifyAdapter, MemStore, MemWarehouse};
use wr_core::{Config, FakeClock, TriggerRequest, TriggerResponse};
use wr_engine::TailService;

pub const RULES_URL: &str = "mem://config/rules";

// 1_700_000_000 sits 20s into its 60s bucket: [1_699_999_980, 1_700_000_040).
pub const BUCKET_START: i64 = 1_699_999_980;
pub const BUCKET_END: i64 = 1_700_000_040;

pub type SpecService = TailService<MemStore, MemWarehouse, FakeNotifyAdapter, FakeClock>;

pub struct Harness {
    pub store: MemStore,
    pub warehouse: MemWarehouse,
    pub notifier: FakeNotifyAdapter,
    pub clock: FakeClock,
    pub service: Arc<SpecService>,
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

pub fn harness() -> Harness {
    let store = MemStore::new();
    let warehouse = MemWarehouse::new();
    let notifier = FakeNotifyAdapter::new();
    let clock = FakeClock::new();
    clock.set(at(1_700_000_000));
    let service = Arc::new(TailService::new(
        Config::builder().build(),
        store.clone(),
        warehouse.clone(),
        notifier.clone(),
        clock.clone(),
    ));
    Harness {
        store,
        warehouse,
        notifier,
        clock,
        service,
    }
}

impl Harness {
    pub fn seed_rule(&self, name: &str, content: &str) {
        self.store
            .seed(&format!("{RULES_URL}/{name}"), content, at(100));
    }

    pub fn seed_data(&self, url: &str, secs: i64) {
        self.store.seed(url, "{\"a\":1}", at(secs));
    }

    pub async fn deliver(&self, event_id: &str, source_url: &str) -> TriggerResponse {
        self.service
            .handle(
                TriggerRequest::new(event_id, source_url),
                CancellationToken::new(),
            )
            .await
    }
}
