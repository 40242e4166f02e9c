//! Stub engine wiring for tests.

use std::sync::Arc;

use tether_native::{NativeApi, StubEngine};

/// Fresh stub engine plus the same engine behind the trait object clients take.
///
/// Keep the concrete handle to drive the simulation and inspect bookkeeping.
#[must_use]
pub fn stub_api() -> (Arc<StubEngine>, Arc<dyn NativeApi>) {
    let engine = Arc::new(StubEngine::default());
    let api: Arc<dyn NativeApi> = engine.clone();
    (engine, api)
}

/// Route `tracing` output through the test harness; idempotent.
pub fn init_test_logging() {
    tether_telemetry::init_test_logging();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_handles_share_one_engine() {
        let (engine, api) = stub_api();
        let pack = api.create_settings_pack().expect("pack");
        assert_eq!(engine.live_settings_packs(), 1);
        api.destroy_settings_pack(pack);
        assert_eq!(engine.live_settings_packs(), 0);
        assert_eq!(engine.double_frees(), 0);
    }
}
