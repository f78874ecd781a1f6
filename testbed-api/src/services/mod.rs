//! Service Layer
//!
//! Business logic behind the measured endpoints. Every strategy is chosen
//! once, when `Services` is built from the resolved `ModeConfig`; handlers
//! never look at the mode again.

mod checkout;
mod lookup;
mod reads;

pub use checkout::*;
pub use lookup::*;
pub use reads::*;

use std::sync::Arc;
use std::time::Duration;

use testbed_core::ModeConfig;
use testbed_storage::{CacheBackend, DataStore};

use crate::telemetry::Telemetry;

/// All services wired for one mode.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DataStore>,
    pub lookup: Arc<LookupService>,
    pub checkout: Arc<CheckoutService>,
    pub search: Arc<dyn SearchStrategy>,
}

impl Services {
    pub fn build(
        config: &ModeConfig,
        store: Arc<dyn DataStore>,
        cache: Arc<dyn CacheBackend>,
        cache_ttl: Duration,
        telemetry: Telemetry,
    ) -> Self {
        let read_path = ReadPath::for_config(config, cache, cache_ttl);
        let lookup = Arc::new(LookupService::new(
            store.clone(),
            read_path,
            dashboard_strategy(config),
            telemetry.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            store.clone(),
            checkout_strategy(config),
            lookup.clone(),
            telemetry,
        ));

        tracing::info!(
            mode = config.name(),
            read_path = ?lookup.read_path(),
            checkout = checkout.strategy_name(),
            "Services configured"
        );

        Self {
            store,
            lookup,
            checkout,
            search: search_strategy(config),
        }
    }
}
