use reserva_booking::BookingTransactionManager;
use reserva_core::cache::AtomicCache;
use reserva_core::repository::BookingStore;
use reserva_store::BookingRules;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn AtomicCache>,
    pub store: Arc<dyn BookingStore>,
    pub manager: Arc<BookingTransactionManager>,
    pub rules: BookingRules,
}

impl AppState {
    pub fn new(
        cache: Arc<dyn AtomicCache>,
        store: Arc<dyn BookingStore>,
        rules: BookingRules,
    ) -> Self {
        let manager = Arc::new(BookingTransactionManager::new(
            cache.clone(),
            store.clone(),
            Duration::from_secs(rules.lock_ttl_seconds),
        ));
        Self {
            cache,
            store,
            manager,
            rules,
        }
    }
}
