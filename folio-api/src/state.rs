use std::sync::Arc;
use folio_catalog::CatalogService;
use folio_core::notify::NotificationTransport;
use folio_core::payment::PaymentGateway;
use folio_core::repository::{
    CartRepository, CouponRepository, CourierRepository, OrderRepository, PaymentRepository,
};
use folio_order::{CartService, Notifier, OrderCoordinator, OrderLifecycle, PaymentOrchestrator};
use folio_store::{
    CheckoutSettings, DbClient, MemoryStore, PgCartRepository, PgCatalog, PgCouponRepository,
    PgCourierRepository, PgOrderRepository, PgPaymentRepository,
};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

/// Storage behind the services
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn CatalogService>,
    pub carts: Arc<dyn CartRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub couriers: Arc<dyn CourierRepository>,
}

impl Backends {
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            catalog: store.clone(),
            carts: store.clone(),
            coupons: store.clone(),
            orders: store.clone(),
            payments: store.clone(),
            couriers: store,
        }
    }

    pub fn postgres(db: &DbClient) -> Self {
        Self {
            catalog: Arc::new(PgCatalog::new(db.pool.clone())),
            carts: Arc::new(PgCartRepository::new(db.pool.clone())),
            coupons: Arc::new(PgCouponRepository::new(db.pool.clone())),
            orders: Arc::new(PgOrderRepository::new(db.pool.clone())),
            payments: Arc::new(PgPaymentRepository::new(db.pool.clone())),
            couriers: Arc::new(PgCourierRepository::new(db.pool.clone())),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub carts: Arc<CartService>,
    pub coordinator: Arc<OrderCoordinator>,
    pub lifecycle: Arc<OrderLifecycle>,
    pub payments: Arc<PaymentOrchestrator>,
    pub orders: Arc<dyn OrderRepository>,
    pub couriers: Arc<dyn CourierRepository>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(
        backends: Backends,
        settings: CheckoutSettings,
        gateway: Arc<dyn PaymentGateway>,
        transport: Arc<dyn NotificationTransport>,
        auth: AuthConfig,
    ) -> Self {
        let notifier = Arc::new(Notifier::new(transport, backends.couriers.clone()));
        let currency = settings.currency.clone();

        Self {
            carts: Arc::new(CartService::new(
                backends.carts.clone(),
                backends.catalog.clone(),
                backends.coupons.clone(),
            )),
            coordinator: Arc::new(OrderCoordinator::new(
                backends.catalog,
                backends.coupons,
                backends.orders.clone(),
                backends.carts,
                settings,
            )),
            lifecycle: Arc::new(OrderLifecycle::new(
                backends.orders.clone(),
                backends.couriers.clone(),
                notifier.clone(),
            )),
            payments: Arc::new(PaymentOrchestrator::new(
                gateway,
                backends.orders.clone(),
                backends.payments,
                notifier,
                currency,
            )),
            orders: backends.orders,
            couriers: backends.couriers,
            auth,
        }
    }
}
