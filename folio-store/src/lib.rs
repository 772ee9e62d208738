pub mod app_config;
pub mod database;
pub mod memory;
pub mod order_repo;
pub mod payment_repo;
pub mod cart_repo;
pub mod coupon_repo;
pub mod courier_repo;
pub mod catalog_repo;

pub use app_config::{CheckoutSettings, Config};
pub use database::DbClient;
pub use memory::MemoryStore;
pub use order_repo::PgOrderRepository;
pub use payment_repo::PgPaymentRepository;
pub use cart_repo::PgCartRepository;
pub use coupon_repo::PgCouponRepository;
pub use courier_repo::PgCourierRepository;
pub use catalog_repo::PgCatalog;
