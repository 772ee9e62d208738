pub mod cart;
pub mod coordinator;
pub mod gateway;
pub mod lifecycle;
pub mod notifier;
pub mod numbering;
pub mod orchestrator;

pub use cart::{CartService, CartSummary};
pub use coordinator::{CheckoutRequest, OrderCoordinator, Quote};
pub use gateway::{HostedGateway, HostedGatewayConfig, SandboxGateway};
pub use lifecycle::{OrderLifecycle, TransitionOutcome};
pub use notifier::{HttpSmsTransport, LogTransport, Notifier};
pub use numbering::{OrderNumberSource, TimestampNumbers};
pub use orchestrator::{PaymentOrchestrator, Reconciliation};
