use axum::{
    http::{header, HeaderName, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod cart;
pub mod dashboard;
pub mod error;
pub mod middleware;
pub mod orders;
pub mod payments;
pub mod session;
pub mod state;

pub use state::{AppState, AuthConfig, Backends};

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::USER_AGENT,
            HeaderName::from_static(middleware::auth::CART_SESSION_HEADER),
        ]);

    let customer = Router::new()
        .merge(cart::routes())
        .merge(orders::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::cart_identity_middleware,
        ));

    let staff = dashboard::routes().route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::staff_auth_middleware,
    ));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(session::routes())
        .merge(payments::routes())
        .merge(customer)
        .merge(staff)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
