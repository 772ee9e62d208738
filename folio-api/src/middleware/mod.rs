pub mod auth;

pub use auth::{cart_identity_middleware, staff_auth_middleware, CartIdentity, CustomerClaims, StaffClaims};
