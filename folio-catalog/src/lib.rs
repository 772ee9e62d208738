pub mod book;
pub mod cart;
pub mod coupon;

pub use book::{Book, CatalogError, CatalogService};
pub use cart::{Cart, CartError, CartItem, CartOwner, PricedLine, MAX_LINE_QUANTITY};
pub use coupon::{Coupon, CouponError, CouponEvaluator, DiscountType};
