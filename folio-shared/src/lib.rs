pub mod money;
pub mod pii;

pub use money::{round_money, DEFAULT_CURRENCY};
pub use pii::Masked;
