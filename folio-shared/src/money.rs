use rust_decimal::{Decimal, RoundingStrategy};

/// Currency used when configuration does not override it.
pub const DEFAULT_CURRENCY: &str = "AZN";

/// Round a monetary amount to 2 decimals, half-up.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
