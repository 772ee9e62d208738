use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// A wrapper for customer contact data that masks its value in Debug/Display output.
#[derive(Clone, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", mask(&self.0.to_string()))
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", mask(&self.0.to_string()))
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // API responses carry the real value; only log formatting is masked.
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Keeps the last two characters so operators can still tell numbers apart.
fn mask(raw: &str) -> String {
    let visible: String = raw.chars().rev().take(2).collect::<Vec<_>>().into_iter().rev().collect();
    if raw.chars().count() <= 2 {
        return "********".to_string();
    }
    format!("********{}", visible)
}
