use std::fmt::Display;

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::op;

//--------------------------------------        Kobo        ----------------------------------------------------------
/// A monetary amount in kobo, the minor unit of the Naira (100 kobo = ₦1).
///
/// All order and payment amounts in the dispatch engine are stored as integer kobo to avoid floating point rounding
/// in financial arithmetic.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Kobo(i64);

op!(binary Kobo, Add, add);
op!(binary Kobo, Sub, sub);

impl From<i64> for Kobo {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for Kobo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let naira = self.0 as f64 / 100.0;
        write!(f, "₦{naira:0.2}")
    }
}

impl Kobo {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_naira(naira: i64) -> Self {
        Self(naira * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Kobo::from_naira(10);
        let b = Kobo::from(250);
        assert_eq!(a + b, Kobo::from(1250));
        assert_eq!(a - b, Kobo::from(750));
    }

    #[test]
    fn display_is_in_naira() {
        assert_eq!(Kobo::from(150_050).to_string(), "₦1500.50");
        assert_eq!(Kobo::from_naira(2).to_string(), "₦2.00");
    }

    #[test]
    fn positivity() {
        assert!(Kobo::from(1).is_positive());
        assert!(!Kobo::from(0).is_positive());
        assert!(!Kobo::from(-5).is_positive());
    }
}
