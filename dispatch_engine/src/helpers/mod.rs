use chrono::Utc;
use rand::Rng;

use crate::db_types::OrderNumber;

const ORDER_NUMBER_SUFFIX_LEN: usize = 6;

/// Generates a fresh human-readable order number, e.g. `ORD-20240830-K3T9QX`. Generated once at checkout; the
/// UNIQUE constraint on the orders table catches the (astronomically unlikely) collision.
pub fn new_order_number() -> OrderNumber {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ORDER_NUMBER_SUFFIX_LEN)
        .map(|_| {
            const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
            ALPHABET[rng.gen_range(0..ALPHABET.len())] as char
        })
        .collect();
    OrderNumber::from(format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), suffix))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_numbers_have_the_expected_shape() {
        let n = new_order_number();
        let parts: Vec<&str> = n.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), ORDER_NUMBER_SUFFIX_LEN);
    }

    #[test]
    fn order_numbers_are_random() {
        let a = new_order_number();
        let b = new_order_number();
        assert_ne!(a, b);
    }
}
