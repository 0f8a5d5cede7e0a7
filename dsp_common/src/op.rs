//! Tiny macro for forwarding binary arithmetic operators to newtype wrappers around an integer.

#[macro_export]
macro_rules! op {
    (binary $ty:ty, $op:ident, $method:ident) => {
        impl std::ops::$op for $ty {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(std::ops::$op::$method(self.0, rhs.0))
            }
        }
    };
}
