//! Unary arithmetic and prime decomposition.
//!
//! These are the pure computations behind the `Sum`, `SquareRoot` and
//! `PrimeNumberDecomposition` RPCs. None of them touch the transport; the
//! server only wraps their results into protobuf messages.

use crate::{Error, Result};

/// Returns the exact sum of two 32-bit integers.
///
/// # Errors
///
/// Returns [`Error::Overflow`] if the sum does not fit in an `i32`. The result
/// never wraps or saturates.
pub fn checked_sum(first: i32, second: i32) -> Result<i32> {
    first.checked_add(second).ok_or_else(|| Error::Overflow {
        context: format!("{first} + {second} does not fit in a 32-bit integer"),
    })
}

/// Returns the real square root of a non-negative integer.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] for negative input instead of producing
/// `NaN`.
pub fn square_root(number: i32) -> Result<f64> {
    if number < 0 {
        return Err(Error::InvalidRequest {
            reason: format!("received a negative number: {number}"),
        });
    }
    Ok(f64::from(number).sqrt())
}

/// Lazy iterator over the prime factors of a number, with multiplicity and in
/// non-decreasing order.
///
/// Factors are found by trial division starting at 2. The divisor only moves
/// on when it no longer divides the remainder, so repeated factors are yielded
/// back to back. Once the square of the divisor exceeds the remainder, the
/// remainder is itself prime and is yielded as the final factor.
///
/// Inputs below 2 (including zero and negative numbers) have no factors.
///
/// ```
/// use calculator_tonic_core::arithmetic::PrimeFactors;
///
/// let factors: Vec<i64> = PrimeFactors::new(120).collect();
/// assert_eq!(factors, [2, 2, 2, 3, 5]);
/// ```
///
/// The gap between two factors can be billions of divisions. Callers that
/// must stay responsive in the meantime use [`search`](Self::search) instead
/// of [`next`](Iterator::next).
#[derive(Clone, Debug)]
pub struct PrimeFactors {
    remainder: i64,
    divisor: i64,
}

/// Outcome of one bounded [`PrimeFactors::search`] step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactorSearch {
    /// The next prime factor.
    Found(i64),
    /// Every factor has been yielded.
    Exhausted,
    /// The divisor budget ran out first; search again to continue.
    Unfinished,
}

impl PrimeFactors {
    pub const fn new(number: i64) -> Self {
        Self {
            remainder: number,
            divisor: 2,
        }
    }

    /// Looks for the next factor, trying at most `max_divisors` candidate
    /// divisors (at least one) before giving control back.
    pub fn search(&mut self, max_divisors: u64) -> FactorSearch {
        let mut tried = 0;
        while self.remainder > 1 {
            // `divisor > remainder / divisor` is `divisor² > remainder` without
            // the multiplication overflowing.
            if self.divisor > self.remainder / self.divisor {
                let factor = self.remainder;
                self.remainder = 1;
                return FactorSearch::Found(factor);
            }
            if self.remainder % self.divisor == 0 {
                self.remainder /= self.divisor;
                return FactorSearch::Found(self.divisor);
            }
            self.divisor += 1;
            tried += 1;
            if tried >= max_divisors {
                return FactorSearch::Unfinished;
            }
        }
        FactorSearch::Exhausted
    }
}

impl Iterator for PrimeFactors {
    type Item = i64;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.search(u64::MAX) {
                FactorSearch::Found(factor) => return Some(factor),
                FactorSearch::Exhausted => return None,
                FactorSearch::Unfinished => {}
            }
        }
    }
}

impl core::iter::FusedIterator for PrimeFactors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_adds_small_numbers() {
        assert_eq!(checked_sum(10, 3), Ok(13));
        assert_eq!(checked_sum(-7, 7), Ok(0));
    }

    #[test]
    fn sum_is_commutative() {
        for (a, b) in [(1, 2), (-40, 9), (i32::MAX, -1), (0, i32::MIN)] {
            assert_eq!(checked_sum(a, b), checked_sum(b, a));
        }
    }

    #[test]
    fn sum_rejects_overflow() {
        assert!(matches!(
            checked_sum(i32::MAX, 1),
            Err(Error::Overflow { .. })
        ));
        assert!(matches!(
            checked_sum(i32::MIN, -1),
            Err(Error::Overflow { .. })
        ));
        assert_eq!(checked_sum(i32::MAX, i32::MIN), Ok(-1));
    }

    #[test]
    fn square_root_of_perfect_square() {
        assert_eq!(square_root(4), Ok(2.0));
        assert_eq!(square_root(0), Ok(0.0));
    }

    #[test]
    fn square_root_of_non_square() {
        let root = square_root(2).unwrap();
        assert!((root - core::f64::consts::SQRT_2).abs() < f64::EPSILON);
    }

    #[test]
    fn square_root_rejects_negative_input() {
        assert_eq!(
            square_root(-1),
            Err(Error::InvalidRequest {
                reason: "received a negative number: -1".into()
            })
        );
    }

    #[test]
    fn factors_of_large_composite_multiply_back() {
        let number = 12_390_392_840;
        let factors: Vec<i64> = PrimeFactors::new(number).collect();

        assert_eq!(factors.iter().product::<i64>(), number);
        assert!(factors.windows(2).all(|w| w[0] <= w[1]));
        assert!(factors.iter().all(|&f| is_prime(f)));
    }

    #[test]
    fn factors_keep_multiplicity() {
        assert_eq!(PrimeFactors::new(12).collect::<Vec<_>>(), [2, 2, 3]);
        assert_eq!(PrimeFactors::new(1024).count(), 10);
    }

    #[test]
    fn numbers_below_two_have_no_factors() {
        assert_eq!(PrimeFactors::new(1).next(), None);
        assert_eq!(PrimeFactors::new(0).next(), None);
        assert_eq!(PrimeFactors::new(-12).next(), None);
    }

    #[test]
    fn prime_yields_itself() {
        assert_eq!(PrimeFactors::new(2).collect::<Vec<_>>(), [2]);
        assert_eq!(PrimeFactors::new(97).collect::<Vec<_>>(), [97]);
        assert_eq!(
            PrimeFactors::new(1_000_000_007).collect::<Vec<_>>(),
            [1_000_000_007]
        );
    }

    #[test]
    fn bounded_search_resumes_where_it_stopped() {
        let mut factors = PrimeFactors::new(97);
        // 2 does not divide 97, so one divisor is not enough.
        assert_eq!(factors.search(1), FactorSearch::Unfinished);

        let mut steps = 1;
        let found = loop {
            match factors.search(1) {
                FactorSearch::Unfinished => steps += 1,
                other => break other,
            }
        };
        assert_eq!(found, FactorSearch::Found(97));
        assert!(steps < 10);
        assert_eq!(factors.search(1), FactorSearch::Exhausted);
        assert_eq!(factors.next(), None);
    }

    #[test]
    fn bounded_search_matches_iterator() {
        let number = 12_390_392_840;
        let mut stepped = PrimeFactors::new(number);
        let mut factors = Vec::new();
        loop {
            match stepped.search(3) {
                FactorSearch::Found(factor) => factors.push(factor),
                FactorSearch::Exhausted => break,
                FactorSearch::Unfinished => {}
            }
        }
        assert_eq!(factors, PrimeFactors::new(number).collect::<Vec<_>>());
    }

    #[test]
    fn largest_input_terminates() {
        let factors: Vec<i64> = PrimeFactors::new(i64::MAX).collect();
        assert_eq!(factors.iter().product::<i64>(), i64::MAX);
    }

    fn is_prime(n: i64) -> bool {
        n >= 2 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
    }
}
