//! Run progress as the fraction of distinct completed cases.

use std::collections::HashSet;

use crate::errors::ProgressError;

#[derive(Debug, Default)]
pub struct ProgressCalculator {
    amount: usize,
    completed: HashSet<String>,
}

impl ProgressCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of collected cases. Resets completed ids.
    pub fn set_test_amount(&mut self, amount: i64) -> Result<(), ProgressError> {
        if amount <= 0 {
            return Err(ProgressError::InvalidAmount(amount));
        }
        self.amount = amount as usize;
        self.completed.clear();
        Ok(())
    }

    /// Mark `node_id` completed and return the floored percentage.
    ///
    /// Idempotent per id, so the result never decreases and is capped at 100.
    pub fn calculate(&mut self, node_id: &str) -> u8 {
        if self.amount == 0 {
            return 0;
        }
        if !self.completed.contains(node_id) {
            self.completed.insert(node_id.to_string());
        }
        let percent = self.completed.len() * 100 / self.amount;
        percent.min(100) as u8
    }

    pub fn amount(&self) -> usize {
        self.amount
    }

    pub fn completed(&self) -> usize {
        self.completed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_amount() {
        let mut calc = ProgressCalculator::new();
        assert!(matches!(
            calc.set_test_amount(0),
            Err(ProgressError::InvalidAmount(0))
        ));
        assert!(calc.set_test_amount(-3).is_err());
    }

    #[test]
    fn test_floor_percentages() {
        let mut calc = ProgressCalculator::new();
        calc.set_test_amount(3).unwrap();
        assert_eq!(calc.calculate("a"), 33);
        assert_eq!(calc.calculate("b"), 66);
        assert_eq!(calc.calculate("c"), 100);
    }

    #[test]
    fn test_repeated_ids_do_not_advance() {
        let mut calc = ProgressCalculator::new();
        calc.set_test_amount(4).unwrap();
        assert_eq!(calc.calculate("a"), 25);
        assert_eq!(calc.calculate("a"), 25);
        assert_eq!(calc.completed(), 1);
    }

    #[test]
    fn test_monotonic_and_stays_at_100() {
        for n in 1..=17usize {
            let mut calc = ProgressCalculator::new();
            calc.set_test_amount(n as i64).unwrap();
            let mut last = 0;
            // Feed every id twice in interleaved order
            let ids: Vec<String> = (0..n).map(|i| format!("m::c{}", i)).collect();
            for round in 0..2 {
                for id in &ids {
                    let p = calc.calculate(id);
                    assert!(p >= last, "progress decreased for n={} round={}", n, round);
                    last = p;
                }
                assert_eq!(last, 100);
            }
        }
    }
}
