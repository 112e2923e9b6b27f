/// Running spend for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostAccumulator {
    last_query_usd: Option<f64>,
    cumulative_usd: f64,
}

impl CostAccumulator {
    /// Adds one query's reported cost. Missing, negative or non-finite values count as zero.
    pub fn record(&mut self, total_cost_usd: Option<f64>) -> f64 {
        let cost = total_cost_usd
            .filter(|cost| cost.is_finite() && *cost > 0.0)
            .unwrap_or(0.0);
        self.last_query_usd = Some(cost);
        self.cumulative_usd += cost;
        cost
    }

    #[must_use]
    pub fn last_query_usd(&self) -> Option<f64> {
        self.last_query_usd
    }

    #[must_use]
    pub fn cumulative_usd(&self) -> f64 {
        self.cumulative_usd
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::CostAccumulator;

    #[test]
    fn costs_accumulate_and_missing_counts_as_zero() {
        let mut cost = CostAccumulator::default();
        assert_eq!(cost.record(Some(0.002)), 0.002);
        assert_eq!(cost.record(None), 0.0);
        assert_eq!(cost.record(Some(-1.0)), 0.0);
        assert_eq!(cost.record(Some(f64::NAN)), 0.0);
        assert!((cost.cumulative_usd() - 0.002).abs() < 1e-12);
        assert_eq!(cost.last_query_usd(), Some(0.0));

        cost.reset();
        assert_eq!(cost.cumulative_usd(), 0.0);
        assert_eq!(cost.last_query_usd(), None);
    }
}
