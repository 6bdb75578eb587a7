//! Per-cycle prediction table and winner selection.
//!
//! A fresh table is assembled every cycle, consumed by `winner()`, and
//! discarded. Records are kept in instrument configuration order; that order
//! is the tie-break when two instruments share the maximum score.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One instrument's score for the current cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Open time of the candle the score was computed from
    pub open_time: DateTime<Utc>,
    pub name: String,
    pub symbol: String,
    /// This instrument's own buy threshold, copied from its config
    pub threshold: f64,
    /// Model output score
    pub score: f64,
}

impl PredictionRecord {
    fn clears_own_threshold(&self) -> bool {
        self.score > self.threshold
    }
}

/// Ordered collection of records for one cycle, in configuration order
#[derive(Debug, Clone, Default)]
pub struct PredictionTable {
    records: Vec<PredictionRecord>,
}

impl PredictionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: PredictionRecord) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    /// Pick the instrument to buy this cycle, if any.
    ///
    /// The winner must hold the table-wide maximum score AND exceed its own
    /// threshold. A maximum that fails its own threshold yields no winner
    /// even when a lower-scoring record clears its threshold. Ties at the
    /// maximum break to the first record in table order; the order carries
    /// no ranking meaning, it is just deterministic.
    pub fn winner(&self) -> Option<&PredictionRecord> {
        let max = self
            .records
            .iter()
            .map(|r| r.score)
            .fold(f64::NEG_INFINITY, f64::max);

        self.records
            .iter()
            .find(|r| r.score == max && r.clears_own_threshold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, score: f64, threshold: f64) -> PredictionRecord {
        PredictionRecord {
            open_time: Utc::now(),
            name: name.into(),
            symbol: format!("{}USDT", name.to_uppercase()),
            threshold,
            score,
        }
    }

    fn table(records: Vec<PredictionRecord>) -> PredictionTable {
        let mut table = PredictionTable::new();
        for r in records {
            table.push(r);
        }
        table
    }

    #[test]
    fn empty_table_has_no_winner() {
        assert!(PredictionTable::new().winner().is_none());
    }

    #[test]
    fn no_winner_when_nothing_clears_its_threshold() {
        let t = table(vec![record("btc", 0.5, 0.75), record("eth", 0.6, 0.8)]);
        assert!(t.winner().is_none());
    }

    #[test]
    fn single_qualifying_maximum_wins() {
        let t = table(vec![record("btc", 0.7, 0.75), record("eth", 0.9, 0.8)]);
        assert_eq!(t.winner().map(|w| w.name.as_str()), Some("eth"));
    }

    #[test]
    fn maximum_failing_its_own_threshold_blocks_any_winner() {
        // A (0.8 > 0.75) passes its threshold but is not the max;
        // B (0.9) is the max but fails its own 0.95 threshold.
        let t = table(vec![record("a", 0.8, 0.75), record("b", 0.9, 0.95)]);
        assert!(t.winner().is_none());
    }

    #[test]
    fn tie_at_maximum_breaks_to_first_in_table_order() {
        let t = table(vec![record("a", 0.9, 0.75), record("b", 0.9, 0.5)]);
        assert_eq!(t.winner().map(|w| w.name.as_str()), Some("a"));
    }

    #[test]
    fn tie_where_first_fails_threshold_falls_to_second() {
        let t = table(vec![record("a", 0.9, 0.95), record("b", 0.9, 0.5)]);
        assert_eq!(t.winner().map(|w| w.name.as_str()), Some("b"));
    }

    #[test]
    fn threshold_must_be_strictly_exceeded() {
        let t = table(vec![record("btc", 0.75, 0.75)]);
        assert!(t.winner().is_none());
    }
}
