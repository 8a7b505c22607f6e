//! Per-security price thresholds and position state.

use serde::Serialize;

use super::Quote;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TrackerAction {
    Buy { price: f64 },
    Sell { price: f64, profit: f64 },
}

#[derive(Debug, Clone)]
pub struct StockTracker {
    code: String,
    buy_price: Option<f64>,
    sell_price: Option<f64>,
    highest: Option<f64>,
    lowest: Option<f64>,
    entry: Option<f64>,
}

impl StockTracker {
    pub fn new(code: impl Into<String>, buy_price: Option<f64>, sell_price: Option<f64>) -> Self {
        Self {
            code: code.into(),
            buy_price,
            sell_price,
            highest: None,
            lowest: None,
            entry: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn highest(&self) -> Option<f64> {
        self.highest
    }

    pub fn lowest(&self) -> Option<f64> {
        self.lowest
    }

    pub fn is_holding(&self) -> bool {
        self.entry.is_some()
    }

    /// Feed one quote and return the signals it triggers.
    ///
    /// The buy check runs before the sell check, so a quote at or above the
    /// sell price right after a buy yields both in the same tick.
    pub fn observe(&mut self, quote: &Quote) -> Vec<TrackerAction> {
        let current = quote.current;
        self.highest = Some(self.highest.map_or(current, |h| h.max(current)));
        self.lowest = Some(self.lowest.map_or(current, |l| l.min(current)));

        let mut actions = Vec::new();

        if let (None, Some(buy)) = (self.entry, self.buy_price) {
            if current <= buy {
                self.entry = Some(current);
                actions.push(TrackerAction::Buy { price: current });
            }
        }

        if let (Some(entry), Some(sell)) = (self.entry, self.sell_price) {
            if current >= sell {
                self.entry = None;
                actions.push(TrackerAction::Sell {
                    price: current,
                    profit: current - entry,
                });
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(current: f64) -> Quote {
        Quote {
            time: "2024-01-05 10:00:00".into(),
            current,
            high: current,
            low: current,
        }
    }

    #[test]
    fn test_buy_then_sell() {
        let mut tracker = StockTracker::new("600519", Some(10.0), Some(11.0));
        assert!(tracker.observe(&quote(10.5)).is_empty());
        assert_eq!(tracker.observe(&quote(9.8)), vec![TrackerAction::Buy { price: 9.8 }]);
        assert!(tracker.is_holding());
        assert!(tracker.observe(&quote(9.5)).is_empty());

        let actions = tracker.observe(&quote(11.3));
        assert_eq!(actions.len(), 1);
        match actions[0] {
            TrackerAction::Sell { price, profit } => {
                assert_eq!(price, 11.3);
                assert!((profit - 1.5).abs() < 1e-9);
            }
            _ => panic!("expected sell"),
        }
        assert!(!tracker.is_holding());
    }

    #[test]
    fn test_high_low_tracking() {
        let mut tracker = StockTracker::new("000001", None, None);
        for price in [10.0, 12.0, 9.0, 11.0] {
            tracker.observe(&quote(price));
        }
        assert_eq!(tracker.highest(), Some(12.0));
        assert_eq!(tracker.lowest(), Some(9.0));
        assert!(!tracker.is_holding());
    }

    #[test]
    fn test_buy_and_sell_same_tick() {
        // sell price below buy price: both checks fire
        let mut tracker = StockTracker::new("600000", Some(10.0), Some(9.0));
        let actions = tracker.observe(&quote(9.5));
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[1], TrackerAction::Sell { profit, .. } if profit == 0.0));
    }

    #[test]
    fn test_no_sell_without_position() {
        let mut tracker = StockTracker::new("600000", None, Some(9.0));
        assert!(tracker.observe(&quote(20.0)).is_empty());
    }
}
