//! Trading signal submitted to the position-opening gate.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Direction of a proposed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// A strategy's request to open a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    /// Strategy confidence in `[0, 1]`.
    pub confidence: Decimal,
    /// Notional size of the position in account currency.
    #[serde(default)]
    pub position_size: Option<Decimal>,
    /// Total cost, used when no position size is given.
    #[serde(default)]
    pub cost: Option<Decimal>,
}

impl TradingSignal {
    /// Create a signal sized by notional position size.
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        entry_price: Decimal,
        confidence: Decimal,
        position_size: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            entry_price,
            confidence,
            position_size: Some(position_size),
            cost: None,
        }
    }

    /// Use a cost figure instead of a position size.
    pub fn with_cost(mut self, cost: Decimal) -> Self {
        self.position_size = None;
        self.cost = Some(cost);
        self
    }

    /// Capital needed to open this position.
    ///
    /// A zero or missing position size falls back to the cost; with neither
    /// present nothing is required.
    pub fn required_capital(&self) -> Decimal {
        self.position_size
            .filter(|size| !size.is_zero())
            .or(self.cost)
            .unwrap_or(Decimal::ZERO)
    }

    /// Reject signals whose numbers cannot be reasoned about.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(Error::InvalidSignal {
                message: "symbol is empty".to_string(),
            });
        }
        if self.confidence < Decimal::ZERO || self.confidence > Decimal::ONE {
            return Err(Error::InvalidSignal {
                message: format!("confidence {} outside [0, 1]", self.confidence),
            });
        }
        if self.entry_price < Decimal::ZERO {
            return Err(Error::InvalidSignal {
                message: format!("negative entry price {}", self.entry_price),
            });
        }
        for (field, value) in [("position_size", self.position_size), ("cost", self.cost)] {
            if let Some(v) = value {
                if v < Decimal::ZERO {
                    return Err(Error::InvalidSignal {
                        message: format!("negative {field} {v}"),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal() -> TradingSignal {
        TradingSignal::new(
            "BTC-USDT",
            Direction::Long,
            Decimal::new(65000, 0),
            Decimal::new(80, 2),
            Decimal::new(1000, 0),
        )
    }

    #[test]
    fn test_required_capital_prefers_position_size() {
        let mut s = signal();
        s.cost = Some(Decimal::new(50, 0));
        assert_eq!(s.required_capital(), Decimal::new(1000, 0));
    }

    #[test]
    fn test_required_capital_falls_back_to_cost() {
        let s = signal().with_cost(Decimal::new(250, 0));
        assert_eq!(s.required_capital(), Decimal::new(250, 0));

        let mut zero_size = signal();
        zero_size.position_size = Some(Decimal::ZERO);
        zero_size.cost = Some(Decimal::new(75, 0));
        assert_eq!(zero_size.required_capital(), Decimal::new(75, 0));

        let mut neither = signal();
        neither.position_size = None;
        assert_eq!(neither.required_capital(), Decimal::ZERO);
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        let mut s = signal();
        s.confidence = Decimal::new(15, 1); // 1.5
        assert!(matches!(s.validate(), Err(Error::InvalidSignal { .. })));

        s.confidence = Decimal::new(-1, 1);
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_size() {
        let mut s = signal();
        s.position_size = Some(Decimal::new(-10, 0));
        assert!(s.validate().is_err());
        assert!(signal().validate().is_ok());
    }

    #[test]
    fn test_signal_deserializes_without_optional_fields() {
        let json = r#"{"symbol":"ETH-USDT","direction":"SHORT","entry_price":"3200","confidence":"0.9","cost":"500"}"#;
        let s: TradingSignal = serde_json::from_str(json).unwrap();
        assert_eq!(s.direction, Direction::Short);
        assert_eq!(s.position_size, None);
        assert_eq!(s.required_capital(), Decimal::new(500, 0));
    }
}
