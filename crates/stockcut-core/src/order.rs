//! Order files: the raw piece list a user saves and reloads.
//!
//! An order file is a JSON array of `{"width": .., "quantity": ..}` objects.
//! It is independent of the history file and carries no results.

use crate::types::{OptimizerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One row of a piece order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub width: u32,
    pub quantity: u32,
}

/// Reads an order file.
pub fn load_order(path: &Path) -> Result<Vec<OrderLine>> {
    let content = std::fs::read_to_string(path)?;
    parse_order(&content)
}

/// Parses order JSON and rejects lines with a zero width or quantity.
pub fn parse_order(content: &str) -> Result<Vec<OrderLine>> {
    let lines: Vec<OrderLine> = serde_json::from_str(content)?;
    for (idx, line) in lines.iter().enumerate() {
        if line.width == 0 || line.quantity == 0 {
            return Err(OptimizerError::InvalidInput(format!(
                "order line {} must have a positive width and quantity",
                idx + 1
            )));
        }
    }
    Ok(lines)
}

/// Writes an order file, pretty-printed.
pub fn save_order(path: &Path, lines: &[OrderLine]) -> Result<()> {
    if lines.is_empty() {
        return Err(OptimizerError::InvalidInput(
            "there are no pieces to save".to_string(),
        ));
    }
    let json = serde_json::to_string_pretty(lines)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::Demand;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.json");
        let lines = vec![
            OrderLine {
                width: 500,
                quantity: 4,
            },
            OrderLine {
                width: 110,
                quantity: 10,
            },
        ];

        save_order(&path, &lines).unwrap();
        let loaded = load_order(&path).unwrap();
        assert_eq!(loaded, lines);
    }

    #[test]
    fn test_parse_rejects_zero_quantity() {
        let err = parse_order(r#"[{"width": 500, "quantity": 0}]"#).unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidInput(_)));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let err = parse_order(r#"[{"width": "wide"}]"#).unwrap_err();
        assert!(matches!(err, OptimizerError::Serialization(_)));
    }

    #[test]
    fn test_save_refuses_empty_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        assert!(save_order(&path, &[]).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_demand_round_trips_through_lines() {
        let demand: Demand = [(700, 2), (100, 12)].into_iter().collect();
        let lines = demand.to_lines();
        assert_eq!(lines[0].width, 100);
        assert_eq!(Demand::from_lines(&lines), demand);
    }
}
