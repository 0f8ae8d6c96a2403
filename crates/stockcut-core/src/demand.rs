use crate::order::OrderLine;
use crate::types::{Algorithm, OptimizerError, Result};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Separator between `{width}x{quantity}` entries in a signature
const SIGNATURE_SEPARATOR: &str = "|";

/// Piece order: width in millimeters mapped to the number of pieces required.
///
/// Widths are kept in ascending order, which is also the canonical order used
/// by [`Demand::canonical_signature`]. Adding a width that is already present
/// increases its quantity, in code and in serialized maps alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Demand {
    pieces: BTreeMap<u32, u32>,
}

impl Demand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` pieces of `width`, merging with any existing entry.
    pub fn add(&mut self, width: u32, quantity: u32) {
        let entry = self.pieces.entry(width).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    /// Builds a demand from order lines, summing duplicate widths.
    pub fn from_lines(lines: &[OrderLine]) -> Self {
        lines.iter().map(|l| (l.width, l.quantity)).collect()
    }

    /// Converts back into order lines, one per distinct width.
    pub fn to_lines(&self) -> Vec<OrderLine> {
        self.iter()
            .map(|(width, quantity)| OrderLine { width, quantity })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Number of distinct widths.
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    /// `(width, quantity)` pairs, widths ascending.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.pieces.iter().map(|(&w, &q)| (w, q))
    }

    pub fn quantity(&self, width: u32) -> u32 {
        self.pieces.get(&width).copied().unwrap_or(0)
    }

    /// Total number of pieces over all widths.
    pub fn total_pieces(&self) -> u64 {
        self.pieces.values().map(|&q| q as u64).sum()
    }

    pub fn max_width(&self) -> Option<u32> {
        self.pieces.keys().next_back().copied()
    }

    /// Rejects zero widths and zero quantities.
    pub fn validate(&self) -> Result<()> {
        for (width, quantity) in self.iter() {
            if width == 0 {
                return Err(OptimizerError::InvalidDemand(format!(
                    "piece width must be positive (quantity {} given for width 0)",
                    quantity
                )));
            }
            if quantity == 0 {
                return Err(OptimizerError::InvalidDemand(format!(
                    "quantity for width {}mm must be positive",
                    width
                )));
            }
        }
        Ok(())
    }

    /// Deterministic cache key for this demand and algorithm,
    /// e.g. `110x10|215x8|350x5|500x4|alg:best_fit`.
    pub fn canonical_signature(&self, algorithm: Algorithm) -> Result<String> {
        self.validate()?;

        let mut parts: Vec<String> = self
            .iter()
            .map(|(width, quantity)| format!("{}x{}", width, quantity))
            .collect();
        parts.push(format!("alg:{}", algorithm.tag()));
        Ok(parts.join(SIGNATURE_SEPARATOR))
    }

    /// Expands every `(width, quantity)` pair into `quantity` copies of `width`.
    pub fn flatten(&self) -> Vec<u32> {
        let mut pieces = Vec::with_capacity(self.total_pieces() as usize);
        for (width, quantity) in self.iter() {
            pieces.extend(std::iter::repeat(width).take(quantity as usize));
        }
        pieces
    }
}

impl FromIterator<(u32, u32)> for Demand {
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        let mut demand = Demand::new();
        for (width, quantity) in iter {
            demand.add(width, quantity);
        }
        demand
    }
}

impl<'de> Deserialize<'de> for Demand {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DemandVisitor;

        impl<'de> Visitor<'de> for DemandVisitor {
            type Value = Demand;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of piece width to quantity")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Demand, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut demand = Demand::new();
                while let Some((width, quantity)) = map.next_entry::<u32, u32>()? {
                    demand.add(width, quantity);
                }
                Ok(demand)
            }
        }

        deserializer.deserialize_map(DemandVisitor)
    }
}
