use crate::models::portfolio::{Asset, AssetSlot, Portfolio, Position};

/// Relative gap between a position's reported total and its leaf sum above
/// which the walker logs a diagnostic.
const DIVERGENCE_TOLERANCE: f64 = 0.01;

/// A leaf asset together with where it was found in the portfolio tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafAsset<'a> {
    pub protocol: &'a str,
    pub chain: &'a str,
    pub slot: AssetSlot,
    pub asset: &'a Asset,
}

impl LeafAsset<'_> {
    /// Leaf value with borrowed assets counted as negative.
    pub fn net_value(&self) -> f64 {
        self.slot.signed(self.asset.numeric_value())
    }
}

/// Flattens protocol → chain → position → sub-position trees into leaf assets.
///
/// Traversal uses an explicit stack, so nesting depth is bounded only by
/// memory. Output order is depth-first: a node's slots in declaration order,
/// then each child in order.
pub struct PositionWalker;

impl PositionWalker {
    /// All leaf assets under `position`, including its own slots.
    pub fn flatten(position: &Position) -> Vec<&Asset> {
        Self::flatten_with_slots(position)
            .into_iter()
            .map(|(_, asset)| asset)
            .collect()
    }

    /// Like [`flatten`](Self::flatten), keeping the slot each asset came from.
    pub fn flatten_with_slots(position: &Position) -> Vec<(AssetSlot, &Asset)> {
        let mut out = Vec::new();
        let mut stack = vec![position];

        while let Some(node) = stack.pop() {
            for slot in AssetSlot::ALL {
                out.extend(node.slot(slot).iter().map(|asset| (slot, asset)));
            }
            // Reverse so the first child is popped first.
            stack.extend(node.children.iter().rev());
        }

        out
    }

    /// Sum of every leaf value under `position`, borrowed assets included
    /// at face value (gross exposure).
    pub fn leaf_total(position: &Position) -> f64 {
        Self::flatten(position).iter().map(|a| a.numeric_value()).sum()
    }

    /// Every leaf asset of a portfolio, tagged with protocol and chain keys.
    pub fn walk_portfolio(portfolio: &Portfolio) -> Vec<LeafAsset<'_>> {
        let mut leaves = Vec::new();

        for (protocol_key, protocol) in &portfolio.protocols {
            let protocol_name = if protocol.display_key().is_empty() {
                protocol_key.as_str()
            } else {
                protocol.display_key()
            };

            for (chain_key, chain) in &protocol.chains {
                let chain_name = if chain.key.is_empty() {
                    chain_key.as_str()
                } else {
                    chain.key.as_str()
                };

                for (position_key, position) in &chain.positions {
                    let slots = Self::flatten_with_slots(position);
                    Self::check_reported_total(&portfolio.address, position_key, position, &slots);

                    leaves.extend(slots.into_iter().map(|(slot, asset)| LeafAsset {
                        protocol: protocol_name,
                        chain: chain_name,
                        slot,
                        asset,
                    }));
                }
            }
        }

        leaves
    }

    /// Reported totals are never used; divergence is only surfaced in logs.
    /// The comparison is against the net leaf sum, supply minus borrow.
    fn check_reported_total(
        address: &str,
        position_key: &str,
        position: &Position,
        slots: &[(AssetSlot, &Asset)],
    ) {
        if position.total_value.is_empty() {
            return;
        }
        let leaf_sum = Self::net_total(slots);
        let divergence = position.reported_divergence(leaf_sum);
        let scale = leaf_sum.abs().max(position.reported_total().abs());
        if scale > 0.0 && divergence.abs() / scale > DIVERGENCE_TOLERANCE {
            tracing::debug!(
                address,
                position = position_key,
                reported = position.reported_total(),
                leaf_sum,
                "Position total diverges from leaf sum; using leaf sum"
            );
        }
    }

    fn net_total(slots: &[(AssetSlot, &Asset)]) -> f64 {
        slots
            .iter()
            .map(|(slot, asset)| slot.signed(asset.numeric_value()))
            .sum()
    }
}
