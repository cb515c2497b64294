use serde::{Deserialize, Serialize};

use crate::models::dataset::ValueDictionary;
use crate::models::portfolio::{Asset, Portfolio};
use crate::services::position_walker::PositionWalker;

/// Label for assets that carry neither a symbol nor a name.
pub const UNKNOWN_KEY: &str = "Unknown";

/// Which asset field keys the dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    /// Uppercased ticker symbol, falling back to name
    #[default]
    Symbol,
    /// Display name, falling back to symbol
    Name,
}

impl KeyMode {
    pub fn key_for(&self, asset: &Asset) -> String {
        let symbol = asset.symbol.trim();
        let name = asset.name.trim();
        let (primary, fallback) = match self {
            KeyMode::Symbol => (symbol, name),
            KeyMode::Name => (name, symbol),
        };
        let key = if primary.is_empty() { fallback } else { primary };
        if key.is_empty() {
            return UNKNOWN_KEY.to_string();
        }
        match (self, primary.is_empty()) {
            (KeyMode::Symbol, false) => key.to_uppercase(),
            _ => key.to_string(),
        }
    }
}

/// Reduces leaf assets into key → summed value dictionaries.
///
/// Values that fail to parse count as zero. Summation depends only on the
/// multiset of inputs, so any reordering produces the same dictionary.
pub struct ValueAggregator;

impl ValueAggregator {
    pub fn aggregate_assets<'a, I>(assets: I, mode: KeyMode) -> ValueDictionary
    where
        I: IntoIterator<Item = &'a Asset>,
    {
        assets
            .into_iter()
            .map(|asset| (mode.key_for(asset), asset.numeric_value()))
            .collect()
    }

    /// Asset-level dictionary of one portfolio, summed across every protocol,
    /// chain and position.
    pub fn aggregate_portfolio(portfolio: &Portfolio, mode: KeyMode) -> ValueDictionary {
        Self::aggregate_assets(
            PositionWalker::walk_portfolio(portfolio)
                .into_iter()
                .map(|leaf| leaf.asset),
            mode,
        )
    }

    /// Asset-level dictionary summed across several portfolios.
    pub fn aggregate_portfolios<'a, I>(portfolios: I, mode: KeyMode) -> ValueDictionary
    where
        I: IntoIterator<Item = &'a Portfolio>,
    {
        portfolios
            .into_iter()
            .fold(ValueDictionary::new(), |acc, p| {
                acc.merged(&Self::aggregate_portfolio(p, mode))
            })
    }

    /// Protocol key → leaf sum. Upstream's per-protocol `value` is ignored.
    pub fn aggregate_protocols(portfolio: &Portfolio) -> ValueDictionary {
        PositionWalker::walk_portfolio(portfolio)
            .into_iter()
            .map(|leaf| (leaf.protocol, leaf.asset.numeric_value()))
            .collect()
    }

    /// Chain key → leaf sum across every protocol on that chain.
    pub fn aggregate_chains(portfolio: &Portfolio) -> ValueDictionary {
        PositionWalker::walk_portfolio(portfolio)
            .into_iter()
            .map(|leaf| (leaf.chain, leaf.asset.numeric_value()))
            .collect()
    }

    /// Net worth derived from leaf assets: holdings minus borrowed assets.
    ///
    /// The allocation dictionaries above stay gross, so debt shows up there
    /// as exposure while it is subtracted here.
    pub fn net_worth(portfolio: &Portfolio) -> f64 {
        PositionWalker::walk_portfolio(portfolio)
            .iter()
            .map(|leaf| leaf.net_value())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_fallbacks() {
        let both = Asset::new("eth", "Ether", "1");
        let no_symbol = Asset::new("", "Mystery Token", "1");
        let nothing = Asset::new(" ", "", "1");

        assert_eq!(KeyMode::Symbol.key_for(&both), "ETH");
        assert_eq!(KeyMode::Name.key_for(&both), "Ether");
        assert_eq!(KeyMode::Symbol.key_for(&no_symbol), "Mystery Token");
        assert_eq!(KeyMode::Name.key_for(&Asset::new("usdc", "", "1")), "usdc");
        assert_eq!(KeyMode::Symbol.key_for(&nothing), UNKNOWN_KEY);
    }
}
