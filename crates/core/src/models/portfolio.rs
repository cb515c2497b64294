use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::category::CategorySet;
use super::numeric::{lenient_opt_string, lenient_string, parse_decimal};

/// One wallet's holdings at a point in time, as returned by the upstream API.
///
/// Immutable once fetched: every (address, date) pair yields its own value.
/// The reported `net_worth` and every intermediate `value` field are
/// informational; totals are always derived from leaf [`Asset`]s.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(default)]
    pub address: String,

    #[serde(default, rename = "networth", deserialize_with = "lenient_string")]
    pub net_worth: String,

    /// Protocol key → holding
    #[serde(default, rename = "assetByProtocols")]
    pub protocols: BTreeMap<String, ProtocolHolding>,
}

/// A protocol (Aave, Uniswap, "wallet"...) and its per-chain holdings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProtocolHolding {
    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,

    /// Chain key → holding
    #[serde(default)]
    pub chains: BTreeMap<String, ChainHolding>,
}

impl ProtocolHolding {
    /// Key used when aggregating by protocol: `key`, falling back to `name`.
    pub fn display_key(&self) -> &str {
        if self.key.is_empty() {
            &self.name
        } else {
            &self.key
        }
    }
}

/// One chain inside a protocol holding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChainHolding {
    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,

    /// Position key → position
    #[serde(default, rename = "protocolPositions")]
    pub positions: BTreeMap<String, Position>,
}

/// The typed asset slots a [`Position`] may carry, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetSlot {
    Assets,
    Supplied,
    Borrowed,
    Reward,
    Dex,
    Quote,
    Margin,
    Base,
}

impl AssetSlot {
    /// Every slot, in the order the walker visits them.
    pub const ALL: [AssetSlot; 8] = [
        AssetSlot::Assets,
        AssetSlot::Supplied,
        AssetSlot::Borrowed,
        AssetSlot::Reward,
        AssetSlot::Dex,
        AssetSlot::Quote,
        AssetSlot::Margin,
        AssetSlot::Base,
    ];

    /// Borrowed assets are debt: they reduce net worth instead of adding to it.
    pub fn is_liability(self) -> bool {
        matches!(self, AssetSlot::Borrowed)
    }

    /// Contribution of `value` held in this slot to a net total. Debt is
    /// subtracted whichever sign upstream reports it with.
    pub fn signed(self, value: f64) -> f64 {
        if self.is_liability() {
            -value.abs()
        } else {
            value
        }
    }
}

impl std::fmt::Display for AssetSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssetSlot::Assets => "assets",
            AssetSlot::Supplied => "supplyAssets",
            AssetSlot::Borrowed => "borrowAssets",
            AssetSlot::Reward => "rewardAssets",
            AssetSlot::Dex => "dexAssets",
            AssetSlot::Quote => "quoteAssets",
            AssetSlot::Margin => "marginAssets",
            AssetSlot::Base => "baseAssets",
        };
        write!(f, "{name}")
    }
}

/// A leaf-or-branch holding node. May nest arbitrarily through `children`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    #[serde(default)]
    pub name: String,

    /// Self-reported by upstream. Never used for totals.
    #[serde(default, deserialize_with = "lenient_string")]
    pub total_value: String,

    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub supply_assets: Vec<Asset>,
    #[serde(default)]
    pub borrow_assets: Vec<Asset>,
    #[serde(default)]
    pub reward_assets: Vec<Asset>,
    #[serde(default)]
    pub dex_assets: Vec<Asset>,
    #[serde(default)]
    pub quote_assets: Vec<Asset>,
    #[serde(default)]
    pub margin_assets: Vec<Asset>,
    #[serde(default)]
    pub base_assets: Vec<Asset>,

    #[serde(default, rename = "protocolPositions")]
    pub children: Vec<Position>,
}

impl Position {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Assets held in one typed slot (empty slice when absent).
    pub fn slot(&self, slot: AssetSlot) -> &[Asset] {
        match slot {
            AssetSlot::Assets => &self.assets,
            AssetSlot::Supplied => &self.supply_assets,
            AssetSlot::Borrowed => &self.borrow_assets,
            AssetSlot::Reward => &self.reward_assets,
            AssetSlot::Dex => &self.dex_assets,
            AssetSlot::Quote => &self.quote_assets,
            AssetSlot::Margin => &self.margin_assets,
            AssetSlot::Base => &self.base_assets,
        }
    }

    /// Mutable access to a slot, for building fixtures.
    pub fn slot_mut(&mut self, slot: AssetSlot) -> &mut Vec<Asset> {
        match slot {
            AssetSlot::Assets => &mut self.assets,
            AssetSlot::Supplied => &mut self.supply_assets,
            AssetSlot::Borrowed => &mut self.borrow_assets,
            AssetSlot::Reward => &mut self.reward_assets,
            AssetSlot::Dex => &mut self.dex_assets,
            AssetSlot::Quote => &mut self.quote_assets,
            AssetSlot::Margin => &mut self.margin_assets,
            AssetSlot::Base => &mut self.base_assets,
        }
    }

    pub fn with_assets(mut self, slot: AssetSlot, assets: Vec<Asset>) -> Self {
        self.slot_mut(slot).extend(assets);
        self
    }

    pub fn with_child(mut self, child: Position) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && AssetSlot::ALL.iter().all(|s| self.slot(*s).is_empty())
    }

    pub fn reported_total(&self) -> f64 {
        parse_decimal(&self.total_value)
    }

    /// `reported - leaf_sum`: how far upstream's own total drifts from the sum
    /// of the leaves it reported.
    pub fn reported_divergence(&self, leaf_sum: f64) -> f64 {
        self.reported_total() - leaf_sum
    }
}

/// Leaf value holder.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub symbol: String,

    #[serde(default)]
    pub name: String,

    /// Fiat value, as a decimal string
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,

    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub balance: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<String>,

    #[serde(default, alias = "category", skip_serializing_if = "CategorySet::is_empty")]
    pub categories: CategorySet,
}

impl Asset {
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn numeric_value(&self) -> f64 {
        parse_decimal(&self.value)
    }
}
