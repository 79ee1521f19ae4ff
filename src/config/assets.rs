//! Catalogue of the cryptocurrencies the announcer can track.
//!
//! The set is closed: every asset carries the CoinGecko id used in API calls, the
//! display name, the spoken ticker, and a base price used for synthetic quotes when
//! the API cannot be reached.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A tracked cryptocurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    #[default]
    Bitcoin,
    Ethereum,
    Solana,
    Ripple,
    Cardano,
    Dogecoin,
    Litecoin,
    Polkadot,
}

/// Static metadata for an asset.
#[derive(Debug, Clone, Copy)]
pub struct AssetInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub ticker: &'static str,
    pub base_price: f64,
}

const ASSETS: &[(Asset, AssetInfo)] = &[
    (Asset::Bitcoin, AssetInfo { id: "bitcoin", name: "Bitcoin", ticker: "BTC", base_price: 43000.0 }),
    (Asset::Ethereum, AssetInfo { id: "ethereum", name: "Ethereum", ticker: "ETH", base_price: 2300.0 }),
    (Asset::Solana, AssetInfo { id: "solana", name: "Solana", ticker: "SOL", base_price: 100.0 }),
    (Asset::Ripple, AssetInfo { id: "ripple", name: "XRP", ticker: "XRP", base_price: 0.6 }),
    (Asset::Cardano, AssetInfo { id: "cardano", name: "Cardano", ticker: "ADA", base_price: 0.5 }),
    (Asset::Dogecoin, AssetInfo { id: "dogecoin", name: "Dogecoin", ticker: "DOGE", base_price: 0.085 }),
    (Asset::Litecoin, AssetInfo { id: "litecoin", name: "Litecoin", ticker: "LTC", base_price: 70.0 }),
    (Asset::Polkadot, AssetInfo { id: "polkadot", name: "Polkadot", ticker: "DOT", base_price: 7.0 }),
];

impl Asset {
    /// All assets in display order.
    pub fn all() -> impl Iterator<Item = Asset> {
        ASSETS.iter().map(|(asset, _)| *asset)
    }

    /// Static metadata for this asset.
    pub fn info(self) -> &'static AssetInfo {
        // ASSETS rows follow the variant declaration order.
        &ASSETS[self as usize].1
    }

    /// CoinGecko identifier.
    pub fn id(self) -> &'static str {
        self.info().id
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn ticker(self) -> &'static str {
        self.info().ticker
    }

    pub fn base_price(self) -> f64 {
        self.info().base_price
    }

    /// Look up an asset by CoinGecko id or ticker, ignoring case.
    pub fn lookup(key: &str) -> Option<Asset> {
        let key = key.trim();
        ASSETS
            .iter()
            .find(|(_, info)| info.id.eq_ignore_ascii_case(key) || info.ticker.eq_ignore_ascii_case(key))
            .map(|(asset, _)| *asset)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.ticker())
    }
}

impl FromStr for Asset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Asset::lookup(s).ok_or_else(|| format!("unknown asset '{}' (run with --list-assets to see the supported set)", s))
    }
}

/// Print the supported assets.
pub fn print_assets() {
    println!("═══════════════════════════════════════════════");
    println!("  Supported assets");
    println!("═══════════════════════════════════════════════");
    println!("{:<12} {:<10} {:<7} {:>10}", "ID", "NAME", "TICKER", "FALLBACK");
    println!("{}", "─".repeat(42));

    for asset in Asset::all() {
        let info = asset.info();
        println!("{:<12} {:<10} {:<7} {:>10}", info.id, info.name, info.ticker, info.base_price);
    }

    println!();
    println!("Usage:");
    println!("  ./crypto-voice --asset ethereum");
    println!("  ./crypto-voice --asset SOL --interval 30");
}
