//! Price data: the quote model and the CoinGecko fetcher.

mod fetcher;
mod quote;

pub use fetcher::{PriceFetcher, QuoteSource};
pub use quote::{ChangeWindow, PriceMovement, PriceQuote, compare_quotes, round_to};
