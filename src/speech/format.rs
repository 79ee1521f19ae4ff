//! Turns a quote into the sentence that gets spoken.

use crate::price::{ChangeWindow, PriceQuote, round_to};

/// Format a USD price for speech.
///
/// Prices of 1000 and above are rounded to whole dollars, prices from 1 to 1000 keep
/// up to 2 decimals, and anything below 1 keeps up to 3. Trailing zeros are dropped.
pub fn format_price(price: f64) -> String {
    let rounded = if price >= 1000.0 {
        price.round()
    } else if price >= 1.0 {
        round_to(price, 2)
    } else {
        round_to(price, 3)
    };
    // f64's Display prints the shortest form, so 12.50 becomes "12.5" and 43251.0 "43251".
    format!("{}", rounded)
}

/// Build the announcement sentence, e.g. `"BTC price is $43251, up 2.5 percent in 24 hours"`.
///
/// # Arguments
/// * `ticker` - Spoken ticker symbol
/// * `price` - USD price to announce
/// * `quote` - Quote supplying the percentage changes
/// * `window` - Which change to mention, if any
pub fn format_price_text(ticker: &str, price: f64, quote: &PriceQuote, window: ChangeWindow) -> String {
    let mut text = format!("{} price is ${}", ticker, format_price(price));

    if let (Some(change), Some(phrase)) = (quote.change(window), window.phrase()) {
        let direction = if change >= 0.0 { "up" } else { "down" };
        text.push_str(&format!(", {} {:.1} percent {}", direction, round_to(change.abs(), 1), phrase));
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decimals(text: &str) -> usize {
        let number = text.rsplit('$').next().unwrap().split(',').next().unwrap();
        number.split('.').nth(1).map(str::len).unwrap_or(0)
    }

    #[test]
    fn test_large_prices_have_no_decimals() {
        for price in [1000.0, 1000.49, 43250.5, 99999.999, 123456.78] {
            let text = format_price_text("BTC", price, &PriceQuote::default(), ChangeWindow::Disabled);
            assert!(!text.contains('.'), "{}", text);
        }
    }

    #[test]
    fn test_mid_prices_have_at_most_two_decimals() {
        for price in [1.0, 1.005, 12.5, 99.999, 250.123, 999.994] {
            assert!(decimals(&format_price_text("ETH", price, &PriceQuote::default(), ChangeWindow::Disabled)) <= 2);
        }
        assert_eq!(format_price(12.5), "12.5");
        assert_eq!(format_price(12.0), "12");
        assert_eq!(format_price(250.126), "250.13");
    }

    #[test]
    fn test_small_prices_have_at_most_three_decimals() {
        for price in [0.5, 0.085, 0.08549, 0.0001, 0.999] {
            assert!(decimals(&format_price_text("DOGE", price, &PriceQuote::default(), ChangeWindow::Disabled)) <= 3);
        }
        assert_eq!(format_price(0.1234), "0.123");
    }

    #[test]
    fn test_price_with_day_change() {
        let quote = PriceQuote { price: 43250.50, change_24h: Some(2.47), ..Default::default() };
        assert_eq!(format_price_text("BTC", 43250.50, &quote, ChangeWindow::OneDay), "BTC price is $43251, up 2.5 percent in 24 hours");
    }

    #[test]
    fn test_price_only() {
        assert_eq!(format_price_text("BTC", 0.085, &PriceQuote::default(), ChangeWindow::Disabled), "BTC price is $0.085");
    }

    #[test]
    fn test_negative_changes_and_windows() {
        let quote = PriceQuote { price: 2300.0, change_1h: Some(-0.04), change_24h: None, change_7d: Some(-12.0) };
        assert_eq!(format_price_text("ETH", 2300.0, &quote, ChangeWindow::OneHour), "ETH price is $2300, down 0.0 percent in 1 hour");
        assert_eq!(format_price_text("ETH", 2300.0, &quote, ChangeWindow::SevenDays), "ETH price is $2300, down 12.0 percent in 7 days");
    }

    #[test]
    fn test_missing_change_appends_nothing() {
        let quote = PriceQuote { price: 100.0, ..Default::default() };
        assert_eq!(format_price_text("SOL", 100.0, &quote, ChangeWindow::OneDay), "SOL price is $100");
    }
}
