//! Price quote model and change-window selection.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// A USD price with optional percentage changes over fixed windows.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PriceQuote {
    pub price: f64,
    pub change_1h: Option<f64>,
    pub change_24h: Option<f64>,
    pub change_7d: Option<f64>,
}

impl PriceQuote {
    /// Percentage change for the given window, if the window is enabled and known.
    pub fn change(&self, window: ChangeWindow) -> Option<f64> {
        match window {
            ChangeWindow::Disabled => None,
            ChangeWindow::OneHour => self.change_1h,
            ChangeWindow::OneDay => self.change_24h,
            ChangeWindow::SevenDays => self.change_7d,
        }
    }
}

/// Time horizon whose percentage change gets announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
pub enum ChangeWindow {
    /// Announce the price only
    #[value(name = "off", alias = "disabled")]
    #[serde(rename = "off")]
    Disabled,
    /// Change over the last hour
    #[value(name = "1h")]
    #[serde(rename = "1h")]
    OneHour,
    /// Change over the last 24 hours
    #[default]
    #[value(name = "24h")]
    #[serde(rename = "24h")]
    OneDay,
    /// Change over the last 7 days
    #[value(name = "7d")]
    #[serde(rename = "7d")]
    SevenDays,
}

impl ChangeWindow {
    /// Spoken suffix for the window ("in 24 hours").
    pub fn phrase(&self) -> Option<&'static str> {
        match self {
            ChangeWindow::Disabled => None,
            ChangeWindow::OneHour => Some("in 1 hour"),
            ChangeWindow::OneDay => Some("in 24 hours"),
            ChangeWindow::SevenDays => Some("in 7 days"),
        }
    }
}

impl fmt::Display for ChangeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeWindow::Disabled => write!(f, "off"),
            ChangeWindow::OneHour => write!(f, "1h"),
            ChangeWindow::OneDay => write!(f, "24h"),
            ChangeWindow::SevenDays => write!(f, "7d"),
        }
    }
}

/// Direction of a new quote relative to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMovement {
    /// No previous quote to compare against
    First,
    Up,
    Down,
    Unchanged,
}

impl fmt::Display for PriceMovement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceMovement::First => write!(f, "first quote"),
            PriceMovement::Up => write!(f, "up since last"),
            PriceMovement::Down => write!(f, "down since last"),
            PriceMovement::Unchanged => write!(f, "unchanged since last"),
        }
    }
}

/// Compare the latest quote with the previous one.
pub fn compare_quotes(previous: Option<&PriceQuote>, current: &PriceQuote) -> PriceMovement {
    match previous {
        None => PriceMovement::First,
        Some(prev) if current.price > prev.price => PriceMovement::Up,
        Some(prev) if current.price < prev.price => PriceMovement::Down,
        Some(_) => PriceMovement::Unchanged,
    }
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
