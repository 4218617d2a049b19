pub mod etf;
pub mod trading_date;

pub use etf::{CompositionRow, CompositionSnapshot, EtfQuote, RankedRow, TradingSnapshot};
pub use trading_date::TradingDate;
