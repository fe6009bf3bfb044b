use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest symbol the engine will register.
const MAX_SYMBOL_LEN: usize = 24;

/// A validated instrument identifier, e.g `"BTC-USDT"`.
///
/// The engine does not maintain a whitelist of instruments; any string that
/// passes [`Symbol::from_str`] gets a book lazily on first submission.
/// Serialized as a plain JSON string via `try_from`/`into`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Returns the symbol code, e.g `"BTC-USDT"`.
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = String;

    /// Accepts 1..=24 characters from `[A-Za-z0-9._-]`, normalized to
    /// uppercase so `"btc-usdt"` and `"BTC-USDT"` share a book.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("symbol must not be empty".to_string());
        }
        if s.len() > MAX_SYMBOL_LEN {
            return Err(format!(
                "symbol `{s}` exceeds {MAX_SYMBOL_LEN} characters"
            ));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(format!("symbol `{s}` contains invalid characters"));
        }
        Ok(Symbol(s.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for Symbol {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> String {
        symbol.0
    }
}
