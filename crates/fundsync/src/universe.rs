//! Symbol universe loading.
//!
//! The universe comes from the watchlist collaborator table via paginated
//! reads. Entries are de-duplicated preserving order and validated against
//! the accepted symbol shape; invalid entries are dropped and logged. An
//! empty watchlist falls back to a small hardcoded list so a fresh
//! deployment still ingests something.

use std::collections::HashSet;

use tracing::{debug, warn};

use fundsync_core::{FundamentalStore, Result, Symbol};

/// Fallback universe when the watchlist is empty.
pub const DEFAULT_UNIVERSE: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK.B", "JPM", "V",
];

/// Watchlist page size.
const PAGE_SIZE: u32 = 1000;

/// Loads the full symbol universe from the store.
///
/// # Errors
/// Propagates store errors: failing to acquire the universe is one of the
/// few failures that aborts a run.
pub async fn load_universe(store: &dyn FundamentalStore) -> Result<Vec<Symbol>> {
    let mut raw = Vec::new();
    let mut offset = 0u32;

    loop {
        let page = store.universe_page(offset, PAGE_SIZE).await?;
        let page_len = page.len();
        raw.extend(page);
        if page_len < PAGE_SIZE as usize {
            break;
        }
        offset += PAGE_SIZE;
    }

    let mut seen = HashSet::new();
    let mut universe = Vec::new();
    for entry in raw {
        let symbol = Symbol::new(entry);
        if !symbol.is_valid_shape() {
            warn!(symbol = %symbol, "Dropping invalid watchlist entry");
            continue;
        }
        if seen.insert(symbol.clone()) {
            universe.push(symbol);
        }
    }

    if universe.is_empty() {
        debug!("Watchlist empty, using the default universe");
        universe = DEFAULT_UNIVERSE.iter().map(Symbol::new).collect();
    }

    debug!(count = universe.len(), "Loaded symbol universe");
    Ok(universe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundsync_store::MemoryStore;

    #[tokio::test]
    async fn dedupes_validates_and_preserves_order() {
        let store = MemoryStore::with_watchlist([
            "msft", "AAPL", "MSFT", "not a symbol", "WAYTOOLONGSYM", "BRK.B",
        ]);

        let universe = load_universe(&store).await.unwrap();
        assert_eq!(
            universe,
            vec![Symbol::new("MSFT"), Symbol::new("AAPL"), Symbol::new("BRK.B")]
        );
    }

    #[tokio::test]
    async fn empty_watchlist_falls_back_to_default() {
        let store = MemoryStore::new();
        let universe = load_universe(&store).await.unwrap();
        assert_eq!(universe.len(), DEFAULT_UNIVERSE.len());
        assert_eq!(universe[0], Symbol::new("AAPL"));
    }
}
