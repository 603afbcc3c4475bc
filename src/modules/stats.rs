//! Whale statistics and leaderboard over a transfer set

use std::collections::{HashMap, HashSet};

use crate::models::{TopWhale, WhaleStats, WhaleTransfer};

/// Aggregate volume, largest transfer and participant count
pub fn get_whale_stats(transfers: &[WhaleTransfer]) -> WhaleStats {
    let mut whales = HashSet::new();
    for t in transfers {
        for party in [&t.transfer.from, &t.transfer.to] {
            if !party.is_empty() {
                whales.insert(party.to_lowercase());
            }
        }
    }

    WhaleStats {
        total_transfers: transfers.len(),
        total_volume: transfers.iter().map(WhaleTransfer::usd_or_zero).sum(),
        largest_transfer: transfers
            .iter()
            .map(WhaleTransfer::usd_or_zero)
            .fold(0.0, f64::max),
        unique_whales: whales.len(),
    }
}

/// Addresses ranked by combined sent and received volume.
///
/// Both sides of every transfer are credited. Addresses compare
/// case-insensitively and keep the spelling first seen. Ties go to the
/// busier address, then the lexically smaller one.
pub fn get_top_whales(transfers: &[WhaleTransfer], limit: usize) -> Vec<TopWhale> {
    let mut board: HashMap<String, TopWhale> = HashMap::new();

    for t in transfers {
        let usd = t.usd_or_zero();
        for party in [&t.transfer.from, &t.transfer.to] {
            if party.is_empty() {
                continue;
            }
            let entry = board.entry(party.to_lowercase()).or_insert_with(|| TopWhale {
                address: party.clone(),
                volume: 0.0,
                transfer_count: 0,
            });
            entry.volume += usd;
            entry.transfer_count += 1;
        }
    }

    let mut ranked: Vec<TopWhale> = board.into_values().collect();
    ranked.sort_by(|a, b| {
        b.volume
            .total_cmp(&a.volume)
            .then_with(|| b.transfer_count.cmp(&a.transfer_count))
            .then_with(|| a.address.to_lowercase().cmp(&b.address.to_lowercase()))
    });
    ranked.truncate(limit);
    ranked
}

/// Case-insensitive exact match on the token symbol
pub fn filter_by_token(transfers: &[WhaleTransfer], symbol: &str) -> Vec<WhaleTransfer> {
    transfers
        .iter()
        .filter(|t| t.transfer.token.symbol.eq_ignore_ascii_case(symbol))
        .cloned()
        .collect()
}

/// Transfers with a known USD value of at least `min`
pub fn filter_by_min_value(transfers: &[WhaleTransfer], min: f64) -> Vec<WhaleTransfer> {
    transfers
        .iter()
        .filter(|t| t.transfer.value_usd.is_some_and(|usd| usd >= min))
        .cloned()
        .collect()
}

pub fn filter_by_chain(transfers: &[WhaleTransfer], chain_id: &str) -> Vec<WhaleTransfer> {
    transfers
        .iter()
        .filter(|t| t.chain_id == chain_id)
        .cloned()
        .collect()
}
