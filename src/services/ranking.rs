// src/services/ranking.rs
use std::cmp::Ordering;

use crate::models::{RankedStock, TickerRecord};

/// Descending numeric order; `-0.0` and `0.0` compare equal.
fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Ranks a population by the magic formula.
///
/// Both axes are ranked descending with a stable sort, so equal values keep
/// the order they arrived in. The final order is ascending `magic_index`;
/// ties keep the earning-yield order.
pub fn rank_universe(records: Vec<TickerRecord>, roic_ignore: bool) -> Vec<RankedStock> {
    let mut ranked: Vec<RankedStock> = records
        .into_iter()
        .map(|record| RankedStock {
            record,
            roic_rank: 0,
            earning_yield_rank: 0,
            magic_index: 0,
        })
        .collect();

    ranked.sort_by(|a, b| descending(a.record.roic, b.record.roic));
    for (position, stock) in ranked.iter_mut().enumerate() {
        stock.roic_rank = if roic_ignore { 0 } else { position };
    }

    ranked.sort_by(|a, b| descending(a.record.earning_yield, b.record.earning_yield));
    for (position, stock) in ranked.iter_mut().enumerate() {
        stock.earning_yield_rank = position;
        stock.magic_index = stock.roic_rank + position;
    }

    ranked.sort_by_key(|stock| stock.magic_index);
    ranked
}
