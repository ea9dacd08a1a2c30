// src/services/valuation.rs
use crate::models::{RawTickerFields, TickerRecord, NOT_FOUND};

pub const DEFAULT_MAX_PL: f64 = 15.0;
pub const DEFAULT_MAX_PVP: f64 = 1.5;

/// Multiple caps used by the Graham intrinsic value formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrahamParams {
    pub max_pl: f64,
    pub max_pvp: f64,
}

impl Default for GrahamParams {
    fn default() -> Self {
        GrahamParams {
            max_pl: DEFAULT_MAX_PL,
            max_pvp: DEFAULT_MAX_PVP,
        }
    }
}

impl GrahamParams {
    pub fn is_default(&self) -> bool {
        *self == GrahamParams::default()
    }
}

/// Non-finite values become `0`, and `-0.0` becomes `0.0`.
fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value + 0.0
    } else {
        0.0
    }
}

/// Rounds to two decimals, half away from zero.
pub fn round2(value: f64) -> f64 {
    finite_or_zero((value * 100.0).round() / 100.0)
}

/// `ebit = ev / ev_ebit`, `yield = ebit / ev`. Zero when either divisor is zero.
pub fn earning_yield(fields: &RawTickerFields) -> f64 {
    let ev_ebit = fields.number("ev_ebit");
    let ev = fields.number("ev");
    if ev_ebit == 0.0 || ev == 0.0 {
        return 0.0;
    }
    let ebit = ev / ev_ebit;
    round2(ebit / ev)
}

pub fn graham_vi(vpa: f64, lpa: f64, params: GrahamParams) -> f64 {
    if vpa <= 0.0 || lpa <= 0.0 {
        return 0.0;
    }
    let pre_vi = params.max_pl * params.max_pvp * vpa * lpa;
    if pre_vi < 0.0 {
        return 0.0;
    }
    round2(pre_vi.sqrt())
}

pub fn graham_upside(price: f64, vi: f64) -> f64 {
    if price <= 0.0 || vi <= 0.0 {
        return 0.0;
    }
    round2((vi - price) / price)
}

/// EBIT as published, or derived from `ev / ev_ebit` when the page lacks it.
fn ebit_of(fields: &RawTickerFields) -> f64 {
    if fields.contains("ebit") {
        return fields.number("ebit");
    }
    let ev_ebit = fields.number("ev_ebit");
    if ev_ebit == 0.0 {
        0.0
    } else {
        finite_or_zero(fields.number("ev") / ev_ebit)
    }
}

fn indexes_of(fields: &RawTickerFields) -> Vec<String> {
    if !fields.contains("indexes") {
        return Vec::new();
    }
    fields
        .text("indexes")
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn value_ticker(fields: &RawTickerFields, params: GrahamParams) -> TickerRecord {
    let vpa = fields.number("vpa");
    let lpa = fields.number("lpa");
    let current_price = fields.number("price");
    let vi = graham_vi(vpa, lpa, params);

    TickerRecord {
        symbol: fields.text("ticker"),
        roic: fields.number("roic"),
        vpa,
        lpa,
        p_l: fields.number("p_l"),
        p_vp: fields.number("p_vp"),
        dividend_yield: fields.number("dy"),
        current_price,
        earning_yield: earning_yield(fields),
        graham_vi: vi,
        graham_upside: graham_upside(current_price, vi),
        ebit: ebit_of(fields),
        market_cap: fields.number("market_cap"),
        sector: if fields.contains("sector") {
            fields.text("sector")
        } else {
            NOT_FOUND.to_string()
        },
        indexes: indexes_of(fields),
    }
}

/// Recomputes the Graham columns of an already valued record.
pub fn revalue_graham(record: &mut TickerRecord, params: GrahamParams) {
    record.graham_vi = graham_vi(record.vpa, record.lpa, params);
    record.graham_upside = graham_upside(record.current_price, record.graham_vi);
}
