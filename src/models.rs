// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

pub const NOT_FOUND: &str = "Not found";

/// A single scraped value. Status Invest hands back numbers, text and nulls
/// in the same payload, so fields stay loosely typed until they are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

/// Raw per-ticker fields, merged from the universe listing and the ticker page.
/// Every read goes through `number`/`text`, which apply the documented defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTickerFields(HashMap<String, FieldValue>);

impl RawTickerFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.0.insert(key.into(), value);
    }

    pub fn set_number(&mut self, key: impl Into<String>, value: f64) {
        self.insert(key, FieldValue::Number(value));
    }

    pub fn set_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key, FieldValue::Text(value.into()));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    /// Numeric field, `0` when absent, unparseable or non-finite.
    pub fn number(&self, key: &str) -> f64 {
        let value = match self.0.get(key) {
            Some(FieldValue::Number(n)) => *n,
            Some(FieldValue::Text(s)) => parse_br_number(s).unwrap_or(0.0),
            None => 0.0,
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    /// Text field, `"Not found"` when absent.
    pub fn text(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(FieldValue::Text(s)) => s.clone(),
            Some(FieldValue::Number(n)) => n.to_string(),
            None => NOT_FOUND.to_string(),
        }
    }

    /// Overlays `other` on top of `self`; keys from `other` win.
    pub fn merge(&mut self, other: RawTickerFields) {
        self.0.extend(other.0);
    }

    /// Builds fields from one entry of the advanced-search JSON listing.
    /// Keys are lowercased (`p_L` -> `p_l`, `eV_Ebit` -> `ev_ebit`) and nulls dropped.
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut fields = RawTickerFields::new();
        for (key, value) in object {
            let key = canonical_key(&key.to_lowercase());
            match value {
                serde_json::Value::Number(n) => {
                    if let Some(n) = n.as_f64() {
                        fields.set_number(key, n);
                    }
                }
                serde_json::Value::String(s) => fields.set_text(key, s.clone()),
                serde_json::Value::Bool(b) => fields.set_text(key, b.to_string()),
                _ => {}
            }
        }
        fields
    }
}

fn canonical_key(key: &str) -> String {
    match key {
        "valormercado" => "market_cap".to_string(),
        "valorfirma" => "ev".to_string(),
        "setor" | "sectorname" => "sector".to_string(),
        other => other.to_string(),
    }
}

fn br_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^-?[\d.]*\d(,\d+)?%?$").expect("valid number pattern"))
}

/// Parses numbers in Brazilian notation: `1.234,56`, `12,5%`, `--%`.
pub fn parse_br_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw == "--%" || raw == "-" || raw == "--" {
        return Some(0.0);
    }
    if !br_number_pattern().is_match(raw) {
        return None;
    }
    raw.replace('.', "")
        .replace('%', "")
        .replace(',', ".")
        .parse::<f64>()
        .ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerRecord {
    pub symbol: String,
    pub roic: f64,
    pub vpa: f64,
    pub lpa: f64,
    pub p_l: f64,
    pub p_vp: f64,
    pub dividend_yield: f64,
    pub current_price: f64,
    pub earning_yield: f64,
    pub graham_vi: f64,
    pub graham_upside: f64,
    pub ebit: f64,
    pub market_cap: f64,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl TickerRecord {
    pub fn in_any_index(&self, wanted: &[String]) -> bool {
        self.indexes
            .iter()
            .any(|idx| wanted.iter().any(|w| w.eq_ignore_ascii_case(idx)))
    }
}

/// The full valued universe for one harvest cycle, as published to the result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseSnapshot {
    pub generated_at: DateTime<Utc>,
    pub records: Vec<TickerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStock {
    #[serde(flatten)]
    pub record: TickerRecord,
    pub roic_rank: usize,
    pub earning_yield_rank: usize,
    pub magic_index: usize,
}
