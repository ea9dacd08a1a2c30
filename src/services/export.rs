// src/services/export.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::Writer;

use crate::models::RankedStock;

pub const EXPORT_COLUMNS: [&str; 16] = [
    "symbol",
    "roic",
    "vpa",
    "lpa",
    "p_l",
    "p_vp",
    "dividend_yield",
    "current_price",
    "earning_yield",
    "graham_vi",
    "graham_upside",
    "ebit",
    "market_cap",
    "roic_rank",
    "earning_yield_rank",
    "magic_index",
];

pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("magic_formula_{}.csv", now.format("%Y%m%d%H%M%S"))
}

/// One header row, then one row per stock in the given order.
pub fn to_csv(stocks: &[RankedStock]) -> Result<Vec<u8>> {
    let mut wtr = Writer::from_writer(Vec::new());
    wtr.write_record(EXPORT_COLUMNS)?;

    for stock in stocks {
        let r = &stock.record;
        wtr.write_record(&[
            r.symbol.clone(),
            r.roic.to_string(),
            r.vpa.to_string(),
            r.lpa.to_string(),
            r.p_l.to_string(),
            r.p_vp.to_string(),
            r.dividend_yield.to_string(),
            r.current_price.to_string(),
            r.earning_yield.to_string(),
            r.graham_vi.to_string(),
            r.graham_upside.to_string(),
            r.ebit.to_string(),
            r.market_cap.to_string(),
            stock.roic_rank.to_string(),
            stock.earning_yield_rank.to_string(),
            stock.magic_index.to_string(),
        ])?;
    }

    Ok(wtr.into_inner().map_err(|e| e.into_error())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TickerRecord;
    use chrono::TimeZone;
    use csv::Reader;

    fn stock(symbol: &str, magic_index: usize) -> RankedStock {
        RankedStock {
            record: TickerRecord {
                symbol: symbol.to_string(),
                roic: 12.5,
                vpa: 10.0,
                lpa: 5.0,
                p_l: 4.0,
                p_vp: 2.0,
                dividend_yield: 6.1,
                current_price: 20.0,
                earning_yield: 0.25,
                graham_vi: 33.54,
                graham_upside: 0.68,
                ebit: 250.0,
                market_cap: 1000.0,
                sector: "Energia".into(),
                indexes: vec!["IBOV".into()],
            },
            roic_rank: 1,
            earning_yield_rank: magic_index - 1,
            magic_index,
        }
    }

    #[test]
    fn header_and_rows_keep_order() {
        let bytes = to_csv(&[stock("AAAA3", 1), stock("BBBB3", 3)]).unwrap();
        let mut rdr = Reader::from_reader(bytes.as_slice());

        let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, EXPORT_COLUMNS.to_vec());

        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "AAAA3");
        assert_eq!(&rows[1][0], "BBBB3");
        assert_eq!(&rows[0][9], "33.54");
        assert_eq!(&rows[1][15], "3");
    }

    #[test]
    fn empty_export_still_has_header() {
        let bytes = to_csv(&[]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("symbol,roic,vpa"));
    }

    #[test]
    fn filename_is_timestamped() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(export_filename(now), "magic_formula_20240309140507.csv");
    }
}
