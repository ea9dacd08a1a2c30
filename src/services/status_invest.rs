// src/services/status_invest.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use std::time::Duration;

use crate::models::{parse_br_number, FieldValue, RawTickerFields};

use super::harvester::TickerSource;

const BASE_URL: &str = "https://statusinvest.com.br";
const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko)";
const LEGEND_CLASS: &str = "title m-0 legend-tooltip";

/// Client for the Status Invest listing endpoint and ticker pages.
pub struct StatusInvestClient {
    client: Client,
    base_url: String,
}

impl StatusInvestClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TickerSource for StatusInvestClient {
    async fn fetch_universe(&self) -> Result<Vec<RawTickerFields>> {
        let url = format!("{}/category/advancedsearchresult", self.base_url);
        let search = json!({
            "Sector": "",
            "SubSector": "",
            "Segment": "",
            "my_range": "0;25",
        });
        info!("Fetching ticker universe from {}", url);

        let body: Value = self
            .client
            .get(&url)
            .header("accept", "*/*")
            .header("x-requested-with", "XMLHttpRequest")
            .query(&[("search", search.to_string()), ("CategoryType", "1".to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let universe = parse_universe(&body)?;
        info!("Universe listing returned {} tickers", universe.len());
        Ok(universe)
    }

    async fn fetch_raw_fields(&self, ticker: &str) -> Result<RawTickerFields> {
        let url = format!("{}/acoes/{}", self.base_url, ticker.to_lowercase());
        debug!("Fetching ticker page {}", url);

        let html = self
            .client
            .get(&url)
            .header("accept", "*/*")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let fields = parse_stock_page(&html)?;
        if fields.is_empty() {
            return Err(anyhow!("no indicators found on page for {}", ticker));
        }
        Ok(fields.into_fields())
    }
}

/// The listing comes back either as a bare array or wrapped in `{"list": [...]}`.
pub fn parse_universe(body: &Value) -> Result<Vec<RawTickerFields>> {
    let entries = match body {
        Value::Array(entries) => entries,
        Value::Object(map) => map
            .get("list")
            .and_then(Value::as_array)
            .context("listing response has no `list` array")?,
        _ => return Err(anyhow!("unexpected listing response shape")),
    };

    Ok(entries
        .iter()
        .filter_map(Value::as_object)
        .map(RawTickerFields::from_json_object)
        .filter(|fields| fields.contains("ticker"))
        .collect())
}

/// Label/value pairs scraped from one ticker page.
#[derive(Debug, Default)]
pub struct PageFields {
    fields: RawTickerFields,
    count: usize,
}

impl PageFields {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn into_fields(self) -> RawTickerFields {
        self.fields
    }

    fn push(&mut self, label: &str, raw: &str) {
        let key = page_key(label);
        let value = match parse_br_number(raw) {
            Some(n) => FieldValue::Number(n),
            None => FieldValue::Text(raw.to_string()),
        };
        self.fields.insert(key, value);
        self.count += 1;
    }
}

fn page_key(label: &str) -> String {
    match label {
        "Valor de firma" => "ev".to_string(),
        "Valor de mercado" => "market_cap".to_string(),
        "Setor de Atuação" => "sector".to_string(),
        "Subsetor de Atuação" => "subsector".to_string(),
        "Segmento de Atuação" => "segment".to_string(),
        other => other.to_string(),
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {}: {:?}", css, e))
}

fn own_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Pairs each label in `block` with the `strong` that follows it.
fn collect_pairs(block: ElementRef, children: &Selector, page: &mut PageFields) {
    let mut label = String::new();
    for child in block.select(children) {
        if child.value().attr("class") == Some(LEGEND_CLASS) {
            continue;
        }
        let text = own_text(&child);
        if text.is_empty() {
            continue;
        }
        match child.value().name() {
            "strong" if !label.is_empty() => page.push(&label, &text),
            "strong" => {}
            _ => label = text,
        }
    }
}

/// Walks the company section. Indicator blocks are labelled by `h3` or by
/// `span.d-inline-block.mr-2`; the sector block in `top-info` accepts any
/// `span` as a label. The value is the next `strong`.
pub fn parse_stock_page(html: &str) -> Result<PageFields> {
    let document = Html::parse_document(html);
    let info_blocks = selector("div#company-section div.info")?;
    let indicator_children = selector("strong, h3, span.d-inline-block.mr-2")?;
    let sector_blocks = selector("div#company-section div.top-info div.info")?;
    let sector_children = selector("strong, span")?;
    let index_links = selector("a[href^=\"/indices/\"]")?;

    let mut page = PageFields::default();
    for block in document.select(&info_blocks) {
        collect_pairs(block, &indicator_children, &mut page);
    }
    for block in document.select(&sector_blocks) {
        collect_pairs(block, &sector_children, &mut page);
    }

    let indexes: Vec<String> = document
        .select(&index_links)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| href.trim_end_matches('/').rsplit('/').next())
        .filter(|slug| !slug.is_empty())
        .map(|slug| slug.to_uppercase())
        .collect();
    if !indexes.is_empty() {
        page.fields.set_text("indexes", indexes.join(","));
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <html><body>
      <div id="company-section">
        <div class="top-info top-info-1 top-info-sm-2 top-info-md-n sm d-flex justify-between">
          <div class="info">
            <div><div>
              <span class="sub-value">Setor de Atuação</span>
              <strong class="value">Bens Industriais</strong>
            </div></div>
          </div>
        </div>
        <div class="info">
          <div><div>
            <h3 class="title m-0">Valor de mercado</h3>
            <span class="icon">R$</span>
            <strong class="value">1.000,00</strong>
          </div></div>
        </div>
        <div class="info">
          <div><div>
            <span class="d-inline-block mr-2">P/L</span>
            <strong class="value">6,50</strong>
          </div></div>
        </div>
        <div class="info">
          <div><div>
            <h3 class="title m-0">Valor de firma</h3>
            <span class="title m-0 legend-tooltip">ajuda</span>
            <strong class="value">145.300.000,00</strong>
          </div></div>
        </div>
        <div class="info">
          <div><div>
            <h3 class="title m-0">Dívida líquida</h3>
            <strong class="value">--%</strong>
          </div></div>
        </div>
        <a href="/indices/ibovespa">Ibovespa</a>
        <a href="/indices/ibrx-100/">IBrX 100</a>
      </div>
    </body></html>
    "#;

    #[test]
    fn parses_company_section() {
        let page = parse_stock_page(PAGE).unwrap();
        assert!(!page.is_empty());
        let fields = page.into_fields();
        assert_eq!(fields.number("ev"), 145_300_000.0);
        assert_eq!(fields.text("sector"), "Bens Industriais");
        assert_eq!(fields.number("market_cap"), 1000.0);
        assert!(!fields.contains("R$"));
        assert_eq!(fields.number("P/L"), 6.5);
        assert_eq!(fields.number("Dívida líquida"), 0.0);
        assert_eq!(fields.text("indexes"), "IBOVESPA,IBRX-100");
    }

    #[test]
    fn decorative_spans_are_not_labels() {
        let html = r#"<div id="company-section"><div class="info"><div><div>
            <h3 class="title m-0">Valor de mercado</h3>
            <span class="icon">R$</span>
            <span class="sub-value">bilhões</span>
            <strong class="value">2.500,00</strong>
        </div></div></div></div>"#;
        let fields = parse_stock_page(html).unwrap().into_fields();
        assert_eq!(fields.number("market_cap"), 2500.0);
        assert!(!fields.contains("bilhões"));
    }

    #[test]
    fn empty_page_yields_no_fields() {
        let page = parse_stock_page("<html><body><p>captcha</p></body></html>").unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn universe_accepts_both_shapes() {
        let bare = json!([{"ticker": "VALE3", "roic": 20.1}, {"companyName": "no ticker"}]);
        let wrapped = json!({"list": [{"ticker": "WEGE3"}]});

        let from_bare = parse_universe(&bare).unwrap();
        assert_eq!(from_bare.len(), 1);
        assert_eq!(from_bare[0].number("roic"), 20.1);
        assert_eq!(parse_universe(&wrapped).unwrap()[0].text("ticker"), "WEGE3");
        assert!(parse_universe(&json!("oops")).is_err());
    }
}
