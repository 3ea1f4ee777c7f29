use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::ProviderId;

/// Analyst consensus on an ordered scale, worst to best.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AnalystConsensus {
    Sell,
    Underperform,
    Hold,
    Outperform,
    Buy,
}

impl AnalystConsensus {
    /// Position on the Sell..Buy scale (0..=4).
    pub fn index(self) -> u8 {
        match self {
            AnalystConsensus::Sell => 0,
            AnalystConsensus::Underperform => 1,
            AnalystConsensus::Hold => 2,
            AnalystConsensus::Outperform => 3,
            AnalystConsensus::Buy => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AnalystConsensus::Sell => "Sell",
            AnalystConsensus::Underperform => "Underperform",
            AnalystConsensus::Hold => "Hold",
            AnalystConsensus::Outperform => "Outperform",
            AnalystConsensus::Buy => "Buy",
        }
    }
}

/// MSCI ESG letter rating, best to worst. Derived `Ord` follows declaration
/// order, so a smaller rating is a better one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum MsciEsgRating {
    #[serde(rename = "AAA")]
    Aaa,
    #[serde(rename = "AA")]
    Aa,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "BBB")]
    Bbb,
    #[serde(rename = "BB")]
    Bb,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "CCC")]
    Ccc,
}

impl MsciEsgRating {
    /// Rank on the AAA..CCC scale (0 = AAA).
    pub fn rank(self) -> u8 {
        match self {
            MsciEsgRating::Aaa => 0,
            MsciEsgRating::Aa => 1,
            MsciEsgRating::A => 2,
            MsciEsgRating::Bbb => 3,
            MsciEsgRating::Bb => 4,
            MsciEsgRating::B => 5,
            MsciEsgRating::Ccc => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MsciEsgRating::Aaa => "AAA",
            MsciEsgRating::Aa => "AA",
            MsciEsgRating::A => "A",
            MsciEsgRating::Bbb => "BBB",
            MsciEsgRating::Bb => "BB",
            MsciEsgRating::B => "B",
            MsciEsgRating::Ccc => "CCC",
        }
    }
}

/// Per-bucket analyst rating counts. Fixed keys, compared per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalystRatings {
    pub sell: u32,
    pub underperform: u32,
    pub hold: u32,
    pub outperform: u32,
    pub buy: u32,
}

/// A tracked stock: identity, raw per-provider attributes, and the derived
/// scores recomputed from them on every write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub ticker: String,
    pub name: String,
    pub isin: Option<String>,
    pub country: Option<String>,

    // Morningstar
    pub morningstar_id: Option<String>,
    pub morningstar_last_fetch: Option<DateTime<Utc>>,
    pub star_rating: Option<u8>,
    pub morningstar_fair_value: Option<f64>,
    pub last_close: Option<f64>,

    // MarketScreener
    pub market_screener_id: Option<String>,
    pub market_screener_last_fetch: Option<DateTime<Utc>>,
    pub analyst_consensus: Option<AnalystConsensus>,
    pub analyst_count: Option<u32>,
    pub analyst_target_price: Option<f64>,
    pub analyst_ratings: Option<AnalystRatings>,

    // MSCI
    pub msci_id: Option<String>,
    pub msci_last_fetch: Option<DateTime<Utc>>,
    pub msci_esg_rating: Option<MsciEsgRating>,
    pub msci_temperature: Option<f64>,

    // LSEG
    pub lseg_id: Option<String>,
    pub lseg_last_fetch: Option<DateTime<Utc>>,
    pub lseg_esg_score: Option<u8>,
    pub lseg_emissions: Option<u8>,

    // S&P
    pub sp_id: Option<String>,
    pub sp_last_fetch: Option<DateTime<Utc>>,
    pub sp_esg_score: Option<u8>,

    // Sustainalytics
    pub sustainalytics_id: Option<String>,
    pub sustainalytics_last_fetch: Option<DateTime<Utc>>,
    pub sustainalytics_esg_risk: Option<f64>,

    // Yahoo
    pub yahoo_id: Option<String>,
    pub yahoo_last_fetch: Option<DateTime<Utc>>,
    pub currency: Option<String>,
    pub low_52w: Option<f64>,
    pub high_52w: Option<f64>,
    pub prices_1y: Option<Vec<f64>>,
    pub prices_1mo: Option<Vec<f64>>,

    // Derived, never written directly
    #[serde(default)]
    pub financial_score: f64,
    #[serde(default)]
    pub esg_score: f64,
    #[serde(default)]
    pub total_score: f64,
    pub morningstar_fair_value_percentage_to_last_close: Option<f64>,
    pub analyst_target_price_percentage_to_last_close: Option<f64>,
    pub position_in_52w: Option<f64>,
}

impl Stock {
    pub fn new(ticker: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// The stock's external identifier for a provider, if one is set and
    /// non-empty.
    pub fn identifier(&self, provider: ProviderId) -> Option<&str> {
        let id = match provider {
            ProviderId::Morningstar => &self.morningstar_id,
            ProviderId::MarketScreener => &self.market_screener_id,
            ProviderId::Msci => &self.msci_id,
            ProviderId::Lseg => &self.lseg_id,
            ProviderId::Sp => &self.sp_id,
            ProviderId::Sustainalytics => &self.sustainalytics_id,
            ProviderId::Yahoo => &self.yahoo_id,
        };
        id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn last_fetch(&self, provider: ProviderId) -> Option<DateTime<Utc>> {
        match provider {
            ProviderId::Morningstar => self.morningstar_last_fetch,
            ProviderId::MarketScreener => self.market_screener_last_fetch,
            ProviderId::Msci => self.msci_last_fetch,
            ProviderId::Lseg => self.lseg_last_fetch,
            ProviderId::Sp => self.sp_last_fetch,
            ProviderId::Sustainalytics => self.sustainalytics_last_fetch,
            ProviderId::Yahoo => self.yahoo_last_fetch,
        }
    }

    /// Whether any metric owned by `provider` currently holds a value.
    /// Drives the regression-vs-new alerting asymmetry on fetch failure.
    pub fn has_any_owned_value(&self, provider: ProviderId) -> bool {
        provider
            .descriptor()
            .owned_fields
            .iter()
            .any(|field| self.field_is_set(*field))
    }
}

/// Per-job fetch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Restrict the job to a single stock.
    pub ticker: Option<String>,
    /// Ignore the provider TTL and refetch everything eligible.
    pub no_skip: bool,
    /// Wipe the provider's attributes before applying fetched values.
    pub clear: bool,
    /// Worker count; `None` uses the provider default.
    pub concurrency: Option<usize>,
}

impl FetchOptions {
    pub fn for_ticker(ticker: impl Into<String>) -> Self {
        Self {
            ticker: Some(ticker.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consensus_scale_is_ordered() {
        assert!(AnalystConsensus::Sell < AnalystConsensus::Buy);
        assert_eq!(AnalystConsensus::Hold.index(), 2);
        assert_eq!(AnalystConsensus::Buy.index(), 4);
    }

    #[test]
    fn msci_rating_smaller_is_better() {
        assert!(MsciEsgRating::Aaa < MsciEsgRating::Ccc);
        assert_eq!(MsciEsgRating::Bbb.rank(), 3);
    }

    #[test]
    fn empty_identifier_does_not_count() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        assert_eq!(stock.identifier(ProviderId::Msci), None);

        stock.msci_id = Some(String::new());
        assert_eq!(stock.identifier(ProviderId::Msci), None);

        stock.msci_id = Some("apple-inc".to_string());
        assert_eq!(stock.identifier(ProviderId::Msci), Some("apple-inc"));
    }

    #[test]
    fn msci_rating_serializes_as_letters() {
        let json = serde_json::to_string(&MsciEsgRating::Aa).unwrap();
        assert_eq!(json, "\"AA\"");
        let back: MsciEsgRating = serde_json::from_str("\"CCC\"").unwrap();
        assert_eq!(back, MsciEsgRating::Ccc);
    }
}
