use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Stock;

/// Every patchable attribute of a [`Stock`]. Derived scores are absent on
/// purpose: they are recomputed, never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeField {
    Name,
    Isin,
    Country,

    MorningstarId,
    MorningstarLastFetch,
    StarRating,
    MorningstarFairValue,
    LastClose,

    MarketScreenerId,
    MarketScreenerLastFetch,
    AnalystConsensus,
    AnalystCount,
    AnalystTargetPrice,
    AnalystRatings,

    MsciId,
    MsciLastFetch,
    MsciEsgRating,
    MsciTemperature,

    LsegId,
    LsegLastFetch,
    LsegEsgScore,
    LsegEmissions,

    SpId,
    SpLastFetch,
    SpEsgScore,

    SustainalyticsId,
    SustainalyticsLastFetch,
    SustainalyticsEsgRisk,

    YahooId,
    YahooLastFetch,
    Currency,
    Low52w,
    High52w,
    Prices1y,
    Prices1mo,
}

impl AttributeField {
    /// Stable snake_case name, identical to the JSON patch key.
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeField::Name => "name",
            AttributeField::Isin => "isin",
            AttributeField::Country => "country",
            AttributeField::MorningstarId => "morningstar_id",
            AttributeField::MorningstarLastFetch => "morningstar_last_fetch",
            AttributeField::StarRating => "star_rating",
            AttributeField::MorningstarFairValue => "morningstar_fair_value",
            AttributeField::LastClose => "last_close",
            AttributeField::MarketScreenerId => "market_screener_id",
            AttributeField::MarketScreenerLastFetch => "market_screener_last_fetch",
            AttributeField::AnalystConsensus => "analyst_consensus",
            AttributeField::AnalystCount => "analyst_count",
            AttributeField::AnalystTargetPrice => "analyst_target_price",
            AttributeField::AnalystRatings => "analyst_ratings",
            AttributeField::MsciId => "msci_id",
            AttributeField::MsciLastFetch => "msci_last_fetch",
            AttributeField::MsciEsgRating => "msci_esg_rating",
            AttributeField::MsciTemperature => "msci_temperature",
            AttributeField::LsegId => "lseg_id",
            AttributeField::LsegLastFetch => "lseg_last_fetch",
            AttributeField::LsegEsgScore => "lseg_esg_score",
            AttributeField::LsegEmissions => "lseg_emissions",
            AttributeField::SpId => "sp_id",
            AttributeField::SpLastFetch => "sp_last_fetch",
            AttributeField::SpEsgScore => "sp_esg_score",
            AttributeField::SustainalyticsId => "sustainalytics_id",
            AttributeField::SustainalyticsLastFetch => "sustainalytics_last_fetch",
            AttributeField::SustainalyticsEsgRisk => "sustainalytics_esg_risk",
            AttributeField::YahooId => "yahoo_id",
            AttributeField::YahooLastFetch => "yahoo_last_fetch",
            AttributeField::Currency => "currency",
            AttributeField::Low52w => "low_52w",
            AttributeField::High52w => "high_52w",
            AttributeField::Prices1y => "prices_1y",
            AttributeField::Prices1mo => "prices_1mo",
        }
    }
}

impl fmt::Display for AttributeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Stock {
    /// Whether the field currently holds a value.
    pub fn field_is_set(&self, field: AttributeField) -> bool {
        match field {
            AttributeField::Name => !self.name.is_empty(),
            AttributeField::Isin => self.isin.is_some(),
            AttributeField::Country => self.country.is_some(),
            AttributeField::MorningstarId => self.morningstar_id.is_some(),
            AttributeField::MorningstarLastFetch => self.morningstar_last_fetch.is_some(),
            AttributeField::StarRating => self.star_rating.is_some(),
            AttributeField::MorningstarFairValue => self.morningstar_fair_value.is_some(),
            AttributeField::LastClose => self.last_close.is_some(),
            AttributeField::MarketScreenerId => self.market_screener_id.is_some(),
            AttributeField::MarketScreenerLastFetch => {
                self.market_screener_last_fetch.is_some()
            }
            AttributeField::AnalystConsensus => self.analyst_consensus.is_some(),
            AttributeField::AnalystCount => self.analyst_count.is_some(),
            AttributeField::AnalystTargetPrice => self.analyst_target_price.is_some(),
            AttributeField::AnalystRatings => self.analyst_ratings.is_some(),
            AttributeField::MsciId => self.msci_id.is_some(),
            AttributeField::MsciLastFetch => self.msci_last_fetch.is_some(),
            AttributeField::MsciEsgRating => self.msci_esg_rating.is_some(),
            AttributeField::MsciTemperature => self.msci_temperature.is_some(),
            AttributeField::LsegId => self.lseg_id.is_some(),
            AttributeField::LsegLastFetch => self.lseg_last_fetch.is_some(),
            AttributeField::LsegEsgScore => self.lseg_esg_score.is_some(),
            AttributeField::LsegEmissions => self.lseg_emissions.is_some(),
            AttributeField::SpId => self.sp_id.is_some(),
            AttributeField::SpLastFetch => self.sp_last_fetch.is_some(),
            AttributeField::SpEsgScore => self.sp_esg_score.is_some(),
            AttributeField::SustainalyticsId => self.sustainalytics_id.is_some(),
            AttributeField::SustainalyticsLastFetch => {
                self.sustainalytics_last_fetch.is_some()
            }
            AttributeField::SustainalyticsEsgRisk => self.sustainalytics_esg_risk.is_some(),
            AttributeField::YahooId => self.yahoo_id.is_some(),
            AttributeField::YahooLastFetch => self.yahoo_last_fetch.is_some(),
            AttributeField::Currency => self.currency.is_some(),
            AttributeField::Low52w => self.low_52w.is_some(),
            AttributeField::High52w => self.high_52w.is_some(),
            AttributeField::Prices1y => self.prices_1y.is_some(),
            AttributeField::Prices1mo => self.prices_1mo.is_some(),
        }
    }

    /// Erase a field. Required identity fields cannot be erased and are left
    /// untouched.
    pub fn clear_field(&mut self, field: AttributeField) {
        match field {
            AttributeField::Name => {}
            AttributeField::Isin => self.isin = None,
            AttributeField::Country => self.country = None,
            AttributeField::MorningstarId => self.morningstar_id = None,
            AttributeField::MorningstarLastFetch => self.morningstar_last_fetch = None,
            AttributeField::StarRating => self.star_rating = None,
            AttributeField::MorningstarFairValue => self.morningstar_fair_value = None,
            AttributeField::LastClose => self.last_close = None,
            AttributeField::MarketScreenerId => self.market_screener_id = None,
            AttributeField::MarketScreenerLastFetch => self.market_screener_last_fetch = None,
            AttributeField::AnalystConsensus => self.analyst_consensus = None,
            AttributeField::AnalystCount => self.analyst_count = None,
            AttributeField::AnalystTargetPrice => self.analyst_target_price = None,
            AttributeField::AnalystRatings => self.analyst_ratings = None,
            AttributeField::MsciId => self.msci_id = None,
            AttributeField::MsciLastFetch => self.msci_last_fetch = None,
            AttributeField::MsciEsgRating => self.msci_esg_rating = None,
            AttributeField::MsciTemperature => self.msci_temperature = None,
            AttributeField::LsegId => self.lseg_id = None,
            AttributeField::LsegLastFetch => self.lseg_last_fetch = None,
            AttributeField::LsegEsgScore => self.lseg_esg_score = None,
            AttributeField::LsegEmissions => self.lseg_emissions = None,
            AttributeField::SpId => self.sp_id = None,
            AttributeField::SpLastFetch => self.sp_last_fetch = None,
            AttributeField::SpEsgScore => self.sp_esg_score = None,
            AttributeField::SustainalyticsId => self.sustainalytics_id = None,
            AttributeField::SustainalyticsLastFetch => self.sustainalytics_last_fetch = None,
            AttributeField::SustainalyticsEsgRisk => self.sustainalytics_esg_risk = None,
            AttributeField::YahooId => self.yahoo_id = None,
            AttributeField::YahooLastFetch => self.yahoo_last_fetch = None,
            AttributeField::Currency => self.currency = None,
            AttributeField::Low52w => self.low_52w = None,
            AttributeField::High52w => self.high_52w = None,
            AttributeField::Prices1y => self.prices_1y = None,
            AttributeField::Prices1mo => self.prices_1mo = None,
        }
    }

    /// Short human rendering of a field's current value, for change digests.
    pub fn render_field(&self, field: AttributeField) -> Option<String> {
        match field {
            AttributeField::Name => Some(self.name.clone()).filter(|n| !n.is_empty()),
            AttributeField::Isin => self.isin.clone(),
            AttributeField::Country => self.country.clone(),
            AttributeField::MorningstarId => self.morningstar_id.clone(),
            AttributeField::MorningstarLastFetch => {
                self.morningstar_last_fetch.map(|t| t.to_rfc3339())
            }
            AttributeField::StarRating => self.star_rating.map(|v| v.to_string()),
            AttributeField::MorningstarFairValue => {
                self.morningstar_fair_value.map(|v| format!("{v:.2}"))
            }
            AttributeField::LastClose => self.last_close.map(|v| format!("{v:.2}")),
            AttributeField::MarketScreenerId => self.market_screener_id.clone(),
            AttributeField::MarketScreenerLastFetch => {
                self.market_screener_last_fetch.map(|t| t.to_rfc3339())
            }
            AttributeField::AnalystConsensus => {
                self.analyst_consensus.map(|v| v.label().to_string())
            }
            AttributeField::AnalystCount => self.analyst_count.map(|v| v.to_string()),
            AttributeField::AnalystTargetPrice => {
                self.analyst_target_price.map(|v| format!("{v:.2}"))
            }
            AttributeField::AnalystRatings => self.analyst_ratings.as_ref().map(|r| {
                format!(
                    "{}/{}/{}/{}/{}",
                    r.sell, r.underperform, r.hold, r.outperform, r.buy
                )
            }),
            AttributeField::MsciId => self.msci_id.clone(),
            AttributeField::MsciLastFetch => self.msci_last_fetch.map(|t| t.to_rfc3339()),
            AttributeField::MsciEsgRating => {
                self.msci_esg_rating.map(|v| v.label().to_string())
            }
            AttributeField::MsciTemperature => {
                self.msci_temperature.map(|v| format!("{v:.1}\u{b0}C"))
            }
            AttributeField::LsegId => self.lseg_id.clone(),
            AttributeField::LsegLastFetch => self.lseg_last_fetch.map(|t| t.to_rfc3339()),
            AttributeField::LsegEsgScore => self.lseg_esg_score.map(|v| v.to_string()),
            AttributeField::LsegEmissions => self.lseg_emissions.map(|v| v.to_string()),
            AttributeField::SpId => self.sp_id.clone(),
            AttributeField::SpLastFetch => self.sp_last_fetch.map(|t| t.to_rfc3339()),
            AttributeField::SpEsgScore => self.sp_esg_score.map(|v| v.to_string()),
            AttributeField::SustainalyticsId => self.sustainalytics_id.clone(),
            AttributeField::SustainalyticsLastFetch => {
                self.sustainalytics_last_fetch.map(|t| t.to_rfc3339())
            }
            AttributeField::SustainalyticsEsgRisk => {
                self.sustainalytics_esg_risk.map(|v| format!("{v:.1}"))
            }
            AttributeField::YahooId => self.yahoo_id.clone(),
            AttributeField::YahooLastFetch => self.yahoo_last_fetch.map(|t| t.to_rfc3339()),
            AttributeField::Currency => self.currency.clone(),
            AttributeField::Low52w => self.low_52w.map(|v| format!("{v:.2}")),
            AttributeField::High52w => self.high_52w.map(|v| format!("{v:.2}")),
            AttributeField::Prices1y => self.prices_1y.as_ref().map(|p| format!("{} points", p.len())),
            AttributeField::Prices1mo => {
                self.prices_1mo.as_ref().map(|p| format!("{} points", p.len()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_round_trip_through_serde() {
        let json = serde_json::to_string(&AttributeField::MsciEsgRating).unwrap();
        assert_eq!(json, "\"msci_esg_rating\"");
        let back: AttributeField = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AttributeField::MsciEsgRating);
        assert_eq!(back.as_str(), "msci_esg_rating");
    }

    #[test]
    fn clear_field_never_touches_required_identity() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        stock.clear_field(AttributeField::Name);
        assert_eq!(stock.name, "Apple Inc.");
    }
}
