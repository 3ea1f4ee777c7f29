use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RatingsError;
use crate::fields::AttributeField;
use crate::providers::ProviderId;
use crate::types::{AnalystConsensus, AnalystRatings, MsciEsgRating, Stock};

/// A tri-state edit for one field: leave it alone, erase it, or replace it.
///
/// JSON mapping: an absent key is `Keep`, an explicit `null` is `Clear`, a
/// value is `Set`. Omission and explicit null are distinct operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

// Hand-written so the impl carries no `T: Default` bound; several field
// types (timestamps, rating enums) have no Default of their own.
impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(v) => Some(v),
            _ => None,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // A present key deserializes here; absence is handled by the
        // container-level default, which yields Keep.
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        })
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Keep is skipped via skip_serializing_if; serializing it anyway
            // would be indistinguishable from Clear.
            Patch::Keep | Patch::Clear => serializer.serialize_none(),
            Patch::Set(v) => v.serialize(serializer),
        }
    }
}

/// A proposed set of attribute edits for one stock. Field names match the
/// entity schema; anything else is rejected as an invalid request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StockPatch {
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub name: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub isin: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub country: Patch<String>,

    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub morningstar_id: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub morningstar_last_fetch: Patch<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub star_rating: Patch<u8>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub morningstar_fair_value: Patch<f64>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub last_close: Patch<f64>,

    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub market_screener_id: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub market_screener_last_fetch: Patch<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub analyst_consensus: Patch<AnalystConsensus>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub analyst_count: Patch<u32>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub analyst_target_price: Patch<f64>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub analyst_ratings: Patch<AnalystRatings>,

    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub msci_id: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub msci_last_fetch: Patch<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub msci_esg_rating: Patch<MsciEsgRating>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub msci_temperature: Patch<f64>,

    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub lseg_id: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub lseg_last_fetch: Patch<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub lseg_esg_score: Patch<u8>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub lseg_emissions: Patch<u8>,

    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub sp_id: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub sp_last_fetch: Patch<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub sp_esg_score: Patch<u8>,

    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub sustainalytics_id: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub sustainalytics_last_fetch: Patch<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub sustainalytics_esg_risk: Patch<f64>,

    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub yahoo_id: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub yahoo_last_fetch: Patch<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub currency: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub low_52w: Patch<f64>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub high_52w: Patch<f64>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub prices_1y: Patch<Vec<f64>>,
    #[serde(skip_serializing_if = "Patch::is_keep")]
    pub prices_1mo: Patch<Vec<f64>>,
}

fn diff<T: PartialEq>(
    changed: &mut Vec<AttributeField>,
    field: AttributeField,
    patch: &Patch<T>,
    current: Option<&T>,
) {
    match patch {
        Patch::Keep => {}
        Patch::Clear => {
            if current.is_some() {
                changed.push(field);
            }
        }
        Patch::Set(v) => {
            if current != Some(v) {
                changed.push(field);
            }
        }
    }
}

fn apply<T: Clone>(patch: &Patch<T>, slot: &mut Option<T>) {
    match patch {
        Patch::Keep => {}
        Patch::Clear => *slot = None,
        Patch::Set(v) => *slot = Some(v.clone()),
    }
}

impl StockPatch {
    /// Parse a JSON proposal, rejecting fields unknown to the entity schema.
    pub fn from_json(value: serde_json::Value) -> Result<Self, RatingsError> {
        let patch: StockPatch = serde_json::from_value(value)
            .map_err(|e| RatingsError::InvalidRequest(e.to_string()))?;
        patch.validate()?;
        Ok(patch)
    }

    /// Range and shape checks that serde cannot express.
    pub fn validate(&self) -> Result<(), RatingsError> {
        if matches!(self.name, Patch::Clear) {
            return Err(RatingsError::InvalidRequest(
                "name cannot be cleared".to_string(),
            ));
        }
        if let Some(stars) = self.star_rating.as_set() {
            if !(1..=5).contains(stars) {
                return Err(RatingsError::InvalidRequest(format!(
                    "star_rating must be 1..=5, got {stars}"
                )));
            }
        }
        for (field, value) in [
            (AttributeField::LsegEsgScore, self.lseg_esg_score.as_set()),
            (AttributeField::LsegEmissions, self.lseg_emissions.as_set()),
            (AttributeField::SpEsgScore, self.sp_esg_score.as_set()),
        ] {
            if let Some(score) = value {
                if *score > 100 {
                    return Err(RatingsError::InvalidRequest(format!(
                        "{field} must be 0..=100, got {score}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == StockPatch::default()
    }

    /// The fields this patch would actually change on `current`. Edits that
    /// restate the present value (element-wise for sequences, per-key for
    /// rating maps) are dropped, so a refetch producing an identical payload
    /// is a no-op.
    pub fn changed_fields(&self, current: &Stock) -> Vec<AttributeField> {
        let mut changed = Vec::new();
        if let Patch::Set(name) = &self.name {
            if *name != current.name {
                changed.push(AttributeField::Name);
            }
        }
        diff(&mut changed, AttributeField::Isin, &self.isin, current.isin.as_ref());
        diff(
            &mut changed,
            AttributeField::Country,
            &self.country,
            current.country.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::MorningstarId,
            &self.morningstar_id,
            current.morningstar_id.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::MorningstarLastFetch,
            &self.morningstar_last_fetch,
            current.morningstar_last_fetch.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::StarRating,
            &self.star_rating,
            current.star_rating.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::MorningstarFairValue,
            &self.morningstar_fair_value,
            current.morningstar_fair_value.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::LastClose,
            &self.last_close,
            current.last_close.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::MarketScreenerId,
            &self.market_screener_id,
            current.market_screener_id.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::MarketScreenerLastFetch,
            &self.market_screener_last_fetch,
            current.market_screener_last_fetch.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::AnalystConsensus,
            &self.analyst_consensus,
            current.analyst_consensus.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::AnalystCount,
            &self.analyst_count,
            current.analyst_count.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::AnalystTargetPrice,
            &self.analyst_target_price,
            current.analyst_target_price.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::AnalystRatings,
            &self.analyst_ratings,
            current.analyst_ratings.as_ref(),
        );
        diff(&mut changed, AttributeField::MsciId, &self.msci_id, current.msci_id.as_ref());
        diff(
            &mut changed,
            AttributeField::MsciLastFetch,
            &self.msci_last_fetch,
            current.msci_last_fetch.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::MsciEsgRating,
            &self.msci_esg_rating,
            current.msci_esg_rating.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::MsciTemperature,
            &self.msci_temperature,
            current.msci_temperature.as_ref(),
        );
        diff(&mut changed, AttributeField::LsegId, &self.lseg_id, current.lseg_id.as_ref());
        diff(
            &mut changed,
            AttributeField::LsegLastFetch,
            &self.lseg_last_fetch,
            current.lseg_last_fetch.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::LsegEsgScore,
            &self.lseg_esg_score,
            current.lseg_esg_score.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::LsegEmissions,
            &self.lseg_emissions,
            current.lseg_emissions.as_ref(),
        );
        diff(&mut changed, AttributeField::SpId, &self.sp_id, current.sp_id.as_ref());
        diff(
            &mut changed,
            AttributeField::SpLastFetch,
            &self.sp_last_fetch,
            current.sp_last_fetch.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::SpEsgScore,
            &self.sp_esg_score,
            current.sp_esg_score.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::SustainalyticsId,
            &self.sustainalytics_id,
            current.sustainalytics_id.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::SustainalyticsLastFetch,
            &self.sustainalytics_last_fetch,
            current.sustainalytics_last_fetch.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::SustainalyticsEsgRisk,
            &self.sustainalytics_esg_risk,
            current.sustainalytics_esg_risk.as_ref(),
        );
        diff(&mut changed, AttributeField::YahooId, &self.yahoo_id, current.yahoo_id.as_ref());
        diff(
            &mut changed,
            AttributeField::YahooLastFetch,
            &self.yahoo_last_fetch,
            current.yahoo_last_fetch.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::Currency,
            &self.currency,
            current.currency.as_ref(),
        );
        diff(&mut changed, AttributeField::Low52w, &self.low_52w, current.low_52w.as_ref());
        diff(
            &mut changed,
            AttributeField::High52w,
            &self.high_52w,
            current.high_52w.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::Prices1y,
            &self.prices_1y,
            current.prices_1y.as_ref(),
        );
        diff(
            &mut changed,
            AttributeField::Prices1mo,
            &self.prices_1mo,
            current.prices_1mo.as_ref(),
        );
        changed
    }

    /// Merge the patch into `stock`. Keep leaves fields untouched, Clear
    /// erases, Set replaces.
    pub fn apply_to(&self, stock: &mut Stock) {
        if let Patch::Set(name) = &self.name {
            stock.name = name.clone();
        }
        apply(&self.isin, &mut stock.isin);
        apply(&self.country, &mut stock.country);
        apply(&self.morningstar_id, &mut stock.morningstar_id);
        apply(&self.morningstar_last_fetch, &mut stock.morningstar_last_fetch);
        apply(&self.star_rating, &mut stock.star_rating);
        apply(&self.morningstar_fair_value, &mut stock.morningstar_fair_value);
        apply(&self.last_close, &mut stock.last_close);
        apply(&self.market_screener_id, &mut stock.market_screener_id);
        apply(
            &self.market_screener_last_fetch,
            &mut stock.market_screener_last_fetch,
        );
        apply(&self.analyst_consensus, &mut stock.analyst_consensus);
        apply(&self.analyst_count, &mut stock.analyst_count);
        apply(&self.analyst_target_price, &mut stock.analyst_target_price);
        apply(&self.analyst_ratings, &mut stock.analyst_ratings);
        apply(&self.msci_id, &mut stock.msci_id);
        apply(&self.msci_last_fetch, &mut stock.msci_last_fetch);
        apply(&self.msci_esg_rating, &mut stock.msci_esg_rating);
        apply(&self.msci_temperature, &mut stock.msci_temperature);
        apply(&self.lseg_id, &mut stock.lseg_id);
        apply(&self.lseg_last_fetch, &mut stock.lseg_last_fetch);
        apply(&self.lseg_esg_score, &mut stock.lseg_esg_score);
        apply(&self.lseg_emissions, &mut stock.lseg_emissions);
        apply(&self.sp_id, &mut stock.sp_id);
        apply(&self.sp_last_fetch, &mut stock.sp_last_fetch);
        apply(&self.sp_esg_score, &mut stock.sp_esg_score);
        apply(&self.sustainalytics_id, &mut stock.sustainalytics_id);
        apply(
            &self.sustainalytics_last_fetch,
            &mut stock.sustainalytics_last_fetch,
        );
        apply(&self.sustainalytics_esg_risk, &mut stock.sustainalytics_esg_risk);
        apply(&self.yahoo_id, &mut stock.yahoo_id);
        apply(&self.yahoo_last_fetch, &mut stock.yahoo_last_fetch);
        apply(&self.currency, &mut stock.currency);
        apply(&self.low_52w, &mut stock.low_52w);
        apply(&self.high_52w, &mut stock.high_52w);
        apply(&self.prices_1y, &mut stock.prices_1y);
        apply(&self.prices_1mo, &mut stock.prices_1mo);
    }

    pub fn identifier_patch(&self, provider: ProviderId) -> &Patch<String> {
        match provider {
            ProviderId::Morningstar => &self.morningstar_id,
            ProviderId::MarketScreener => &self.market_screener_id,
            ProviderId::Msci => &self.msci_id,
            ProviderId::Lseg => &self.lseg_id,
            ProviderId::Sp => &self.sp_id,
            ProviderId::Sustainalytics => &self.sustainalytics_id,
            ProviderId::Yahoo => &self.yahoo_id,
        }
    }

    /// Whether this patch removes the provider identifier (explicit null or
    /// empty string). Triggers the cascade clear of the provider's fields.
    pub fn removes_identifier(&self, provider: ProviderId) -> bool {
        match self.identifier_patch(provider) {
            Patch::Keep => false,
            Patch::Clear => true,
            Patch::Set(s) => s.is_empty(),
        }
    }

    /// Stamp the provider's last-fetch field.
    pub fn set_last_fetch(&mut self, provider: ProviderId, at: DateTime<Utc>) {
        let slot = match provider {
            ProviderId::Morningstar => &mut self.morningstar_last_fetch,
            ProviderId::MarketScreener => &mut self.market_screener_last_fetch,
            ProviderId::Msci => &mut self.msci_last_fetch,
            ProviderId::Lseg => &mut self.lseg_last_fetch,
            ProviderId::Sp => &mut self.sp_last_fetch,
            ProviderId::Sustainalytics => &mut self.sustainalytics_last_fetch,
            ProviderId::Yahoo => &mut self.yahoo_last_fetch,
        };
        *slot = Patch::Set(at);
    }

    /// Mark a metric field for erasure. Used for identifier cascade clears
    /// and the job-level `clear` option. Fields the patch already sets keep
    /// their new value.
    pub fn clear_unless_set(&mut self, field: AttributeField) {
        macro_rules! clear_slot {
            ($name:ident) => {
                if self.$name.is_keep() {
                    self.$name = Patch::Clear;
                }
            };
        }
        match field {
            AttributeField::Name => {}
            AttributeField::Isin => clear_slot!(isin),
            AttributeField::Country => clear_slot!(country),
            AttributeField::MorningstarId => clear_slot!(morningstar_id),
            AttributeField::MorningstarLastFetch => clear_slot!(morningstar_last_fetch),
            AttributeField::StarRating => clear_slot!(star_rating),
            AttributeField::MorningstarFairValue => clear_slot!(morningstar_fair_value),
            AttributeField::LastClose => clear_slot!(last_close),
            AttributeField::MarketScreenerId => clear_slot!(market_screener_id),
            AttributeField::MarketScreenerLastFetch => clear_slot!(market_screener_last_fetch),
            AttributeField::AnalystConsensus => clear_slot!(analyst_consensus),
            AttributeField::AnalystCount => clear_slot!(analyst_count),
            AttributeField::AnalystTargetPrice => clear_slot!(analyst_target_price),
            AttributeField::AnalystRatings => clear_slot!(analyst_ratings),
            AttributeField::MsciId => clear_slot!(msci_id),
            AttributeField::MsciLastFetch => clear_slot!(msci_last_fetch),
            AttributeField::MsciEsgRating => clear_slot!(msci_esg_rating),
            AttributeField::MsciTemperature => clear_slot!(msci_temperature),
            AttributeField::LsegId => clear_slot!(lseg_id),
            AttributeField::LsegLastFetch => clear_slot!(lseg_last_fetch),
            AttributeField::LsegEsgScore => clear_slot!(lseg_esg_score),
            AttributeField::LsegEmissions => clear_slot!(lseg_emissions),
            AttributeField::SpId => clear_slot!(sp_id),
            AttributeField::SpLastFetch => clear_slot!(sp_last_fetch),
            AttributeField::SpEsgScore => clear_slot!(sp_esg_score),
            AttributeField::SustainalyticsId => clear_slot!(sustainalytics_id),
            AttributeField::SustainalyticsLastFetch => clear_slot!(sustainalytics_last_fetch),
            AttributeField::SustainalyticsEsgRisk => clear_slot!(sustainalytics_esg_risk),
            AttributeField::YahooId => clear_slot!(yahoo_id),
            AttributeField::YahooLastFetch => clear_slot!(yahoo_last_fetch),
            AttributeField::Currency => clear_slot!(currency),
            AttributeField::Low52w => clear_slot!(low_52w),
            AttributeField::High52w => clear_slot!(high_52w),
            AttributeField::Prices1y => clear_slot!(prices_1y),
            AttributeField::Prices1mo => clear_slot!(prices_1mo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_tri_state_maps_missing_null_and_value() {
        let patch = StockPatch::from_json(json!({
            "star_rating": 4,
            "morningstar_fair_value": null
        }))
        .unwrap();

        assert_eq!(patch.star_rating, Patch::Set(4));
        assert_eq!(patch.morningstar_fair_value, Patch::Clear);
        assert!(patch.last_close.is_keep());

        // Round trip: Keep stays absent, Clear stays null, Set keeps value.
        let back = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            back,
            json!({ "star_rating": 4, "morningstar_fair_value": null })
        );
    }

    #[test]
    fn unknown_field_is_an_invalid_request() {
        let err = StockPatch::from_json(json!({ "star_raing": 4 })).unwrap_err();
        assert!(matches!(err, RatingsError::InvalidRequest(_)));
    }

    #[test]
    fn out_of_range_star_rating_is_rejected() {
        let err = StockPatch::from_json(json!({ "star_rating": 6 })).unwrap_err();
        assert!(matches!(err, RatingsError::InvalidRequest(_)));
    }

    #[test]
    fn restating_the_current_value_is_not_a_change() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        stock.star_rating = Some(4);
        stock.prices_1mo = Some(vec![101.0, 102.5]);
        stock.analyst_ratings = Some(AnalystRatings {
            buy: 10,
            hold: 5,
            ..Default::default()
        });

        let patch = StockPatch {
            star_rating: Patch::Set(4),
            // A fresh Vec instance with equal elements must not register.
            prices_1mo: Patch::Set(vec![101.0, 102.5]),
            analyst_ratings: Patch::Set(AnalystRatings {
                buy: 10,
                hold: 5,
                ..Default::default()
            }),
            ..Default::default()
        };

        assert!(patch.changed_fields(&stock).is_empty());
    }

    #[test]
    fn clear_is_a_change_only_when_a_value_exists() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        let patch = StockPatch {
            msci_temperature: Patch::Clear,
            ..Default::default()
        };
        assert!(patch.changed_fields(&stock).is_empty());

        stock.msci_temperature = Some(1.8);
        assert_eq!(
            patch.changed_fields(&stock),
            vec![AttributeField::MsciTemperature]
        );
    }

    #[test]
    fn apply_distinguishes_clear_from_keep() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        stock.msci_temperature = Some(1.8);
        stock.sp_esg_score = Some(55);

        let patch = StockPatch {
            msci_temperature: Patch::Clear,
            lseg_esg_score: Patch::Set(70),
            ..Default::default()
        };
        patch.apply_to(&mut stock);

        assert_eq!(stock.msci_temperature, None);
        assert_eq!(stock.lseg_esg_score, Some(70));
        assert_eq!(stock.sp_esg_score, Some(55));
    }

    #[test]
    fn empty_identifier_counts_as_removal() {
        let patch = StockPatch {
            msci_id: Patch::Set(String::new()),
            ..Default::default()
        };
        assert!(patch.removes_identifier(ProviderId::Msci));
        assert!(!patch.removes_identifier(ProviderId::Yahoo));
    }

    #[test]
    fn clear_unless_set_respects_fresh_values() {
        let mut patch = StockPatch {
            star_rating: Patch::Set(5),
            ..Default::default()
        };
        patch.clear_unless_set(AttributeField::StarRating);
        patch.clear_unless_set(AttributeField::MorningstarFairValue);

        assert_eq!(patch.star_rating, Patch::Set(5));
        assert_eq!(patch.morningstar_fair_value, Patch::Clear);
    }
}
