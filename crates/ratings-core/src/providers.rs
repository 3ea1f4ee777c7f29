use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fields::AttributeField;

/// The seven tracked data providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Morningstar,
    MarketScreener,
    Msci,
    Lseg,
    Sp,
    Sustainalytics,
    Yahoo,
}

/// Whether one network round trip serves one stock or the whole set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchCardinality {
    Individual,
    Bulk,
}

/// Static per-provider metadata. Defined once, immutable.
#[derive(Debug, Clone, Copy)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub name: &'static str,
    pub identifier_field: AttributeField,
    pub last_fetch_field: AttributeField,
    /// Minimum age before a stock becomes eligible for refetch.
    pub ttl_seconds: i64,
    pub cardinality: FetchCardinality,
    pub default_concurrency: usize,
    /// Metric fields this provider writes. Cleared in cascade when the
    /// provider identifier is removed.
    pub owned_fields: &'static [AttributeField],
}

const DAY: i64 = 86_400;
const WEEK: i64 = 7 * DAY;

pub const PROVIDERS: [ProviderDescriptor; 7] = [
    ProviderDescriptor {
        id: ProviderId::Morningstar,
        name: "Morningstar",
        identifier_field: AttributeField::MorningstarId,
        last_fetch_field: AttributeField::MorningstarLastFetch,
        ttl_seconds: DAY,
        cardinality: FetchCardinality::Individual,
        default_concurrency: 4,
        owned_fields: &[
            AttributeField::StarRating,
            AttributeField::MorningstarFairValue,
            AttributeField::LastClose,
        ],
    },
    ProviderDescriptor {
        id: ProviderId::MarketScreener,
        name: "Market Screener",
        identifier_field: AttributeField::MarketScreenerId,
        last_fetch_field: AttributeField::MarketScreenerLastFetch,
        ttl_seconds: DAY,
        cardinality: FetchCardinality::Individual,
        default_concurrency: 4,
        owned_fields: &[
            AttributeField::AnalystConsensus,
            AttributeField::AnalystCount,
            AttributeField::AnalystTargetPrice,
            AttributeField::AnalystRatings,
        ],
    },
    ProviderDescriptor {
        id: ProviderId::Msci,
        name: "MSCI",
        identifier_field: AttributeField::MsciId,
        last_fetch_field: AttributeField::MsciLastFetch,
        ttl_seconds: WEEK,
        cardinality: FetchCardinality::Individual,
        // MSCI rate-limits aggressively; two workers keeps us under it.
        default_concurrency: 2,
        owned_fields: &[
            AttributeField::MsciEsgRating,
            AttributeField::MsciTemperature,
        ],
    },
    ProviderDescriptor {
        id: ProviderId::Lseg,
        name: "LSEG",
        identifier_field: AttributeField::LsegId,
        last_fetch_field: AttributeField::LsegLastFetch,
        ttl_seconds: WEEK,
        cardinality: FetchCardinality::Individual,
        default_concurrency: 4,
        owned_fields: &[
            AttributeField::LsegEsgScore,
            AttributeField::LsegEmissions,
        ],
    },
    ProviderDescriptor {
        id: ProviderId::Sp,
        name: "S&P",
        identifier_field: AttributeField::SpId,
        last_fetch_field: AttributeField::SpLastFetch,
        ttl_seconds: WEEK,
        cardinality: FetchCardinality::Individual,
        default_concurrency: 4,
        owned_fields: &[AttributeField::SpEsgScore],
    },
    ProviderDescriptor {
        id: ProviderId::Sustainalytics,
        name: "Sustainalytics",
        identifier_field: AttributeField::SustainalyticsId,
        last_fetch_field: AttributeField::SustainalyticsLastFetch,
        ttl_seconds: WEEK,
        cardinality: FetchCardinality::Bulk,
        default_concurrency: 1,
        owned_fields: &[AttributeField::SustainalyticsEsgRisk],
    },
    ProviderDescriptor {
        id: ProviderId::Yahoo,
        name: "Yahoo Finance",
        identifier_field: AttributeField::YahooId,
        last_fetch_field: AttributeField::YahooLastFetch,
        ttl_seconds: DAY,
        cardinality: FetchCardinality::Individual,
        default_concurrency: 4,
        owned_fields: &[
            AttributeField::Currency,
            AttributeField::Low52w,
            AttributeField::High52w,
            AttributeField::Prices1y,
            AttributeField::Prices1mo,
        ],
    },
];

impl ProviderId {
    pub const ALL: [ProviderId; 7] = [
        ProviderId::Morningstar,
        ProviderId::MarketScreener,
        ProviderId::Msci,
        ProviderId::Lseg,
        ProviderId::Sp,
        ProviderId::Sustainalytics,
        ProviderId::Yahoo,
    ];

    pub fn descriptor(self) -> &'static ProviderDescriptor {
        // PROVIDERS is declared in ALL order.
        &PROVIDERS[self as usize]
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_lookup_matches_registry_order() {
        for provider in ProviderId::ALL {
            assert_eq!(provider.descriptor().id, provider);
        }
    }

    #[test]
    fn sustainalytics_is_the_only_bulk_provider() {
        let bulk: Vec<_> = PROVIDERS
            .iter()
            .filter(|d| d.cardinality == FetchCardinality::Bulk)
            .map(|d| d.id)
            .collect();
        assert_eq!(bulk, vec![ProviderId::Sustainalytics]);
    }

    #[test]
    fn owned_fields_are_disjoint_across_providers() {
        let mut seen = std::collections::HashSet::new();
        for descriptor in &PROVIDERS {
            for field in descriptor.owned_fields {
                assert!(seen.insert(*field), "{field} owned twice");
            }
        }
    }
}
