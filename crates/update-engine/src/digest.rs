//! Directional change digests for the user-visible rating fields.

use ratings_core::{AttributeField, Stock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Better,
    Worse,
}

/// The fields subscribers hear about, with their display labels. Everything
/// else (identifiers, fetch stamps, price series) changes silently.
const DIGEST_FIELDS: [(AttributeField, &str); 10] = [
    (AttributeField::StarRating, "Star rating"),
    (AttributeField::MorningstarFairValue, "Morningstar fair value"),
    (AttributeField::AnalystConsensus, "Analyst consensus"),
    (AttributeField::AnalystTargetPrice, "Analyst target price"),
    (AttributeField::MsciTemperature, "MSCI implied temperature rise"),
    (AttributeField::MsciEsgRating, "MSCI ESG rating"),
    (AttributeField::LsegEsgScore, "LSEG ESG score"),
    (AttributeField::LsegEmissions, "LSEG emissions score"),
    (AttributeField::SpEsgScore, "S&P ESG score"),
    (AttributeField::SustainalyticsEsgRisk, "Sustainalytics ESG risk"),
];

fn compare(old: Option<f64>, new: Option<f64>, larger_is_better: bool) -> Option<Direction> {
    let old = old?;
    let new = new?;
    if new == old {
        return None;
    }
    let improved = (new > old) == larger_is_better;
    Some(if improved {
        Direction::Better
    } else {
        Direction::Worse
    })
}

/// Direction of a change. `None` when the field moved from or to unknown,
/// where better/worse has no meaning.
fn direction(field: AttributeField, old: &Stock, new: &Stock) -> Option<Direction> {
    match field {
        AttributeField::StarRating => compare(
            old.star_rating.map(f64::from),
            new.star_rating.map(f64::from),
            true,
        ),
        // Price targets are judged by the upside they imply against the
        // last close they came with, not by their absolute level.
        AttributeField::MorningstarFairValue => compare(
            scoring_engine::fair_value_percentage_to_last_close(old),
            scoring_engine::fair_value_percentage_to_last_close(new),
            true,
        )
        .or_else(|| {
            compare(old.morningstar_fair_value, new.morningstar_fair_value, true)
        }),
        AttributeField::AnalystConsensus => compare(
            old.analyst_consensus.map(|c| f64::from(c.index())),
            new.analyst_consensus.map(|c| f64::from(c.index())),
            true,
        ),
        AttributeField::AnalystTargetPrice => compare(
            scoring_engine::analyst_target_price_percentage_to_last_close(old),
            scoring_engine::analyst_target_price_percentage_to_last_close(new),
            true,
        )
        .or_else(|| compare(old.analyst_target_price, new.analyst_target_price, true)),
        AttributeField::MsciTemperature => {
            compare(old.msci_temperature, new.msci_temperature, false)
        }
        AttributeField::MsciEsgRating => compare(
            old.msci_esg_rating.map(|r| f64::from(r.rank())),
            new.msci_esg_rating.map(|r| f64::from(r.rank())),
            false,
        ),
        AttributeField::LsegEsgScore => compare(
            old.lseg_esg_score.map(f64::from),
            new.lseg_esg_score.map(f64::from),
            true,
        ),
        AttributeField::LsegEmissions => compare(
            old.lseg_emissions.map(f64::from),
            new.lseg_emissions.map(f64::from),
            true,
        ),
        AttributeField::SpEsgScore => compare(
            old.sp_esg_score.map(f64::from),
            new.sp_esg_score.map(f64::from),
            true,
        ),
        AttributeField::SustainalyticsEsgRisk => compare(
            old.sustainalytics_esg_risk,
            new.sustainalytics_esg_risk,
            false,
        ),
        _ => None,
    }
}

/// One line per changed user-visible field, oldest value first. Empty when
/// none of the changed fields is user-visible.
pub fn build_digest(old: &Stock, new: &Stock, changed: &[AttributeField]) -> String {
    let mut lines = Vec::new();
    for (field, label) in DIGEST_FIELDS {
        if !changed.contains(&field) {
            continue;
        }
        let old_text = old
            .render_field(field)
            .unwrap_or_else(|| "unknown".to_string());
        let new_text = new
            .render_field(field)
            .unwrap_or_else(|| "unknown".to_string());
        let marker = match direction(field, old, new) {
            Some(Direction::Better) => " (better)",
            Some(Direction::Worse) => " (worse)",
            None => "",
        };
        lines.push(format!("{label} changed from {old_text} to {new_text}{marker}"));
    }
    lines.join("\n")
}
