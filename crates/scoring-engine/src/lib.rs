//! Pure scoring over a stock's raw attributes.
//!
//! Every function here is deterministic and total: missing inputs produce
//! `None` sub-scores, which are excluded from aggregation rather than
//! treated as zero. No I/O, no state.

use ratings_core::Stock;

/// Premium of the last close over a reference price, in percent. Positive
/// means the stock trades above the reference. `None` when either side is
/// missing or the reference is zero.
fn premium_over(last_close: Option<f64>, reference: Option<f64>) -> Option<f64> {
    let last_close = last_close?;
    let reference = reference?;
    if reference == 0.0 {
        return None;
    }
    Some((last_close / reference - 1.0) * 100.0)
}

/// Low-conviction damping: fewer than 10 analysts shrinks the contribution
/// proportionally.
fn analyst_damping(count: u32) -> f64 {
    if count < 10 {
        f64::from(count) / 10.0
    } else {
        1.0
    }
}

fn aggregate(sub_scores: &[Option<f64>], min_divisor: usize) -> f64 {
    let available: Vec<f64> = sub_scores.iter().filter_map(|s| *s).collect();
    let sum: f64 = available.iter().sum();
    // Dividing by at least `min_divisor` keeps a single glowing metric from
    // carrying the whole score.
    let divisor = min_divisor.max(available.len()) as f64;
    (sum / divisor).max(-1.0)
}

/// Star rating mapped linearly: 1 star = -1 up to 5 stars = +1.
pub fn star_rating_score(stock: &Stock) -> Option<f64> {
    stock.star_rating.map(|stars| (f64::from(stars) - 3.0) / 2.0)
}

/// Discount to the Morningstar fair value. Capped above at +1; a deep
/// premium is allowed to drag the aggregate down past it.
pub fn fair_value_score(stock: &Stock) -> Option<f64> {
    let premium = premium_over(stock.last_close, stock.morningstar_fair_value)?;
    Some((-premium / 50.0).min(1.0))
}

/// Analyst consensus on the Sell..Buy scale, damped by analyst count.
pub fn analyst_consensus_score(stock: &Stock) -> Option<f64> {
    let count = stock.analyst_count.filter(|c| *c > 0)?;
    let consensus = stock.analyst_consensus?;
    Some((0.5 * f64::from(consensus.index()) - 1.0) * analyst_damping(count))
}

/// Discount to the analyst price target, gated and damped like the
/// consensus score.
pub fn analyst_target_price_score(stock: &Stock) -> Option<f64> {
    let count = stock.analyst_count.filter(|c| *c > 0)?;
    let premium = premium_over(stock.last_close, stock.analyst_target_price)?;
    Some((-premium / 50.0).min(1.0) * analyst_damping(count))
}

pub fn financial_score(stock: &Stock) -> f64 {
    aggregate(
        &[
            star_rating_score(stock),
            fair_value_score(stock),
            analyst_consensus_score(stock),
            analyst_target_price_score(stock),
        ],
        3,
    )
}

/// MSCI letter rating mapped linearly: AAA = +1, BBB = 0, CCC = -1.
pub fn msci_rating_score(stock: &Stock) -> Option<f64> {
    stock
        .msci_esg_rating
        .map(|rating| (3.0 - f64::from(rating.rank())) / 3.0)
}

/// MSCI implied temperature rise: 2 degrees C anchors zero, capped above
/// at +1.
pub fn msci_temperature_score(stock: &Stock) -> Option<f64> {
    stock.msci_temperature.map(|t| (2.0 - t).min(1.0))
}

/// 0-100 provider score rescaled to [-1, 1] around the 50 midpoint.
fn rescale_centi(score: Option<u8>) -> Option<f64> {
    score.map(|x| (f64::from(x) - 50.0) / 50.0)
}

pub fn lseg_esg_score(stock: &Stock) -> Option<f64> {
    rescale_centi(stock.lseg_esg_score)
}

pub fn lseg_emissions_score(stock: &Stock) -> Option<f64> {
    rescale_centi(stock.lseg_emissions)
}

pub fn sp_esg_score(stock: &Stock) -> Option<f64> {
    rescale_centi(stock.sp_esg_score)
}

/// Sustainalytics risk is inverted: 0 risk = +1, 20 = 0, 40 = -1.
pub fn sustainalytics_score(stock: &Stock) -> Option<f64> {
    stock.sustainalytics_esg_risk.map(|risk| 1.0 - risk / 20.0)
}

pub fn esg_score(stock: &Stock) -> f64 {
    aggregate(
        &[
            msci_rating_score(stock),
            msci_temperature_score(stock),
            lseg_esg_score(stock),
            lseg_emissions_score(stock),
            sp_esg_score(stock),
            sustainalytics_score(stock),
        ],
        4,
    )
}

/// Harmonic mean when both dimensions are strictly positive, so a stock
/// cannot coast on one of them; otherwise the worse dimension caps the
/// total.
pub fn total_score(financial: f64, esg: f64) -> f64 {
    if financial > 0.0 && esg > 0.0 {
        2.0 * financial * esg / (financial + esg)
    } else {
        financial.min(esg)
    }
}

/// Upside of a reference price over the last close, in percent. `None` on a
/// missing input or zero last close, never NaN.
fn percentage_to_last_close(reference: Option<f64>, last_close: Option<f64>) -> Option<f64> {
    let reference = reference?;
    let last_close = last_close?;
    if last_close == 0.0 {
        return None;
    }
    Some((reference / last_close - 1.0) * 100.0)
}

pub fn fair_value_percentage_to_last_close(stock: &Stock) -> Option<f64> {
    percentage_to_last_close(stock.morningstar_fair_value, stock.last_close)
}

pub fn analyst_target_price_percentage_to_last_close(stock: &Stock) -> Option<f64> {
    percentage_to_last_close(stock.analyst_target_price, stock.last_close)
}

/// Position of the last close inside the 52-week range, 0 at the low, 1 at
/// the high.
pub fn position_in_52w(stock: &Stock) -> Option<f64> {
    let last_close = stock.last_close?;
    let low = stock.low_52w?;
    let high = stock.high_52w?;
    if high == low {
        return None;
    }
    Some((last_close - low) / (high - low))
}

/// Recompute every derived attribute from the raw attributes. Idempotent:
/// running it twice on the same raw inputs yields identical output.
pub fn recompute(stock: &mut Stock) {
    stock.financial_score = financial_score(stock);
    stock.esg_score = esg_score(stock);
    stock.total_score = total_score(stock.financial_score, stock.esg_score);
    stock.morningstar_fair_value_percentage_to_last_close =
        fair_value_percentage_to_last_close(stock);
    stock.analyst_target_price_percentage_to_last_close =
        analyst_target_price_percentage_to_last_close(stock);
    stock.position_in_52w = position_in_52w(stock);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratings_core::{AnalystConsensus, MsciEsgRating};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    fn stock_with_financials(
        stars: u8,
        last_close: f64,
        fair_value: f64,
        consensus: AnalystConsensus,
        target: f64,
    ) -> Stock {
        let mut stock = Stock::new("TEST", "Test Corp");
        stock.star_rating = Some(stars);
        stock.last_close = Some(last_close);
        stock.morningstar_fair_value = Some(fair_value);
        stock.analyst_consensus = Some(consensus);
        stock.analyst_count = Some(10);
        stock.analyst_target_price = Some(target);
        stock
    }

    #[test]
    fn midpoint_star_rating_alone_scores_zero() {
        let mut stock = Stock::new("TEST", "Test Corp");
        stock.star_rating = Some(3);
        assert_eq!(star_rating_score(&stock), Some(0.0));
        assert_eq!(financial_score(&stock), 0.0);
    }

    #[test]
    fn one_star_with_every_signal_poor_bottoms_out() {
        // 100% premium over fair value and target drags the sum past -1;
        // the aggregate clamp floors it.
        let stock =
            stock_with_financials(1, 150.0, 75.0, AnalystConsensus::Sell, 75.0);
        assert_eq!(financial_score(&stock), -1.0);
    }

    #[test]
    fn five_stars_with_every_signal_excellent_tops_out() {
        let stock =
            stock_with_financials(5, 150.0, 300.0, AnalystConsensus::Buy, 300.0);
        assert!(approx(financial_score(&stock), 1.0));
    }

    #[test]
    fn thin_coverage_is_penalized_by_the_divisor() {
        // One excellent signal divided by the minimum divisor of 3.
        let mut stock = Stock::new("TEST", "Test Corp");
        stock.star_rating = Some(5);
        assert!(approx(financial_score(&stock), 1.0 / 3.0));
    }

    #[test]
    fn missing_analyst_count_gates_both_analyst_scores() {
        let mut stock = Stock::new("TEST", "Test Corp");
        stock.analyst_consensus = Some(AnalystConsensus::Buy);
        stock.last_close = Some(100.0);
        stock.analyst_target_price = Some(150.0);

        assert_eq!(analyst_consensus_score(&stock), None);
        assert_eq!(analyst_target_price_score(&stock), None);

        stock.analyst_count = Some(0);
        assert_eq!(analyst_consensus_score(&stock), None);

        stock.analyst_count = Some(5);
        assert!(approx(analyst_consensus_score(&stock).unwrap(), 0.5));
    }

    #[test]
    fn fair_value_score_caps_above_but_not_below() {
        let mut stock = Stock::new("TEST", "Test Corp");
        stock.last_close = Some(50.0);
        stock.morningstar_fair_value = Some(200.0);
        // -75% premium would score 1.5; capped at 1.
        assert_eq!(fair_value_score(&stock), Some(1.0));

        stock.morningstar_fair_value = Some(10.0);
        // 400% premium scores -8, uncapped.
        assert!(approx(fair_value_score(&stock).unwrap(), -8.0));

        stock.morningstar_fair_value = Some(0.0);
        assert_eq!(fair_value_score(&stock), None);
    }

    #[test]
    fn esg_scale_anchors() {
        let mut stock = Stock::new("TEST", "Test Corp");
        stock.msci_esg_rating = Some(MsciEsgRating::Aaa);
        assert_eq!(msci_rating_score(&stock), Some(1.0));
        stock.msci_esg_rating = Some(MsciEsgRating::Bbb);
        assert_eq!(msci_rating_score(&stock), Some(0.0));
        stock.msci_esg_rating = Some(MsciEsgRating::Ccc);
        assert_eq!(msci_rating_score(&stock), Some(-1.0));

        stock.msci_temperature = Some(1.5);
        assert_eq!(msci_temperature_score(&stock), Some(0.5));
        stock.msci_temperature = Some(0.5);
        assert_eq!(msci_temperature_score(&stock), Some(1.0));

        stock.sustainalytics_esg_risk = Some(40.0);
        assert_eq!(sustainalytics_score(&stock), Some(-1.0));

        stock.sp_esg_score = Some(75);
        assert_eq!(sp_esg_score(&stock), Some(0.5));
    }

    #[test]
    fn esg_aggregate_divides_by_at_least_four() {
        let mut stock = Stock::new("TEST", "Test Corp");
        stock.msci_esg_rating = Some(MsciEsgRating::Aaa);
        stock.sp_esg_score = Some(100);
        // Two perfect signals over the minimum divisor of 4.
        assert!(approx(esg_score(&stock), 0.5));
    }

    #[test]
    fn total_score_harmonic_mean_and_min_rule() {
        assert!(approx(total_score(0.5, 0.5), 0.5));
        assert!(approx(total_score(0.5, -0.2), -0.2));
        assert!(approx(total_score(-0.3, -0.8), -0.8));
        // Harmonic mean punishes imbalance harder than the arithmetic mean.
        assert!(total_score(0.9, 0.1) < 0.5);
    }

    #[test]
    fn percentage_fields_guard_zero_denominators() {
        let mut stock = Stock::new("TEST", "Test Corp");
        stock.morningstar_fair_value = Some(120.0);
        stock.last_close = Some(0.0);
        assert_eq!(fair_value_percentage_to_last_close(&stock), None);

        stock.last_close = Some(100.0);
        assert!(approx(
            fair_value_percentage_to_last_close(&stock).unwrap(),
            20.0
        ));
    }

    #[test]
    fn position_in_52w_requires_a_real_range() {
        let mut stock = Stock::new("TEST", "Test Corp");
        stock.last_close = Some(75.0);
        stock.low_52w = Some(50.0);
        stock.high_52w = Some(100.0);
        assert!(approx(position_in_52w(&stock).unwrap(), 0.5));

        stock.high_52w = Some(50.0);
        assert_eq!(position_in_52w(&stock), None);
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut stock =
            stock_with_financials(4, 150.0, 180.0, AnalystConsensus::Outperform, 170.0);
        stock.msci_esg_rating = Some(MsciEsgRating::Aa);
        stock.msci_temperature = Some(1.8);
        stock.lseg_esg_score = Some(80);
        stock.sustainalytics_esg_risk = Some(12.0);

        recompute(&mut stock);
        let first = stock.clone();
        recompute(&mut stock);

        assert_eq!(stock, first);
        assert!(stock.total_score >= -1.0 && stock.total_score <= 1.0);
        assert!(stock.financial_score >= -1.0 && stock.financial_score <= 1.0);
        assert!(stock.esg_score >= -1.0 && stock.esg_score <= 1.0);
    }
}
