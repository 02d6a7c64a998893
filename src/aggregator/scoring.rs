use super::views::{AggregatedPrice, PriceQuote, RiskAssessment, RiskLevel};
use crate::types::{Reserve, Source};

pub const HIGH_RISK_SCORE: u32 = 60;
pub const MEDIUM_RISK_SCORE: u32 = 30;

/// 1 for existing anywhere, +1 for top-pool listing, +1 for a lending reserve.
/// Additive and monotonic in observed signals; not a calibrated metric.
pub fn ecosystem_score(in_any_source: bool, in_top_pools: bool, has_reserve: bool) -> u8 {
    if !in_any_source {
        return 0;
    }
    1 + u8::from(in_top_pools) + u8::from(has_reserve)
}

/// Mean of the positive, finite quotes. No usable quote gives 0 from 0 sources.
pub fn aggregate_price(quotes: &[PriceQuote]) -> AggregatedPrice {
    let usable: Vec<&PriceQuote> = quotes
        .iter()
        .filter(|q| q.price_usd.is_finite() && q.price_usd > 0.0)
        .collect();
    if usable.is_empty() {
        return AggregatedPrice::default();
    }
    let sum: f64 = usable.iter().map(|q| q.price_usd).sum();
    let mut sources: Vec<Source> = usable.iter().map(|q| q.source).collect();
    sources.sort();
    sources.dedup();
    AggregatedPrice {
        average: sum / usable.len() as f64,
        source_count: usable.len(),
        sources,
    }
}

/// Tiered heuristic over utilization (percent), LTV and liquidation
/// threshold (fractions). Breakpoints are strict.
pub fn risk_score(utilization_rate: f64, ltv: f64, liquidation_threshold: f64) -> u32 {
    let mut score = 0;

    if utilization_rate > 90.0 {
        score += 40;
    } else if utilization_rate > 80.0 {
        score += 30;
    } else if utilization_rate > 70.0 {
        score += 20;
    }

    if ltv > 0.8 {
        score += 30;
    } else if ltv > 0.6 {
        score += 20;
    } else if ltv > 0.4 {
        score += 10;
    }

    if liquidation_threshold < 0.6 {
        score += 20;
    } else if liquidation_threshold < 0.7 {
        score += 10;
    }

    score
}

pub fn classify(score: u32) -> RiskLevel {
    if score >= HIGH_RISK_SCORE {
        RiskLevel::High
    } else if score >= MEDIUM_RISK_SCORE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn assess_reserve_risk(reserve: &Reserve) -> RiskAssessment {
    let score = risk_score(
        reserve.utilization_rate,
        reserve.ltv,
        reserve.liquidation_threshold,
    );
    RiskAssessment {
        score,
        level: classify(score),
    }
}
