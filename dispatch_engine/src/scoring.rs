//! The agent scoring engine.
//!
//! Every eligible candidate gets a score from independent weighted terms: current workload in the target market,
//! workload elsewhere, proximity of their locations to the market, a live-GPS bonus, and account tenure. Higher wins.
//! The terms are pure functions over data the candidate repository already fetched; distance resolution (external
//! service with Haversine fallback) happens before scoring so this module never does IO.

use crate::db_types::LocationType;

/// An agent at or above this many active orders in the target market is at capacity and hard-excluded.
pub const MAX_ACTIVE_ORDERS_PER_MARKET: i64 = 3;
/// How many ranked candidates an assignment attempt considers.
pub const TOP_CANDIDATE_COUNT: usize = 4;

/// Agents already working the target market stay consolidated there.
pub const IN_MARKET_WORKLOAD_BONUS: i64 = 1000;
/// Capacity reached in the target market: pushes the total negative so the candidate is dropped.
pub const IN_MARKET_CAPACITY_PENALTY: i64 = -1000;
/// A light workload in another market still signals an active, reliable agent.
pub const ELSEWHERE_WORKLOAD_BONUS: i64 = 200;
/// Heavily loaded elsewhere: deprioritised, but not excluded.
pub const ELSEWHERE_OVERLOAD_PENALTY: i64 = -200;
pub const FRESH_AGENT_BONUS: i64 = 50;
/// A declared service area whose radius covers the market.
pub const SERVICE_AREA_COVERAGE_BONUS: i64 = 50;

/// A candidate's location with its resolved distance to the target market.
#[derive(Debug, Clone)]
pub struct LocationDistance {
    pub location_type: LocationType,
    pub distance_km: f64,
    /// Coverage radius, set for service areas.
    pub radius_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub agent_id: i64,
    pub score: i64,
    /// Minimum distance from any of the agent's active locations to the market. Used as the ranking tie-breaker.
    pub distance_km: f64,
}

/// The market-workload term. Checked against the target market first; only agents with no presence there are scored
/// on their workload elsewhere.
pub fn workload_score(active_in_market: i64, active_elsewhere: i64) -> i64 {
    if active_in_market >= MAX_ACTIVE_ORDERS_PER_MARKET {
        IN_MARKET_CAPACITY_PENALTY
    } else if active_in_market >= 1 {
        IN_MARKET_WORKLOAD_BONUS
    } else if active_elsewhere >= MAX_ACTIVE_ORDERS_PER_MARKET {
        ELSEWHERE_OVERLOAD_PENALTY
    } else if active_elsewhere >= 1 {
        ELSEWHERE_WORKLOAD_BONUS
    } else {
        FRESH_AGENT_BONUS
    }
}

/// The proximity term: tiered on the minimum distance over all active locations, plus a flat bonus when any service
/// area covers the market.
pub fn proximity_score(distances: &[LocationDistance]) -> i64 {
    let nearest = min_distance(distances);
    let mut score = match nearest {
        d if d <= 2.0 => 100,
        d if d <= 5.0 => 80,
        d if d <= 10.0 => 60,
        d if d <= 20.0 => 40,
        _ => 0,
    };
    let covered = distances
        .iter()
        .filter(|d| d.location_type == LocationType::ServiceArea)
        .any(|d| d.radius_km.map(|r| d.distance_km <= r).unwrap_or(false));
    if covered {
        score += SERVICE_AREA_COVERAGE_BONUS;
    }
    score
}

/// The live-GPS term, separate from service areas. Nearest tier only.
pub fn current_location_score(distances: &[LocationDistance]) -> i64 {
    let nearest = distances
        .iter()
        .filter(|d| d.location_type == LocationType::CurrentLocation)
        .map(|d| d.distance_km)
        .fold(f64::INFINITY, f64::min);
    match nearest {
        d if d <= 1.0 => 30,
        d if d <= 3.0 => 20,
        d if d <= 5.0 => 10,
        _ => 0,
    }
}

pub fn tenure_score(account_age_days: i64) -> i64 {
    if account_age_days > 30 {
        10
    } else if account_age_days > 7 {
        5
    } else {
        0
    }
}

fn min_distance(distances: &[LocationDistance]) -> f64 {
    distances.iter().map(|d| d.distance_km).fold(f64::INFINITY, f64::min)
}

/// Sum all scoring terms for one candidate.
pub fn score_candidate(
    agent_id: i64,
    account_age_days: i64,
    active_in_market: i64,
    active_elsewhere: i64,
    distances: &[LocationDistance],
) -> ScoredCandidate {
    let score = workload_score(active_in_market, active_elsewhere)
        + proximity_score(distances)
        + current_location_score(distances)
        + tenure_score(account_age_days);
    ScoredCandidate { agent_id, score, distance_km: min_distance(distances) }
}

/// Drop negative totals, rank by score descending with distance as the tie-breaker, and keep the top candidates.
/// The assignment orchestrator works down this list in order.
pub fn rank_candidates(mut candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    candidates.retain(|c| c.score >= 0);
    candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.distance_km.total_cmp(&b.distance_km)));
    candidates.truncate(TOP_CANDIDATE_COUNT);
    candidates
}

#[cfg(test)]
mod test {
    use super::*;

    fn service_area(distance_km: f64, radius_km: f64) -> LocationDistance {
        LocationDistance { location_type: LocationType::ServiceArea, distance_km, radius_km: Some(radius_km) }
    }

    fn gps(distance_km: f64) -> LocationDistance {
        LocationDistance { location_type: LocationType::CurrentLocation, distance_km, radius_km: None }
    }

    #[test]
    fn workload_prefers_consolidation() {
        // 2 active in the target market beats 0 anywhere, which beats 3 in the target market (excluded).
        let busy_here = workload_score(2, 0);
        let fresh = workload_score(0, 0);
        let at_capacity = workload_score(3, 0);
        assert!(busy_here > fresh);
        assert!(fresh > at_capacity);
        assert!(at_capacity < 0);
    }

    #[test]
    fn workload_elsewhere_tiers() {
        assert_eq!(workload_score(0, 2), ELSEWHERE_WORKLOAD_BONUS);
        assert_eq!(workload_score(0, 3), ELSEWHERE_OVERLOAD_PENALTY);
        assert_eq!(workload_score(0, 0), FRESH_AGENT_BONUS);
        // In-market presence wins over whatever is happening elsewhere.
        assert_eq!(workload_score(1, 5), IN_MARKET_WORKLOAD_BONUS);
    }

    #[test]
    fn proximity_tiers() {
        assert_eq!(proximity_score(&[service_area(1.5, 1.0)]), 100);
        assert_eq!(proximity_score(&[service_area(4.0, 1.0)]), 80);
        assert_eq!(proximity_score(&[service_area(9.9, 1.0)]), 60);
        assert_eq!(proximity_score(&[service_area(15.0, 1.0)]), 40);
        assert_eq!(proximity_score(&[service_area(50.0, 1.0)]), 0);
        assert_eq!(proximity_score(&[]), 0);
    }

    #[test]
    fn covering_service_area_adds_flat_bonus() {
        // 4km away with a 10km radius: tier 80 plus the coverage bonus.
        assert_eq!(proximity_score(&[service_area(4.0, 10.0)]), 80 + SERVICE_AREA_COVERAGE_BONUS);
        // Two covering areas still only add the bonus once.
        assert_eq!(
            proximity_score(&[service_area(4.0, 10.0), service_area(8.0, 20.0)]),
            80 + SERVICE_AREA_COVERAGE_BONUS
        );
        // A live GPS point never counts as coverage.
        assert_eq!(proximity_score(&[gps(0.5)]), 100);
    }

    #[test]
    fn current_location_nearest_tier_only() {
        assert_eq!(current_location_score(&[gps(0.8)]), 30);
        assert_eq!(current_location_score(&[gps(2.5)]), 20);
        assert_eq!(current_location_score(&[gps(4.9)]), 10);
        assert_eq!(current_location_score(&[gps(6.0)]), 0);
        assert_eq!(current_location_score(&[service_area(0.5, 5.0)]), 0);
    }

    #[test]
    fn tenure_tiers() {
        assert_eq!(tenure_score(45), 10);
        assert_eq!(tenure_score(31), 10);
        assert_eq!(tenure_score(30), 5);
        assert_eq!(tenure_score(8), 5);
        assert_eq!(tenure_score(7), 0);
        assert_eq!(tenure_score(0), 0);
    }

    #[test]
    fn at_capacity_agent_never_ranks() {
        let mut candidates = Vec::new();
        // A maxed-out agent right next to the market still scores negative overall.
        candidates.push(score_candidate(1, 100, 3, 0, &[service_area(0.5, 10.0), gps(0.5)]));
        candidates.push(score_candidate(2, 1, 0, 0, &[service_area(50.0, 1.0)]));
        let ranked = rank_candidates(candidates);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].agent_id, 2);
    }

    #[test]
    fn busy_nearby_agent_outranks_idle_distant_one() {
        // A1: 1 active order in the market, 1.5km away. A2: idle, 50km away.
        let a1 = score_candidate(1, 40, 1, 0, &[gps(1.5)]);
        let a2 = score_candidate(2, 40, 0, 0, &[gps(50.0)]);
        let ranked = rank_candidates(vec![a2, a1]);
        assert_eq!(ranked[0].agent_id, 1);
    }

    #[test]
    fn ties_break_on_distance() {
        let near = ScoredCandidate { agent_id: 1, score: 130, distance_km: 1.0 };
        let far = ScoredCandidate { agent_id: 2, score: 130, distance_km: 4.0 };
        let ranked = rank_candidates(vec![far.clone(), near.clone()]);
        assert_eq!(ranked, vec![near, far]);
    }

    #[test]
    fn only_top_four_survive() {
        let candidates = (0..8)
            .map(|i| ScoredCandidate { agent_id: i, score: 100 + i, distance_km: 1.0 })
            .collect::<Vec<_>>();
        let ranked = rank_candidates(candidates);
        assert_eq!(ranked.len(), TOP_CANDIDATE_COUNT);
        assert_eq!(ranked[0].agent_id, 7);
    }
}
