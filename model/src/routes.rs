use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::ids::{orig, JourneyID, StopID, VariantID};
use crate::timetable::TimetableMatrix;
use crate::topology::VisitOrder;

/// Travel direction along the canonical stop order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Direction {
    Outbound,
    Return,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Outbound => "O",
            Direction::Return => "R",
        }
    }
}

/// A cluster of journeys sharing an identical stop-visit pattern.
#[derive(Clone, Debug)]
pub struct RouteVariant {
    pub id: VariantID,
    /// Stop membership aligned to the canonical stop order.
    pub mask: Vec<bool>,
    /// How many journeys follow this pattern.
    pub count: usize,
    pub direction: Direction,
}

impl RouteVariant {
    /// "Route_A", "Route_B", ... in descending journey-count order.
    pub fn label(&self) -> String {
        if self.id.0 < 26 {
            format!("Route_{}", (b'A' + self.id.0 as u8) as char)
        } else {
            format!("Route_{}", self.id.0)
        }
    }

    pub fn num_stops(&self) -> usize {
        self.mask.iter().filter(|visits| **visits).count()
    }

    /// Shared-stop count with another variant (normally the primary), as a
    /// fraction of that variant's stop count. Self-overlap is 1.0.
    pub fn overlap(&self, other: &RouteVariant) -> f64 {
        let shared = self
            .mask
            .iter()
            .zip(other.mask.iter())
            .filter(|(a, b)| **a && **b)
            .count();
        shared as f64 / other.num_stops().max(1) as f64
    }
}

/// One run of a vehicle along the line, as finally classified.
#[derive(Clone, Debug)]
pub struct Journey {
    pub id: orig::JourneyID,
    pub variant: VariantID,
    pub direction: Direction,
    pub num_stops: usize,
    pub start_stop: Option<orig::StopID>,
    pub start_time_planned: Option<NaiveDateTime>,
    pub start_time_observed: Option<NaiveDateTime>,
    pub end_stop: Option<orig::StopID>,
    pub end_time_planned: Option<NaiveDateTime>,
    pub end_time_observed: Option<NaiveDateTime>,
}

/// Classifies a journey by the sign of successive observed departure deltas
/// along the canonical stop order: mostly increasing means Outbound. A tie
/// (or no usable pair) counts as Outbound.
pub fn journey_direction(matrix: &TimetableMatrix, journey: JourneyID) -> Direction {
    let mut increasing = 0;
    let mut decreasing = 0;
    for stop in 1..matrix.num_stops() {
        let prev = matrix.get(StopID(stop - 1), journey).departure_observed;
        let here = matrix.get(StopID(stop), journey).departure_observed;
        if let (Some(prev), Some(here)) = (prev, here) {
            if here < prev {
                decreasing += 1;
            } else {
                increasing += 1;
            }
        }
    }
    if decreasing > increasing {
        Direction::Return
    } else {
        Direction::Outbound
    }
}

/// Groups journeys by identical stop-visit mask. Returns the variants ranked
/// by descending journey count and each journey's variant assignment.
pub fn group_variants(
    orders: &[VisitOrder],
    directions: &[Direction],
) -> (Vec<RouteVariant>, Vec<VariantID>) {
    let mut groups: BTreeMap<Vec<bool>, Vec<usize>> = BTreeMap::new();
    for (journey, order) in orders.iter().enumerate() {
        let mask: Vec<bool> = order.iter().map(|rank| *rank >= 0).collect();
        groups.entry(mask).or_insert_with(Vec::new).push(journey);
    }

    let mut ranked: Vec<(Vec<bool>, Vec<usize>)> = groups.into_iter().collect();
    ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));

    let mut variants = Vec::new();
    let mut assignment = vec![VariantID(0); orders.len()];
    for (rank, (mask, journeys)) in ranked.into_iter().enumerate() {
        let id = VariantID(rank);
        // Majority vote over the member journeys
        let returns = journeys
            .iter()
            .filter(|j| directions[**j] == Direction::Return)
            .count();
        let direction = if returns * 2 > journeys.len() {
            Direction::Return
        } else {
            Direction::Outbound
        };
        for journey in &journeys {
            assignment[*journey] = id;
        }
        variants.push(RouteVariant {
            id,
            mask,
            count: journeys.len(),
            direction,
        });
    }
    (variants, assignment)
}

pub struct PruneOutcome {
    /// Variants surviving, in the original ranked order (ids untouched).
    pub variants: Vec<RouteVariant>,
    pub keep_journeys: Vec<bool>,
    /// Stops still claimed by at least one surviving variant.
    pub keep_stops: Vec<bool>,
}

/// Drops variants whose overlap with the primary variant falls below
/// `threshold`, together with their journeys, then drops stops no surviving
/// variant claims.
pub fn prune(
    variants: Vec<RouteVariant>,
    assignment: &[VariantID],
    num_stops: usize,
    threshold: f64,
) -> PruneOutcome {
    let Some(primary) = variants.first().cloned() else {
        // No journeys at all: nothing survives
        return PruneOutcome {
            variants,
            keep_journeys: Vec::new(),
            keep_stops: vec![false; num_stops],
        };
    };

    let (kept, dropped): (Vec<RouteVariant>, Vec<RouteVariant>) = variants
        .into_iter()
        .partition(|variant| variant.overlap(&primary) >= threshold);
    if !dropped.is_empty() {
        info!(
            "Dropping {} as their similitude with {} is smaller than the threshold ({})",
            dropped
                .iter()
                .map(|v| v.label())
                .collect::<Vec<_>>()
                .join(", "),
            primary.label(),
            threshold
        );
    }

    let dropped_ids: Vec<VariantID> = dropped.iter().map(|v| v.id).collect();
    let keep_journeys: Vec<bool> = assignment
        .iter()
        .map(|variant| !dropped_ids.contains(variant))
        .collect();

    let mut keep_stops = vec![false; num_stops];
    for variant in &kept {
        for (stop, visits) in variant.mask.iter().enumerate() {
            if *visits {
                keep_stops[stop] = true;
            }
        }
    }

    PruneOutcome {
        variants: kept,
        keep_journeys,
        keep_stops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 7)
            .unwrap()
            .and_hms_opt(8, min, 0)
            .unwrap()
    }

    #[test]
    fn direction_from_departure_deltas() {
        let mut matrix = TimetableMatrix::new(3, 2);
        for stop in 0..3 {
            matrix
                .get_mut(StopID(stop), JourneyID(0))
                .departure_observed = Some(t(stop as u32 * 5));
            matrix
                .get_mut(StopID(stop), JourneyID(1))
                .departure_observed = Some(t(30 - stop as u32 * 5));
        }
        assert_eq!(journey_direction(&matrix, JourneyID(0)), Direction::Outbound);
        assert_eq!(journey_direction(&matrix, JourneyID(1)), Direction::Return);
    }

    #[test]
    fn identical_masks_share_a_variant() {
        let orders: Vec<VisitOrder> = vec![
            vec![0, 1, 2, -1],
            vec![0, 2, 1, -1],
            vec![0, 1, 2, 3],
        ];
        let directions = vec![Direction::Outbound; 3];
        let (variants, assignment) = group_variants(&orders, &directions);
        assert_eq!(variants.len(), 2);
        assert_eq!(assignment[0], assignment[1]);
        assert_ne!(assignment[0], assignment[2]);
        // Most frequent pattern is ranked first
        assert_eq!(variants[0].count, 2);
        assert_eq!(variants[0].label(), "Route_A");
    }

    #[test]
    fn variant_direction_is_majority_vote() {
        let orders: Vec<VisitOrder> = vec![vec![0, 1], vec![1, 0], vec![0, 1]];
        let directions = vec![Direction::Return, Direction::Return, Direction::Outbound];
        // All three masks are identical, so one variant with a 2:1 vote
        let (variants, _) = group_variants(&orders, &directions);
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].direction, Direction::Return);
    }

    #[test]
    fn primary_survives_any_threshold_up_to_one() {
        let orders: Vec<VisitOrder> = vec![
            vec![0, 1, 2, 3],
            vec![0, 1, 2, 3],
            vec![0, -1, -1, 1],
        ];
        let directions = vec![Direction::Outbound; 3];
        let (variants, assignment) = group_variants(&orders, &directions);
        assert!((variants[0].overlap(&variants[0]) - 1.0).abs() < f64::EPSILON);

        let outcome = prune(variants, &assignment, 4, 1.0);
        assert!(outcome.variants.iter().any(|v| v.id == VariantID(0)));
        // The 2-stop variant shares half its stops with the primary
        assert_eq!(outcome.variants.len(), 1);
        assert_eq!(outcome.keep_journeys, vec![true, true, false]);
        // Stop 3 was claimed by both patterns, so it stays; all stops stay
        assert_eq!(outcome.keep_stops, vec![true, true, true, true]);
    }

    #[test]
    fn pruning_drops_unclaimed_stops() {
        let orders: Vec<VisitOrder> = vec![
            vec![0, 1, -1],
            vec![0, 1, -1],
            vec![-1, 0, 1],
        ];
        let directions = vec![Direction::Outbound; 3];
        let (variants, assignment) = group_variants(&orders, &directions);
        let outcome = prune(variants, &assignment, 3, 0.75);
        assert_eq!(outcome.variants.len(), 1);
        assert_eq!(outcome.keep_stops, vec![true, true, false]);
        assert_eq!(outcome.keep_journeys, vec![true, true, false]);
    }
}
