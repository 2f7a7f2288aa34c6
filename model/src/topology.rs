use abstutil::Counter;
use geom::{Distance, Pt2D};

use crate::ids::{JourneyID, StopID};
use crate::timetable::TimetableMatrix;

/// A journey's visiting ranks, aligned to the current stop row order. Rank 0
/// is the first stop the journey was observed at; -1 marks a stop it never
/// visited.
pub type VisitOrder = Vec<i64>;

/// Ranks the stops of one journey by its earliest observed event per stop.
/// Ties keep row order (the sort is stable).
pub fn visit_order(matrix: &TimetableMatrix, journey: JourneyID) -> VisitOrder {
    let mut seen = Vec::new();
    for stop in 0..matrix.num_stops() {
        if let Some(t) = matrix.get(StopID(stop), journey).first_observed() {
            seen.push((stop, t));
        }
    }
    seen.sort_by_key(|(_, t)| *t);

    let mut ranks = vec![-1; matrix.num_stops()];
    for (rank, (stop, _)) in seen.into_iter().enumerate() {
        ranks[stop] = rank as i64;
    }
    ranks
}

pub struct ResolvedDistances {
    /// Per stop row, the distance along the line, if any order placed it.
    pub distances: Vec<Option<Distance>>,
    /// Stop rows left without a distance after all orders were tried.
    pub unresolved: Vec<usize>,
}

/// Assigns each stop a distance along the line. The most frequent observed
/// visiting order seeds absolute distances as a cumulative path length; every
/// further order, by decreasing frequency, is interpolated against the stops
/// it shares with the already-resolved set.
pub fn resolve_distances(positions: &[Pt2D], orders: &[VisitOrder]) -> ResolvedDistances {
    // Journeys observed at fewer than two stops say nothing about ordering
    let mut counter: Counter<VisitOrder> = Counter::new();
    for order in orders {
        if order.iter().filter(|rank| **rank >= 0).count() >= 2 {
            counter.inc(order.clone());
        }
    }
    let mut ranked: Vec<(VisitOrder, usize)> = counter.consume().into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut distances: Vec<Option<Distance>> = vec![None; positions.len()];
    let mut remaining = positions.len();

    if let Some((primary, _)) = ranked.first() {
        let covered = covered_stops(primary);
        let local = cumulative_meters(positions, &covered);
        for (stop, meters) in covered.iter().zip(local.iter()) {
            distances[*stop] = Some(Distance::meters(*meters));
            remaining -= 1;
        }
    }

    for (order, _) in ranked.iter().skip(1) {
        if remaining == 0 {
            break;
        }
        let covered = covered_stops(order);
        if covered.len() < 2 {
            continue;
        }
        let local = cumulative_meters(positions, &covered);

        // Anchor on the covered stops that already have a distance
        let mut anchors: Vec<(f64, f64)> = covered
            .iter()
            .zip(local.iter())
            .filter_map(|(stop, x)| distances[*stop].map(|d| (*x, d.inner_meters())))
            .collect();
        if anchors.len() < 2 {
            continue;
        }
        anchors.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (stop, x) in covered.iter().zip(local.iter()) {
            if distances[*stop].is_none() {
                distances[*stop] = Some(Distance::meters(piecewise_linear(&anchors, *x)));
                remaining -= 1;
            }
        }
    }

    let unresolved: Vec<usize> = distances
        .iter()
        .enumerate()
        .filter_map(|(stop, d)| if d.is_none() { Some(stop) } else { None })
        .collect();
    ResolvedDistances {
        distances,
        unresolved,
    }
}

/// Stop rows an order covers, sorted by visiting rank.
fn covered_stops(order: &VisitOrder) -> Vec<usize> {
    let mut covered: Vec<usize> = (0..order.len()).filter(|stop| order[*stop] >= 0).collect();
    covered.sort_by_key(|stop| order[*stop]);
    covered
}

/// Cumulative straight-line path length along the given stop sequence,
/// starting at 0.
fn cumulative_meters(positions: &[Pt2D], sequence: &[usize]) -> Vec<f64> {
    let mut result = Vec::with_capacity(sequence.len());
    let mut total = 0.0;
    for (i, stop) in sequence.iter().enumerate() {
        if i > 0 {
            total += positions[sequence[i - 1]].dist_to(positions[*stop]).inner_meters();
        }
        result.push(total);
    }
    result
}

/// Evaluates the piecewise-linear function through `anchors` (sorted by x) at
/// `x`, extrapolating linearly beyond both ends.
fn piecewise_linear(anchors: &[(f64, f64)], x: f64) -> f64 {
    let n = anchors.len();
    let (seg_start, seg_end) = if x <= anchors[0].0 {
        (anchors[0], anchors[1])
    } else if x >= anchors[n - 1].0 {
        (anchors[n - 2], anchors[n - 1])
    } else {
        let mut seg = (anchors[0], anchors[1]);
        for pair in anchors.windows(2) {
            if x >= pair[0].0 && x <= pair[1].0 {
                seg = (pair[0], pair[1]);
                break;
            }
        }
        seg
    };
    let (x0, y0) = seg_start;
    let (x1, y1) = seg_end;
    if (x1 - x0).abs() < f64::EPSILON {
        return y0;
    }
    y0 + (x - x0) / (x1 - x0) * (y1 - y0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::timetable::TimetableMatrix;

    fn t(min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 7)
            .unwrap()
            .and_hms_opt(8, min, 0)
            .unwrap()
    }

    // One journey per column; each visits the listed stop rows at successive
    // minutes
    fn matrix_from_visits(num_stops: usize, journeys: &[Vec<usize>]) -> TimetableMatrix {
        let mut matrix = TimetableMatrix::new(num_stops, journeys.len());
        for (j, stops) in journeys.iter().enumerate() {
            for (minute, stop) in stops.iter().enumerate() {
                matrix
                    .get_mut(StopID(*stop), JourneyID(j))
                    .arrival_observed = Some(t(minute as u32));
            }
        }
        matrix
    }

    fn orders_of(matrix: &TimetableMatrix) -> Vec<VisitOrder> {
        (0..matrix.num_journeys())
            .map(|j| visit_order(matrix, JourneyID(j)))
            .collect()
    }

    #[test]
    fn rank_order_follows_observed_times() {
        let matrix = matrix_from_visits(4, &[vec![2, 0, 3]]);
        assert_eq!(visit_order(&matrix, JourneyID(0)), vec![1, -1, 0, 2]);
    }

    #[test]
    fn full_journey_recovers_ground_truth() {
        // Stops laid out east-west, visited in positional order
        let positions = vec![
            Pt2D::new(0.0, 0.0),
            Pt2D::new(100.0, 0.0),
            Pt2D::new(250.0, 0.0),
            Pt2D::new(400.0, 0.0),
        ];
        let matrix = matrix_from_visits(4, &[vec![0, 1, 2, 3]]);
        let resolved = resolve_distances(&positions, &orders_of(&matrix));
        assert!(resolved.unresolved.is_empty());
        let meters: Vec<f64> = resolved
            .distances
            .iter()
            .map(|d| d.unwrap().inner_meters())
            .collect();
        assert_eq!(meters, vec![0.0, 100.0, 250.0, 400.0]);
    }

    #[test]
    fn distances_non_decreasing_along_primary_order() {
        let positions = vec![
            Pt2D::new(0.0, 0.0),
            Pt2D::new(30.0, 40.0),
            Pt2D::new(60.0, 80.0),
        ];
        let matrix = matrix_from_visits(3, &[vec![0, 1, 2], vec![0, 1, 2], vec![2, 1, 0]]);
        let resolved = resolve_distances(&positions, &orders_of(&matrix));
        let meters: Vec<f64> = resolved
            .distances
            .iter()
            .map(|d| d.unwrap().inner_meters())
            .collect();
        assert!(meters.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn secondary_order_interpolates_missing_stop() {
        // Stop 3 is only visited by the rarer journeys, halfway between
        // stops 1 and 2
        let positions = vec![
            Pt2D::new(0.0, 0.0),
            Pt2D::new(100.0, 0.0),
            Pt2D::new(200.0, 0.0),
            Pt2D::new(150.0, 0.0),
        ];
        let matrix = matrix_from_visits(
            4,
            &[
                vec![0, 1, 2],
                vec![0, 1, 2],
                vec![0, 1, 3, 2],
            ],
        );
        let resolved = resolve_distances(&positions, &orders_of(&matrix));
        assert!(resolved.unresolved.is_empty());
        let d3 = resolved.distances[3].unwrap().inner_meters();
        assert!((d3 - 150.0).abs() < 1e-6);
    }

    #[test]
    fn extrapolates_beyond_known_ends() {
        // The rare journey starts one stop before everyone else
        let positions = vec![
            Pt2D::new(0.0, 0.0),
            Pt2D::new(100.0, 0.0),
            Pt2D::new(200.0, 0.0),
            Pt2D::new(-50.0, 0.0),
        ];
        let matrix = matrix_from_visits(
            4,
            &[
                vec![0, 1, 2],
                vec![0, 1, 2],
                vec![3, 0, 1],
            ],
        );
        let resolved = resolve_distances(&positions, &orders_of(&matrix));
        assert!(resolved.unresolved.is_empty());
        let d3 = resolved.distances[3].unwrap().inner_meters();
        assert!((d3 - (-50.0)).abs() < 1e-6);
    }

    #[test]
    fn uncovered_stops_stay_unresolved() {
        let positions = vec![
            Pt2D::new(0.0, 0.0),
            Pt2D::new(100.0, 0.0),
            Pt2D::new(999.0, 999.0),
        ];
        let matrix = matrix_from_visits(3, &[vec![0, 1]]);
        let resolved = resolve_distances(&positions, &orders_of(&matrix));
        assert_eq!(resolved.unresolved, vec![2]);
        assert!(resolved.distances[2].is_none());
    }

    #[test]
    fn single_stop_journeys_contribute_nothing() {
        let positions = vec![Pt2D::new(0.0, 0.0), Pt2D::new(100.0, 0.0)];
        let matrix = matrix_from_visits(2, &[vec![0]]);
        let resolved = resolve_distances(&positions, &orders_of(&matrix));
        assert_eq!(resolved.unresolved, vec![0, 1]);
    }
}
