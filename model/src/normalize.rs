use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::ids::{orig, JourneyID, StopID};
use crate::records::{QualityStatus, VisitRecord};
use crate::routes::Direction;
use crate::timetable::{TimetableMatrix, VisitTimes};

/// The deduplicated, pivoted form of one line's records: stop rows (in stop
/// number order until reconstruction sorts them), journey columns (in journey
/// id order until classification sorts them), and the dense matrix.
pub struct Normalized {
    pub stops: Vec<orig::StopID>,
    pub journeys: Vec<orig::JourneyID>,
    pub matrix: TimetableMatrix,
}

pub fn normalize(records: &[VisitRecord]) -> Normalized {
    let deduped = dedup(records);
    pivot(&deduped)
}

/// Keeps, per (stop, journey), the record with the best
/// (arrival, departure) status pair; later input wins ties.
fn dedup(records: &[VisitRecord]) -> Vec<&VisitRecord> {
    let mut best: BTreeMap<(orig::StopID, orig::JourneyID), (QualityStatus, QualityStatus, &VisitRecord)> =
        BTreeMap::new();
    let mut dropped = 0;
    for rec in records {
        let quality = (rec.arrival_status, rec.departure_status);
        match best.entry((rec.stop, rec.journey.clone())) {
            Entry::Vacant(e) => {
                e.insert((quality.0, quality.1, rec));
            }
            Entry::Occupied(mut e) => {
                dropped += 1;
                if quality >= (e.get().0, e.get().1) {
                    e.insert((quality.0, quality.1, rec));
                }
            }
        }
    }
    if dropped > 0 {
        info!("Removed {} duplicate records", dropped);
    }
    best.into_values().map(|(_, _, rec)| rec).collect()
}

fn pivot(records: &[&VisitRecord]) -> Normalized {
    let mut stops: Vec<orig::StopID> = records.iter().map(|rec| rec.stop).collect();
    stops.sort();
    stops.dedup();
    let mut journeys: Vec<orig::JourneyID> =
        records.iter().map(|rec| rec.journey.clone()).collect();
    journeys.sort();
    journeys.dedup();

    let stop_idx: BTreeMap<orig::StopID, usize> =
        stops.iter().enumerate().map(|(i, s)| (*s, i)).collect();
    let journey_idx: BTreeMap<&orig::JourneyID, usize> =
        journeys.iter().enumerate().map(|(i, j)| (j, i)).collect();

    let mut matrix = TimetableMatrix::new(stops.len(), journeys.len());
    for rec in records {
        let cell = matrix.get_mut(
            StopID(stop_idx[&rec.stop]),
            JourneyID(journey_idx[&rec.journey]),
        );
        *cell = VisitTimes {
            arrival_planned: rec.arrival_planned,
            arrival_observed: rec.arrival_observed,
            departure_planned: rec.departure_planned,
            departure_observed: rec.departure_observed,
        };
    }

    Normalized {
        stops,
        journeys,
        matrix,
    }
}

/// Replaces each journey's observed timestamps with their running maximum
/// along the journey's travel direction, so a later stop never appears to be
/// served before an earlier one. Rows must already be in canonical order.
/// Scheduled values are untouched.
pub fn correct_observed_times(matrix: &mut TimetableMatrix, directions: &[Direction]) {
    let num_stops = matrix.num_stops();
    for (j, direction) in directions.iter().enumerate() {
        let rows: Vec<usize> = match direction {
            Direction::Outbound => (0..num_stops).collect(),
            Direction::Return => (0..num_stops).rev().collect(),
        };
        let mut running: Option<NaiveDateTime> = None;
        for stop in rows {
            let cell = matrix.get_mut(StopID(stop), JourneyID(j));
            // Chronologically within a stop, arrival precedes departure in
            // either travel direction.
            for value in [&mut cell.arrival_observed, &mut cell.departure_observed] {
                if let Some(t) = value {
                    let corrected = match running {
                        Some(floor) if floor > *t => floor,
                        _ => *t,
                    };
                    running = Some(corrected);
                    *value = Some(corrected);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 7)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    fn record(stop: i64, journey: &str, status: QualityStatus, dep: NaiveDateTime) -> VisitRecord {
        VisitRecord {
            line_id: "l".to_string(),
            line_name: "L".to_string(),
            transporter: "X".to_string(),
            mode: "Bus".to_string(),
            journey: orig::JourneyID(journey.to_string()),
            stop: orig::StopID(stop),
            arrival_planned: None,
            arrival_observed: None,
            arrival_status: status,
            departure_planned: None,
            departure_observed: Some(dep),
            departure_status: status,
        }
    }

    #[test]
    fn dedup_keeps_best_status() {
        let records = vec![
            record(1, "j", QualityStatus::Real, t(8, 0)),
            record(1, "j", QualityStatus::Forecast, t(9, 0)),
        ];
        let normalized = normalize(&records);
        assert_eq!(normalized.stops.len(), 1);
        assert_eq!(
            normalized
                .matrix
                .get(StopID(0), JourneyID(0))
                .departure_observed,
            Some(t(8, 0))
        );
    }

    #[test]
    fn dedup_ties_keep_later_record() {
        let records = vec![
            record(1, "j", QualityStatus::Real, t(8, 0)),
            record(1, "j", QualityStatus::Real, t(9, 0)),
        ];
        let normalized = normalize(&records);
        assert_eq!(
            normalized
                .matrix
                .get(StopID(0), JourneyID(0))
                .departure_observed,
            Some(t(9, 0))
        );
    }

    #[test]
    fn pivot_sorts_stops_and_journeys() {
        let records = vec![
            record(20, "b", QualityStatus::Real, t(8, 10)),
            record(10, "a", QualityStatus::Real, t(8, 0)),
        ];
        let normalized = normalize(&records);
        assert_eq!(normalized.stops, vec![orig::StopID(10), orig::StopID(20)]);
        assert_eq!(
            normalized.journeys,
            vec![
                orig::JourneyID("a".to_string()),
                orig::JourneyID("b".to_string())
            ]
        );
        assert!(normalized.matrix.get(StopID(0), JourneyID(1)).departure_observed.is_none());
        assert_eq!(
            normalized
                .matrix
                .get(StopID(1), JourneyID(1))
                .departure_observed,
            Some(t(8, 10))
        );
    }

    #[test]
    fn outbound_correction_applies_running_max() {
        let mut matrix = TimetableMatrix::new(3, 1);
        matrix.get_mut(StopID(0), JourneyID(0)).departure_observed = Some(t(8, 10));
        // Out of order: earlier than the previous stop
        matrix.get_mut(StopID(1), JourneyID(0)).departure_observed = Some(t(8, 5));
        matrix.get_mut(StopID(2), JourneyID(0)).arrival_observed = Some(t(8, 20));

        correct_observed_times(&mut matrix, &[Direction::Outbound]);

        assert_eq!(
            matrix.get(StopID(1), JourneyID(0)).departure_observed,
            Some(t(8, 10))
        );
        assert_eq!(
            matrix.get(StopID(2), JourneyID(0)).arrival_observed,
            Some(t(8, 20))
        );
    }

    #[test]
    fn return_correction_walks_backwards() {
        let mut matrix = TimetableMatrix::new(3, 1);
        matrix.get_mut(StopID(2), JourneyID(0)).departure_observed = Some(t(8, 0));
        matrix.get_mut(StopID(1), JourneyID(0)).arrival_observed = Some(t(7, 50));
        matrix.get_mut(StopID(0), JourneyID(0)).arrival_observed = Some(t(8, 30));

        correct_observed_times(&mut matrix, &[Direction::Return]);

        // Travelling 2 -> 1 -> 0, the sagging arrival at stop 1 is lifted
        assert_eq!(
            matrix.get(StopID(1), JourneyID(0)).arrival_observed,
            Some(t(8, 0))
        );
        assert_eq!(
            matrix.get(StopID(0), JourneyID(0)).arrival_observed,
            Some(t(8, 30))
        );
        // Scheduled side untouched
        assert!(matrix.get(StopID(1), JourneyID(0)).arrival_planned.is_none());
    }
}
