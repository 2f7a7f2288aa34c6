use chrono::NaiveDateTime;

use crate::ids::{JourneyID, StopID};

/// The four timestamps a journey can carry at one stop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VisitTimes {
    pub arrival_planned: Option<NaiveDateTime>,
    pub arrival_observed: Option<NaiveDateTime>,
    pub departure_planned: Option<NaiveDateTime>,
    pub departure_observed: Option<NaiveDateTime>,
}

impl VisitTimes {
    /// The earliest reliable observed event: arrival if present, else
    /// departure.
    pub fn first_observed(&self) -> Option<NaiveDateTime> {
        self.arrival_observed.or(self.departure_observed)
    }

    pub fn visited(&self) -> bool {
        self.first_observed().is_some()
    }

    fn planned(&self) -> impl Iterator<Item = NaiveDateTime> {
        self.arrival_planned.into_iter().chain(self.departure_planned)
    }

    fn observed(&self) -> impl Iterator<Item = NaiveDateTime> {
        self.arrival_observed
            .into_iter()
            .chain(self.departure_observed)
    }
}

/// Dense (stop x journey) table of visit times. Row order follows the stop
/// list it was built against; once reconstruction has run, that is the
/// canonical distance order.
#[derive(Clone)]
pub struct TimetableMatrix {
    num_journeys: usize,
    // Row-major: cells[stop * num_journeys + journey]
    cells: Vec<VisitTimes>,
}

impl TimetableMatrix {
    pub fn new(num_stops: usize, num_journeys: usize) -> Self {
        Self {
            num_journeys,
            cells: vec![VisitTimes::default(); num_stops * num_journeys],
        }
    }

    pub fn num_stops(&self) -> usize {
        if self.num_journeys == 0 {
            0
        } else {
            self.cells.len() / self.num_journeys
        }
    }

    pub fn num_journeys(&self) -> usize {
        self.num_journeys
    }

    pub fn get(&self, stop: StopID, journey: JourneyID) -> &VisitTimes {
        &self.cells[stop.0 * self.num_journeys + journey.0]
    }

    pub fn get_mut(&mut self, stop: StopID, journey: JourneyID) -> &mut VisitTimes {
        &mut self.cells[stop.0 * self.num_journeys + journey.0]
    }

    /// Earliest observed event of a journey, with the stop it happened at.
    pub fn journey_first_observed(&self, journey: JourneyID) -> Option<(StopID, NaiveDateTime)> {
        self.journey_extreme(journey, |t| t.observed(), true)
    }

    pub fn journey_last_observed(&self, journey: JourneyID) -> Option<(StopID, NaiveDateTime)> {
        self.journey_extreme(journey, |t| t.observed(), false)
    }

    pub fn journey_first_planned(&self, journey: JourneyID) -> Option<(StopID, NaiveDateTime)> {
        self.journey_extreme(journey, |t| t.planned(), true)
    }

    pub fn journey_last_planned(&self, journey: JourneyID) -> Option<(StopID, NaiveDateTime)> {
        self.journey_extreme(journey, |t| t.planned(), false)
    }

    fn journey_extreme<I: Iterator<Item = NaiveDateTime>>(
        &self,
        journey: JourneyID,
        events: impl Fn(&VisitTimes) -> I,
        earliest: bool,
    ) -> Option<(StopID, NaiveDateTime)> {
        let mut result: Option<(StopID, NaiveDateTime)> = None;
        for stop in 0..self.num_stops() {
            for t in events(self.get(StopID(stop), journey)) {
                let better = match result {
                    None => true,
                    Some((_, best)) => {
                        if earliest {
                            t < best
                        } else {
                            t > best
                        }
                    }
                };
                if better {
                    result = Some((StopID(stop), t));
                }
            }
        }
        result
    }

    /// Rebuilds with row i taken from old row `order[i]`.
    pub fn reorder_stops(&self, order: &[usize]) -> TimetableMatrix {
        let mut out = TimetableMatrix::new(order.len(), self.num_journeys);
        for (new_stop, old_stop) in order.iter().enumerate() {
            for j in 0..self.num_journeys {
                *out.get_mut(StopID(new_stop), JourneyID(j)) =
                    *self.get(StopID(*old_stop), JourneyID(j));
            }
        }
        out
    }

    /// Rebuilds with column j taken from old column `order[j]`.
    pub fn reorder_journeys(&self, order: &[usize]) -> TimetableMatrix {
        let num_stops = self.num_stops();
        let mut out = TimetableMatrix::new(num_stops, order.len());
        for (new_journey, old_journey) in order.iter().enumerate() {
            for stop in 0..num_stops {
                *out.get_mut(StopID(stop), JourneyID(new_journey)) =
                    *self.get(StopID(stop), JourneyID(*old_journey));
            }
        }
        out
    }

    /// Keeps only the flagged rows and columns, preserving order.
    pub fn filtered(&self, keep_stops: &[bool], keep_journeys: &[bool]) -> TimetableMatrix {
        let new_stops = keep_stops.iter().filter(|k| **k).count();
        let new_journeys = keep_journeys.iter().filter(|k| **k).count();
        let mut out = TimetableMatrix::new(new_stops, new_journeys);
        let mut out_stop = 0;
        for (stop, keep_stop) in keep_stops.iter().enumerate() {
            if !keep_stop {
                continue;
            }
            let mut out_journey = 0;
            for (journey, keep_journey) in keep_journeys.iter().enumerate() {
                if !keep_journey {
                    continue;
                }
                *out.get_mut(StopID(out_stop), JourneyID(out_journey)) =
                    *self.get(StopID(stop), JourneyID(journey));
                out_journey += 1;
            }
            out_stop += 1;
        }
        out
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

    #[test]
    fn first_observed_prefers_arrival() {
        let times = VisitTimes {
            arrival_observed: Some(t(8, 0)),
            departure_observed: Some(t(7, 0)),
            ..Default::default()
        };
        assert_eq!(times.first_observed(), Some(t(8, 0)));

        let times = VisitTimes {
            departure_observed: Some(t(7, 0)),
            ..Default::default()
        };
        assert_eq!(times.first_observed(), Some(t(7, 0)));
    }

    #[test]
    fn journey_extremes() {
        let mut matrix = TimetableMatrix::new(3, 1);
        matrix.get_mut(StopID(0), JourneyID(0)).departure_observed = Some(t(8, 0));
        matrix.get_mut(StopID(1), JourneyID(0)).arrival_observed = Some(t(8, 5));
        matrix.get_mut(StopID(2), JourneyID(0)).arrival_observed = Some(t(8, 10));

        assert_eq!(
            matrix.journey_first_observed(JourneyID(0)),
            Some((StopID(0), t(8, 0)))
        );
        assert_eq!(
            matrix.journey_last_observed(JourneyID(0)),
            Some((StopID(2), t(8, 10)))
        );
        assert_eq!(matrix.journey_first_planned(JourneyID(0)), None);
    }

    #[test]
    fn reorder_and_filter() {
        let mut matrix = TimetableMatrix::new(2, 2);
        matrix.get_mut(StopID(0), JourneyID(1)).arrival_observed = Some(t(9, 0));

        let swapped = matrix.reorder_stops(&[1, 0]);
        assert_eq!(
            swapped.get(StopID(1), JourneyID(1)).arrival_observed,
            Some(t(9, 0))
        );

        let only = matrix.filtered(&[true, false], &[false, true]);
        assert_eq!(only.num_stops(), 1);
        assert_eq!(only.num_journeys(), 1);
        assert_eq!(
            only.get(StopID(0), JourneyID(0)).arrival_observed,
            Some(t(9, 0))
        );
    }
}
