use std::collections::BTreeMap;

use abstutil::Timer;
use geom::{Bounds, Distance, Pt2D};

use crate::ids::{orig, JourneyID, VariantID};
use crate::normalize::{self, Normalized};
use crate::records::{StopRecord, VisitRecord};
use crate::routes::{self, Direction, Journey, RouteVariant};
use crate::timetable::TimetableMatrix;
use crate::topology::{self, VisitOrder};
use crate::ModelError;

/// How far one line's pipeline has run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Raw records ingested, nothing derived yet
    Ingested,
    /// Deduplicated and pivoted into the dense timetable
    Normalized,
    /// Stops carry distances and sit in canonical order
    Ordered,
    /// Variants classified, pruned, and assembled into a LineModel
    Built,
}

pub struct BuildOptions {
    /// Replace out-of-order observed timestamps with a running maximum along
    /// each journey's direction.
    pub correct_times: bool,
    /// Variants sharing less than this fraction of the primary variant's
    /// stops are pruned, along with their journeys.
    pub prune_threshold: f64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            correct_times: true,
            prune_threshold: 0.25,
        }
    }
}

/// A stop in canonical order. The distance is assigned once during
/// reconstruction and never mutated afterwards; None means no observed
/// visiting order covered the stop.
#[derive(Clone, Debug)]
pub struct Stop {
    pub number: orig::StopID,
    pub name: String,
    pub pos: Pt2D,
    pub distance: Option<Distance>,
}

/// Runs one line's records through normalization, reconstruction, and
/// classification. Each step requires the previous one; pass `solve = true`
/// to run missing prerequisites implicitly.
pub struct LineBuilder {
    id: String,
    name: String,
    records: Vec<VisitRecord>,
    stop_info: BTreeMap<orig::StopID, (String, Pt2D)>,
    options: BuildOptions,

    normalized: Option<Normalized>,
    ordered: Option<Ordered>,
    built: Option<LineModel>,
}

struct Ordered {
    stops: Vec<Stop>,
    journeys: Vec<orig::JourneyID>,
    matrix: TimetableMatrix,
    orders: Vec<VisitOrder>,
}

impl LineBuilder {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        records: Vec<VisitRecord>,
        stops: &[StopRecord],
        options: BuildOptions,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            records,
            stop_info: stops
                .iter()
                .map(|s| (s.number, (s.name.clone(), s.pos)))
                .collect(),
            options,
            normalized: None,
            ordered: None,
            built: None,
        }
    }

    pub fn stage(&self) -> Stage {
        if self.built.is_some() {
            Stage::Built
        } else if self.ordered.is_some() {
            Stage::Ordered
        } else if self.normalized.is_some() {
            Stage::Normalized
        } else {
            Stage::Ingested
        }
    }

    pub fn normalize(&mut self) {
        if self.normalized.is_none() {
            self.normalized = Some(normalize::normalize(&self.records));
        }
    }

    pub fn reconstruct(&mut self, solve: bool) -> Result<(), ModelError> {
        if self.ordered.is_some() {
            return Ok(());
        }
        if self.normalized.is_none() {
            if solve {
                self.normalize();
            } else {
                return Err(ModelError::StageNotReady {
                    needed: Stage::Normalized,
                    actual: self.stage(),
                });
            }
        }
        let normalized = self.normalized.as_ref().unwrap();

        let mut stops = Vec::new();
        for number in &normalized.stops {
            match self.stop_info.get(number) {
                Some((name, pos)) => stops.push(Stop {
                    number: *number,
                    name: name.clone(),
                    pos: *pos,
                    distance: None,
                }),
                None => {
                    return Err(ModelError::MalformedInput(format!(
                        "stop {:?} is missing from the stop table",
                        number
                    )));
                }
            }
        }

        let orders: Vec<VisitOrder> = (0..normalized.matrix.num_journeys())
            .map(|j| topology::visit_order(&normalized.matrix, JourneyID(j)))
            .collect();
        let positions: Vec<Pt2D> = stops.iter().map(|s| s.pos).collect();
        let resolved = topology::resolve_distances(&positions, &orders);
        for (stop, distance) in stops.iter_mut().zip(resolved.distances.iter()) {
            stop.distance = *distance;
        }
        if !resolved.unresolved.is_empty() {
            warn!(
                "Still {} distance values missing for line {} ({}): {:?}",
                resolved.unresolved.len(),
                self.name,
                self.id,
                resolved
                    .unresolved
                    .iter()
                    .map(|stop| stops[*stop].number)
                    .collect::<Vec<_>>()
            );
        }

        // Canonical order: by distance, unresolved stops after the resolved
        // ones in their existing order
        let mut perm: Vec<usize> = (0..stops.len()).collect();
        perm.sort_by(|a, b| match (stops[*a].distance, stops[*b].distance) {
            (Some(x), Some(y)) => x.inner_meters().total_cmp(&y.inner_meters()),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        let matrix = normalized.matrix.reorder_stops(&perm);
        let stops: Vec<Stop> = perm.iter().map(|old| stops[*old].clone()).collect();
        let orders: Vec<VisitOrder> = orders
            .iter()
            .map(|order| perm.iter().map(|old| order[*old]).collect())
            .collect();

        self.ordered = Some(Ordered {
            stops,
            journeys: normalized.journeys.clone(),
            matrix,
            orders,
        });
        Ok(())
    }

    pub fn classify(&mut self, solve: bool) -> Result<(), ModelError> {
        if self.built.is_some() {
            return Ok(());
        }
        if self.ordered.is_none() {
            if solve {
                self.reconstruct(true)?;
            } else {
                return Err(ModelError::StageNotReady {
                    needed: Stage::Ordered,
                    actual: self.stage(),
                });
            }
        }
        let Ordered {
            stops,
            journeys,
            matrix,
            orders,
        } = self.ordered.take().unwrap();

        let directions: Vec<Direction> = (0..matrix.num_journeys())
            .map(|j| routes::journey_direction(&matrix, JourneyID(j)))
            .collect();
        let (variants, assignment) = routes::group_variants(&orders, &directions);

        let mut journey_rows = Vec::new();
        for (j, id) in journeys.iter().enumerate() {
            let journey = JourneyID(j);
            let first_observed = matrix.journey_first_observed(journey);
            let last_observed = matrix.journey_last_observed(journey);
            journey_rows.push(Journey {
                id: id.clone(),
                variant: assignment[j],
                direction: directions[j],
                num_stops: orders[j].iter().filter(|rank| **rank >= 0).count(),
                start_stop: first_observed.map(|(stop, _)| stops[stop.0].number),
                start_time_planned: matrix.journey_first_planned(journey).map(|(_, t)| t),
                start_time_observed: first_observed.map(|(_, t)| t),
                end_stop: last_observed.map(|(stop, _)| stops[stop.0].number),
                end_time_planned: matrix.journey_last_planned(journey).map(|(_, t)| t),
                end_time_observed: last_observed.map(|(_, t)| t),
            });
        }

        // Journeys in planned departure order, unplanned ones last
        let mut jperm: Vec<usize> = (0..journey_rows.len()).collect();
        jperm.sort_by(|a, b| {
            match (
                journey_rows[*a].start_time_planned,
                journey_rows[*b].start_time_planned,
            ) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
        let mut matrix = matrix.reorder_journeys(&jperm);
        let journey_rows: Vec<Journey> = jperm.iter().map(|old| journey_rows[*old].clone()).collect();
        let directions: Vec<Direction> = jperm.iter().map(|old| directions[*old]).collect();
        let assignment: Vec<VariantID> = jperm.iter().map(|old| assignment[*old]).collect();

        if self.options.correct_times {
            normalize::correct_observed_times(&mut matrix, &directions);
        }

        let outcome = routes::prune(
            variants,
            &assignment,
            stops.len(),
            self.options.prune_threshold,
        );
        let keep_journeys = outcome.keep_journeys;
        let keep_stops = outcome.keep_stops;
        let dropped: Vec<&Journey> = journey_rows
            .iter()
            .zip(keep_journeys.iter())
            .filter_map(|(row, keep)| if *keep { None } else { Some(row) })
            .collect();
        if !dropped.is_empty() {
            info!(
                "Consequently, dropping journeys {}",
                dropped
                    .iter()
                    .map(|row| row.id.0.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let matrix = matrix.filtered(&keep_stops, &keep_journeys);
        let stops: Vec<Stop> = stops
            .into_iter()
            .zip(keep_stops.iter())
            .filter_map(|(stop, keep)| if *keep { Some(stop) } else { None })
            .collect();
        let journey_rows: Vec<Journey> = journey_rows
            .into_iter()
            .zip(keep_journeys.iter())
            .filter_map(|(row, keep)| if *keep { Some(row) } else { None })
            .collect();
        let variants: Vec<RouteVariant> = outcome
            .variants
            .into_iter()
            .map(|mut variant| {
                variant.mask = variant
                    .mask
                    .iter()
                    .zip(keep_stops.iter())
                    .filter_map(|(visits, keep)| if *keep { Some(*visits) } else { None })
                    .collect();
                variant
            })
            .collect();

        self.built = Some(LineModel {
            id: self.id.clone(),
            name: self.name.clone(),
            stops,
            variants,
            journeys: journey_rows,
            timetable: matrix,
        });
        Ok(())
    }

    pub fn model(&self) -> Result<&LineModel, ModelError> {
        match self.built {
            Some(ref model) => Ok(model),
            None => Err(ModelError::StageNotReady {
                needed: Stage::Built,
                actual: self.stage(),
            }),
        }
    }

    /// Runs all remaining stages and hands over the finished model.
    pub fn build(mut self, timer: &mut Timer) -> Result<LineModel, ModelError> {
        timer.start(format!("build line {} ({})", self.name, self.id));
        self.normalize();
        self.reconstruct(true)?;
        self.classify(true)?;
        timer.stop(format!("build line {} ({})", self.name, self.id));
        Ok(self.built.unwrap())
    }
}

/// The finished line: canonical stops, route variants, journeys, and the
/// pruned timetable. Read-only from here on.
pub struct LineModel {
    pub id: String,
    pub name: String,
    pub stops: Vec<Stop>,
    pub variants: Vec<RouteVariant>,
    pub journeys: Vec<Journey>,
    pub timetable: TimetableMatrix,
}

impl LineModel {
    /// The stop closest to `pt` by straight-line distance; ties go to the
    /// lowest stop index.
    pub fn nearest_stop(&self, pt: Pt2D) -> &Stop {
        let mut best = &self.stops[0];
        let mut best_dist = pt.dist_to(best.pos);
        for stop in &self.stops[1..] {
            let dist = pt.dist_to(stop.pos);
            if dist < best_dist {
                best = stop;
                best_dist = dist;
            }
        }
        best
    }

    pub fn nearest_stops(&self, points: &[Pt2D]) -> Vec<Pt2D> {
        points.iter().map(|pt| self.nearest_stop(*pt).pos).collect()
    }

    pub fn min_max_coords(&self) -> Bounds {
        let mut bounds = Bounds::new();
        for stop in &self.stops {
            bounds.update(stop.pos);
        }
        bounds
    }

    /// The bounding box, padded on every side.
    pub fn area(&self, margin: Distance) -> Bounds {
        let mut bounds = self.min_max_coords();
        bounds.min_x -= margin.inner_meters();
        bounds.min_y -= margin.inner_meters();
        bounds.max_x += margin.inner_meters();
        bounds.max_y += margin.inner_meters();
        bounds
    }

    /// The most frequently served variant.
    pub fn primary_variant(&self) -> &RouteVariant {
        &self.variants[0]
    }

    pub fn variant(&self, id: VariantID) -> Option<&RouteVariant> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// Stops reconstruction could not place; they sit at the end of the stop
    /// list.
    pub fn unresolved_stops(&self) -> Vec<&Stop> {
        self.stops.iter().filter(|s| s.distance.is_none()).collect()
    }

    /// The stops a variant serves, in canonical order.
    pub fn variant_stops(&self, variant: &RouteVariant) -> Vec<&Stop> {
        self.stops
            .iter()
            .zip(variant.mask.iter())
            .filter_map(|(stop, visits)| if *visits { Some(stop) } else { None })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::records::QualityStatus;

    fn t(min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 7)
            .unwrap()
            .and_hms_opt(8, min, 0)
            .unwrap()
    }

    fn stop_records() -> Vec<StopRecord> {
        vec![
            StopRecord {
                number: orig::StopID(1),
                name: "Alpha".to_string(),
                pos: Pt2D::new(0.0, 0.0),
            },
            StopRecord {
                number: orig::StopID(2),
                name: "Bravo".to_string(),
                pos: Pt2D::new(100.0, 0.0),
            },
            StopRecord {
                number: orig::StopID(3),
                name: "Charlie".to_string(),
                pos: Pt2D::new(200.0, 0.0),
            },
        ]
    }

    fn visit(journey: &str, stop: i64, minute: u32) -> VisitRecord {
        VisitRecord {
            line_id: "85:764:705".to_string(),
            line_name: "705".to_string(),
            transporter: "MBC".to_string(),
            mode: "Bus".to_string(),
            journey: orig::JourneyID(journey.to_string()),
            stop: orig::StopID(stop),
            arrival_planned: Some(t(minute)),
            arrival_observed: Some(t(minute)),
            arrival_status: QualityStatus::Real,
            departure_planned: Some(t(minute + 1)),
            departure_observed: Some(t(minute + 1)),
            departure_status: QualityStatus::Real,
        }
    }

    fn outbound_records(journey: &str, offset: u32) -> Vec<VisitRecord> {
        vec![
            visit(journey, 1, offset),
            visit(journey, 2, offset + 5),
            visit(journey, 3, offset + 10),
        ]
    }

    fn builder(records: Vec<VisitRecord>) -> LineBuilder {
        LineBuilder::new(
            "85:764:705",
            "705",
            records,
            &stop_records(),
            BuildOptions::default(),
        )
    }

    #[test]
    fn stage_gating() {
        let mut b = builder(outbound_records("j1", 0));
        assert_eq!(b.stage(), Stage::Ingested);
        match b.reconstruct(false) {
            Err(ModelError::StageNotReady { needed, actual }) => {
                assert_eq!(needed, Stage::Normalized);
                assert_eq!(actual, Stage::Ingested);
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert!(b.model().is_err());

        // solve = true runs everything
        assert!(b.classify(true).is_ok());
        assert_eq!(b.stage(), Stage::Built);
        assert!(b.model().is_ok());
    }

    #[test]
    fn build_recovers_order_and_distance() {
        let mut records = outbound_records("j1", 0);
        records.extend(outbound_records("j2", 30));
        let model = builder(records)
            .build(&mut Timer::throwaway())
            .unwrap();

        let names: Vec<&str> = model.stops.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Bravo", "Charlie"]);
        let meters: Vec<f64> = model
            .stops
            .iter()
            .map(|s| s.distance.unwrap().inner_meters())
            .collect();
        assert_eq!(meters, vec![0.0, 100.0, 200.0]);
        assert_eq!(model.variants.len(), 1);
        assert_eq!(model.variants[0].count, 2);
        assert_eq!(model.journeys.len(), 2);
        assert!(model
            .journeys
            .iter()
            .all(|j| j.direction == Direction::Outbound));
        assert!(model.unresolved_stops().is_empty());
    }

    #[test]
    fn journeys_sorted_by_planned_start() {
        let mut records = outbound_records("late", 30);
        records.extend(outbound_records("early", 0));
        let model = builder(records)
            .build(&mut Timer::throwaway())
            .unwrap();
        assert_eq!(model.journeys[0].id.0, "early");
        assert_eq!(model.journeys[1].id.0, "late");
        assert_eq!(model.journeys[0].start_time_planned, Some(t(0)));
        assert_eq!(model.journeys[0].start_stop, Some(orig::StopID(1)));
        assert_eq!(model.journeys[0].end_stop, Some(orig::StopID(3)));
    }

    #[test]
    fn nearest_stop_ties_go_to_lowest_index() {
        let mut records = outbound_records("j1", 0);
        records.extend(outbound_records("j2", 30));
        let model = builder(records)
            .build(&mut Timer::throwaway())
            .unwrap();

        // Exactly between Alpha and Bravo
        let hits = model.nearest_stops(&[Pt2D::new(50.0, 10.0), Pt2D::new(199.0, 0.0)]);
        assert_eq!(hits[0], Pt2D::new(0.0, 0.0));
        assert_eq!(hits[1], Pt2D::new(200.0, 0.0));
    }

    #[test]
    fn min_max_coords_covers_all_stops() {
        let mut records = outbound_records("j1", 0);
        records.extend(outbound_records("j2", 30));
        let model = builder(records)
            .build(&mut Timer::throwaway())
            .unwrap();
        let bounds = model.min_max_coords();
        assert_eq!(bounds.min_x, 0.0);
        assert_eq!(bounds.max_x, 200.0);

        let padded = model.area(Distance::meters(500.0));
        assert_eq!(padded.min_x, -500.0);
        assert_eq!(padded.max_x, 700.0);
    }

    #[test]
    fn rare_disjoint_variant_is_pruned() {
        let mut records = Vec::new();
        for journey in ["j1", "j2", "j3"] {
            records.extend(outbound_records(journey, 0));
        }
        // One journey only touches Charlie plus a stop nobody else visits
        let extra_stop = StopRecord {
            number: orig::StopID(9),
            name: "Delta".to_string(),
            pos: Pt2D::new(500.0, 500.0),
        };
        records.push(visit("odd", 9, 50));
        records.push(visit("odd", 3, 55));
        let mut stops = stop_records();
        stops.push(extra_stop);

        let model = LineBuilder::new(
            "85:764:705",
            "705",
            records,
            &stops,
            BuildOptions {
                correct_times: true,
                prune_threshold: 0.5,
            },
        )
        .build(&mut Timer::throwaway())
        .unwrap();

        assert_eq!(model.variants.len(), 1);
        assert_eq!(model.journeys.len(), 3);
        assert!(model.journeys.iter().all(|j| j.id.0 != "odd"));
        // Delta lost its only variant
        assert!(model.stops.iter().all(|s| s.name != "Delta"));
        assert_eq!(model.timetable.num_journeys(), 3);
        assert_eq!(model.timetable.num_stops(), 3);
    }
}
