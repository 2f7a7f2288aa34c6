use anyhow::Result;
use geom::{Duration, Pt2D, Speed};
use model::{Direction, JourneyID, LineModel, StopID};

use crate::fleet::SimOptions;

/// How a vehicle progresses between stops.
#[derive(Clone, Copy, Debug)]
pub enum Pace {
    /// Fixed per-segment travel durations, one set per direction
    Timed,
    /// Constant speed over the remaining straight-line distance
    Speed(Speed),
}

#[derive(Clone, Debug)]
pub struct SimStop {
    pub name: String,
    pub pos: Pt2D,
    /// How long vehicles hold here before moving on
    pub dwell: Duration,
}

/// The simulator's route table for one line: stops in canonical order plus
/// travel durations per segment and direction.
pub struct SimLine {
    pub name: String,
    pub stops: Vec<SimStop>,
    // Both indexed by the lower stop index of the segment
    forward: Vec<Duration>,
    backward: Vec<Duration>,
    pub pace: Pace,
}

impl SimLine {
    /// A time-scaled line. `forward[i]` is the travel duration from stop i
    /// to stop i+1; `backward[i]` the duration from stop i+1 back to stop i.
    pub fn with_times(
        name: impl Into<String>,
        stops: Vec<SimStop>,
        forward: Vec<Duration>,
        backward: Vec<Duration>,
    ) -> Result<Self> {
        let name = name.into();
        validate_stops(&name, &stops)?;
        if forward.len() != stops.len() - 1 || backward.len() != stops.len() - 1 {
            bail!(
                "line {} has {} stops but {} forward / {} backward segment durations",
                name,
                stops.len(),
                forward.len(),
                backward.len()
            );
        }
        if forward.iter().chain(&backward).any(|d| *d <= Duration::ZERO) {
            bail!("line {} has a non-positive segment duration", name);
        }
        Ok(Self {
            name,
            stops,
            forward,
            backward,
            pace: Pace::Timed,
        })
    }

    /// A distance-scaled line moving at constant speed.
    pub fn with_speed(name: impl Into<String>, stops: Vec<SimStop>, speed: Speed) -> Result<Self> {
        let name = name.into();
        validate_stops(&name, &stops)?;
        if speed <= Speed::ZERO {
            bail!("line {} has a non-positive speed", name);
        }
        Ok(Self {
            name,
            stops,
            forward: Vec::new(),
            backward: Vec::new(),
            pace: Pace::Speed(speed),
        })
    }

    /// Derives the route table from a reconstructed line: per-stop dwell and
    /// per-direction segment durations averaged over the observed journeys,
    /// falling back to the configured defaults where the timetable is
    /// silent.
    pub fn from_model(model: &LineModel, options: &SimOptions) -> Result<Self> {
        let timetable = &model.timetable;
        let mut stops = Vec::new();
        for (idx, stop) in model.stops.iter().enumerate() {
            let mut dwells = Vec::new();
            for j in 0..timetable.num_journeys() {
                let times = timetable.get(StopID(idx), JourneyID(j));
                if let (Some(arrival), Some(departure)) =
                    (times.arrival_observed, times.departure_observed)
                {
                    if departure >= arrival {
                        dwells.push((departure - arrival).num_seconds() as f64);
                    }
                }
            }
            stops.push(SimStop {
                name: stop.name.clone(),
                pos: stop.pos,
                dwell: mean_duration(&dwells).unwrap_or(options.default_dwell),
            });
        }

        let mut forward = Vec::new();
        let mut backward = Vec::new();
        let mut fallbacks = 0;
        for i in 0..stops.len().saturating_sub(1) {
            let mut out_deltas = Vec::new();
            let mut back_deltas = Vec::new();
            for (j, journey) in model.journeys.iter().enumerate() {
                let lower = timetable.get(StopID(i), JourneyID(j));
                let upper = timetable.get(StopID(i + 1), JourneyID(j));
                match journey.direction {
                    Direction::Outbound => {
                        if let (Some(dep), Some(arr)) =
                            (lower.departure_observed, upper.arrival_observed)
                        {
                            if arr > dep {
                                out_deltas.push((arr - dep).num_seconds() as f64);
                            }
                        }
                    }
                    Direction::Return => {
                        if let (Some(dep), Some(arr)) =
                            (upper.departure_observed, lower.arrival_observed)
                        {
                            if arr > dep {
                                back_deltas.push((arr - dep).num_seconds() as f64);
                            }
                        }
                    }
                }
            }
            forward.push(mean_duration(&out_deltas).unwrap_or_else(|| {
                fallbacks += 1;
                options.fallback_segment
            }));
            backward.push(mean_duration(&back_deltas).unwrap_or_else(|| {
                fallbacks += 1;
                options.fallback_segment
            }));
        }
        if fallbacks > 0 {
            warn!(
                "Line {} has {} segment durations with no observed journey pair; using the fallback",
                model.name, fallbacks
            );
        }

        Self::with_times(model.name.clone(), stops, forward, backward)
    }

    pub(crate) fn travel_time(&self, from: usize, direction: i8) -> Duration {
        if direction > 0 {
            self.forward[from]
        } else {
            self.backward[from - 1]
        }
    }

    pub fn num_stops(&self) -> usize {
        self.stops.len()
    }

    pub fn is_terminus(&self, stop_index: usize) -> bool {
        stop_index == 0 || stop_index == self.stops.len() - 1
    }
}

fn validate_stops(name: &str, stops: &[SimStop]) -> Result<()> {
    if stops.len() < 2 {
        bail!("line {} needs at least 2 stops, has {}", name, stops.len());
    }
    Ok(())
}

fn mean_duration(seconds: &[f64]) -> Option<Duration> {
    if seconds.is_empty() {
        None
    } else {
        Some(Duration::seconds(
            seconds.iter().sum::<f64>() / seconds.len() as f64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use model::{orig, Journey, TimetableMatrix, VariantID};

    fn stop(name: &str, x: f64, y: f64, dwell: f64) -> SimStop {
        SimStop {
            name: name.to_string(),
            pos: Pt2D::new(x, y),
            dwell: Duration::seconds(dwell),
        }
    }

    fn t(min: u32, sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 7)
            .unwrap()
            .and_hms_opt(8, min, sec)
            .unwrap()
    }

    #[test]
    fn rejects_degenerate_lines() {
        assert!(SimLine::with_times("x", vec![stop("a", 0.0, 0.0, 1.0)], vec![], vec![]).is_err());
        assert!(SimLine::with_times(
            "x",
            vec![stop("a", 0.0, 0.0, 1.0), stop("b", 1.0, 0.0, 1.0)],
            vec![Duration::seconds(5.0), Duration::seconds(5.0)],
            vec![Duration::seconds(5.0)],
        )
        .is_err());
        assert!(SimLine::with_times(
            "x",
            vec![stop("a", 0.0, 0.0, 1.0), stop("b", 1.0, 0.0, 1.0)],
            vec![Duration::ZERO],
            vec![Duration::seconds(5.0)],
        )
        .is_err());
    }

    #[test]
    fn travel_time_per_direction() {
        let line = SimLine::with_times(
            "x",
            vec![
                stop("a", 0.0, 0.0, 1.0),
                stop("b", 1.0, 0.0, 1.0),
                stop("c", 2.0, 0.0, 1.0),
            ],
            vec![Duration::seconds(10.0), Duration::seconds(20.0)],
            vec![Duration::seconds(11.0), Duration::seconds(21.0)],
        )
        .unwrap();
        assert_eq!(line.travel_time(0, 1), Duration::seconds(10.0));
        assert_eq!(line.travel_time(1, 1), Duration::seconds(20.0));
        assert_eq!(line.travel_time(2, -1), Duration::seconds(21.0));
        assert_eq!(line.travel_time(1, -1), Duration::seconds(11.0));
        assert!(line.is_terminus(0));
        assert!(line.is_terminus(2));
        assert!(!line.is_terminus(1));
    }

    #[test]
    fn from_model_averages_observed_times() {
        let mut timetable = TimetableMatrix::new(2, 2);
        // Outbound journey: dwell 10s at stop 0, 30s travel to stop 1
        let cell = timetable.get_mut(StopID(0), JourneyID(0));
        cell.arrival_observed = Some(t(0, 0));
        cell.departure_observed = Some(t(0, 10));
        timetable.get_mut(StopID(1), JourneyID(0)).arrival_observed = Some(t(0, 40));
        // Return journey: 50s travel from stop 1 to stop 0
        timetable.get_mut(StopID(1), JourneyID(1)).departure_observed = Some(t(5, 0));
        timetable.get_mut(StopID(0), JourneyID(1)).arrival_observed = Some(t(5, 50));

        let journey = |id: &str, direction| Journey {
            id: orig::JourneyID(id.to_string()),
            variant: VariantID(0),
            direction,
            num_stops: 2,
            start_stop: None,
            start_time_planned: None,
            start_time_observed: None,
            end_stop: None,
            end_time_planned: None,
            end_time_observed: None,
        };
        let line_model = LineModel {
            id: "l".to_string(),
            name: "L".to_string(),
            stops: vec![
                model::Stop {
                    number: orig::StopID(1),
                    name: "a".to_string(),
                    pos: Pt2D::new(0.0, 0.0),
                    distance: Some(geom::Distance::ZERO),
                },
                model::Stop {
                    number: orig::StopID(2),
                    name: "b".to_string(),
                    pos: Pt2D::new(100.0, 0.0),
                    distance: Some(geom::Distance::meters(100.0)),
                },
            ],
            variants: Vec::new(),
            journeys: vec![
                journey("out", Direction::Outbound),
                journey("back", Direction::Return),
            ],
            timetable,
        };

        let line = SimLine::from_model(&line_model, &SimOptions::default()).unwrap();
        assert_eq!(line.stops[0].dwell, Duration::seconds(10.0));
        // No observed dwell at stop 1: the default applies
        assert_eq!(line.stops[1].dwell, SimOptions::default().default_dwell);
        assert_eq!(line.travel_time(0, 1), Duration::seconds(30.0));
        assert_eq!(line.travel_time(1, -1), Duration::seconds(50.0));
    }
}
