use anyhow::Result;
use geom::{Distance, Duration, Pt2D};
use serde::Serialize;

use crate::line::SimLine;
use crate::vehicle::{ArrivalCallback, Vehicle, VehicleID};
use crate::SimError;

pub struct SimOptions {
    /// Dispatch two fresh vehicles per line every this many ticks
    pub frequency: u64,
    /// Simulated seconds advanced per tick
    pub seconds_per_step: f64,
    /// Dwell used where a derived line has no observed dwell at a stop
    pub default_dwell: Duration,
    /// Segment duration used where a derived line has no observed pair
    pub fallback_segment: Duration,
    /// Optional cap on the fleet size. Dispatch skips (with a warning) once
    /// the cap would be exceeded; None reproduces the reference behavior of
    /// unbounded growth.
    pub max_vehicles: Option<usize>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            frequency: 50,
            seconds_per_step: 1.0,
            default_dwell: Duration::seconds(10.0),
            fallback_segment: Duration::seconds(60.0),
            max_vehicles: None,
        }
    }
}

/// Advances a fleet of vehicles over one or more lines in discrete ticks.
/// All mutation happens inside `advance`; vehicles are never removed.
pub struct FleetManager {
    lines: Vec<SimLine>,
    vehicles: Vec<Vehicle>,
    tick: u64,
    id_counter: usize,
    options: SimOptions,
    on_arrival: ArrivalCallback,
}

impl FleetManager {
    pub fn new(lines: Vec<SimLine>, options: SimOptions, on_arrival: ArrivalCallback) -> Self {
        Self {
            lines,
            vehicles: Vec::new(),
            tick: 0,
            id_counter: 0,
            options,
            on_arrival,
        }
    }

    /// Runs `ticks` single steps. Every `frequency` ticks (the very first
    /// included), two vehicles per line are dispatched, one from each
    /// terminus. A callback failure aborts mid-tick and propagates.
    pub fn advance(&mut self, ticks: u64) -> Result<(), SimError> {
        for _ in 0..ticks {
            if self.tick % self.options.frequency == 0 {
                self.dispatch();
            }
            let dt = Duration::seconds(self.options.seconds_per_step);
            for vehicle in &mut self.vehicles {
                vehicle.advance(dt, &self.lines[vehicle.line], &mut self.on_arrival)?;
            }
            self.tick += 1;
        }
        Ok(())
    }

    fn dispatch(&mut self) {
        if let Some(cap) = self.options.max_vehicles {
            if self.vehicles.len() + 2 * self.lines.len() > cap {
                warn!(
                    "Vehicle cap {} reached at tick {}; skipping dispatch",
                    cap, self.tick
                );
                return;
            }
        }
        for line_index in 0..self.lines.len() {
            let line = &self.lines[line_index];
            let last = line.num_stops() - 1;
            for (terminus, direction) in [(0, 1), (last, -1)] {
                let id = VehicleID(self.id_counter);
                self.id_counter += 1;
                self.vehicles
                    .push(Vehicle::spawn(id, line_index, line, terminus, direction));
            }
        }
    }

    /// First vehicle within `tolerance` of the position, scanning in vehicle
    /// id order. A documented approximation, not a nearest-neighbor query;
    /// only sound while vehicles are sparse relative to the tolerance.
    pub fn find_for_pickup(&self, pos: Pt2D, tolerance: Distance) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.pos.dist_to(pos) <= tolerance)
    }

    /// The specific vehicle, if it is within `tolerance` of the position.
    pub fn find_for_delivery(
        &self,
        pos: Pt2D,
        vehicle: VehicleID,
        tolerance: Distance,
    ) -> Option<&Vehicle> {
        self.vehicles
            .iter()
            .find(|v| v.id == vehicle && v.pos.dist_to(pos) <= tolerance)
    }

    /// A snapshot row per vehicle.
    pub fn status(&self) -> Vec<VehicleStatus> {
        self.vehicles
            .iter()
            .map(|vehicle| {
                let line = &self.lines[vehicle.line];
                VehicleStatus {
                    id: vehicle.id.0,
                    x: vehicle.pos.x(),
                    y: vehicle.pos.y(),
                    line: line.name.clone(),
                    direction: vehicle.direction,
                    state: vehicle.state.label(),
                    last_stop: line.stops[vehicle.stop_index].name.clone(),
                    next_stop: line.stops[vehicle.next_stop_index()].name.clone(),
                }
            })
            .collect()
    }

    pub fn status_csv(&self) -> Result<String> {
        let mut out = Vec::new();
        {
            let mut writer = csv::Writer::from_writer(&mut out);
            for row in self.status() {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        let out = String::from_utf8(out)?;
        Ok(out)
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn num_vehicles(&self) -> usize {
        self.vehicles.len()
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.iter()
    }
}

#[derive(Serialize)]
pub struct VehicleStatus {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub line: String,
    pub direction: i8,
    pub state: &'static str,
    pub last_stop: String,
    pub next_stop: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::SimStop;
    use crate::vehicle::MotionState;

    fn two_stop_line(name: &str) -> SimLine {
        SimLine::with_times(
            name,
            vec![
                SimStop {
                    name: "a".to_string(),
                    pos: Pt2D::new(0.0, 0.0),
                    dwell: Duration::seconds(2.0),
                },
                SimStop {
                    name: "b".to_string(),
                    pos: Pt2D::new(10.0, 0.0),
                    dwell: Duration::seconds(2.0),
                },
            ],
            vec![Duration::seconds(10.0)],
            vec![Duration::seconds(10.0)],
        )
        .unwrap()
    }

    fn fleet(frequency: u64, lines: Vec<SimLine>) -> FleetManager {
        FleetManager::new(
            lines,
            SimOptions {
                frequency,
                ..SimOptions::default()
            },
            Box::new(|_| Ok(())),
        )
    }

    #[test]
    fn dispatch_two_per_line_per_period() {
        let mut fleet = fleet(5, vec![two_stop_line("L1"), two_stop_line("L2")]);
        for _ in 0..3 {
            fleet.advance(5).unwrap();
        }
        // Dispatches at ticks 0, 5, and 10
        assert_eq!(fleet.num_vehicles(), 12);
        let ids: Vec<usize> = fleet.vehicles().map(|v| v.id.0).collect();
        assert_eq!(ids, (0..12).collect::<Vec<usize>>());
    }

    #[test]
    fn end_to_end_two_stop_scenario() {
        let mut fleet = fleet(1000, vec![two_stop_line("L")]);
        fleet.advance(10).unwrap();

        let status = fleet.status();
        assert_eq!(status.len(), 2);
        // The vehicle dispatched from the first terminus has crossed over
        assert_eq!(status[0].state, "at_stop");
        assert_eq!(status[0].last_stop, "b");
        assert_eq!(status[0].direction, -1);
        // Its counterpart went the other way
        assert_eq!(status[1].last_stop, "a");
        assert_eq!(status[1].direction, 1);

        fleet.advance(2).unwrap();
        let status = fleet.status();
        assert_eq!(status[0].state, "moving");
        assert_eq!(status[0].direction, -1);
        assert_eq!(status[0].next_stop, "a");
    }

    #[test]
    fn vehicle_cap_skips_dispatch() {
        let mut fleet = FleetManager::new(
            vec![two_stop_line("L")],
            SimOptions {
                frequency: 1,
                max_vehicles: Some(4),
                ..SimOptions::default()
            },
            Box::new(|_| Ok(())),
        );
        fleet.advance(10).unwrap();
        assert_eq!(fleet.num_vehicles(), 4);
    }

    #[test]
    fn pickup_and_delivery_lookups() {
        let mut fleet = fleet(1000, vec![two_stop_line("L")]);
        fleet.advance(10).unwrap();

        // Vehicle 0 is at stop b, vehicle 1 at stop a
        let hit = fleet
            .find_for_pickup(Pt2D::new(10.0, 0.05), Distance::meters(0.1))
            .unwrap();
        assert_eq!(hit.id, VehicleID(0));
        assert!(fleet
            .find_for_pickup(Pt2D::new(5.0, 0.0), Distance::meters(0.1))
            .is_none());

        assert!(fleet
            .find_for_delivery(Pt2D::new(0.0, 0.0), VehicleID(1), Distance::meters(0.1))
            .is_some());
        // Right place, wrong vehicle
        assert!(fleet
            .find_for_delivery(Pt2D::new(0.0, 0.0), VehicleID(0), Distance::meters(0.1))
            .is_none());
    }

    #[test]
    fn callback_error_fails_the_tick() {
        let mut fleet = FleetManager::new(
            vec![two_stop_line("L")],
            SimOptions {
                frequency: 1000,
                ..SimOptions::default()
            },
            Box::new(|_| Err(anyhow::anyhow!("downstream refused"))),
        );
        let err = fleet.advance(10).unwrap_err();
        assert!(matches!(err, SimError::Callback { .. }));
    }

    #[test]
    fn status_csv_has_one_row_per_vehicle() {
        let mut fleet = fleet(1000, vec![two_stop_line("L")]);
        fleet.advance(1).unwrap();
        let csv = fleet.status_csv().unwrap();
        // Header plus two vehicles
        assert_eq!(csv.trim_end().lines().count(), 3);
        assert!(csv.starts_with("id,x,y,line,direction,state,last_stop,next_stop"));
    }

    #[test]
    fn vehicles_keep_state_across_advances() {
        let mut fleet = fleet(1000, vec![two_stop_line("L")]);
        for _ in 0..24 {
            fleet.advance(1).unwrap();
        }
        // A full out-and-back: the first vehicle is underway again from its
        // spawn terminus
        let vehicle = fleet.vehicles().next().unwrap();
        assert_eq!(vehicle.state, MotionState::Moving);
        assert_eq!(vehicle.direction, 1);
        assert_eq!(vehicle.stop_index, 0);
    }
}
