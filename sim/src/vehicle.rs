use anyhow::Result;
use geom::{Duration, Pt2D};

use crate::line::{Pace, SimLine, SimStop};
use crate::SimError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionState {
    AtStop,
    Moving,
}

impl MotionState {
    pub fn label(self) -> &'static str {
        match self {
            MotionState::AtStop => "at_stop",
            MotionState::Moving => "moving",
        }
    }
}

/// Assigned monotonically by the fleet and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VehicleID(pub usize);

/// Handed to the arrival callback, synchronously, at the moment a vehicle
/// snaps to a stop.
pub struct Arrival<'a> {
    pub vehicle: VehicleID,
    pub line: &'a str,
    pub stop_index: usize,
    pub stop: &'a SimStop,
}

pub type ArrivalCallback = Box<dyn FnMut(Arrival) -> Result<()>>;

pub struct Vehicle {
    pub id: VehicleID,
    pub(crate) line: usize,
    pub stop_index: usize,
    /// +1 towards higher stop indices, -1 towards lower ones
    pub direction: i8,
    pub pos: Pt2D,
    pub state: MotionState,
    dwell_elapsed: Duration,
    segment_elapsed: Duration,
}

impl Vehicle {
    /// Spawns at a terminus, already underway: the spawn stop's dwell is not
    /// served.
    pub(crate) fn spawn(
        id: VehicleID,
        line_index: usize,
        line: &SimLine,
        terminus: usize,
        direction: i8,
    ) -> Vehicle {
        Vehicle {
            id,
            line: line_index,
            stop_index: terminus,
            direction,
            pos: line.stops[terminus].pos,
            state: MotionState::Moving,
            dwell_elapsed: Duration::ZERO,
            segment_elapsed: Duration::ZERO,
        }
    }

    /// Advances by `budget` of simulated time. Each inner step resolves at
    /// most one dwell completion or one arrival; leftover time carries into
    /// the next step, so the budget is consumed exactly.
    pub(crate) fn advance(
        &mut self,
        budget: Duration,
        line: &SimLine,
        on_arrival: &mut ArrivalCallback,
    ) -> Result<(), SimError> {
        let mut left = budget;
        while left > Duration::ZERO {
            left = match self.state {
                MotionState::AtStop => self.dwell(left, line),
                MotionState::Moving => self.travel(left, line, on_arrival)?,
            };
        }
        Ok(())
    }

    fn dwell(&mut self, left: Duration, line: &SimLine) -> Duration {
        self.dwell_elapsed = self.dwell_elapsed + left;
        let threshold = line.stops[self.stop_index].dwell;
        if self.dwell_elapsed >= threshold {
            let carry = self.dwell_elapsed - threshold;
            self.state = MotionState::Moving;
            self.dwell_elapsed = Duration::ZERO;
            self.segment_elapsed = Duration::ZERO;
            carry
        } else {
            Duration::ZERO
        }
    }

    fn travel(
        &mut self,
        left: Duration,
        line: &SimLine,
        on_arrival: &mut ArrivalCallback,
    ) -> Result<Duration, SimError> {
        let next_index = self.next_stop_index();
        let next_pos = line.stops[next_index].pos;
        match line.pace {
            Pace::Timed => {
                let segment = line.travel_time(self.stop_index, self.direction);
                let remaining = segment - self.segment_elapsed;
                if remaining <= left {
                    self.arrive(next_index, line, on_arrival)?;
                    Ok(left - remaining)
                } else {
                    // Move towards the target proportionally, never
                    // overshooting
                    let ratio = left / segment;
                    self.pos = self.pos.offset(
                        ratio * (next_pos.x() - self.pos.x()),
                        ratio * (next_pos.y() - self.pos.y()),
                    );
                    self.segment_elapsed = self.segment_elapsed + left;
                    Ok(Duration::ZERO)
                }
            }
            Pace::Speed(speed) => {
                let distance = self.pos.dist_to(next_pos).inner_meters();
                let reach = speed.inner_meters_per_second() * left.inner_seconds();
                if distance <= reach {
                    let used =
                        Duration::seconds(distance / speed.inner_meters_per_second());
                    self.arrive(next_index, line, on_arrival)?;
                    Ok(left - used)
                } else {
                    let ratio = reach / distance;
                    self.pos = self.pos.offset(
                        ratio * (next_pos.x() - self.pos.x()),
                        ratio * (next_pos.y() - self.pos.y()),
                    );
                    Ok(Duration::ZERO)
                }
            }
        }
    }

    fn arrive(
        &mut self,
        next_index: usize,
        line: &SimLine,
        on_arrival: &mut ArrivalCallback,
    ) -> Result<(), SimError> {
        self.pos = line.stops[next_index].pos;
        self.stop_index = next_index;
        self.state = MotionState::AtStop;
        self.segment_elapsed = Duration::ZERO;

        on_arrival(Arrival {
            vehicle: self.id,
            line: &line.name,
            stop_index: next_index,
            stop: &line.stops[next_index],
        })
        .map_err(|source| SimError::Callback {
            vehicle: self.id,
            stop: line.stops[next_index].name.clone(),
            source,
        })?;

        // Reverse at the route endpoints, exactly once per terminus arrival
        if line.is_terminus(next_index) {
            self.direction = -self.direction;
        }
        Ok(())
    }

    pub fn next_stop_index(&self) -> usize {
        (self.stop_index as i64 + self.direction as i64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geom::Speed;

    fn two_stop_line() -> SimLine {
        SimLine::with_times(
            "L",
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

    fn noop() -> ArrivalCallback {
        Box::new(|_| Ok(()))
    }

    #[test]
    fn proportional_position_update() {
        let line = two_stop_line();
        let mut cb = noop();
        let mut vehicle = Vehicle::spawn(VehicleID(0), 0, &line, 0, 1);

        vehicle.advance(Duration::seconds(1.0), &line, &mut cb).unwrap();
        assert!((vehicle.pos.x() - 1.0).abs() < 1e-9);
        vehicle.advance(Duration::seconds(1.0), &line, &mut cb).unwrap();
        // 1 + 0.1 * (10 - 1)
        assert!((vehicle.pos.x() - 1.9).abs() < 1e-9);
        assert_eq!(vehicle.state, MotionState::Moving);
    }

    #[test]
    fn arrival_snaps_and_flips_exactly_once() {
        let line = two_stop_line();
        let mut cb = noop();
        let mut vehicle = Vehicle::spawn(VehicleID(0), 0, &line, 0, 1);

        for _ in 0..10 {
            vehicle.advance(Duration::seconds(1.0), &line, &mut cb).unwrap();
        }
        assert_eq!(vehicle.state, MotionState::AtStop);
        assert_eq!(vehicle.stop_index, 1);
        assert_eq!(vehicle.pos, Pt2D::new(10.0, 0.0));
        assert_eq!(vehicle.direction, -1);

        // Two more ticks of dwell, then it departs
        vehicle.advance(Duration::seconds(1.0), &line, &mut cb).unwrap();
        assert_eq!(vehicle.state, MotionState::AtStop);
        vehicle.advance(Duration::seconds(1.0), &line, &mut cb).unwrap();
        assert_eq!(vehicle.state, MotionState::Moving);
        assert_eq!(vehicle.direction, -1);
    }

    #[test]
    fn dwell_overflow_carries_into_travel() {
        let line = two_stop_line();
        let mut cb = noop();
        let mut vehicle = Vehicle::spawn(VehicleID(0), 0, &line, 0, 1);

        // One big step: 10s travel + 2s dwell + 3s back towards stop 0
        vehicle.advance(Duration::seconds(15.0), &line, &mut cb).unwrap();
        assert_eq!(vehicle.state, MotionState::Moving);
        assert_eq!(vehicle.stop_index, 1);
        assert_eq!(vehicle.direction, -1);
        // 3 of 10 seconds into the return segment: 10 + 0.3 * (0 - 10)
        assert!((vehicle.pos.x() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn out_and_back_conserves_time() {
        let line = two_stop_line();
        let mut cb = noop();
        let mut vehicle = Vehicle::spawn(VehicleID(0), 0, &line, 0, 1);

        // travel 10 + dwell 2 + travel 10 + dwell 2 = 24 ticks for a full
        // loop
        for _ in 0..23 {
            vehicle.advance(Duration::seconds(1.0), &line, &mut cb).unwrap();
        }
        assert_eq!(vehicle.state, MotionState::AtStop);
        assert_eq!(vehicle.stop_index, 0);
        vehicle.advance(Duration::seconds(1.0), &line, &mut cb).unwrap();
        assert_eq!(vehicle.state, MotionState::Moving);
        assert_eq!(vehicle.direction, 1);
        assert_eq!(vehicle.pos, Pt2D::new(0.0, 0.0));
    }

    #[test]
    fn speed_pace_snaps_without_overshoot() {
        let line = SimLine::with_speed(
            "L",
            vec![
                SimStop {
                    name: "a".to_string(),
                    pos: Pt2D::new(0.0, 0.0),
                    dwell: Duration::seconds(1.0),
                },
                SimStop {
                    name: "b".to_string(),
                    pos: Pt2D::new(10.0, 0.0),
                    dwell: Duration::seconds(1.0),
                },
            ],
            Speed::meters_per_second(5.0),
        )
        .unwrap();
        let mut cb = noop();
        let mut vehicle = Vehicle::spawn(VehicleID(0), 0, &line, 0, 1);

        vehicle.advance(Duration::seconds(1.0), &line, &mut cb).unwrap();
        assert!((vehicle.pos.x() - 5.0).abs() < 1e-9);
        assert_eq!(vehicle.state, MotionState::Moving);

        vehicle.advance(Duration::seconds(1.0), &line, &mut cb).unwrap();
        assert_eq!(vehicle.pos, Pt2D::new(10.0, 0.0));
        assert_eq!(vehicle.state, MotionState::AtStop);
        assert_eq!(vehicle.direction, -1);
    }

    #[test]
    fn callback_sees_the_arrived_stop() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let line = two_stop_line();
        let seen: Rc<RefCell<Vec<(usize, String)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut cb: ArrivalCallback = Box::new(move |arrival: Arrival| {
            sink.borrow_mut()
                .push((arrival.stop_index, arrival.stop.name.clone()));
            Ok(())
        });

        let mut vehicle = Vehicle::spawn(VehicleID(0), 0, &line, 0, 1);
        vehicle.advance(Duration::seconds(24.0), &line, &mut cb).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![(1, "b".to_string()), (0, "a".to_string())]
        );
    }

    #[test]
    fn callback_failure_propagates() {
        let line = two_stop_line();
        let mut cb: ArrivalCallback = Box::new(|_| Err(anyhow::anyhow!("sink full")));
        let mut vehicle = Vehicle::spawn(VehicleID(0), 0, &line, 0, 1);

        let err = vehicle
            .advance(Duration::seconds(10.0), &line, &mut cb)
            .unwrap_err();
        match err {
            SimError::Callback { vehicle, stop, .. } => {
                assert_eq!(vehicle, VehicleID(0));
                assert_eq!(stop, "b");
            }
        }
    }
}
