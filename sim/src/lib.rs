//! Discrete-tick simulation of vehicles moving along reconstructed line
//! models: dispatching from the termini, dwell and travel sub-steps that
//! conserve time exactly, and tolerance-based pickup/delivery lookups.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod error;
mod fleet;
mod line;
mod tasks;
mod vehicle;

pub use self::error::SimError;
pub use self::fleet::{FleetManager, SimOptions, VehicleStatus};
pub use self::line::{Pace, SimLine, SimStop};
pub use self::tasks::{assign_tasks, Assignment, Task};
pub use self::vehicle::{Arrival, ArrivalCallback, MotionState, Vehicle, VehicleID};
