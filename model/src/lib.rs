//! Reconstructs canonical bus-line topologies (ordered stops with distances,
//! route variants, directions) from noisy per-stop observation records. The
//! crate consumes already-loaded tables; retrieval, coordinate conversion,
//! and rendering live elsewhere.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod error;
mod export;
mod ids;
mod line;
mod normalize;
mod records;
mod registry;
mod routes;
mod timetable;
mod topology;

pub use self::error::ModelError;
pub use self::export::{to_geojson, write_tables};
pub use self::ids::{orig, JourneyID, StopID, VariantID};
pub use self::line::{BuildOptions, LineBuilder, LineModel, Stage, Stop};
pub use self::records::{
    line_catalog, load_stops, load_visits, records_for_line, LineInfo, QualityStatus, StopRecord,
    VisitRecord,
};
pub use self::registry::{build_lines, LineRegistry, LineSelection, Match};
pub use self::routes::{Direction, Journey, RouteVariant};
pub use self::timetable::{TimetableMatrix, VisitTimes};
