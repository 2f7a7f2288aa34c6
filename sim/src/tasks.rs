use geom::{Distance, Pt2D};
use model::LineModel;

/// A pickup/delivery pair for comparing direct travel against travel
/// assisted by a line.
#[derive(Clone, Copy, Debug)]
pub struct Task {
    pub pickup: Pt2D,
    pub delivery: Pt2D,
}

impl Task {
    pub fn direct_distance(&self) -> Distance {
        self.pickup.dist_to(self.delivery)
    }
}

/// Where a task was routed: via a line's nearest stops, or directly.
#[derive(Clone, Debug)]
pub struct Assignment {
    /// The winning line's name; None means the direct trip wins ("Direct")
    pub line: Option<String>,
    pub pickup_stop: Pt2D,
    pub delivery_stop: Pt2D,
    /// Walking legs to and from the chosen line's stops
    pub detour: Distance,
    /// Direct distance minus detour; positive iff a line is assigned
    pub improvement: Distance,
}

/// Assigns each task the line whose nearest stops shave the most off the
/// direct point-to-point distance. A task keeps its direct trip unless some
/// line strictly beats it.
pub fn assign_tasks(tasks: &[Task], lines: &[&LineModel]) -> Vec<Assignment> {
    tasks.iter().map(|task| assign_task(task, lines)).collect()
}

fn assign_task(task: &Task, lines: &[&LineModel]) -> Assignment {
    let direct = task.direct_distance();

    let mut best: Option<(&LineModel, Pt2D, Pt2D, Distance)> = None;
    for line in lines {
        let pickup_stop = line.nearest_stop(task.pickup).pos;
        let delivery_stop = line.nearest_stop(task.delivery).pos;
        let detour = task.pickup.dist_to(pickup_stop) + task.delivery.dist_to(delivery_stop);
        if best.map(|(_, _, _, d)| detour < d).unwrap_or(true) {
            best = Some((line, pickup_stop, delivery_stop, detour));
        }
    }

    match best {
        Some((line, pickup_stop, delivery_stop, detour)) if detour < direct => Assignment {
            line: Some(line.name.clone()),
            pickup_stop,
            delivery_stop,
            detour,
            improvement: direct - detour,
        },
        Some((_, pickup_stop, delivery_stop, detour)) => Assignment {
            line: None,
            pickup_stop,
            delivery_stop,
            detour,
            improvement: direct - detour,
        },
        None => Assignment {
            line: None,
            pickup_stop: task.pickup,
            delivery_stop: task.delivery,
            detour: direct,
            improvement: Distance::ZERO,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{orig, Stop, TimetableMatrix};

    fn line(name: &str, xs: &[f64]) -> LineModel {
        LineModel {
            id: name.to_string(),
            name: name.to_string(),
            stops: xs
                .iter()
                .enumerate()
                .map(|(i, x)| Stop {
                    number: orig::StopID(i as i64),
                    name: format!("s{}", i),
                    pos: Pt2D::new(*x, 0.0),
                    distance: Some(Distance::meters(*x)),
                })
                .collect(),
            variants: Vec::new(),
            journeys: Vec::new(),
            timetable: TimetableMatrix::new(xs.len(), 0),
        }
    }

    #[test]
    fn nearby_stops_beat_the_direct_trip() {
        let l = line("7", &[0.0, 500.0, 1000.0]);
        let task = Task {
            pickup: Pt2D::new(10.0, 0.0),
            delivery: Pt2D::new(990.0, 0.0),
        };
        let assignment = assign_task(&task, &[&l]);
        assert_eq!(assignment.line.as_deref(), Some("7"));
        assert_eq!(assignment.pickup_stop, Pt2D::new(0.0, 0.0));
        assert_eq!(assignment.delivery_stop, Pt2D::new(1000.0, 0.0));
        assert!((assignment.detour.inner_meters() - 20.0).abs() < 1e-9);
        assert!((assignment.improvement.inner_meters() - 960.0).abs() < 1e-9);
    }

    #[test]
    fn long_detours_stay_direct() {
        let l = line("7", &[0.0, 1000.0]);
        // Both endpoints sit next to the same stop; the detour doubles back
        let task = Task {
            pickup: Pt2D::new(400.0, 0.0),
            delivery: Pt2D::new(450.0, 0.0),
        };
        let assignment = assign_task(&task, &[&l]);
        assert_eq!(assignment.line, None);
        assert!(assignment.improvement < Distance::ZERO);
    }

    #[test]
    fn best_of_several_lines_wins() {
        let near = line("near", &[0.0, 1000.0]);
        let far = line("far", &[0.0, 5000.0]);
        let task = Task {
            pickup: Pt2D::new(5.0, 0.0),
            delivery: Pt2D::new(995.0, 0.0),
        };
        let assignment = assign_task(&task, &[&far, &near]);
        assert_eq!(assignment.line.as_deref(), Some("near"));
    }

    #[test]
    fn no_lines_means_direct() {
        let task = Task {
            pickup: Pt2D::new(0.0, 0.0),
            delivery: Pt2D::new(3.0, 4.0),
        };
        let assignments = assign_tasks(&[task], &[]);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].line, None);
        assert!((assignments[0].detour.inner_meters() - 5.0).abs() < 1e-9);
    }
}
