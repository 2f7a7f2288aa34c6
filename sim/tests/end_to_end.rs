//! Drives the whole pipeline: raw visit records through reconstruction,
//! route-table derivation, and a fleet running on the result.

use std::cell::RefCell;
use std::rc::Rc;

use abstutil::Timer;
use chrono::{NaiveDate, NaiveDateTime};
use geom::{Distance, Duration, Pt2D};

use model::{orig, BuildOptions, LineBuilder, QualityStatus, StopRecord, VisitRecord};
use sim::{assign_tasks, FleetManager, SimLine, SimOptions, Task};

fn at(minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 7)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
        + chrono::Duration::seconds((minute * 60 + second) as i64)
}

fn visit(journey: &str, stop: i64, arrival: NaiveDateTime) -> VisitRecord {
    let departure = arrival + chrono::Duration::seconds(10);
    VisitRecord {
        line_id: "85:764:705".to_string(),
        line_name: "705".to_string(),
        transporter: "MBC".to_string(),
        mode: "Bus".to_string(),
        journey: orig::JourneyID(journey.to_string()),
        stop: orig::StopID(stop),
        arrival_planned: Some(arrival),
        arrival_observed: Some(arrival),
        arrival_status: QualityStatus::Real,
        departure_planned: Some(departure),
        departure_observed: Some(departure),
        departure_status: QualityStatus::Real,
    }
}

fn stop_table() -> Vec<StopRecord> {
    vec![
        StopRecord {
            number: orig::StopID(1),
            name: "Gare".to_string(),
            pos: Pt2D::new(0.0, 0.0),
        },
        StopRecord {
            number: orig::StopID(2),
            name: "Centre".to_string(),
            pos: Pt2D::new(600.0, 0.0),
        },
        StopRecord {
            number: orig::StopID(3),
            name: "Plage".to_string(),
            pos: Pt2D::new(1200.0, 0.0),
        },
    ]
}

// Each journey dwells 10s per stop and takes 60s between stops
fn records() -> Vec<VisitRecord> {
    let mut records = Vec::new();
    for (journey, offset) in [("out-1", 0), ("out-2", 30)] {
        records.push(visit(journey, 1, at(offset, 0)));
        records.push(visit(journey, 2, at(offset + 1, 10)));
        records.push(visit(journey, 3, at(offset + 2, 20)));
    }
    records.push(visit("back-1", 3, at(15, 0)));
    records.push(visit("back-1", 2, at(16, 10)));
    records.push(visit("back-1", 1, at(17, 20)));
    records
}

#[test]
fn reconstructed_line_drives_a_fleet() {
    let model = LineBuilder::new(
        "85:764:705",
        "705",
        records(),
        &stop_table(),
        BuildOptions::default(),
    )
    .build(&mut Timer::throwaway())
    .unwrap();

    // Canonical order recovered from the observations
    let names: Vec<&str> = model.stops.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Gare", "Centre", "Plage"]);
    assert_eq!(model.journeys.len(), 3);

    let line = SimLine::from_model(&model, &SimOptions::default()).unwrap();
    assert_eq!(line.stops[0].dwell, Duration::seconds(10.0));

    let arrivals: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&arrivals);
    let mut fleet = FleetManager::new(
        vec![line],
        SimOptions {
            frequency: 100_000,
            ..SimOptions::default()
        },
        Box::new(move |arrival| {
            sink.borrow_mut().push(arrival.stop.name.clone());
            Ok(())
        }),
    );

    // 60s to Centre (from either terminus), 10s dwell, 60s onwards
    fleet.advance(60).unwrap();
    assert_eq!(
        *arrivals.borrow(),
        vec!["Centre".to_string(), "Centre".to_string()]
    );
    fleet.advance(70).unwrap();
    assert!(arrivals.borrow().contains(&"Plage".to_string()));
    assert!(arrivals.borrow().contains(&"Gare".to_string()));

    // The first vehicle sits at its far terminus, ready for pickup
    let hit = fleet
        .find_for_pickup(Pt2D::new(1200.0, 0.0), Distance::meters(0.5))
        .unwrap();
    assert_eq!(hit.id.0, 0);
    assert_eq!(hit.direction, -1);

    // Tasks along the line profit from it; short hops stay direct
    let assignments = assign_tasks(
        &[
            Task {
                pickup: Pt2D::new(10.0, 20.0),
                delivery: Pt2D::new(1190.0, 20.0),
            },
            Task {
                pickup: Pt2D::new(280.0, 0.0),
                delivery: Pt2D::new(320.0, 0.0),
            },
        ],
        &[&model],
    );
    assert_eq!(assignments[0].line.as_deref(), Some("705"));
    assert!(assignments[0].improvement > Distance::ZERO);
    assert_eq!(assignments[1].line, None);
}
