use std::path::Path;

use anyhow::Result;
use chrono::NaiveDateTime;

use crate::ids::{JourneyID, StopID};
use crate::line::LineModel;
use crate::timetable::VisitTimes;

/// Writes the six ;-delimited tables for one line into `dir`, named like the
/// upstream exports: stops, routes, journeys, and the full/planned/real
/// timetable matrices.
pub fn write_tables(model: &LineModel, dir: &Path) -> Result<()> {
    write_stops(model, &dir.join(format!("{}_stops.csv", model.name)))?;
    write_routes(model, &dir.join(format!("{}_routes.csv", model.name)))?;
    write_journeys(model, &dir.join(format!("{}_journeys.csv", model.name)))?;
    for (suffix, events) in [
        ("full", EVENTS),
        ("planned", &EVENTS[..2]),
        ("real", &EVENTS[2..]),
    ] {
        write_timetable(
            model,
            events,
            &dir.join(format!("{}_{}.csv", model.name, suffix)),
        )?;
    }
    Ok(())
}

const EVENTS: &[(&str, fn(&VisitTimes) -> Option<NaiveDateTime>)] = &[
    ("ARRIVAL", |t| t.arrival_planned),
    ("DEPARTURE", |t| t.departure_planned),
    ("ARRIVAL_REAL", |t| t.arrival_observed),
    ("DEPARTURE_REAL", |t| t.departure_observed),
];

fn writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    Ok(csv::WriterBuilder::new().delimiter(b';').from_path(path)?)
}

fn write_stops(model: &LineModel, path: &Path) -> Result<()> {
    let mut out = writer(path)?;
    let mut header = vec![
        "STOP_NAME".to_string(),
        "STOP_NUMBER".to_string(),
        "POSITION_X".to_string(),
        "POSITION_Y".to_string(),
        "DISTANCE".to_string(),
    ];
    header.extend(model.variants.iter().map(|v| v.label()));
    out.write_record(&header)?;

    for (idx, stop) in model.stops.iter().enumerate() {
        let mut row = vec![
            stop.name.clone(),
            stop.number.0.to_string(),
            fmt_f64(stop.pos.x()),
            fmt_f64(stop.pos.y()),
            stop.distance
                .map(|d| fmt_f64(d.inner_meters()))
                .unwrap_or_default(),
        ];
        row.extend(
            model
                .variants
                .iter()
                .map(|v| yes_no(v.mask[idx]).to_string()),
        );
        out.write_record(&row)?;
    }
    out.flush()?;
    Ok(())
}

fn write_routes(model: &LineModel, path: &Path) -> Result<()> {
    let mut out = writer(path)?;
    let mut header = vec!["ROUTE".to_string()];
    header.extend(model.stops.iter().map(|s| s.name.clone()));
    header.push("Count".to_string());
    header.push("Direction".to_string());
    out.write_record(&header)?;

    for variant in &model.variants {
        let mut row = vec![variant.label()];
        row.extend(variant.mask.iter().map(|visits| yes_no(*visits).to_string()));
        row.push(variant.count.to_string());
        row.push(variant.direction.label().to_string());
        out.write_record(&row)?;
    }
    out.flush()?;
    Ok(())
}

fn write_journeys(model: &LineModel, path: &Path) -> Result<()> {
    let mut out = writer(path)?;
    out.write_record([
        "JOURNEY_ID",
        "Route",
        "Number_of_stops",
        "Direction",
        "Start",
        "Start_time_Planned",
        "Start_time_Real",
        "End",
        "End_time_Planned",
        "End_time_Real",
    ])?;
    for journey in &model.journeys {
        let variant_label = model
            .variant(journey.variant)
            .map(|v| v.label())
            .unwrap_or_default();
        out.write_record(&[
            journey.id.0.clone(),
            variant_label,
            journey.num_stops.to_string(),
            journey.direction.label().to_string(),
            stop_name(model, journey.start_stop),
            fmt_time(journey.start_time_planned),
            fmt_time(journey.start_time_observed),
            stop_name(model, journey.end_stop),
            fmt_time(journey.end_time_planned),
            fmt_time(journey.end_time_observed),
        ])?;
    }
    out.flush()?;
    Ok(())
}

fn write_timetable(
    model: &LineModel,
    events: &[(&str, fn(&VisitTimes) -> Option<NaiveDateTime>)],
    path: &Path,
) -> Result<()> {
    let mut out = writer(path)?;
    let mut header = vec![
        "STOP_NAME".to_string(),
        "STOP_NUMBER".to_string(),
        "EVENT".to_string(),
    ];
    header.extend(model.journeys.iter().map(|j| j.id.0.clone()));
    out.write_record(&header)?;

    for (stop_idx, stop) in model.stops.iter().enumerate() {
        for (event, getter) in events {
            let mut row = vec![
                stop.name.clone(),
                stop.number.0.to_string(),
                event.to_string(),
            ];
            for journey_idx in 0..model.journeys.len() {
                let times = model
                    .timetable
                    .get(StopID(stop_idx), JourneyID(journey_idx));
                row.push(fmt_time(getter(times)));
            }
            out.write_record(&row)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// One GeoJSON FeatureCollection per line: a Point per stop and a LineString
/// per route variant, in the model's planar coordinates.
pub fn to_geojson(model: &LineModel) -> Result<String> {
    use geojson::{Feature, FeatureCollection, GeoJson};

    let mut features = Vec::new();
    for stop in &model.stops {
        let mut feature = Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                stop.pos.x(),
                stop.pos.y(),
            ]))),
            id: None,
            properties: None,
            foreign_members: None,
        };
        feature.set_property("type", "stop");
        feature.set_property("name", stop.name.clone());
        feature.set_property("number", stop.number.0);
        if let Some(distance) = stop.distance {
            feature.set_property("distance_meters", distance.inner_meters());
        }
        features.push(feature);
    }

    for variant in &model.variants {
        let points: Vec<Vec<f64>> = model
            .variant_stops(variant)
            .into_iter()
            .map(|stop| vec![stop.pos.x(), stop.pos.y()])
            .collect();
        let mut feature = Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::LineString(points))),
            id: None,
            properties: None,
            foreign_members: None,
        };
        feature.set_property("type", "route");
        feature.set_property("route", variant.label());
        feature.set_property("count", variant.count);
        feature.set_property("direction", variant.direction.label());
        features.push(feature);
    }

    let gj = GeoJson::FeatureCollection(FeatureCollection {
        features,
        bbox: None,
        foreign_members: None,
    });
    Ok(serde_json::to_string_pretty(&gj)?)
}

fn fmt_time(t: Option<NaiveDateTime>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn fmt_f64(value: f64) -> String {
    format!("{:.1}", value)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        ""
    }
}

fn stop_name(model: &LineModel, number: Option<crate::ids::orig::StopID>) -> String {
    number
        .and_then(|n| model.stops.iter().find(|s| s.number == n))
        .map(|s| s.name.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    use abstutil::Timer;
    use chrono::NaiveDate;
    use geom::Pt2D;

    use crate::ids::orig;
    use crate::line::{BuildOptions, LineBuilder};
    use crate::records::{QualityStatus, StopRecord, VisitRecord};

    fn visit(journey: &str, stop: i64, minute: u32) -> VisitRecord {
        let t = NaiveDate::from_ymd_opt(2025, 1, 7)
            .unwrap()
            .and_hms_opt(8, minute, 0)
            .unwrap();
        VisitRecord {
            line_id: "l7".to_string(),
            line_name: "7".to_string(),
            transporter: "TL".to_string(),
            mode: "Bus".to_string(),
            journey: orig::JourneyID(journey.to_string()),
            stop: orig::StopID(stop),
            arrival_planned: Some(t),
            arrival_observed: Some(t),
            arrival_status: QualityStatus::Real,
            departure_planned: Some(t),
            departure_observed: Some(t),
            departure_status: QualityStatus::Real,
        }
    }

    fn sample_model() -> crate::line::LineModel {
        let stops = vec![
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
        ];
        let records = vec![visit("j1", 1, 0), visit("j1", 2, 5)];
        LineBuilder::new("l7", "7", records, &stops, BuildOptions::default())
            .build(&mut Timer::throwaway())
            .unwrap()
    }

    #[test]
    fn tables_written_with_expected_headers() {
        let model = sample_model();
        let dir = std::env::temp_dir().join("line_export_test");
        std::fs::create_dir_all(&dir).unwrap();
        write_tables(&model, &dir).unwrap();

        let stops = std::fs::read_to_string(dir.join("7_stops.csv")).unwrap();
        let header = stops.lines().next().unwrap();
        assert_eq!(
            header,
            "STOP_NAME;STOP_NUMBER;POSITION_X;POSITION_Y;DISTANCE;Route_A"
        );
        assert!(stops.contains("Alpha"));

        let full = std::fs::read_to_string(dir.join("7_full.csv")).unwrap();
        assert_eq!(full.lines().count(), 1 + 2 * 4);
        let real = std::fs::read_to_string(dir.join("7_real.csv")).unwrap();
        assert!(real.contains("ARRIVAL_REAL"));
        assert!(!real.contains("DEPARTURE;"));
    }

    #[test]
    fn geojson_has_stop_and_route_features() {
        let model = sample_model();
        let raw = to_geojson(&model).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let features = parsed["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0]["properties"]["type"], "stop");
        assert_eq!(features[2]["properties"]["route"], "Route_A");
    }
}
