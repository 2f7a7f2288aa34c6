use chrono::NaiveDateTime;
use geom::Pt2D;
use serde::Deserialize;

use crate::ids::orig;
use crate::ModelError;

/// One already-loaded observation row for a (stop, journey) visit: scheduled
/// and observed arrival/departure timestamps plus per-event quality status.
/// Upstream column names are preserved in the CSV form.
#[derive(Clone, Debug)]
pub struct VisitRecord {
    pub line_id: String,
    pub line_name: String,
    pub transporter: String,
    pub mode: String,
    pub journey: orig::JourneyID,
    pub stop: orig::StopID,
    pub arrival_planned: Option<NaiveDateTime>,
    pub arrival_observed: Option<NaiveDateTime>,
    pub arrival_status: QualityStatus,
    pub departure_planned: Option<NaiveDateTime>,
    pub departure_observed: Option<NaiveDateTime>,
    pub departure_status: QualityStatus,
}

/// Reliability of an observed timestamp, worst to best. Deduplication keeps
/// the best-ranked record per (stop, journey).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityStatus {
    Unknown,
    Estimated,
    Forecast,
    Real,
}

impl QualityStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "REAL" => Self::Real,
            "PROGNOSE" => Self::Forecast,
            "GESCHAETZT" => Self::Estimated,
            _ => Self::Unknown,
        }
    }
}

/// A stop's position and display name, from the service-point table.
#[derive(Clone, Debug)]
pub struct StopRecord {
    pub number: orig::StopID,
    pub name: String,
    pub pos: Pt2D,
}

pub fn load_visits<R: std::io::Read>(reader: R) -> Result<Vec<VisitRecord>, ModelError> {
    let mut records = Vec::new();
    let mut cancelled = 0;
    for rec in csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_reader(reader)
        .deserialize()
    {
        let rec: RawVisit = rec.map_err(|err| ModelError::MalformedInput(err.to_string()))?;
        if rec.cancelled.trim().eq_ignore_ascii_case("true") {
            cancelled += 1;
            continue;
        }
        records.push(VisitRecord {
            line_id: rec.line_id,
            line_name: rec.line_name,
            transporter: rec.transporter,
            mode: rec.mode,
            journey: orig::JourneyID(rec.journey_id),
            stop: orig::StopID(rec.stop_number),
            arrival_planned: parse_time(&rec.arrival)?,
            arrival_observed: parse_time(&rec.arrival_real)?,
            arrival_status: QualityStatus::parse(rec.arrival_real_status.trim()),
            departure_planned: parse_time(&rec.departure)?,
            departure_observed: parse_time(&rec.departure_real)?,
            departure_status: QualityStatus::parse(rec.departure_real_status.trim()),
        });
    }
    if cancelled > 0 {
        info!("Skipped {} records of cancelled journeys", cancelled);
    }
    Ok(records)
}

pub fn load_stops<R: std::io::Read>(reader: R) -> Result<Vec<StopRecord>, ModelError> {
    let mut stops = Vec::new();
    for rec in csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_reader(reader)
        .deserialize()
    {
        let rec: RawStop = rec.map_err(|err| ModelError::MalformedInput(err.to_string()))?;
        stops.push(StopRecord {
            number: orig::StopID(rec.number),
            name: rec.name,
            pos: Pt2D::new(rec.east, rec.north),
        });
    }
    Ok(stops)
}

/// Timestamps arrive as day-first local datetimes, with or without seconds.
/// Empty cells mean the event was not scheduled/observed.
fn parse_time(raw: &str) -> Result<Option<NaiveDateTime>, ModelError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    for fmt in ["%d.%m.%Y %H:%M:%S", "%d.%m.%Y %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Some(t));
        }
    }
    Err(ModelError::MalformedInput(format!(
        "unparsable timestamp {:?}",
        raw
    )))
}

/// One line as advertised by the records: id, display name, operator, mode.
#[derive(Clone, Debug, PartialEq)]
pub struct LineInfo {
    pub id: String,
    pub name: String,
    pub transporter: String,
    pub mode: String,
}

/// Distinct lines present in a record table, in first-seen order.
pub fn line_catalog(records: &[VisitRecord]) -> Vec<LineInfo> {
    let mut seen = std::collections::BTreeSet::new();
    let mut catalog = Vec::new();
    for rec in records {
        if seen.insert(rec.line_id.clone()) {
            catalog.push(LineInfo {
                id: rec.line_id.clone(),
                name: rec.line_name.clone(),
                transporter: rec.transporter.clone(),
                mode: rec.mode.clone(),
            });
        }
    }
    catalog
}

pub fn records_for_line(records: &[VisitRecord], line_id: &str) -> Vec<VisitRecord> {
    records
        .iter()
        .filter(|rec| rec.line_id == line_id)
        .cloned()
        .collect()
}

#[derive(Deserialize)]
struct RawVisit {
    #[serde(rename = "LINE_ID")]
    line_id: String,
    #[serde(rename = "LINE_NAME")]
    line_name: String,
    #[serde(rename = "TRANSPORTER")]
    transporter: String,
    #[serde(rename = "MEAN_OF_TRANSPORT")]
    mode: String,
    #[serde(rename = "JOURNEY_ID")]
    journey_id: String,
    #[serde(rename = "STOP_NUMBER")]
    stop_number: i64,
    #[serde(rename = "CANCELLED")]
    cancelled: String,
    #[serde(rename = "ARRIVAL")]
    arrival: String,
    #[serde(rename = "ARRIVAL_REAL")]
    arrival_real: String,
    #[serde(rename = "ARRIVAL_REAL_STATUS")]
    arrival_real_status: String,
    #[serde(rename = "DEPARTURE")]
    departure: String,
    #[serde(rename = "DEPARTURE_REAL")]
    departure_real: String,
    #[serde(rename = "DEPARTURE_REAL_STATUS")]
    departure_real_status: String,
}

#[derive(Deserialize)]
struct RawStop {
    number: i64,
    #[serde(rename = "designationOfficial")]
    name: String,
    #[serde(rename = "lv95East")]
    east: f64,
    #[serde(rename = "lv95North")]
    north: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_status_ranking() {
        assert!(QualityStatus::Real > QualityStatus::Forecast);
        assert!(QualityStatus::Forecast > QualityStatus::Estimated);
        assert!(QualityStatus::Estimated > QualityStatus::Unknown);
        assert_eq!(QualityStatus::parse("UNBEKANNT"), QualityStatus::Unknown);
        assert_eq!(QualityStatus::parse(""), QualityStatus::Unknown);
        assert_eq!(QualityStatus::parse("REAL"), QualityStatus::Real);
    }

    #[test]
    fn parse_time_formats() {
        assert_eq!(parse_time("").unwrap(), None);
        assert!(parse_time("07.01.2025 12:30").unwrap().is_some());
        assert!(parse_time("07.01.2025 12:30:45").unwrap().is_some());
        assert!(parse_time("not a time").is_err());
    }

    #[test]
    fn catalog_dedupes_lines() {
        let mut rec = VisitRecord {
            line_id: "85:764:705".to_string(),
            line_name: "705".to_string(),
            transporter: "MBC".to_string(),
            mode: "Bus".to_string(),
            journey: orig::JourneyID("j1".to_string()),
            stop: orig::StopID(1),
            arrival_planned: None,
            arrival_observed: None,
            arrival_status: QualityStatus::Unknown,
            departure_planned: None,
            departure_observed: None,
            departure_status: QualityStatus::Unknown,
        };
        let mut records = vec![rec.clone()];
        rec.stop = orig::StopID(2);
        records.push(rec);
        let catalog = line_catalog(&records);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].name, "705");
    }
}
