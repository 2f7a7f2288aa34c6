use std::collections::BTreeMap;

use abstutil::Timer;
use anyhow::Result;

use crate::line::{BuildOptions, LineBuilder, LineModel};
use crate::records::{line_catalog, records_for_line, StopRecord, VisitRecord};
use crate::ModelError;

/// Result of a by-name lookup: one hit, or the ids of all lines sharing the
/// name.
pub enum Match<'a> {
    Single(&'a LineModel),
    Multiple(Vec<String>),
}

/// All reconstructed lines, addressable by canonical id or by display name.
pub struct LineRegistry {
    lines: Vec<LineModel>,
    by_id: BTreeMap<String, usize>,
    by_name: BTreeMap<String, Vec<usize>>,
}

impl LineRegistry {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            by_id: BTreeMap::new(),
            by_name: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, model: LineModel) -> Result<()> {
        if self.by_id.contains_key(&model.id) {
            bail!("Duplicate line id {:?}", model.id);
        }
        let idx = self.lines.len();
        self.by_id.insert(model.id.clone(), idx);
        self.by_name
            .entry(model.name.clone())
            .or_insert_with(Vec::new)
            .push(idx);
        self.lines.push(model);
        Ok(())
    }

    /// Resolves a selector against ids first, then names. Name collisions
    /// come back as `Match::Multiple` rather than an error.
    pub fn lookup(&self, selector: &str) -> Result<Match, ModelError> {
        if let Some(idx) = self.by_id.get(selector) {
            return Ok(Match::Single(&self.lines[*idx]));
        }
        match self.by_name.get(selector) {
            Some(hits) if hits.len() == 1 => Ok(Match::Single(&self.lines[hits[0]])),
            Some(hits) => Ok(Match::Multiple(
                hits.iter().map(|idx| self.lines[*idx].id.clone()).collect(),
            )),
            None => Err(ModelError::UnknownLine {
                selector: selector.to_string(),
                valid_ids: self.ids(),
                valid_names: self.names(),
            }),
        }
    }

    /// Like `lookup`, but a shared name is an error carrying the candidate
    /// ids.
    pub fn get(&self, selector: &str) -> Result<&LineModel, ModelError> {
        match self.lookup(selector)? {
            Match::Single(model) => Ok(model),
            Match::Multiple(candidates) => Err(ModelError::AmbiguousLineName {
                name: selector.to_string(),
                candidates,
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LineModel> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.by_id.keys().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }
}

/// Which lines of a record table to reconstruct.
pub enum LineSelection {
    All,
    /// Canonical ids or display names; names must be unambiguous
    Selectors(Vec<String>),
}

/// Reconstructs every selected line and registers the results. `modes`
/// filters the catalog first (case-insensitive, e.g. "bus", "metro").
pub fn build_lines(
    records: &[VisitRecord],
    stops: &[StopRecord],
    selection: &LineSelection,
    modes: Option<&[&str]>,
    options: &BuildOptions,
    timer: &mut Timer,
) -> Result<LineRegistry> {
    let mut catalog = line_catalog(records);
    if let Some(modes) = modes {
        let lowered: Vec<String> = modes.iter().map(|m| m.to_lowercase()).collect();
        let filtered: Vec<_> = catalog
            .iter()
            .filter(|info| lowered.contains(&info.mode.to_lowercase()))
            .cloned()
            .collect();
        if filtered.is_empty() {
            bail!(
                "No line matches the requested modes; found: {}",
                catalog
                    .iter()
                    .map(|info| info.mode.to_lowercase())
                    .collect::<std::collections::BTreeSet<_>>()
                    .into_iter()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        catalog = filtered;
    }

    let selected: Vec<_> = match selection {
        LineSelection::All => catalog.clone(),
        LineSelection::Selectors(wanted) => {
            let mut selected = Vec::new();
            for selector in wanted {
                let hit = catalog
                    .iter()
                    .find(|info| &info.id == selector || &info.name == selector);
                match hit {
                    Some(info) => selected.push(info.clone()),
                    None => {
                        return Err(ModelError::UnknownLine {
                            selector: selector.clone(),
                            valid_ids: catalog.iter().map(|info| info.id.clone()).collect(),
                            valid_names: catalog.iter().map(|info| info.name.clone()).collect(),
                        }
                        .into());
                    }
                }
            }
            selected
        }
    };

    let mut registry = LineRegistry::new();
    for info in selected {
        info!("Reconstructing line {} ({})", info.name, info.id);
        let line_records = records_for_line(records, &info.id);
        let model = LineBuilder::new(
            info.id.clone(),
            info.name.clone(),
            line_records,
            stops,
            BuildOptions {
                correct_times: options.correct_times,
                prune_threshold: options.prune_threshold,
            },
        )
        .build(timer)?;
        registry.insert(model)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::TimetableMatrix;

    fn model(id: &str, name: &str) -> LineModel {
        LineModel {
            id: id.to_string(),
            name: name.to_string(),
            stops: Vec::new(),
            variants: Vec::new(),
            journeys: Vec::new(),
            timetable: TimetableMatrix::new(0, 0),
        }
    }

    #[test]
    fn lookup_by_id_and_name() {
        let mut registry = LineRegistry::new();
        registry.insert(model("85:764:705", "705")).unwrap();
        registry.insert(model("85:151:1", "1")).unwrap();

        assert!(matches!(
            registry.lookup("85:764:705"),
            Ok(Match::Single(m)) if m.name == "705"
        ));
        assert!(matches!(
            registry.lookup("705"),
            Ok(Match::Single(m)) if m.id == "85:764:705"
        ));
    }

    #[test]
    fn shared_names_are_discriminated() {
        let mut registry = LineRegistry::new();
        registry.insert(model("85:764:705", "705")).unwrap();
        registry.insert(model("85:999:705", "705")).unwrap();

        match registry.lookup("705") {
            Ok(Match::Multiple(candidates)) => {
                assert_eq!(candidates.len(), 2);
            }
            _ => panic!("expected Multiple"),
        }
        assert!(matches!(
            registry.get("705"),
            Err(ModelError::AmbiguousLineName { ref candidates, .. }) if candidates.len() == 2
        ));
        // By id still resolves
        assert!(registry.get("85:999:705").is_ok());
    }

    #[test]
    fn unknown_selector_lists_alternatives() {
        let mut registry = LineRegistry::new();
        registry.insert(model("85:764:705", "705")).unwrap();
        match registry.get("701") {
            Err(ModelError::UnknownLine {
                valid_ids,
                valid_names,
                ..
            }) => {
                assert_eq!(valid_ids, vec!["85:764:705".to_string()]);
                assert_eq!(valid_names, vec!["705".to_string()]);
            }
            _ => panic!("expected UnknownLine"),
        }
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut registry = LineRegistry::new();
        registry.insert(model("x", "a")).unwrap();
        assert!(registry.insert(model("x", "b")).is_err());
    }
}
