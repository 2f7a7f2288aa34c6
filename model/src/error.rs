use crate::line::Stage;

/// Typed failures surfaced by the pipeline. Load paths may wrap these with
/// more context; callers that need to react match on the variant.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A later-stage artifact was requested before its stage ran. Recover by
    /// running the missing stages, or pass `solve = true` to run them
    /// implicitly.
    #[error("the pipeline is at {actual:?} but this call needs {needed:?}; run the earlier stages first, or pass solve = true")]
    StageNotReady { needed: Stage, actual: Stage },

    /// The selector matched no known line.
    #[error("no line matches {selector:?}; valid ids: {}; valid names: {}", valid_ids.join(", "), valid_names.join(", "))]
    UnknownLine {
        selector: String,
        valid_ids: Vec<String>,
        valid_names: Vec<String>,
    },

    /// The selector is a name shared by several lines; pick one of the ids.
    #[error("line name {name:?} is shared by ids {}", candidates.join(", "))]
    AmbiguousLineName {
        name: String,
        candidates: Vec<String>,
    },

    /// Missing required fields or unparsable values in input records.
    #[error("malformed input: {0}")]
    MalformedInput(String),
}
