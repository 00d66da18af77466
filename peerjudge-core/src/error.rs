use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Unknown {kind} '{id}'")]
    NotFound { kind: &'static str, id: String },

    #[error("Reviewer '{reviewer_id}' already judged pair ({item_a}, {item_b})")]
    Conflict {
        reviewer_id: String,
        item_a: i64,
        item_b: i64,
    },

    #[error("Reviewer '{reviewer_id}' has no comparisons left in their quota")]
    QuotaExhausted { reviewer_id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("An open session already exists for project '{project_id}', question '{question_id}'")]
    SessionAlreadyOpen {
        project_id: String,
        question_id: String,
    },

    #[error("No open session for project '{project_id}', question '{question_id}'")]
    SessionNotOpen {
        project_id: String,
        question_id: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session lock poisoned by a panicking writer")]
    LockPoisoned,
}

impl SchedulerError {
    pub(crate) fn reviewer_not_found(id: &str) -> Self {
        SchedulerError::NotFound { kind: "reviewer", id: id.to_string() }
    }

    pub(crate) fn item_not_found(id: i64) -> Self {
        SchedulerError::NotFound { kind: "item", id: id.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode decision record: {0}")]
    Codec(String),

    #[error("Decision store unavailable: {0}")]
    Unavailable(String),
}
