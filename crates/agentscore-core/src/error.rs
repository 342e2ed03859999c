use thiserror::Error;

/// Errors surfaced by the analysis engine and its collaborators.
#[derive(Debug, Error)]
pub enum AgentScoreError {
    #[error("call '{0}' not found in workflow graph")]
    UnknownCall(String),

    #[error("workflow '{0}' not found")]
    UnknownWorkflow(String),

    #[error("call '{call_id}' already recorded in workflow '{workflow_id}'")]
    DuplicateCall { workflow_id: String, call_id: String },

    #[error("edge {source_id} -> {target_id} belongs to workflow '{edge_workflow}', not '{workflow}'")]
    CrossWorkflowEdge {
        source_id: String,
        target_id: String,
        edge_workflow: String,
        workflow: String,
    },

    #[error("failed to parse trace: {0}")]
    TraceParse(String),

    #[error("trace store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentScoreError>;
