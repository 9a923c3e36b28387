/// Failure reported by an external model collaborator (segmenter, detector,
/// fiducial detector).
///
/// The pipeline never aborts on these: a failing collaborator contributes
/// zero results for the run.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{collaborator} failed: {message}")]
pub struct CollaboratorError {
    pub collaborator: String,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}
