use thiserror::Error;

pub type Result<T, E = CompileError> = core::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("token {index}: unknown instruction '{token}'")]
    UnknownToken { index: usize, token: String },
    #[error("token {index}: invalid distance in '{token}'")]
    InvalidDistance { index: usize, token: String },
    #[error("token {index}: negative distance {distance}")]
    NegativeDistance { index: usize, distance: f64 },
}

impl CompileError {
    /// Rebase a single-token error onto its position in a token list.
    pub(crate) fn at(self, index: usize) -> Self {
        match self {
            CompileError::UnknownToken { token, .. } => CompileError::UnknownToken { index, token },
            CompileError::InvalidDistance { token, .. } => {
                CompileError::InvalidDistance { index, token }
            }
            CompileError::NegativeDistance { distance, .. } => {
                CompileError::NegativeDistance { index, distance }
            }
        }
    }

    pub fn index(&self) -> usize {
        match self {
            CompileError::UnknownToken { index, .. }
            | CompileError::InvalidDistance { index, .. }
            | CompileError::NegativeDistance { index, .. } => *index,
        }
    }
}
