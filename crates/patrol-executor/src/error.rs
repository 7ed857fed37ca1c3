use path_compiler::CompileError;
use thiserror::Error;

pub type Result<T, E = PatrolError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PatrolError {
    #[error("route compilation failed: {0}")]
    Compile(#[from] CompileError),
    #[error("route not configured: {0}")]
    UnknownRoute(String),
    #[error("a patrol is already active on route {0}")]
    AlreadyActive(String),
    #[error("navigation service error: {0}")]
    Navigation(String),
}

#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error("announcement channel unavailable: {0}")]
    Unavailable(String),
}
