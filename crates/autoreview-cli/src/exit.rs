use autoreview_core::PlatformError;
use autoreview_orchestrator::OrchestratorError;

// ---------------------------------------------------------------------------
// CliExit: typed non-zero exit codes, resolved once in main
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum CliExit {
    Validation(String),
    Subprocess(String),
    Auth(String),
}

impl CliExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliExit::Validation(_) => 1,
            CliExit::Subprocess(_) => 2,
            CliExit::Auth(_) => 3,
        }
    }
}

impl std::fmt::Display for CliExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliExit::Validation(msg) => write!(f, "{msg}"),
            CliExit::Subprocess(msg) => write!(f, "review process failed: {msg}"),
            CliExit::Auth(msg) => write!(f, "authentication failed: {msg}"),
        }
    }
}

impl std::error::Error for CliExit {}

/// Wrap an orchestrator error so its class survives to the exit code.
pub fn from_orchestrator(e: OrchestratorError) -> anyhow::Error {
    match e {
        OrchestratorError::Validation(msg) => CliExit::Validation(msg).into(),
        OrchestratorError::Subprocess(msg) => CliExit::Subprocess(msg).into(),
        OrchestratorError::AuthFailed(msg) => CliExit::Auth(msg).into(),
        OrchestratorError::Platform(PlatformError::Auth(msg)) => CliExit::Auth(msg).into(),
        other => anyhow::Error::new(other),
    }
}

pub fn code_for(e: &anyhow::Error) -> i32 {
    e.chain()
        .find_map(|cause| cause.downcast_ref::<CliExit>())
        .map(CliExit::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn codes_follow_error_class() {
        let e = from_orchestrator(OrchestratorError::Subprocess("boom".into()));
        assert_eq!(code_for(&e), 2);
        let e = from_orchestrator(OrchestratorError::AuthFailed("expired".into()));
        assert_eq!(code_for(&e), 3);
        let e = from_orchestrator(OrchestratorError::Platform(PlatformError::Auth("401".into())));
        assert_eq!(code_for(&e), 3);
        let e = from_orchestrator(OrchestratorError::AlreadyRunning("app#1".into()));
        assert_eq!(code_for(&e), 1);
    }

    #[test]
    fn code_survives_context() {
        let e: anyhow::Error = CliExit::Subprocess("x".into()).into();
        let e = Err::<(), _>(e).context("review #4").unwrap_err();
        assert_eq!(code_for(&e), 2);
    }
}
