use std::fmt::{Debug, Display};
use thiserror::Error;

/// Result of invoking a [`Handler`](crate::pipeline::Handler).
pub type HandlerResult = Result<(), Error>;

/// Returned by functions that extract data from a request context.
///
/// `what` names the missing resource, e.g. `strand-db/Tx[0]`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not find value {what} in context")]
pub struct MissingContextValue {
    pub what: String,
}

impl MissingContextValue {
    pub fn new(what: impl Into<String>) -> Self {
        Self { what: what.into() }
    }
}

/// Errors produced by pipeline handlers.
#[derive(Error, Debug)]
pub enum Error {
    /// The failure has already been translated into the response.
    #[error("error is handled and is inside the response")]
    Handled,
    #[error(transparent)]
    MissingContext(#[from] MissingContextValue),
    /// Any other application error. An outer boundary decides how it is rendered.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Wrap an arbitrary message as an unhandled error.
    pub fn msg<M>(message: M) -> Self
    where
        M: Display + Debug + Send + Sync + 'static,
    {
        Error::Other(anyhow::Error::msg(message))
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, Error::Handled)
    }

    /// True for every error except [`Error::Handled`].
    pub fn is_unhandled(&self) -> bool {
        !self.is_handled()
    }

    pub fn is_missing_context(&self) -> bool {
        matches!(self, Error::MissingContext(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handled_is_not_unhandled() {
        assert!(Error::Handled.is_handled());
        assert!(!Error::Handled.is_unhandled());
        assert!(Error::msg("boom").is_unhandled());
    }

    #[test]
    fn test_missing_context_message() {
        let err: Error = MissingContextValue::new("strand-db/Tx[2]").into();
        assert!(err.is_missing_context());
        assert_eq!(
            err.to_string(),
            "could not find value strand-db/Tx[2] in context"
        );
    }
}
