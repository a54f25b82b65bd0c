use thiserror::Error;

/// Failure classes surfaced while handling a webhook delivery.
///
/// Only `Configuration` is fatal, and only at startup. Every other variant is
/// turned into a reply for the user via [`ApplicationError::user_message`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("{service} rejected the request with status {status}")]
    UpstreamRejected { service: String, status: u16 },
    #[error("{service} could not be reached: {message}")]
    UpstreamUnreachable { service: String, message: String },
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("malformed card submission: {0}")]
    MalformedCardSubmission(String),
}

impl ApplicationError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(_) => "An unexpected internal error occurred.".to_owned(),
            Self::UpstreamRejected { service, status } => {
                format!("{service} returned an error (status {status}). Please try again.")
            }
            Self::UpstreamUnreachable { service, .. } => {
                format!("{service} is temporarily unavailable. Please retry shortly.")
            }
            Self::UnknownCommand(command) => {
                format!("I don't know the command `{command}`. Ask for **/help** to see what I can do.")
            }
            Self::MalformedCardSubmission(detail) => {
                format!("That card submission could not be processed: {detail}.")
            }
        }
    }
}
