use thiserror::Error;

/// Failures of a single chat exchange.
///
/// Every variant surfaces as exactly one assistant-styled bubble in the
/// transcript; nothing is retried.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The API answered with a non-success status.
    #[error("API error {status}: {message}")]
    Remote { status: u16, message: String },

    /// The API answered 2xx but the payload held no generated text.
    #[error("response contained no generated text")]
    EmptyResponse,

    /// The request never produced a usable response (connection refused,
    /// body read failure, undecodable JSON).
    #[error("{0}")]
    Transport(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        // Keep only the rendered message so results stay Send + 'static
        // across the spawned request task.
        ChatError::Transport(err.to_string())
    }
}

impl ChatError {
    /// The text shown in the chat transcript for this failure.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Remote { status, message } => {
                format!("API error {status}: {message}")
            }
            ChatError::EmptyResponse => {
                "Sorry, I could not generate a response. Please try again.".to_string()
            }
            ChatError::Transport(message) => {
                format!("An error occurred: {message}. Please make sure your API key is correct.")
            }
        }
    }
}
