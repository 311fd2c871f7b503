use sl427_frame::FrameError;

/// Errors raised while building, decoding or validating user data.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Malformed or out-of-range station address.
    #[error("address error: {0}")]
    Address(String),

    /// Control field bytes missing or inconsistent.
    #[error("control field error: {0}")]
    Control(String),

    /// Unknown functional code, missing sub-field or bad data-item payload.
    #[error("data error: {0}")]
    Data(String),

    /// Downlink frame without a password.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The wire envelope around the user data was invalid.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, MessageError>;
