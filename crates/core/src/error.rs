/// Result alias that carries the custom [`VizError`] type.
pub type Result<T> = std::result::Result<T, VizError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VizError {
    /// Free-form error for cases that do not warrant a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Caller supplied arguments that violate a documented precondition.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// The spectral transform rejected its buffers.
    #[error("fft failure: {0}")]
    Fft(#[from] realfft::FftError),
    /// A render target refused a draw command, usually because of non-finite
    /// geometry produced by a misbehaving visualiser.
    #[error("render failure: {0}")]
    Render(String),
    /// An audio source could not be acquired or resumed.
    #[error("audio source unavailable: {0}")]
    SourceUnavailable(String),
}

impl VizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn render<T: Into<String>>(msg: T) -> Self {
        Self::Render(msg.into())
    }
}

impl From<&str> for VizError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VizError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
