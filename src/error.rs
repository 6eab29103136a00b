use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdaqError {
    #[error("Job not found: {0}")]
    JobNotFound(usize),

    #[error("Job {job} is {state}: cannot {operation}")]
    InvalidState {
        job: usize,
        state: String,
        operation: &'static str,
    },

    #[error("Descriptor error: {0}")]
    Descriptor(String),

    #[error("Descriptor parse error: {0}")]
    DescriptorParse(#[from] toml::de::Error),

    #[error("Signal error: {0}")]
    Signal(String),

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EdaqError>;
