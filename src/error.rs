use thiserror::Error;

/// Errors that can occur when parsing VAST XML or building ad requests
#[derive(Error, Debug)]
pub enum VastError {
    #[error("Failed to parse XML: {0}")]
    XmlParseError(#[from] quick_xml::Error),

    #[error("Malformed VAST document: {0}")]
    MalformedXml(String),

    #[error("Empty VAST document")]
    EmptyDocument,

    #[error("Wrapper depth {depth} exceeds maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("No InLine or Wrapper ad node found")]
    NoAdNode,

    #[error("Wrapper ad without InLine must be resolved before parsing")]
    WrapperWithoutInLine,

    #[error("Wrapper redirect cycle detected at {0}")]
    WrapperCycle(String),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VastError>;
