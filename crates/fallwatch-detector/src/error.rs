/// Internal error detail, used only for logging and never surfaced to the
/// worker: [`crate::DetectorClient::run`] always returns a plain
/// `Vec<fallwatch_types::Detection>`, translating every variant below into
/// an empty list and a circuit-breaker update. Kept as a real enum anyway,
/// the same way `ci2::Error` and `download_verify::DlError` describe
/// internal failure detail that a caller further up the stack discards.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("service url must use the http scheme: {0}")]
    InvalidServiceUrl(String),
    #[error("service url has no host")]
    MissingHost(String),
    #[error("failed to encode frame: {0}")]
    Encode(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status code: {0}")]
    HttpStatus(u16),
    #[error("failed to parse response JSON: {0}")]
    InvalidJson(String),
}

pub type Result<T> = std::result::Result<T, Error>;
