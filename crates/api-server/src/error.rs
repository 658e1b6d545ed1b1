use faststr::FastStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid Request Body: {0}")]
    InvalidRequestBody(FastStr),

    #[error("failed to build client")]
    FailedToBuildClient,

    #[error("server error: {0}")]
    Server(FastStr),
}

pub type Result<T> = std::result::Result<T, Error>;
