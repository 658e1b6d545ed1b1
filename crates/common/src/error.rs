use faststr::FastStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    MsgError(FastStr),
    #[error("no usable configuration: {0}")]
    ConfigMissing(FastStr),
    #[error("invalid configuration value for {0}: {1}")]
    InvalidConfig(&'static str, FastStr),
    #[error("Reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("Invalid response data: {0} status: {1}")]
    InvalidResponseData(FastStr, u16),
    #[error("upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),
    #[error("serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
