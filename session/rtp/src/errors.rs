use std::{io, net::SocketAddr};

use rtp_wire::errors::RtpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtpSessionError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("wire format error: {0}")]
    Wire(#[from] RtpError),
    #[error("bind to {address} failed: {source}")]
    Bind {
        address: SocketAddr,
        source: io::Error,
    },
    #[error("send to {destination} failed")]
    SendFailed { destination: SocketAddr },
    #[error("session is not running")]
    NotRunning,
}

pub type RtpSessionResult<T> = Result<T, RtpSessionError>;
