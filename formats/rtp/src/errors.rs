use std::{io, string};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtpError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid utf8 text: {0}")]
    InvalidUtf8(#[from] string::FromUtf8Error),
    #[error("unknown rtp version: {0}")]
    InvalidVersion(u8),
    #[error("unsupported rtp version: {0}")]
    UnsupportedVersion(u8),
    #[error("packet is truncated")]
    PacketTruncated,
    #[error("bad padding size: {0}")]
    BadPaddingSize(usize),
    #[error("payload type out of range: {0}")]
    PayloadTypeOutOfRange(u8),
    #[error("too many csrc identifiers")]
    TooManyCSRC,
    #[error("rtp header extension must be a multiple of 4 bytes: {0}")]
    BadHeaderExtensionSize(usize),
    #[error("unknown rtcp payload type: {0}")]
    UnknownRtcpPayloadType(u8),
    #[error("wrong payload type: {0}")]
    WrongPayloadType(String),
    #[error("too many report blocks")]
    TooManyReportBlocks,
    #[error("too many sources in bye packet")]
    TooManyByeSources,
    #[error("bye reason too large: {0}")]
    ByeReasonTooLarge(String),
    #[error("unknown sdes item type: {0}")]
    UnknownSdesType(u8),
    #[error("sdes value too large: {0}")]
    SDESValueTooLarge(String),
    #[error("malformed sdes priv item")]
    MalformedSdesPrivItem,
    #[error("sdes packet has too many chunks")]
    SDESTooManyChunks,
    #[error("app packet subtype out of range: {0}")]
    AppSubtypeOutOfRange(u8),
    #[error("app packet name must be 4 ascii characters: {0}")]
    InvalidAppPacketName(String),
    #[error("empty rtcp compound packet")]
    EmptyRtcpCompoundPacket,
    #[error("compound packet must start with a sender or receiver report")]
    BadFirstPacketInRtcpCompound,
    #[error("compound packet carries a source description without a cname")]
    MissingCnameInRtcpCompound,
}

pub type RtpResult<T> = Result<T, RtpError>;
