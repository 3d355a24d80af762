use crate::errors::RtpError;

/// Protocol version carried in the top two bits of the first octet
/// of every RTP and RTCP packet. Only version 2 is in use today.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RtpVersion {
    V0 = 0,
    V1 = 1,
    #[default]
    V2 = 2,
}

impl TryFrom<u8> for RtpVersion {
    type Error = RtpError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::V0),
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            _ => Err(RtpError::InvalidVersion(value)),
        }
    }
}

impl From<RtpVersion> for u8 {
    fn from(value: RtpVersion) -> Self {
        value as u8
    }
}
