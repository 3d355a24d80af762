use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tokio_util::bytes::Bytes;
use utils::traits::{
    dynamic_sized_packet::DynamicSizedPacket, fixed_packet::FixedPacket, reader::ReadRemainingFrom,
    writer::WriteTo,
};

use crate::{
    errors::{RtpError, RtpResult},
    util::padding::rtp_get_padding_size,
    version::RtpVersion,
};

use super::{RtcpPacketSizeTrait, common_header::RtcpCommonHeader, payload_types::RtcpPayloadType};

///! @see: RFC 3550 6.7 APP: Application-Defined RTCP Packet
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P| subtype |  PT=APP=204   |              length           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           SSRC/CSRC                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          name (ASCII)                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                   application-dependent data                ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Debug, Default, Clone)]
pub struct RtcpAppPacket {
    pub header: RtcpCommonHeader,
    pub subtype: u8,
    pub ssrc: u32,
    pub name: [u8; 4],
    pub payload: Bytes,
}

impl RtcpAppPacket {
    pub fn builder() -> RtcpAppPacketBuilder {
        Default::default()
    }

    pub fn name_str(&self) -> &str {
        std::str::from_utf8(&self.name).unwrap_or_default()
    }
}

impl DynamicSizedPacket for RtcpAppPacket {
    fn get_packet_bytes_count(&self) -> usize {
        let raw_size = self.get_packet_bytes_count_without_padding();
        raw_size + rtp_get_padding_size(raw_size)
    }
}

impl RtcpPacketSizeTrait for RtcpAppPacket {
    fn get_packet_bytes_count_without_padding(&self) -> usize {
        RtcpCommonHeader::bytes_count() // header
          + 4 // ssrc
          + 4 // name
          + self.payload.len() // app data
    }
    fn get_header(&self) -> RtcpCommonHeader {
        RtcpCommonHeader {
            version: RtpVersion::V2,
            padding: false,
            count: self.subtype,
            payload_type: RtcpPayloadType::App,
            length: (self.get_packet_bytes_count() / 4 - 1) as u16,
        }
    }
}

impl<R: io::Read> ReadRemainingFrom<RtcpCommonHeader, R> for RtcpAppPacket {
    type Error = RtpError;
    fn read_remaining_from(header: RtcpCommonHeader, mut reader: R) -> Result<Self, Self::Error> {
        if header.payload_type != RtcpPayloadType::App {
            return Err(RtpError::WrongPayloadType(format!(
                "expect app payload type got {:?} instead",
                header.payload_type
            )));
        }
        let subtype = header.count;
        let ssrc = reader.read_u32::<BigEndian>()?;
        let mut name = [0_u8; 4];
        reader.read_exact(&mut name)?;
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;
        Ok(Self {
            header,
            subtype,
            ssrc,
            name,
            payload: Bytes::from(payload),
        })
    }
}

impl<W: io::Write> WriteTo<W> for RtcpAppPacket {
    type Error = RtpError;
    fn write_to(&self, writer: &mut W) -> Result<(), Self::Error> {
        self.get_header().write_to(writer)?;
        writer.write_u32::<BigEndian>(self.ssrc)?;
        writer.write_all(&self.name)?;
        writer.write_all(&self.payload)?;
        // app data goes on the wire as whole words
        let padding_size = rtp_get_padding_size(self.get_packet_bytes_count_without_padding());
        if padding_size > 0 {
            writer.write_all(&vec![0_u8; padding_size])?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RtcpAppPacketBuilder(RtcpAppPacket);

impl RtcpAppPacketBuilder {
    pub fn subtype(mut self, subtype: u8) -> RtpResult<Self> {
        if subtype > 0b1_1111 {
            return Err(RtpError::AppSubtypeOutOfRange(subtype));
        }
        self.0.subtype = subtype;
        Ok(self)
    }

    pub fn ssrc(mut self, ssrc: u32) -> Self {
        self.0.ssrc = ssrc;
        self
    }

    pub fn name(mut self, name: &str) -> RtpResult<Self> {
        if name.len() != 4 || !name.is_ascii() {
            return Err(RtpError::InvalidAppPacketName(name.to_string()));
        }
        self.0.name.copy_from_slice(name.as_bytes());
        Ok(self)
    }

    pub fn payload(mut self, payload: Bytes) -> Self {
        self.0.payload = payload;
        self
    }

    pub fn build(mut self) -> RtpResult<RtcpAppPacket> {
        self.0.header = self.0.get_header();
        Ok(self.0)
    }
}
