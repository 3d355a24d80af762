use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};
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

///! @see: RFC 3550 6.6 BYE: Goodbye RTCP Packet
///        0                   1                   2                   3
///        0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       |V=2|P|    SC   |   PT=BYE=203  |            length             |
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       |                             SSRC/CSRC                         |
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       :                               ...                             :
///       +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// (opt) |     length    |             reason for leaving              ...
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///
#[derive(Debug, Default, Clone)]
pub struct RtcpByePacket {
    pub header: RtcpCommonHeader,
    pub ssrc_list: Vec<u32>,
    pub reason: Option<String>,
}

impl RtcpByePacket {
    pub fn builder() -> RtcpByePacketBuilder {
        Default::default()
    }
}

impl DynamicSizedPacket for RtcpByePacket {
    fn get_packet_bytes_count(&self) -> usize {
        let raw_size = self.get_packet_bytes_count_without_padding();
        raw_size + rtp_get_padding_size(raw_size)
    }
}

impl RtcpPacketSizeTrait for RtcpByePacket {
    fn get_packet_bytes_count_without_padding(&self) -> usize {
        RtcpCommonHeader::bytes_count() // header
        + self.ssrc_list.len() * 4 // ssrc list
        + self.reason.as_ref().map_or_else(|| 0, |v| v.len() + 1) // reason and its length octet
    }
    fn get_header(&self) -> RtcpCommonHeader {
        RtcpCommonHeader {
            version: RtpVersion::V2,
            // the null octets after the reason live inside the length,
            // they are not signaled padding
            padding: false,
            count: self.ssrc_list.len() as u8,
            payload_type: RtcpPayloadType::Bye,
            length: (self.get_packet_bytes_count() / 4 - 1) as u16,
        }
    }
}

impl<R: io::Read> ReadRemainingFrom<RtcpCommonHeader, R> for RtcpByePacket {
    type Error = RtpError;
    fn read_remaining_from(header: RtcpCommonHeader, mut reader: R) -> Result<Self, Self::Error> {
        if header.payload_type != RtcpPayloadType::Bye {
            return Err(RtpError::WrongPayloadType(format!(
                "expect bye payload type got {:?} instead",
                header.payload_type
            )));
        }
        let mut ssrc_list = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            ssrc_list.push(reader.read_u32::<BigEndian>()?);
        }

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        let reason = if buffer.is_empty() || buffer[0] == 0 {
            None
        } else {
            let length = buffer[0] as usize;
            if length + 1 > buffer.len() {
                return Err(RtpError::PacketTruncated);
            }
            Some(String::from_utf8(buffer[1..=length].to_vec())?)
        };

        Ok(Self {
            header,
            ssrc_list,
            reason,
        })
    }
}

impl<W: io::Write> WriteTo<W> for RtcpByePacket {
    type Error = RtpError;
    fn write_to(&self, writer: &mut W) -> Result<(), Self::Error> {
        self.get_header().write_to(writer)?;
        self.ssrc_list
            .iter()
            .try_for_each(|ssrc| writer.write_u32::<BigEndian>(*ssrc))?;

        if let Some(reason) = &self.reason {
            writer.write_u8(reason.len() as u8)?;
            writer.write_all(reason.as_bytes())?;
        }
        let padding_size = rtp_get_padding_size(self.get_packet_bytes_count_without_padding());
        if padding_size > 0 {
            writer.write_all(&vec![0_u8; padding_size])?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RtcpByePacketBuilder(RtcpByePacket);

impl RtcpByePacketBuilder {
    pub fn ssrc(mut self, ssrc: u32) -> Self {
        self.0.ssrc_list.push(ssrc);
        self
    }

    pub fn reason(mut self, reason: String) -> RtpResult<Self> {
        if reason.len() > 255 {
            return Err(RtpError::ByeReasonTooLarge(reason));
        }
        self.0.reason = Some(reason);
        Ok(self)
    }

    pub fn build(mut self) -> RtpResult<RtcpByePacket> {
        if self.0.ssrc_list.len() > 31 {
            return Err(RtpError::TooManyByeSources);
        }
        self.0.header = self.0.get_header();
        Ok(self.0)
    }
}
