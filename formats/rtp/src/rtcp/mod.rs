use std::io::{self, Cursor, Read};

use app::RtcpAppPacket;
use bye::RtcpByePacket;
use common_header::RtcpCommonHeader;
use payload_types::RtcpPayloadType;
use receiver_report::RtcpReceiverReport;
use sdes::RtcpSourceDescriptionPacket;
use sender_report::RtcpSenderReport;
use tokio_util::bytes::Buf;
use utils::traits::{
    dynamic_sized_packet::DynamicSizedPacket,
    reader::{ReadRemainingFrom, TryReadFrom, TryReadRemainingFrom},
    writer::WriteTo,
};

use crate::{
    errors::{RtpError, RtpResult},
    util::padding::rtp_get_block_padding_size,
    version::RtpVersion,
};

pub mod app;
pub mod bye;
pub mod common_header;
pub mod compound_packet;
pub mod framed;
pub mod payload_types;
pub mod receiver_report;
pub mod report_block;
pub mod sdes;
pub mod sender_report;
pub mod simple_ntp;

pub trait RtcpPacketSizeTrait: DynamicSizedPacket {
    fn get_packet_bytes_count_without_padding(&self) -> usize;
    fn get_header(&self) -> RtcpCommonHeader;
}

#[derive(Debug, Clone)]
pub enum RtcpPacket {
    SenderReport(RtcpSenderReport),
    ReceiverReport(RtcpReceiverReport),
    SourceDescription(RtcpSourceDescriptionPacket),
    Bye(RtcpByePacket),
    App(RtcpAppPacket),
}

impl RtcpPacket {
    pub fn payload_type(&self) -> RtcpPayloadType {
        match self {
            RtcpPacket::SenderReport(_) => RtcpPayloadType::SenderReport,
            RtcpPacket::ReceiverReport(_) => RtcpPayloadType::ReceiverReport,
            RtcpPacket::SourceDescription(_) => RtcpPayloadType::SourceDescription,
            RtcpPacket::Bye(_) => RtcpPayloadType::Bye,
            RtcpPacket::App(_) => RtcpPayloadType::App,
        }
    }

    /// Decodes exactly one packet from a complete buffer.
    pub fn decode_single(buffer: &[u8]) -> RtpResult<Self> {
        let mut cursor = Cursor::new(buffer);
        let header = match RtcpCommonHeader::try_read_from(&mut cursor)? {
            Some(header) => header,
            None => return Err(RtpError::PacketTruncated),
        };
        match Self::try_read_remaining_from(header, &mut cursor)? {
            Some(packet) => Ok(packet),
            None => Err(RtpError::PacketTruncated),
        }
    }

    /// Writes the packet padded so that `compound_offset` plus the
    /// written size lands on a multiple of `fixed_block_size`. The P
    /// bit and the length field are patched to cover the padding.
    pub fn write_aligned_to<W: io::Write>(
        &self,
        writer: &mut W,
        compound_offset: usize,
        fixed_block_size: Option<usize>,
    ) -> RtpResult<usize> {
        let natural_size = self.get_packet_bytes_count();
        let padding = match fixed_block_size {
            Some(block_size) if block_size > 0 => {
                rtp_get_block_padding_size(compound_offset, natural_size, block_size)
            }
            _ => 0,
        };
        if padding == 0 {
            self.write_to(writer)?;
            return Ok(natural_size);
        }
        if padding > u8::MAX as usize {
            return Err(RtpError::BadPaddingSize(padding));
        }

        let padded_size = natural_size + padding;
        let mut buffer = Vec::with_capacity(padded_size);
        self.write_to(&mut buffer)?;
        buffer[0] |= 0b0010_0000;
        let length_words = (padded_size / 4 - 1) as u16;
        buffer[2..4].copy_from_slice(&length_words.to_be_bytes());
        buffer.resize(padded_size, 0);
        buffer[padded_size - 1] = padding as u8;
        writer.write_all(&buffer)?;
        Ok(padded_size)
    }
}

impl DynamicSizedPacket for RtcpPacket {
    fn get_packet_bytes_count(&self) -> usize {
        match self {
            RtcpPacket::SenderReport(packet) => packet.get_packet_bytes_count(),
            RtcpPacket::ReceiverReport(packet) => packet.get_packet_bytes_count(),
            RtcpPacket::SourceDescription(packet) => packet.get_packet_bytes_count(),
            RtcpPacket::Bye(packet) => packet.get_packet_bytes_count(),
            RtcpPacket::App(packet) => packet.get_packet_bytes_count(),
        }
    }
}

impl<R: AsRef<[u8]>> TryReadRemainingFrom<RtcpCommonHeader, R> for RtcpPacket {
    type Error = RtpError;
    fn try_read_remaining_from(
        header: RtcpCommonHeader,
        reader: &mut Cursor<R>,
    ) -> Result<Option<Self>, Self::Error> {
        if header.version != RtpVersion::V2 {
            return Err(RtpError::UnsupportedVersion(header.version.into()));
        }
        let bytes_remaining = (header.length as usize) * 4;
        if reader.remaining() < bytes_remaining {
            return Ok(None);
        }

        let mut remaining_bytes = vec![0_u8; bytes_remaining];
        reader.read_exact(&mut remaining_bytes)?;

        if header.padding {
            let padding_bytes = remaining_bytes.last().copied().map_or(0, |b| b as usize);
            if padding_bytes == 0 || padding_bytes > remaining_bytes.len() {
                return Err(RtpError::BadPaddingSize(padding_bytes));
            }
            remaining_bytes.truncate(remaining_bytes.len() - padding_bytes);
        }

        let cursor = Cursor::new(&remaining_bytes);

        match header.payload_type {
            RtcpPayloadType::SenderReport => Ok(Some(Self::SenderReport(
                RtcpSenderReport::read_remaining_from(header, cursor)?,
            ))),
            RtcpPayloadType::ReceiverReport => Ok(Some(Self::ReceiverReport(
                RtcpReceiverReport::read_remaining_from(header, cursor)?,
            ))),
            RtcpPayloadType::SourceDescription => Ok(Some(Self::SourceDescription(
                RtcpSourceDescriptionPacket::read_remaining_from(header, cursor)?,
            ))),
            RtcpPayloadType::Bye => Ok(Some(Self::Bye(RtcpByePacket::read_remaining_from(
                header, cursor,
            )?))),
            RtcpPayloadType::App => Ok(Some(Self::App(RtcpAppPacket::read_remaining_from(
                header, cursor,
            )?))),
        }
    }
}

impl<W: io::Write> WriteTo<W> for RtcpPacket {
    type Error = RtpError;
    fn write_to(&self, writer: &mut W) -> Result<(), Self::Error> {
        match self {
            RtcpPacket::SenderReport(packet) => packet.write_to(writer),
            RtcpPacket::ReceiverReport(packet) => packet.write_to(writer),
            RtcpPacket::SourceDescription(packet) => packet.write_to(writer),
            RtcpPacket::Bye(packet) => packet.write_to(writer),
            RtcpPacket::App(packet) => packet.write_to(writer),
        }
    }
}
