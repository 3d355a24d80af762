pub mod builder;
pub mod framed;
pub mod header;

use std::io::{self, Cursor, Read};

use builder::RtpPacketBuilder;
use tokio_util::bytes::{Buf, Bytes};
use utils::traits::{
    dynamic_sized_packet::DynamicSizedPacket, reader::TryReadFrom, writer::WriteTo,
};

use crate::{
    errors::{RtpError, RtpResult},
    packet::header::RtpHeader,
    util::padding::rtp_get_block_padding_size,
};

/// A media packet: fixed header, optional csrc list and extension,
/// then an opaque payload. The payload is never inspected here.
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn builder() -> RtpPacketBuilder {
        Default::default()
    }

    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Decodes one packet from a complete datagram.
    pub fn decode(buffer: &[u8]) -> RtpResult<Self> {
        let mut cursor = Cursor::new(buffer);
        match Self::try_read_from(&mut cursor)? {
            Some(packet) => Ok(packet),
            None => Err(RtpError::PacketTruncated),
        }
    }

    /// Header with the redundant fields recomputed from the rest of
    /// the packet, as it goes on the wire for an unpadded encode.
    pub fn get_header(&self) -> RtpHeader {
        RtpHeader {
            version: self.header.version,
            padding: false,
            extension: self.header.header_extension.is_some(),
            csrc_count: self.header.csrc_list.len() as u8,
            marker: self.header.marker,
            payload_type: self.header.payload_type,
            sequence_number: self.header.sequence_number,
            timestamp: self.header.timestamp,
            ssrc: self.header.ssrc,
            csrc_list: self.header.csrc_list.clone(),
            header_extension: self.header.header_extension.clone(),
        }
    }

    /// Writes the packet padded up to a multiple of `block_size`, for
    /// payloads that must hide their real length (e.g. fixed-block
    /// ciphers). The padding octets count themselves in the last one
    /// and are flagged through the header P bit.
    pub fn write_aligned_to<W: io::Write>(
        &self,
        writer: &mut W,
        block_size: usize,
    ) -> RtpResult<usize> {
        let raw_size = self.get_packet_bytes_count();
        let padding = if block_size > 1 {
            rtp_get_block_padding_size(0, raw_size, block_size)
        } else {
            0
        };
        if padding == 0 {
            self.write_to(writer)?;
            return Ok(raw_size);
        }
        if padding > u8::MAX as usize {
            return Err(RtpError::BadPaddingSize(padding));
        }

        let mut header = self.get_header();
        header.padding = true;
        header.write_to(writer)?;
        writer.write_all(&self.payload)?;
        let mut padding_bytes = vec![0_u8; padding];
        padding_bytes[padding - 1] = padding as u8;
        writer.write_all(&padding_bytes)?;
        Ok(raw_size + padding)
    }
}

impl DynamicSizedPacket for RtpPacket {
    fn get_packet_bytes_count(&self) -> usize {
        self.header.get_packet_bytes_count() + self.payload.len()
    }
}

impl<R: AsRef<[u8]>> TryReadFrom<R> for RtpPacket {
    type Error = RtpError;
    fn try_read_from(reader: &mut Cursor<R>) -> Result<Option<Self>, Self::Error> {
        let header = match RtpHeader::try_read_from(reader.by_ref())? {
            Some(header) => header,
            None => return Ok(None),
        };

        let payload_size = reader.remaining();
        let payload = reader.copy_to_bytes(payload_size);

        if header.padding {
            let padding_size = payload.last().copied().map_or(0, |b| b as usize);
            if padding_size == 0 || padding_size > payload_size {
                return Err(RtpError::BadPaddingSize(padding_size));
            }
            Ok(Some(Self {
                header,
                payload: payload.slice(..payload_size - padding_size),
            }))
        } else {
            Ok(Some(Self { header, payload }))
        }
    }
}

impl<W: io::Write> WriteTo<W> for RtpPacket {
    type Error = RtpError;
    fn write_to(&self, writer: &mut W) -> Result<(), Self::Error> {
        self.get_header().write_to(writer)?;
        writer.write_all(&self.payload)?;
        Ok(())
    }
}
