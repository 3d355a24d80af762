use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num::ToPrimitive;
use std::io::{self, Read};
use utils::traits::{
    dynamic_sized_packet::DynamicSizedPacket,
    fixed_packet::FixedPacket,
    reader::{ReadFrom, ReadRemainingFrom},
    writer::WriteTo,
};

use crate::{
    errors::{RtpError, RtpResult},
    util::{
        RtpPaddedPacketTrait,
        padding::{rtp_get_padding_size, rtp_need_padding},
    },
    version::RtpVersion,
};

use super::{RtcpPacketSizeTrait, common_header::RtcpCommonHeader, payload_types::RtcpPayloadType};

// @see: RFC 3550 6.5 SDES: Source Description RTCP Packet
/// ```text
///         0                   1                   2                   3
///         0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// header |V=2|P|    SC   |  PT=SDES=202  |             length            |
///        +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// chunk  |                             SSRC/CSRC_1                       |
///     1  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///        |                             SDES items                        |
///        |                                ...                            |
///        +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// chunk  |                             SSRC/CSRC_2                       |
///     2  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///        |                             SDES items                        |
///        |                                ...                            |
///        +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SDESItemType {
    CNAME = 1,
    NAME = 2,
    EMAIL = 3,
    PHONE = 4,
    LOC = 5,
    TOOL = 6,
    NOTE = 7,
    PRIV = 8,
}

impl From<SDESItemType> for u8 {
    fn from(value: SDESItemType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for SDESItemType {
    type Error = RtpError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::CNAME),
            2 => Ok(Self::NAME),
            3 => Ok(Self::EMAIL),
            4 => Ok(Self::PHONE),
            5 => Ok(Self::LOC),
            6 => Ok(Self::TOOL),
            7 => Ok(Self::NOTE),
            8 => Ok(Self::PRIV),
            _ => Err(RtpError::UnknownSdesType(value)),
        }
    }
}

/// One TLV item inside a chunk. The prefix is only present for PRIV
/// items, where it shares the 255-octet body with the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SDESItem {
    item_type: SDESItemType,
    prefix: Option<String>,
    value: String,
}

impl SDESItem {
    pub fn new(item_type: SDESItemType, value: String) -> RtpResult<Self> {
        if item_type == SDESItemType::PRIV {
            return Err(RtpError::MalformedSdesPrivItem);
        }
        if value.len() > 255 {
            return Err(RtpError::SDESValueTooLarge(value));
        }
        Ok(Self {
            item_type,
            prefix: None,
            value,
        })
    }

    pub fn private(prefix: String, value: String) -> RtpResult<Self> {
        if prefix.len() + 1 + value.len() > 255 {
            return Err(RtpError::SDESValueTooLarge(value));
        }
        Ok(Self {
            item_type: SDESItemType::PRIV,
            prefix: Some(prefix),
            value,
        })
    }

    pub fn item_type(&self) -> SDESItemType {
        self.item_type
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn body_bytes_count(&self) -> usize {
        self.prefix.as_ref().map_or_else(|| 0, |v| v.len() + 1) + self.value.len()
    }
}

impl DynamicSizedPacket for SDESItem {
    fn get_packet_bytes_count(&self) -> usize {
        1 // item type
          + 1 // body length
          + self.body_bytes_count()
    }
}

impl<R: io::Read> ReadRemainingFrom<SDESItemType, R> for SDESItem {
    type Error = RtpError;
    fn read_remaining_from(item_type: SDESItemType, mut reader: R) -> Result<Self, Self::Error> {
        let length = reader.read_u8()? as usize;
        if item_type == SDESItemType::PRIV {
            if length < 1 {
                return Err(RtpError::MalformedSdesPrivItem);
            }
            let prefix_length = reader.read_u8()? as usize;
            if prefix_length + 1 > length {
                return Err(RtpError::MalformedSdesPrivItem);
            }
            let mut prefix_bytes = vec![0_u8; prefix_length];
            reader.read_exact(&mut prefix_bytes)?;
            let mut value_bytes = vec![0_u8; length - 1 - prefix_length];
            reader.read_exact(&mut value_bytes)?;
            Ok(Self {
                item_type,
                prefix: Some(String::from_utf8(prefix_bytes)?),
                value: String::from_utf8(value_bytes)?,
            })
        } else {
            let mut value_bytes = vec![0_u8; length];
            reader.read_exact(&mut value_bytes)?;
            Ok(Self {
                item_type,
                prefix: None,
                value: String::from_utf8(value_bytes)?,
            })
        }
    }
}

impl<W: io::Write> WriteTo<W> for SDESItem {
    type Error = RtpError;
    fn write_to(&self, writer: &mut W) -> Result<(), Self::Error> {
        writer.write_u8(self.item_type.into())?;
        let length = self
            .body_bytes_count()
            .to_u8()
            .ok_or_else(|| RtpError::SDESValueTooLarge(self.value.clone()))?;
        writer.write_u8(length)?;
        if let Some(prefix) = &self.prefix {
            writer.write_u8(prefix.len() as u8)?;
            writer.write_all(prefix.as_bytes())?;
        }
        writer.write_all(self.value.as_bytes())?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SDESChunk {
    pub ssrc: u32,
    pub items: Vec<SDESItem>,
}

impl DynamicSizedPacket for SDESChunk {
    fn get_packet_bytes_count(&self) -> usize {
        let len = self.get_packet_bytes_count_without_padding();
        if rtp_need_padding(len) {
            len + rtp_get_padding_size(len)
        } else {
            // a full null word terminates an already aligned chunk
            len + 4
        }
    }
}

impl RtpPaddedPacketTrait for SDESChunk {
    fn get_packet_bytes_count_without_padding(&self) -> usize {
        4 + self
            .items
            .iter()
            .fold(0, |sum, v| v.get_packet_bytes_count() + sum)
    }
}

impl<R: io::Read> ReadFrom<R> for SDESChunk {
    type Error = RtpError;
    fn read_from(mut reader: R) -> Result<Self, Self::Error> {
        let ssrc = reader.read_u32::<BigEndian>()?;
        let mut bytes_read = 0;
        let mut items = Vec::new();
        loop {
            let item_type = reader.read_u8()?;
            bytes_read += 1;
            if item_type != 0 {
                let item = SDESItem::read_remaining_from(item_type.try_into()?, reader.by_ref())?;
                bytes_read += item.get_packet_bytes_count() - 1;
                items.push(item);
            } else {
                // null octets pad the chunk to the next word boundary
                while bytes_read % 4 != 0 {
                    let _ = reader.read_u8()?;
                    bytes_read += 1;
                }
                break;
            }
        }

        Ok(Self { ssrc, items })
    }
}

impl<W: io::Write> WriteTo<W> for SDESChunk {
    type Error = RtpError;
    fn write_to(&self, writer: &mut W) -> Result<(), Self::Error> {
        writer.write_u32::<BigEndian>(self.ssrc)?;
        self.items
            .iter()
            .try_for_each(|item| item.write_to(writer))?;
        let raw_len = self.get_packet_bytes_count_without_padding();
        let padding_size = rtp_get_padding_size(raw_len);
        if padding_size == 0 {
            writer.write_u32::<BigEndian>(0)?;
        } else {
            writer.write_all(&vec![0_u8; padding_size])?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct RtcpSourceDescriptionPacket {
    pub header: RtcpCommonHeader,
    pub chunks: Vec<SDESChunk>,
}

impl DynamicSizedPacket for RtcpSourceDescriptionPacket {
    fn get_packet_bytes_count(&self) -> usize {
        self.get_packet_bytes_count_without_padding()
    }
}

impl RtcpPacketSizeTrait for RtcpSourceDescriptionPacket {
    fn get_packet_bytes_count_without_padding(&self) -> usize {
        // chunk sizes already include their null terminators
        RtcpCommonHeader::bytes_count()
            + self
                .chunks
                .iter()
                .fold(0, |sum, v| v.get_packet_bytes_count() + sum)
    }
    fn get_header(&self) -> RtcpCommonHeader {
        RtcpCommonHeader {
            version: RtpVersion::V2,
            padding: false,
            count: self.chunks.len() as u8,
            payload_type: RtcpPayloadType::SourceDescription,
            length: (self.get_packet_bytes_count() / 4 - 1) as u16,
        }
    }
}

impl<R: io::Read> ReadRemainingFrom<RtcpCommonHeader, R> for RtcpSourceDescriptionPacket {
    type Error = RtpError;
    fn read_remaining_from(header: RtcpCommonHeader, mut reader: R) -> Result<Self, Self::Error> {
        if header.payload_type != RtcpPayloadType::SourceDescription {
            return Err(RtpError::WrongPayloadType(format!(
                "expect sdes payload type got {:?} instead",
                header.payload_type
            )));
        }

        let mut chunks = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            chunks.push(SDESChunk::read_from(reader.by_ref())?);
        }

        Ok(Self { header, chunks })
    }
}

impl<W: io::Write> WriteTo<W> for RtcpSourceDescriptionPacket {
    type Error = RtpError;
    fn write_to(&self, writer: &mut W) -> Result<(), Self::Error> {
        self.get_header().write_to(writer)?;
        self.chunks
            .iter()
            .try_for_each(|chunk| chunk.write_to(writer))?;
        Ok(())
    }
}

impl RtcpSourceDescriptionPacket {
    pub fn builder() -> RtcpSourceDescriptionPacketBuilder {
        RtcpSourceDescriptionPacketBuilder::new()
    }

    pub fn get_cname(&self) -> Option<String> {
        self.chunks.iter().find_map(|v| {
            v.items.iter().find_map(|item| {
                if !matches!(item.item_type, SDESItemType::CNAME) {
                    return None;
                }
                Some(item.value.clone())
            })
        })
    }

    pub fn get_cname_of(&self, ssrc: u32) -> Option<String> {
        self.chunks.iter().find_map(|v| {
            if v.ssrc != ssrc {
                return None;
            }
            v.items.iter().find_map(|item| {
                if !matches!(item.item_type, SDESItemType::CNAME) {
                    return None;
                }
                Some(item.value.clone())
            })
        })
    }
}

#[derive(Debug, Default)]
pub struct RtcpSourceDescriptionPacketBuilder(RtcpSourceDescriptionPacket);

impl RtcpSourceDescriptionPacketBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn build(mut self) -> RtpResult<RtcpSourceDescriptionPacket> {
        if self.0.chunks.len() > 31 {
            return Err(RtpError::SDESTooManyChunks);
        }
        self.0.header = self.0.get_header();
        Ok(self.0)
    }

    pub fn chunk(mut self, chunk: SDESChunk) -> Self {
        self.0.chunks.push(chunk);
        self
    }

    pub fn item(mut self, ssrc: u32, item: SDESItem) -> Self {
        if let Some(chunk) = self.0.chunks.iter_mut().find(|v| v.ssrc == ssrc) {
            chunk.items.push(item);
        } else {
            self.0.chunks.push(SDESChunk {
                ssrc,
                items: vec![item],
            });
        }
        self
    }

    fn item_from_parts(self, ssrc: u32, item_type: SDESItemType, value: String) -> RtpResult<Self> {
        SDESItem::new(item_type, value).map(|v| self.item(ssrc, v))
    }

    pub fn cname(self, ssrc: u32, cname: String) -> RtpResult<Self> {
        self.item_from_parts(ssrc, SDESItemType::CNAME, cname)
    }

    pub fn name(self, ssrc: u32, name: String) -> RtpResult<Self> {
        self.item_from_parts(ssrc, SDESItemType::NAME, name)
    }

    pub fn email(self, ssrc: u32, email: String) -> RtpResult<Self> {
        self.item_from_parts(ssrc, SDESItemType::EMAIL, email)
    }

    pub fn phone(self, ssrc: u32, phone: String) -> RtpResult<Self> {
        self.item_from_parts(ssrc, SDESItemType::PHONE, phone)
    }

    pub fn loc(self, ssrc: u32, loc: String) -> RtpResult<Self> {
        self.item_from_parts(ssrc, SDESItemType::LOC, loc)
    }

    pub fn tool(self, ssrc: u32, tool: String) -> RtpResult<Self> {
        self.item_from_parts(ssrc, SDESItemType::TOOL, tool)
    }

    pub fn note(self, ssrc: u32, note: String) -> RtpResult<Self> {
        self.item_from_parts(ssrc, SDESItemType::NOTE, note)
    }

    pub fn private(self, ssrc: u32, prefix: String, value: String) -> RtpResult<Self> {
        SDESItem::private(prefix, value).map(|v| self.item(ssrc, v))
    }
}
