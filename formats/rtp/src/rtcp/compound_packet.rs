use std::io::{self, Cursor, Read};

use utils::traits::{
    dynamic_sized_packet::DynamicSizedPacket,
    reader::{TryReadFrom, TryReadRemainingFrom},
    writer::WriteTo,
};

use crate::errors::{RtpError, RtpResult};

use super::{RtcpPacket, common_header::RtcpCommonHeader, payload_types::RtcpPayloadType};

/// A UDP datagram worth of control packets. A valid compound starts
/// with a sender or receiver report, and any source description in it
/// must carry a CNAME.
#[derive(Debug, Default, Clone)]
pub struct RtcpCompoundPacket(Vec<RtcpPacket>);

impl RtcpCompoundPacket {
    pub fn builder() -> RtcpCompoundPacketBuilder {
        Default::default()
    }

    pub fn packets(&self) -> &[RtcpPacket] {
        &self.0
    }

    pub fn into_packets(self) -> Vec<RtcpPacket> {
        self.0
    }

    /// Decodes a complete datagram. Validity of the compound structure
    /// is not enforced on the receive path.
    pub fn decode(buffer: &[u8]) -> RtpResult<Self> {
        let mut cursor = Cursor::new(buffer);
        match Self::try_read_from(&mut cursor)? {
            Some(packet) => Ok(packet),
            None => Err(RtpError::PacketTruncated),
        }
    }

    pub fn validate(&self) -> RtpResult<()> {
        if self.0.is_empty() {
            return Err(RtpError::EmptyRtcpCompoundPacket);
        }

        let first_type = self.0[0].payload_type();
        if first_type != RtcpPayloadType::SenderReport
            && first_type != RtcpPayloadType::ReceiverReport
        {
            return Err(RtpError::BadFirstPacketInRtcpCompound);
        }

        for packet in self.0.iter() {
            if let RtcpPacket::SourceDescription(packet) = packet
                && packet.get_cname().is_none()
            {
                return Err(RtpError::MissingCnameInRtcpCompound);
            }
        }
        Ok(())
    }

    /// Writes the compound with each packet padded so the running
    /// octet count stays on multiples of `fixed_block_size`.
    pub fn write_aligned_to<W: io::Write>(
        &self,
        writer: &mut W,
        fixed_block_size: Option<usize>,
    ) -> RtpResult<usize> {
        self.validate()?;
        let mut written = 0;
        for packet in &self.0 {
            written += packet.write_aligned_to(writer, written, fixed_block_size)?;
        }
        Ok(written)
    }
}

impl DynamicSizedPacket for RtcpCompoundPacket {
    fn get_packet_bytes_count(&self) -> usize {
        self.0
            .iter()
            .fold(0, |sum, v| sum + v.get_packet_bytes_count())
    }
}

impl<R: AsRef<[u8]>> TryReadFrom<R> for RtcpCompoundPacket {
    type Error = RtpError;
    fn try_read_from(reader: &mut Cursor<R>) -> Result<Option<Self>, Self::Error> {
        let mut packets = vec![];
        loop {
            let header = match RtcpCommonHeader::try_read_from(reader.by_ref())? {
                Some(header) => header,
                None => break,
            };

            match RtcpPacket::try_read_remaining_from(header, reader.by_ref())? {
                Some(packet) => packets.push(packet),
                None => return Ok(None),
            }
        }
        if packets.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self(packets)))
    }
}

impl<W: io::Write> WriteTo<W> for RtcpCompoundPacket {
    type Error = RtpError;
    fn write_to(&self, writer: &mut W) -> Result<(), Self::Error> {
        self.validate()?;
        self.0
            .iter()
            .try_for_each(|packet| packet.write_to(writer))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RtcpCompoundPacketBuilder(Vec<RtcpPacket>);

impl RtcpCompoundPacketBuilder {
    pub fn packet(mut self, packet: RtcpPacket) -> Self {
        self.0.push(packet);
        self
    }

    pub fn packets(mut self, mut packets: Vec<RtcpPacket>) -> Self {
        self.0.append(&mut packets);
        self
    }

    pub fn build(self) -> RtpResult<RtcpCompoundPacket> {
        let compound = RtcpCompoundPacket(self.0);
        compound.validate()?;
        Ok(compound)
    }
}
