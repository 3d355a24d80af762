use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io;
use utils::traits::{fixed_packet::FixedPacket, reader::ReadFrom, writer::WriteTo};

use crate::errors::RtpError;

use super::simple_ntp::SimpleShortNtp;

/// Reception report block, 24 bytes, carried by both sender and
/// receiver reports. One block per source the reporter hears from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReportBlock {
    pub ssrc: u32,
    /// Fixed point with the binary point at the left edge, i.e. the
    /// loss fraction times 256.
    pub fraction_lost: u8,
    /// Signed 24 bits on the wire.
    pub cumulative_packets_lost: i32,
    pub extended_highest_sequence_number: u32,
    pub interarrival_jitter: u32,
    pub last_sender_report_timestamp: SimpleShortNtp,
    /// The delay, expressed in units of 1/65536 seconds,
    /// between receiving the last SR packet from source SSRC n
    /// and sending this reception report block.
    /// If no SR packet has been received yet from SSRC n,
    /// the DLSR field is set to zero.
    pub delay_since_last_sender_report: u32,
}

impl FixedPacket for ReportBlock {
    fn bytes_count() -> usize {
        24
    }
}

impl<R: io::Read> ReadFrom<R> for ReportBlock {
    type Error = RtpError;
    fn read_from(mut reader: R) -> Result<Self, Self::Error> {
        let ssrc = reader.read_u32::<BigEndian>()?;
        let fraction_lost = reader.read_u8()?;
        let cumulative_packets_lost = reader.read_i24::<BigEndian>()?;
        let extended_highest_sequence_number = reader.read_u32::<BigEndian>()?;
        let interarrival_jitter = reader.read_u32::<BigEndian>()?;
        let last_sender_report_timestamp = reader.read_u32::<BigEndian>()?;
        let delay_since_last_sender_report = reader.read_u32::<BigEndian>()?;
        Ok(Self {
            ssrc,
            fraction_lost,
            cumulative_packets_lost,
            extended_highest_sequence_number,
            interarrival_jitter,
            last_sender_report_timestamp: last_sender_report_timestamp.into(),
            delay_since_last_sender_report,
        })
    }
}

impl<W: io::Write> WriteTo<W> for ReportBlock {
    type Error = RtpError;
    fn write_to(&self, writer: &mut W) -> Result<(), Self::Error> {
        writer.write_u32::<BigEndian>(self.ssrc)?;
        writer.write_u8(self.fraction_lost)?;
        writer.write_i24::<BigEndian>(self.cumulative_packets_lost)?;
        writer.write_u32::<BigEndian>(self.extended_highest_sequence_number)?;
        writer.write_u32::<BigEndian>(self.interarrival_jitter)?;
        writer.write_u32::<BigEndian>(self.last_sender_report_timestamp.into())?;
        writer.write_u32::<BigEndian>(self.delay_since_last_sender_report)?;
        Ok(())
    }
}

impl ReportBlock {
    pub fn builder() -> RtcpReportBlockBuilder {
        Default::default()
    }
}

#[derive(Debug, Default)]
pub struct RtcpReportBlockBuilder(ReportBlock);

impl RtcpReportBlockBuilder {
    pub fn ssrc(mut self, ssrc: u32) -> Self {
        self.0.ssrc = ssrc;
        self
    }

    pub fn fraction_lost(mut self, fraction_lost: u8) -> Self {
        self.0.fraction_lost = fraction_lost;
        self
    }

    pub fn cumulative_packets_lost(mut self, cumulative_packets_lost: i32) -> Self {
        self.0.cumulative_packets_lost = cumulative_packets_lost;
        self
    }

    pub fn extended_highest_sequence_number(mut self, sequence_number: u32) -> Self {
        self.0.extended_highest_sequence_number = sequence_number;
        self
    }

    pub fn interarrival_jitter(mut self, jitter: u32) -> Self {
        self.0.interarrival_jitter = jitter;
        self
    }

    pub fn last_sr<T: Into<SimpleShortNtp>>(mut self, lsr: T) -> Self {
        self.0.last_sender_report_timestamp = lsr.into();
        self
    }

    pub fn delay_since_last_sr(mut self, dlsr: u32) -> Self {
        self.0.delay_since_last_sender_report = dlsr;
        self
    }

    pub fn build(self) -> ReportBlock {
        self.0
    }
}
