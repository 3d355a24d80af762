pub(crate) mod padding;

pub trait RtpPaddedPacketTrait {
    fn get_packet_bytes_count_without_padding(&self) -> usize;
}
