use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering},
};

use parking_lot::RwLock;
use rtp_wire::rtcp::sdes::{SDESChunk, SDESItemType};
use utils::system::time::get_timestamp_ms;

/// Descriptive state carried by SDES items.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RtpParticipantInfo {
    pub cname: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub tool: Option<String>,
    pub note: Option<String>,
    pub priv_prefix: Option<String>,
    pub priv_value: Option<String>,
}

impl RtpParticipantInfo {
    /// Applies every item of a chunk, reporting whether anything changed.
    pub fn update_from_sdes_chunk(&mut self, chunk: &SDESChunk) -> bool {
        let mut changed = false;
        for item in &chunk.items {
            let value = Some(item.value().to_string());
            let slot = match item.item_type() {
                SDESItemType::CNAME => &mut self.cname,
                SDESItemType::NAME => &mut self.name,
                SDESItemType::EMAIL => &mut self.email,
                SDESItemType::PHONE => &mut self.phone,
                SDESItemType::LOC => &mut self.location,
                SDESItemType::TOOL => &mut self.tool,
                SDESItemType::NOTE => &mut self.note,
                SDESItemType::PRIV => {
                    let prefix = item.prefix().map(|v| v.to_string());
                    if self.priv_prefix != prefix {
                        self.priv_prefix = prefix;
                        changed = true;
                    }
                    &mut self.priv_value
                }
            };
            if *slot != value {
                *slot = value;
                changed = true;
            }
        }
        changed
    }
}

/// One source in the session, local or remote. All mutable state is
/// atomics or small locks so per-source updates never take a
/// session-wide lock.
#[derive(Debug)]
pub struct RtpParticipant {
    // -1 until the SSRC is known
    ssrc: AtomicI64,
    info: RwLock<RtpParticipantInfo>,

    data_destination: RwLock<Option<SocketAddr>>,
    control_destination: RwLock<Option<SocketAddr>>,
    last_data_origin: RwLock<Option<SocketAddr>>,
    last_control_origin: RwLock<Option<SocketAddr>>,

    // -1 until the first data packet
    last_sequence_number: AtomicI32,
    // epoch millis of the BYE, -1 until one arrives
    bye_received_at: AtomicI64,
    received_packets: AtomicU64,
    received_bytes: AtomicU64,

    receiver: AtomicBool,
    received_sdes: AtomicBool,
}

impl Default for RtpParticipant {
    fn default() -> Self {
        Self {
            ssrc: AtomicI64::new(-1),
            info: RwLock::new(RtpParticipantInfo::default()),
            data_destination: RwLock::new(None),
            control_destination: RwLock::new(None),
            last_data_origin: RwLock::new(None),
            last_control_origin: RwLock::new(None),
            last_sequence_number: AtomicI32::new(-1),
            bye_received_at: AtomicI64::new(-1),
            received_packets: AtomicU64::new(0),
            received_bytes: AtomicU64::new(0),
            receiver: AtomicBool::new(false),
            received_sdes: AtomicBool::new(false),
        }
    }
}

impl RtpParticipant {
    /// A pre-registered destination for outgoing traffic. The SSRC is
    /// learned later, from the first data packet arriving from the
    /// data address.
    pub fn new_receiver(data_destination: SocketAddr, control_destination: SocketAddr) -> Self {
        let participant = Self::default();
        *participant.data_destination.write() = Some(data_destination);
        *participant.control_destination.write() = Some(control_destination);
        participant.receiver.store(true, Ordering::SeqCst);
        participant
    }

    pub fn with_ssrc(ssrc: u32) -> Self {
        let participant = Self::default();
        participant.ssrc.store(ssrc as i64, Ordering::SeqCst);
        participant
    }

    pub fn from_data_packet(origin: SocketAddr, ssrc: u32) -> Self {
        let participant = Self::with_ssrc(ssrc);
        *participant.last_data_origin.write() = Some(origin);
        *participant.data_destination.write() = Some(origin);
        let mut control = origin;
        control.set_port(origin.port().wrapping_add(1));
        *participant.control_destination.write() = Some(control);
        participant
    }

    pub fn from_sdes_chunk(origin: SocketAddr, chunk: &SDESChunk) -> Self {
        let participant = Self::with_ssrc(chunk.ssrc);
        *participant.last_control_origin.write() = Some(origin);
        *participant.control_destination.write() = Some(origin);
        participant.info.write().update_from_sdes_chunk(chunk);
        participant.received_sdes.store(true, Ordering::SeqCst);
        participant
    }

    pub fn ssrc(&self) -> Option<u32> {
        let raw = self.ssrc.load(Ordering::SeqCst);
        if raw < 0 { None } else { Some(raw as u32) }
    }

    pub fn set_ssrc(&self, ssrc: u32) {
        self.ssrc.store(ssrc as i64, Ordering::SeqCst);
    }

    pub fn info(&self) -> RtpParticipantInfo {
        self.info.read().clone()
    }

    pub fn set_info(&self, info: RtpParticipantInfo) {
        *self.info.write() = info;
    }

    pub fn cname(&self) -> Option<String> {
        self.info.read().cname.clone()
    }

    pub fn update_info_from_sdes_chunk(&self, chunk: &SDESChunk) -> bool {
        let changed = self.info.write().update_from_sdes_chunk(chunk);
        self.received_sdes.store(true, Ordering::SeqCst);
        changed
    }

    pub fn data_destination(&self) -> Option<SocketAddr> {
        *self.data_destination.read()
    }

    pub fn set_data_destination(&self, destination: SocketAddr) {
        *self.data_destination.write() = Some(destination);
    }

    pub fn control_destination(&self) -> Option<SocketAddr> {
        *self.control_destination.read()
    }

    pub fn set_control_destination(&self, destination: SocketAddr) {
        *self.control_destination.write() = Some(destination);
    }

    pub fn last_data_origin(&self) -> Option<SocketAddr> {
        *self.last_data_origin.read()
    }

    pub fn set_last_data_origin(&self, origin: SocketAddr) {
        *self.last_data_origin.write() = Some(origin);
    }

    pub fn last_control_origin(&self) -> Option<SocketAddr> {
        *self.last_control_origin.read()
    }

    pub fn set_last_control_origin(&self, origin: SocketAddr) {
        *self.last_control_origin.write() = Some(origin);
    }

    pub fn last_sequence_number(&self) -> i32 {
        self.last_sequence_number.load(Ordering::SeqCst)
    }

    pub fn set_last_sequence_number(&self, sequence_number: u16) {
        self.last_sequence_number
            .store(sequence_number as i32, Ordering::SeqCst);
    }

    pub fn packet_received(&self, payload_bytes: usize) {
        self.received_packets.fetch_add(1, Ordering::SeqCst);
        self.received_bytes
            .fetch_add(payload_bytes as u64, Ordering::SeqCst);
    }

    pub fn received_packets(&self) -> u64 {
        self.received_packets.load(Ordering::SeqCst)
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes.load(Ordering::SeqCst)
    }

    pub fn mark_bye_received(&self) {
        let now = get_timestamp_ms().unwrap_or_default() as i64;
        self.bye_received_at.store(now, Ordering::SeqCst);
    }

    pub fn bye_received(&self) -> bool {
        self.bye_received_at.load(Ordering::SeqCst) >= 0
    }

    pub fn bye_received_at(&self) -> Option<i64> {
        let raw = self.bye_received_at.load(Ordering::SeqCst);
        if raw < 0 { None } else { Some(raw) }
    }

    pub fn is_receiver(&self) -> bool {
        self.receiver.load(Ordering::SeqCst)
    }

    pub fn received_sdes(&self) -> bool {
        self.received_sdes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtp_wire::rtcp::sdes::SDESItem;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn chunk(ssrc: u32, items: Vec<SDESItem>) -> SDESChunk {
        SDESChunk { ssrc, items }
    }

    #[test]
    fn receiver_has_no_ssrc_until_associated() {
        let participant = RtpParticipant::new_receiver(addr(8000), addr(8001));
        assert!(participant.is_receiver());
        assert_eq!(participant.ssrc(), None);

        participant.set_ssrc(0x45);
        assert_eq!(participant.ssrc(), Some(0x45));
    }

    #[test]
    fn from_data_packet_defaults_control_to_next_port() {
        let participant = RtpParticipant::from_data_packet(addr(9000), 0x45);
        assert_eq!(participant.ssrc(), Some(0x45));
        assert_eq!(participant.data_destination(), Some(addr(9000)));
        assert_eq!(participant.control_destination(), Some(addr(9001)));
        assert!(!participant.is_receiver());
    }

    #[test]
    fn sdes_update_reports_changes() {
        let participant = RtpParticipant::from_sdes_chunk(
            addr(9001),
            &chunk(
                0x45,
                vec![SDESItem::new(SDESItemType::CNAME, "cname@host".to_string()).unwrap()],
            ),
        );
        assert!(participant.received_sdes());
        assert_eq!(participant.cname(), Some("cname@host".to_string()));

        // same chunk again is a no-op
        let unchanged = participant.update_info_from_sdes_chunk(&chunk(
            0x45,
            vec![SDESItem::new(SDESItemType::CNAME, "cname@host".to_string()).unwrap()],
        ));
        assert!(!unchanged);

        let changed = participant.update_info_from_sdes_chunk(&chunk(
            0x45,
            vec![
                SDESItem::new(SDESItemType::CNAME, "cname@host".to_string()).unwrap(),
                SDESItem::new(SDESItemType::NOTE, "hello".to_string()).unwrap(),
            ],
        ));
        assert!(changed);
        assert_eq!(participant.info().note, Some("hello".to_string()));
    }

    #[test]
    fn priv_item_updates_prefix_and_value() {
        let participant = RtpParticipant::with_ssrc(0x45);
        let changed = participant.update_info_from_sdes_chunk(&chunk(
            0x45,
            vec![SDESItem::private("prefix".to_string(), "value".to_string()).unwrap()],
        ));
        assert!(changed);
        let info = participant.info();
        assert_eq!(info.priv_prefix, Some("prefix".to_string()));
        assert_eq!(info.priv_value, Some("value".to_string()));
    }

    #[test]
    fn bye_flag_and_timestamp() {
        let participant = RtpParticipant::with_ssrc(0x45);
        assert!(!participant.bye_received());
        participant.mark_bye_received();
        assert!(participant.bye_received());
        assert!(participant.bye_received_at().is_some());
    }
}
