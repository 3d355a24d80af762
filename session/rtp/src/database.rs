use std::{net::SocketAddr, sync::Arc};

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::RwLock;
use rtp_wire::{packet::RtpPacket, rtcp::sdes::SDESChunk};

use crate::{
    errors::{RtpSessionError, RtpSessionResult},
    participant::RtpParticipant,
};

/// Fired by the database for membership changes it decides on its own.
/// Creation is reported through the lookup return value instead, so
/// the triggering packet can accompany the join notification.
pub trait ParticipantEventListener {
    fn participant_deleted(&self, participant: &Arc<RtpParticipant>);
}

pub trait ParticipantDatabase: Send + Sync {
    /// False when this database does not accept the participant as a
    /// receiver.
    fn add_receiver(&self, participant: Arc<RtpParticipant>) -> bool;

    fn remove_receiver(&self, participant: &Arc<RtpParticipant>) -> bool;

    fn member(&self, ssrc: u32) -> Option<Arc<RtpParticipant>>;

    /// The member behind a data packet, created on first sight. The
    /// boolean is true only for genuinely new members, not for
    /// receivers adopted by data-address association. None means the
    /// packet must be dropped.
    fn participant_from_data_packet(
        &self,
        origin: SocketAddr,
        packet: &RtpPacket,
    ) -> Option<(Arc<RtpParticipant>, bool)>;

    fn participant_from_sdes_chunk(
        &self,
        origin: SocketAddr,
        chunk: &SDESChunk,
    ) -> Option<(Arc<RtpParticipant>, bool)>;

    /// Best effort iteration. Per-entry failures are collected and
    /// returned, never aborting the remaining entries.
    fn for_each_receiver(
        &self,
        operation: &mut dyn FnMut(&Arc<RtpParticipant>) -> RtpSessionResult<()>,
    ) -> Vec<RtpSessionError>;

    fn for_each_member(
        &self,
        operation: &mut dyn FnMut(&Arc<RtpParticipant>) -> RtpSessionResult<()>,
    ) -> Vec<RtpSessionError>;

    fn receiver_count(&self) -> usize;

    fn member_count(&self) -> usize;

    fn known_ssrcs(&self) -> Vec<u32>;

    /// Drops members that said BYE and are not receivers.
    fn cleanup(&self, listener: &dyn ParticipantEventListener);
}

/// Multi-party membership. Members are keyed by SSRC; receivers are
/// the configured send targets, which may or may not be members yet.
pub struct DefaultParticipantDatabase {
    id: String,
    members: DashMap<u32, Arc<RtpParticipant>>,
    receivers: RwLock<Vec<Arc<RtpParticipant>>>,
}

impl DefaultParticipantDatabase {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            members: DashMap::new(),
            receivers: RwLock::new(Vec::new()),
        }
    }
}

impl ParticipantDatabase for DefaultParticipantDatabase {
    fn add_receiver(&self, participant: Arc<RtpParticipant>) -> bool {
        let mut receivers = self.receivers.write();
        if receivers.iter().any(|v| Arc::ptr_eq(v, &participant)) {
            return false;
        }
        receivers.push(participant);
        true
    }

    fn remove_receiver(&self, participant: &Arc<RtpParticipant>) -> bool {
        let mut receivers = self.receivers.write();
        let before = receivers.len();
        receivers.retain(|v| !Arc::ptr_eq(v, participant));
        receivers.len() != before
    }

    fn member(&self, ssrc: u32) -> Option<Arc<RtpParticipant>> {
        self.members.get(&ssrc).map(|v| v.clone())
    }

    fn participant_from_data_packet(
        &self,
        origin: SocketAddr,
        packet: &RtpPacket,
    ) -> Option<(Arc<RtpParticipant>, bool)> {
        let ssrc = packet.header.ssrc;
        match self.members.entry(ssrc) {
            Entry::Occupied(entry) => Some((entry.get().clone(), false)),
            Entry::Vacant(entry) => {
                let adopted = self
                    .receivers
                    .read()
                    .iter()
                    .find(|v| v.ssrc().is_none() && v.data_destination() == Some(origin))
                    .cloned();
                if let Some(receiver) = adopted {
                    // a pre-registered receiver turned out to be this
                    // source, no new member is created
                    receiver.set_ssrc(ssrc);
                    tracing::debug!(
                        "[{}] associated ssrc {:08x} with receiver at {}",
                        self.id,
                        ssrc,
                        origin
                    );
                    entry.insert(receiver.clone());
                    Some((receiver, false))
                } else {
                    let participant = Arc::new(RtpParticipant::from_data_packet(origin, ssrc));
                    entry.insert(participant.clone());
                    Some((participant, true))
                }
            }
        }
    }

    fn participant_from_sdes_chunk(
        &self,
        origin: SocketAddr,
        chunk: &SDESChunk,
    ) -> Option<(Arc<RtpParticipant>, bool)> {
        match self.members.entry(chunk.ssrc) {
            Entry::Occupied(entry) => Some((entry.get().clone(), false)),
            Entry::Vacant(entry) => {
                let adopted = self
                    .receivers
                    .read()
                    .iter()
                    .find(|v| v.ssrc().is_none() && v.control_destination() == Some(origin))
                    .cloned();
                if let Some(receiver) = adopted {
                    receiver.set_ssrc(chunk.ssrc);
                    entry.insert(receiver.clone());
                    Some((receiver, false))
                } else {
                    let participant = Arc::new(RtpParticipant::from_sdes_chunk(origin, chunk));
                    entry.insert(participant.clone());
                    Some((participant, true))
                }
            }
        }
    }

    fn for_each_receiver(
        &self,
        operation: &mut dyn FnMut(&Arc<RtpParticipant>) -> RtpSessionResult<()>,
    ) -> Vec<RtpSessionError> {
        let receivers = self.receivers.read().clone();
        let mut failures = Vec::new();
        for participant in receivers.iter() {
            if let Err(err) = operation(participant) {
                tracing::warn!("[{}] receiver operation failed: {:?}", self.id, err);
                failures.push(err);
            }
        }
        failures
    }

    fn for_each_member(
        &self,
        operation: &mut dyn FnMut(&Arc<RtpParticipant>) -> RtpSessionResult<()>,
    ) -> Vec<RtpSessionError> {
        let members: Vec<_> = self.members.iter().map(|v| v.value().clone()).collect();
        let mut failures = Vec::new();
        for participant in members.iter() {
            if let Err(err) = operation(participant) {
                tracing::warn!("[{}] member operation failed: {:?}", self.id, err);
                failures.push(err);
            }
        }
        failures
    }

    fn receiver_count(&self) -> usize {
        self.receivers.read().len()
    }

    fn member_count(&self) -> usize {
        self.members.len()
    }

    fn known_ssrcs(&self) -> Vec<u32> {
        self.members.iter().map(|v| *v.key()).collect()
    }

    fn cleanup(&self, listener: &dyn ParticipantEventListener) {
        let mut deleted = Vec::new();
        self.members.retain(|_, participant| {
            if participant.bye_received() && !participant.is_receiver() {
                deleted.push(participant.clone());
                false
            } else {
                true
            }
        });
        for participant in deleted {
            tracing::debug!(
                "[{}] deleted participant with ssrc {:?}",
                self.id,
                participant.ssrc()
            );
            listener.participant_deleted(&participant);
        }
    }
}

/// Fixed-remote membership for point-to-point sessions. The single
/// participant adopts the first SSRC seen; anything else is dropped.
pub struct SingleParticipantDatabase {
    participant: Arc<RtpParticipant>,
}

impl SingleParticipantDatabase {
    pub fn new(participant: Arc<RtpParticipant>) -> Self {
        Self { participant }
    }

    fn match_or_adopt(&self, ssrc: u32) -> Option<(Arc<RtpParticipant>, bool)> {
        match self.participant.ssrc() {
            Some(known) if known == ssrc => Some((self.participant.clone(), false)),
            Some(_) => None,
            None => {
                self.participant.set_ssrc(ssrc);
                Some((self.participant.clone(), false))
            }
        }
    }
}

impl ParticipantDatabase for SingleParticipantDatabase {
    /// Only the preconfigured remote is a valid receiver here.
    fn add_receiver(&self, participant: Arc<RtpParticipant>) -> bool {
        Arc::ptr_eq(&participant, &self.participant)
    }

    fn remove_receiver(&self, _participant: &Arc<RtpParticipant>) -> bool {
        false
    }

    fn member(&self, ssrc: u32) -> Option<Arc<RtpParticipant>> {
        if self.participant.ssrc() == Some(ssrc) {
            Some(self.participant.clone())
        } else {
            None
        }
    }

    fn participant_from_data_packet(
        &self,
        _origin: SocketAddr,
        packet: &RtpPacket,
    ) -> Option<(Arc<RtpParticipant>, bool)> {
        self.match_or_adopt(packet.header.ssrc)
    }

    fn participant_from_sdes_chunk(
        &self,
        _origin: SocketAddr,
        chunk: &SDESChunk,
    ) -> Option<(Arc<RtpParticipant>, bool)> {
        self.match_or_adopt(chunk.ssrc)
    }

    fn for_each_receiver(
        &self,
        operation: &mut dyn FnMut(&Arc<RtpParticipant>) -> RtpSessionResult<()>,
    ) -> Vec<RtpSessionError> {
        match operation(&self.participant) {
            Ok(()) => Vec::new(),
            Err(err) => vec![err],
        }
    }

    fn for_each_member(
        &self,
        operation: &mut dyn FnMut(&Arc<RtpParticipant>) -> RtpSessionResult<()>,
    ) -> Vec<RtpSessionError> {
        self.for_each_receiver(operation)
    }

    fn receiver_count(&self) -> usize {
        1
    }

    fn member_count(&self) -> usize {
        1
    }

    fn known_ssrcs(&self) -> Vec<u32> {
        self.participant.ssrc().into_iter().collect()
    }

    fn cleanup(&self, _listener: &dyn ParticipantEventListener) {
        // the fixed remote is never dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn data_packet(ssrc: u32, sequence_number: u16) -> RtpPacket {
        RtpPacket::builder()
            .payload_type(8)
            .unwrap()
            .ssrc(ssrc)
            .sequence_number(sequence_number)
            .payload(&[0xd5; 4])
            .build()
    }

    #[derive(Default)]
    struct CountingListener {
        deletions: AtomicUsize,
    }

    impl ParticipantEventListener for CountingListener {
        fn participant_deleted(&self, _participant: &Arc<RtpParticipant>) {
            self.deletions.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn receiver_is_associated_by_data_address() {
        let database = DefaultParticipantDatabase::new("test");
        let receiver = Arc::new(RtpParticipant::new_receiver(addr(8000), addr(8001)));
        assert!(database.add_receiver(receiver.clone()));
        assert_eq!(database.receiver_count(), 1);
        assert_eq!(database.member_count(), 0);

        // packet from the receiver's data address adopts it, no creation
        let (member, created) = database
            .participant_from_data_packet(addr(8000), &data_packet(0x45, 1))
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&member, &receiver));
        assert_eq!(receiver.ssrc(), Some(0x45));
        assert_eq!(database.member_count(), 1);
    }

    #[test]
    fn unknown_origin_creates_a_member() {
        let database = DefaultParticipantDatabase::new("test");
        let receiver = Arc::new(RtpParticipant::new_receiver(addr(8000), addr(8001)));
        assert!(database.add_receiver(receiver.clone()));

        // packet from elsewhere does not touch the receiver
        let (member, created) = database
            .participant_from_data_packet(addr(9000), &data_packet(0x45, 1))
            .unwrap();
        assert!(created);
        assert!(!Arc::ptr_eq(&member, &receiver));
        assert_eq!(receiver.ssrc(), None);
        assert_eq!(database.member_count(), 1);
        assert_eq!(database.receiver_count(), 1);

        // second packet with the same ssrc resolves to the same member
        let (again, created) = database
            .participant_from_data_packet(addr(9000), &data_packet(0x45, 2))
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&again, &member));
        assert_eq!(database.member_count(), 1);
    }

    #[test]
    fn duplicate_receiver_is_rejected() {
        let database = DefaultParticipantDatabase::new("test");
        let receiver = Arc::new(RtpParticipant::new_receiver(addr(8000), addr(8001)));
        assert!(database.add_receiver(receiver.clone()));
        assert!(!database.add_receiver(receiver.clone()));
        assert!(database.remove_receiver(&receiver));
        assert!(!database.remove_receiver(&receiver));
    }

    #[test]
    fn cleanup_drops_byed_non_receivers() {
        let database = DefaultParticipantDatabase::new("test");
        let (member, _) = database
            .participant_from_data_packet(addr(9000), &data_packet(0x45, 1))
            .unwrap();
        let receiver = Arc::new(RtpParticipant::new_receiver(addr(8000), addr(8001)));
        database.add_receiver(receiver.clone());
        database
            .participant_from_data_packet(addr(8000), &data_packet(0x46, 1))
            .unwrap();
        assert_eq!(database.member_count(), 2);

        member.mark_bye_received();
        receiver.mark_bye_received();

        let listener = CountingListener::default();
        database.cleanup(&listener);
        // the receiver stays even after BYE
        assert_eq!(database.member_count(), 1);
        assert_eq!(listener.deletions.load(Ordering::SeqCst), 1);
        assert!(database.member(0x46).is_some());
        assert!(database.member(0x45).is_none());
    }

    #[test]
    fn single_database_keeps_cardinality() {
        let remote = Arc::new(RtpParticipant::default());
        let database = SingleParticipantDatabase::new(remote.clone());
        assert_eq!(database.member_count(), 1);
        assert_eq!(database.receiver_count(), 1);
        // re-adding the remote is fine, anyone else is refused
        assert!(database.add_receiver(remote.clone()));
        assert!(!database.add_receiver(Arc::new(RtpParticipant::default())));

        // first ssrc seen is adopted
        let (member, created) = database
            .participant_from_data_packet(addr(9000), &data_packet(0x45, 1))
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&member, &remote));
        assert_eq!(remote.ssrc(), Some(0x45));

        // a different ssrc is rejected
        assert!(
            database
                .participant_from_data_packet(addr(9000), &data_packet(0x46, 1))
                .is_none()
        );
        assert_eq!(database.member_count(), 1);
    }
}
