use std::sync::Arc;

use arc_swap::ArcSwap;
use rtp_wire::{
    packet::RtpPacket,
    rtcp::{app::RtcpAppPacket, compound_packet::RtcpCompoundPacket, sdes::SDESChunk},
};
use uuid::Uuid;

use crate::{
    participant::RtpParticipant,
    session::{RtpSession, TerminationReason},
};

pub trait RtpSessionDataListener: Send + Sync {
    fn data_packet_received(
        &self,
        session: &RtpSession,
        participant: &Arc<RtpParticipant>,
        packet: &RtpPacket,
    );
}

pub trait RtpSessionControlListener: Send + Sync {
    /// Full compound packets, only delivered when the session does not
    /// handle RTCP on its own.
    fn control_packet_received(&self, session: &RtpSession, compound: &RtcpCompoundPacket);

    fn app_data_received(&self, session: &RtpSession, packet: &RtcpAppPacket);
}

/// Membership and lifecycle notifications. Every method has an empty
/// default body so implementors only override what they care about.
pub trait RtpSessionEventListener: Send + Sync {
    fn participant_joined_from_data(
        &self,
        _session: &RtpSession,
        _participant: &Arc<RtpParticipant>,
        _packet: &RtpPacket,
    ) {
    }

    fn participant_joined_from_control(
        &self,
        _session: &RtpSession,
        _participant: &Arc<RtpParticipant>,
        _chunk: &SDESChunk,
    ) {
    }

    fn participant_data_updated(&self, _session: &RtpSession, _participant: &Arc<RtpParticipant>) {
    }

    fn participant_left(
        &self,
        _session: &RtpSession,
        _participant: &Arc<RtpParticipant>,
        _reason: Option<&str>,
    ) {
    }

    fn participant_deleted(&self, _session: &RtpSession, _participant: &Arc<RtpParticipant>) {}

    fn resolved_ssrc_conflict(&self, _session: &RtpSession, _old_ssrc: u32, _new_ssrc: u32) {}

    fn session_terminated(&self, _session: &RtpSession, _cause: &TerminationReason) {}
}

/// Copy-on-write listener list. Dispatch reads a snapshot, so a
/// callback may add or remove listeners without deadlocking.
pub struct ListenerSet<T: ?Sized> {
    listeners: ArcSwap<Vec<(Uuid, Arc<T>)>>,
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&self, listener: Arc<T>) -> Uuid {
        let id = Uuid::now_v7();
        self.listeners.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push((id, listener.clone()));
            next
        });
        id
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let mut removed = false;
        self.listeners.rcu(|current| {
            let next: Vec<_> = current
                .iter()
                .filter(|(key, _)| *key != id)
                .cloned()
                .collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    pub fn clear(&self) {
        self.listeners.store(Arc::new(Vec::new()));
    }

    pub fn snapshot(&self) -> Arc<Vec<(Uuid, Arc<T>)>> {
        self.listeners.load_full()
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.load().is_empty()
    }
}
