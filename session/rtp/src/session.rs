use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering},
    },
    time::SystemTime,
};

use parking_lot::{Mutex, RwLock};
use rtp_wire::{
    errors::RtpResult,
    packet::RtpPacket,
    rtcp::{
        RtcpPacket, app::RtcpAppPacket, bye::RtcpByePacket, compound_packet::RtcpCompoundPacket,
        receiver_report::RtcpReceiverReport, report_block::ReportBlock,
        sdes::RtcpSourceDescriptionPacket, sender_report::RtcpSenderReport,
    },
};
use utils::traits::{dynamic_sized_packet::DynamicSizedPacket, writer::WriteTo};
use uuid::Uuid;

use crate::{
    channel::{ChannelConfig, DatagramChannel, DatagramTransport},
    database::{
        DefaultParticipantDatabase, ParticipantDatabase, ParticipantEventListener,
        SingleParticipantDatabase,
    },
    errors::{RtpSessionError, RtpSessionResult},
    listener::{
        ListenerSet, RtpSessionControlListener, RtpSessionDataListener, RtpSessionEventListener,
    },
    participant::{RtpParticipant, RtpParticipantInfo},
    ssrc::{RandomSsrcGenerator, SsrcGenerator},
};

const STATE_CREATED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_TERMINATED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Terminated,
}

#[derive(Debug, Clone)]
pub enum TerminationReason {
    TerminateCalled,
    LoopDetected(String),
}

/// One RTP session: a data socket, a control socket, a membership
/// database and the listeners observing them. All methods take &self;
/// concurrent receive paths only contend on per-participant state.
pub struct RtpSession {
    id: String,
    payload_type: u8,
    local: Arc<RtpParticipant>,
    local_ssrc: AtomicU32,
    local_data_address: SocketAddr,
    local_control_address: SocketAddr,

    database: Box<dyn ParticipantDatabase>,
    transport: Box<dyn DatagramTransport>,
    ssrc_generator: Box<dyn SsrcGenerator>,

    discard_out_of_order: bool,
    max_collisions_before_loop: u32,
    automated_rtcp_handling: bool,
    update_destination_from_origin: bool,
    channel_config: ChannelConfig,

    state: AtomicU8,
    lifecycle: Mutex<()>,
    data_channel: RwLock<Option<Box<dyn DatagramChannel>>>,
    control_channel: RwLock<Option<Box<dyn DatagramChannel>>>,

    sequence_number: AtomicU32,
    collisions: AtomicU32,
    sent_or_received: AtomicBool,
    sent_packets: AtomicU64,
    sent_bytes: AtomicU64,

    data_listeners: ListenerSet<dyn RtpSessionDataListener>,
    control_listeners: ListenerSet<dyn RtpSessionControlListener>,
    event_listeners: ListenerSet<dyn RtpSessionEventListener>,
}

impl RtpSession {
    pub fn builder(
        id: impl Into<String>,
        data_address: SocketAddr,
        transport: Box<dyn DatagramTransport>,
    ) -> RtpSessionBuilder {
        RtpSessionBuilder::new(id, data_address, transport)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => SessionState::Running,
            STATE_TERMINATED => SessionState::Terminated,
            _ => SessionState::Created,
        }
    }

    pub fn local_participant(&self) -> &Arc<RtpParticipant> {
        &self.local
    }

    pub fn local_ssrc(&self) -> u32 {
        self.local_ssrc.load(Ordering::SeqCst)
    }

    pub fn local_data_address(&self) -> SocketAddr {
        self.local_data_address
    }

    pub fn local_control_address(&self) -> SocketAddr {
        self.local_control_address
    }

    pub fn participant(&self, ssrc: u32) -> Option<Arc<RtpParticipant>> {
        self.database.member(ssrc)
    }

    pub fn member_count(&self) -> usize {
        self.database.member_count()
    }

    pub fn add_receiver(&self, participant: Arc<RtpParticipant>) -> bool {
        self.database.add_receiver(participant)
    }

    pub fn remove_receiver(&self, participant: &Arc<RtpParticipant>) -> bool {
        self.database.remove_receiver(participant)
    }

    /// Drops members that said BYE and are not receivers. A BYE only
    /// marks the member; it stays in the database so late reports can
    /// still find it, until this is called.
    pub fn cleanup(&self) {
        self.database.cleanup(self);
    }

    pub fn add_data_listener(&self, listener: Arc<dyn RtpSessionDataListener>) -> Uuid {
        self.data_listeners.add(listener)
    }

    pub fn remove_data_listener(&self, id: Uuid) -> bool {
        self.data_listeners.remove(id)
    }

    pub fn add_control_listener(&self, listener: Arc<dyn RtpSessionControlListener>) -> Uuid {
        self.control_listeners.add(listener)
    }

    pub fn remove_control_listener(&self, id: Uuid) -> bool {
        self.control_listeners.remove(id)
    }

    pub fn add_event_listener(&self, listener: Arc<dyn RtpSessionEventListener>) -> Uuid {
        self.event_listeners.add(listener)
    }

    pub fn remove_event_listener(&self, id: Uuid) -> bool {
        self.event_listeners.remove(id)
    }

    /// Binds the data and control channels and announces the local
    /// source. Idempotent while running; fails after termination.
    pub fn init(&self) -> RtpSessionResult<()> {
        {
            let _guard = self.lifecycle.lock();
            match self.state() {
                SessionState::Running => return Ok(()),
                SessionState::Terminated => return Err(RtpSessionError::NotRunning),
                SessionState::Created => {}
            }

            let data_channel = self
                .transport
                .bind(self.local_data_address, &self.channel_config)
                .map_err(|err| RtpSessionError::Bind {
                    address: self.local_data_address,
                    source: err,
                })?;
            let control_channel = match self
                .transport
                .bind(self.local_control_address, &self.channel_config)
            {
                Ok(channel) => channel,
                Err(err) => {
                    data_channel.close();
                    return Err(RtpSessionError::Bind {
                        address: self.local_control_address,
                        source: err,
                    });
                }
            };

            *self.data_channel.write() = Some(data_channel);
            *self.control_channel.write() = Some(control_channel);
            self.state.store(STATE_RUNNING, Ordering::SeqCst);
        }
        tracing::info!(
            "[{}] session running, data at {}, control at {}",
            self.id,
            self.local_data_address,
            self.local_control_address
        );
        self.join_session();
        Ok(())
    }

    /// Stamps a payload into a data packet and fans it out.
    pub fn send_data(&self, payload: &[u8], timestamp: u32, marker: bool) -> RtpSessionResult<()> {
        let packet = RtpPacket::builder()
            .payload_type(self.payload_type)?
            .marker(marker)
            .timestamp(timestamp)
            .payload(payload)
            .build();
        self.send_data_packet(packet)
    }

    /// Sends a pre-built packet. The payload type, SSRC and sequence
    /// number are overwritten with session-managed values.
    pub fn send_data_packet(&self, mut packet: RtpPacket) -> RtpSessionResult<()> {
        if self.state() != SessionState::Running {
            return Err(RtpSessionError::NotRunning);
        }

        packet.header.payload_type = self.payload_type;
        packet.header.ssrc = self.local_ssrc();
        packet.header.sequence_number =
            self.sequence_number.fetch_add(1, Ordering::SeqCst) as u16;
        self.sent_or_received.store(true, Ordering::SeqCst);

        let mut buffer = Vec::with_capacity(packet.get_packet_bytes_count());
        packet.write_to(&mut buffer)?;

        let channel_guard = self.data_channel.read();
        let channel = channel_guard.as_ref().ok_or(RtpSessionError::NotRunning)?;
        let failures = self.database.for_each_receiver(&mut |participant| {
            if participant.bye_received() {
                return Ok(());
            }
            let Some(destination) = participant.data_destination() else {
                return Ok(());
            };
            if channel.send(&buffer, destination) {
                Ok(())
            } else {
                Err(RtpSessionError::SendFailed { destination })
            }
        });
        drop(channel_guard);

        self.sent_packets.fetch_add(1, Ordering::SeqCst);
        self.sent_bytes
            .fetch_add(packet.payload.len() as u64, Ordering::SeqCst);
        if !failures.is_empty() {
            tracing::warn!(
                "[{}] data fan-out failed for {} receivers",
                self.id,
                failures.len()
            );
        }
        Ok(())
    }

    /// Explicit RTCP. Suppressed (Ok(false)) while the session handles
    /// control traffic on its own; use `send_app_packet` for APP data.
    pub fn send_control_packet(&self, compound: &RtcpCompoundPacket) -> RtpSessionResult<bool> {
        if self.state() != SessionState::Running {
            return Err(RtpSessionError::NotRunning);
        }
        if self.automated_rtcp_handling {
            tracing::warn!(
                "[{}] dropping explicit control packet, automated handling owns the control channel",
                self.id
            );
            return Ok(false);
        }
        let mut buffer = Vec::with_capacity(compound.get_packet_bytes_count());
        compound.write_to(&mut buffer)?;
        self.fan_out_control(&buffer);
        Ok(true)
    }

    /// APP packets are application traffic and bypass the automated
    /// handling gate.
    pub fn send_app_packet(&self, packet: &RtcpAppPacket) -> RtpSessionResult<()> {
        if self.state() != SessionState::Running {
            return Err(RtpSessionError::NotRunning);
        }
        let mut buffer = Vec::with_capacity(packet.get_packet_bytes_count());
        packet.write_to(&mut buffer)?;
        self.fan_out_control(&buffer);
        Ok(())
    }

    /// Entry point for raw data datagrams. A packet that fails to
    /// decode is dropped; the failure never reaches the session state.
    pub fn data_received(&self, origin: SocketAddr, buffer: &[u8]) {
        match RtpPacket::decode(buffer) {
            Ok(packet) => self.data_packet_received(origin, packet),
            Err(err) => {
                tracing::trace!("[{}] undecodable data packet from {}: {:?}", self.id, origin, err)
            }
        }
    }

    pub fn data_packet_received(&self, origin: SocketAddr, packet: RtpPacket) {
        if self.state() != SessionState::Running {
            return;
        }
        if packet.header.payload_type != self.payload_type {
            tracing::trace!(
                "[{}] discarding data packet with foreign payload type {}",
                self.id,
                packet.header.payload_type
            );
            return;
        }

        if packet.header.ssrc == self.local_ssrc() && !self.handle_ssrc_collision(origin) {
            return;
        }

        let Some((participant, created)) =
            self.database.participant_from_data_packet(origin, &packet)
        else {
            tracing::trace!(
                "[{}] dropping data packet from unexpected source {:08x}",
                self.id,
                packet.header.ssrc
            );
            return;
        };
        if created {
            for (_, listener) in self.event_listeners.snapshot().iter() {
                listener.participant_joined_from_data(self, &participant, &packet);
            }
        }

        participant.set_last_data_origin(origin);
        if self.update_destination_from_origin {
            participant.set_data_destination(origin);
        }

        let sequence_number = packet.header.sequence_number;
        if self.discard_out_of_order
            && participant.last_sequence_number() >= sequence_number as i32
        {
            tracing::trace!(
                "[{}] discarding out of order packet, seq {} after {}",
                self.id,
                sequence_number,
                participant.last_sequence_number()
            );
            return;
        }
        participant.set_last_sequence_number(sequence_number);
        participant.packet_received(packet.payload.len());
        self.sent_or_received.store(true, Ordering::SeqCst);

        for (_, listener) in self.data_listeners.snapshot().iter() {
            listener.data_packet_received(self, &participant, &packet);
        }
    }

    /// Entry point for raw control datagrams.
    pub fn control_received(&self, origin: SocketAddr, buffer: &[u8]) {
        match RtcpCompoundPacket::decode(buffer) {
            Ok(compound) => self.control_packet_received(origin, compound),
            Err(err) => tracing::trace!(
                "[{}] undecodable control packet from {}: {:?}",
                self.id,
                origin,
                err
            ),
        }
    }

    pub fn control_packet_received(&self, origin: SocketAddr, compound: RtcpCompoundPacket) {
        if self.state() != SessionState::Running {
            return;
        }
        if !self.automated_rtcp_handling {
            for (_, listener) in self.control_listeners.snapshot().iter() {
                listener.control_packet_received(self, &compound);
            }
            return;
        }

        for packet in compound.packets() {
            match packet {
                RtcpPacket::SenderReport(report) => {
                    self.reports_received(report.sender_ssrc, &report.report_blocks);
                }
                RtcpPacket::ReceiverReport(report) => {
                    self.reports_received(report.sender_ssrc, &report.report_blocks);
                }
                RtcpPacket::SourceDescription(sdes) => self.sdes_received(origin, sdes),
                RtcpPacket::Bye(bye) => self.bye_received(bye),
                RtcpPacket::App(app) => {
                    for (_, listener) in self.control_listeners.snapshot().iter() {
                        listener.app_data_received(self, app);
                    }
                }
            }
        }
    }

    pub fn terminate(&self) {
        self.terminate_internal(TerminationReason::TerminateCalled);
    }

    fn terminate_internal(&self, reason: TerminationReason) {
        {
            let _guard = self.lifecycle.lock();
            if self.state() != SessionState::Running {
                return;
            }
            self.data_listeners.clear();
            self.control_listeners.clear();

            if let Some(channel) = self.data_channel.write().take() {
                channel.close();
            }
            if self.automated_rtcp_handling {
                self.leave_session("Session terminated.");
            }
            if let Some(channel) = self.control_channel.write().take() {
                channel.close();
            }
            self.state.store(STATE_TERMINATED, Ordering::SeqCst);
        }

        tracing::info!("[{}] session terminated: {:?}", self.id, reason);
        let listeners = self.event_listeners.snapshot();
        self.event_listeners.clear();
        for (_, listener) in listeners.iter() {
            listener.session_terminated(self, &reason);
        }
    }

    /// Returns false when the collision turned out to be a loop and
    /// the session is gone.
    fn handle_ssrc_collision(&self, origin: SocketAddr) -> bool {
        let local_data_addr = self.data_channel.read().as_ref().map(|v| v.local_addr());
        if local_data_addr == Some(origin) {
            self.terminate_internal(TerminationReason::LoopDetected(format!(
                "own data traffic looped back from {}",
                origin
            )));
            return false;
        }

        let collisions = self.collisions.fetch_add(1, Ordering::SeqCst) + 1;
        if collisions > self.max_collisions_before_loop {
            self.terminate_internal(TerminationReason::LoopDetected(format!(
                "{} SSRC collisions, assuming a network loop",
                collisions
            )));
            return false;
        }

        let old_ssrc = self.local_ssrc();
        let taken = self.database.known_ssrcs();
        let new_ssrc = self.ssrc_generator.generate_avoiding(&taken);
        self.local_ssrc.store(new_ssrc, Ordering::SeqCst);
        self.local.set_ssrc(new_ssrc);
        tracing::info!(
            "[{}] resolved ssrc collision, {:08x} -> {:08x}",
            self.id,
            old_ssrc,
            new_ssrc
        );

        // a source that never spoke can silently switch; one that did
        // must say goodbye to the old identity and re-announce
        if self.sent_or_received.load(Ordering::SeqCst) && self.automated_rtcp_handling {
            self.leave_with_ssrc(old_ssrc, "SSRC collision detected; rejoining.");
            self.join_session();
        }

        for (_, listener) in self.event_listeners.snapshot().iter() {
            listener.resolved_ssrc_conflict(self, old_ssrc, new_ssrc);
        }
        true
    }

    fn reports_received(&self, sender_ssrc: u32, report_blocks: &[ReportBlock]) {
        if self.database.member(sender_ssrc).is_none() {
            tracing::trace!(
                "[{}] ignoring report from unknown sender {:08x}",
                self.id,
                sender_ssrc
            );
            return;
        }
        let local_ssrc = self.local_ssrc();
        for block in report_blocks.iter().filter(|v| v.ssrc == local_ssrc) {
            tracing::trace!(
                "[{}] reception report for local source: fraction_lost {} highest seq {}",
                self.id,
                block.fraction_lost,
                block.extended_highest_sequence_number
            );
        }
    }

    fn sdes_received(&self, origin: SocketAddr, sdes: &RtcpSourceDescriptionPacket) {
        for chunk in &sdes.chunks {
            let Some((participant, created)) =
                self.database.participant_from_sdes_chunk(origin, chunk)
            else {
                continue;
            };
            participant.set_last_control_origin(origin);
            if self.update_destination_from_origin {
                participant.set_control_destination(origin);
            }
            if created {
                for (_, listener) in self.event_listeners.snapshot().iter() {
                    listener.participant_joined_from_control(self, &participant, chunk);
                }
            } else if !participant.received_sdes() && participant.update_info_from_sdes_chunk(chunk)
            {
                // the first description is authoritative, later
                // chunks never overwrite it
                for (_, listener) in self.event_listeners.snapshot().iter() {
                    listener.participant_data_updated(self, &participant);
                }
            }
        }
    }

    fn bye_received(&self, bye: &RtcpByePacket) {
        for ssrc in &bye.ssrc_list {
            let Some(participant) = self.database.member(*ssrc) else {
                continue;
            };
            participant.mark_bye_received();
            tracing::debug!(
                "[{}] participant {:08x} left: {:?}",
                self.id,
                ssrc,
                bye.reason
            );
            for (_, listener) in self.event_listeners.snapshot().iter() {
                listener.participant_left(self, &participant, bye.reason.as_deref());
            }
        }
    }

    fn join_session(&self) {
        if !self.automated_rtcp_handling {
            return;
        }
        match self.build_join_compound() {
            Ok(compound) => {
                let mut buffer = Vec::with_capacity(compound.get_packet_bytes_count());
                if let Err(err) = compound.write_to(&mut buffer) {
                    tracing::error!("[{}] encoding join announcement failed: {:?}", self.id, err);
                    return;
                }
                self.fan_out_control(&buffer);
            }
            Err(err) => {
                tracing::error!("[{}] building join announcement failed: {:?}", self.id, err)
            }
        }
    }

    fn build_join_compound(&self) -> RtpSessionResult<RtcpCompoundPacket> {
        let ssrc = self.local_ssrc();
        let report = RtcpReceiverReport::builder().ssrc(ssrc).build()?;
        let sdes = self.build_local_sdes(ssrc)?;
        Ok(RtcpCompoundPacket::builder()
            .packet(RtcpPacket::ReceiverReport(report))
            .packet(RtcpPacket::SourceDescription(sdes))
            .build()?)
    }

    fn build_local_sdes(&self, ssrc: u32) -> RtpResult<RtcpSourceDescriptionPacket> {
        let info = self.local.info();
        let cname = info.cname.unwrap_or_else(|| {
            format!(
                "{}/{}@{}",
                env!("CARGO_PKG_NAME"),
                self.id,
                self.local_data_address
            )
        });
        let tool = info
            .tool
            .unwrap_or_else(|| concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string());

        let mut builder = RtcpSourceDescriptionPacket::builder()
            .cname(ssrc, cname)?
            .tool(ssrc, tool)?;
        if let Some(name) = info.name {
            builder = builder.name(ssrc, name)?;
        }
        if let Some(email) = info.email {
            builder = builder.email(ssrc, email)?;
        }
        if let Some(phone) = info.phone {
            builder = builder.phone(ssrc, phone)?;
        }
        if let Some(location) = info.location {
            builder = builder.loc(ssrc, location)?;
        }
        if let Some(note) = info.note {
            builder = builder.note(ssrc, note)?;
        }
        if let (Some(prefix), Some(value)) = (info.priv_prefix, info.priv_value) {
            builder = builder.private(ssrc, prefix, value)?;
        }
        builder.build()
    }

    fn leave_session(&self, reason: &str) {
        self.leave_with_ssrc(self.local_ssrc(), reason);
    }

    /// Says goodbye for the given source identity, one compound per
    /// receiver so each gets a reception report about itself.
    fn leave_with_ssrc(&self, ssrc: u32, reason: &str) {
        let failures = self.database.for_each_receiver(&mut |participant| {
            let Some(destination) = participant.control_destination() else {
                return Ok(());
            };
            let compound = self.build_farewell_compound(ssrc, participant, reason)?;
            let mut buffer = Vec::with_capacity(compound.get_packet_bytes_count());
            compound.write_to(&mut buffer)?;
            let guard = self.control_channel.read();
            let channel = guard.as_ref().ok_or(RtpSessionError::NotRunning)?;
            if channel.send(&buffer, destination) {
                Ok(())
            } else {
                Err(RtpSessionError::SendFailed { destination })
            }
        });
        if !failures.is_empty() {
            tracing::warn!(
                "[{}] farewell delivery failed for {} receivers",
                self.id,
                failures.len()
            );
        }
    }

    fn build_farewell_compound(
        &self,
        ssrc: u32,
        receiver: &Arc<RtpParticipant>,
        reason: &str,
    ) -> RtpSessionResult<RtcpCompoundPacket> {
        let reception_block = match receiver.ssrc() {
            Some(their_ssrc) if receiver.received_packets() > 0 => Some(
                ReportBlock::builder()
                    .ssrc(their_ssrc)
                    .extended_highest_sequence_number(receiver.last_sequence_number().max(0) as u32)
                    .build(),
            ),
            _ => None,
        };

        let sent_packets = self.sent_packets.load(Ordering::SeqCst);
        let report = if sent_packets > 0 {
            let mut builder = RtcpSenderReport::builder()
                .ssrc(ssrc)
                .ntp(SystemTime::now().into())
                .sender_packet_count(sent_packets as u32)
                .sender_octet_count(self.sent_bytes.load(Ordering::SeqCst) as u32);
            if let Some(block) = reception_block {
                builder = builder.report_block(block);
            }
            RtcpPacket::SenderReport(builder.build()?)
        } else {
            let mut builder = RtcpReceiverReport::builder().ssrc(ssrc);
            if let Some(block) = reception_block {
                builder = builder.report_block(block);
            }
            RtcpPacket::ReceiverReport(builder.build()?)
        };

        let sdes = self.build_local_sdes(ssrc)?;
        let bye = RtcpByePacket::builder()
            .ssrc(ssrc)
            .reason(reason.to_string())?
            .build()?;

        Ok(RtcpCompoundPacket::builder()
            .packet(report)
            .packet(RtcpPacket::SourceDescription(sdes))
            .packet(RtcpPacket::Bye(bye))
            .build()?)
    }

    fn fan_out_control(&self, buffer: &[u8]) {
        let guard = self.control_channel.read();
        let Some(channel) = guard.as_ref() else {
            return;
        };
        let failures = self.database.for_each_receiver(&mut |participant| {
            if participant.bye_received() {
                return Ok(());
            }
            let Some(destination) = participant.control_destination() else {
                return Ok(());
            };
            if channel.send(buffer, destination) {
                Ok(())
            } else {
                Err(RtpSessionError::SendFailed { destination })
            }
        });
        if !failures.is_empty() {
            tracing::warn!(
                "[{}] control fan-out failed for {} receivers",
                self.id,
                failures.len()
            );
        }
    }
}

impl ParticipantEventListener for RtpSession {
    fn participant_deleted(&self, participant: &Arc<RtpParticipant>) {
        for (_, listener) in self.event_listeners.snapshot().iter() {
            listener.participant_deleted(self, participant);
        }
    }
}

pub struct RtpSessionBuilder {
    id: String,
    payload_type: u8,
    local_data_address: SocketAddr,
    local_control_address: Option<SocketAddr>,
    local_info: RtpParticipantInfo,
    local_ssrc: Option<u32>,
    remote: Option<Arc<RtpParticipant>>,
    discard_out_of_order: bool,
    max_collisions_before_loop: u32,
    automated_rtcp_handling: bool,
    update_destination_from_origin: bool,
    channel_config: ChannelConfig,
    transport: Box<dyn DatagramTransport>,
    ssrc_generator: Option<Box<dyn SsrcGenerator>>,
}

impl RtpSessionBuilder {
    pub fn new(
        id: impl Into<String>,
        data_address: SocketAddr,
        transport: Box<dyn DatagramTransport>,
    ) -> Self {
        Self {
            id: id.into(),
            payload_type: 0,
            local_data_address: data_address,
            local_control_address: None,
            local_info: RtpParticipantInfo::default(),
            local_ssrc: None,
            remote: None,
            discard_out_of_order: true,
            max_collisions_before_loop: 3,
            automated_rtcp_handling: true,
            update_destination_from_origin: false,
            channel_config: ChannelConfig::default(),
            transport,
            ssrc_generator: None,
        }
    }

    pub fn payload_type(mut self, payload_type: u8) -> RtpSessionResult<Self> {
        if payload_type > 127 {
            return Err(rtp_wire::errors::RtpError::PayloadTypeOutOfRange(payload_type).into());
        }
        self.payload_type = payload_type;
        Ok(self)
    }

    /// Control defaults to the data port plus one.
    pub fn control_address(mut self, address: SocketAddr) -> Self {
        self.local_control_address = Some(address);
        self
    }

    pub fn local_info(mut self, info: RtpParticipantInfo) -> Self {
        self.local_info = info;
        self
    }

    pub fn cname(mut self, cname: impl Into<String>) -> Self {
        self.local_info.cname = Some(cname.into());
        self
    }

    pub fn local_ssrc(mut self, ssrc: u32) -> Self {
        self.local_ssrc = Some(ssrc);
        self
    }

    /// Fixed-remote, point-to-point membership.
    pub fn remote(mut self, participant: Arc<RtpParticipant>) -> Self {
        self.remote = Some(participant);
        self
    }

    pub fn discard_out_of_order(mut self, discard: bool) -> Self {
        self.discard_out_of_order = discard;
        self
    }

    pub fn max_collisions_before_loop(mut self, max: u32) -> Self {
        self.max_collisions_before_loop = max;
        self
    }

    pub fn automated_rtcp_handling(mut self, automated: bool) -> Self {
        self.automated_rtcp_handling = automated;
        self
    }

    pub fn update_destination_from_origin(mut self, update: bool) -> Self {
        self.update_destination_from_origin = update;
        self
    }

    pub fn buffer_sizes(mut self, send: Option<usize>, receive: Option<usize>) -> Self {
        self.channel_config.send_buffer_size = send;
        self.channel_config.receive_buffer_size = receive;
        self
    }

    pub fn ssrc_generator(mut self, generator: Box<dyn SsrcGenerator>) -> Self {
        self.ssrc_generator = Some(generator);
        self
    }

    pub fn build(self) -> RtpSession {
        let ssrc_generator = self
            .ssrc_generator
            .unwrap_or_else(|| Box::new(RandomSsrcGenerator));
        let local_ssrc = self
            .local_ssrc
            .unwrap_or_else(|| ssrc_generator.generate());
        let local_control_address = self.local_control_address.unwrap_or_else(|| {
            let mut control = self.local_data_address;
            control.set_port(self.local_data_address.port().wrapping_add(1));
            control
        });

        let local = Arc::new(RtpParticipant::with_ssrc(local_ssrc));
        local.set_info(self.local_info);

        let database: Box<dyn ParticipantDatabase> = match self.remote {
            Some(remote) => Box::new(SingleParticipantDatabase::new(remote)),
            None => Box::new(DefaultParticipantDatabase::new(&self.id)),
        };

        RtpSession {
            id: self.id,
            payload_type: self.payload_type,
            local,
            local_ssrc: AtomicU32::new(local_ssrc),
            local_data_address: self.local_data_address,
            local_control_address,
            database,
            transport: self.transport,
            ssrc_generator,
            discard_out_of_order: self.discard_out_of_order,
            max_collisions_before_loop: self.max_collisions_before_loop,
            automated_rtcp_handling: self.automated_rtcp_handling,
            update_destination_from_origin: self.update_destination_from_origin,
            channel_config: self.channel_config,
            state: AtomicU8::new(STATE_CREATED),
            lifecycle: Mutex::new(()),
            data_channel: RwLock::new(None),
            control_channel: RwLock::new(None),
            sequence_number: AtomicU32::new(0),
            collisions: AtomicU32::new(0),
            sent_or_received: AtomicBool::new(false),
            sent_packets: AtomicU64::new(0),
            sent_bytes: AtomicU64::new(0),
            data_listeners: ListenerSet::new(),
            control_listeners: ListenerSet::new(),
            event_listeners: ListenerSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io, sync::atomic::AtomicUsize};

    use rtp_wire::rtcp::sdes::{SDESItem, SDESItemType};

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    struct SentDatagram {
        from: SocketAddr,
        payload: Vec<u8>,
        destination: SocketAddr,
    }

    #[derive(Default, Clone)]
    struct MemoryTransport {
        sent: Arc<Mutex<Vec<SentDatagram>>>,
        closed: Arc<AtomicUsize>,
        fail_port: Option<u16>,
    }

    struct MemoryChannel {
        local: SocketAddr,
        sent: Arc<Mutex<Vec<SentDatagram>>>,
        closed: Arc<AtomicUsize>,
    }

    impl DatagramTransport for MemoryTransport {
        fn bind(
            &self,
            address: SocketAddr,
            _config: &ChannelConfig,
        ) -> io::Result<Box<dyn DatagramChannel>> {
            if self.fail_port == Some(address.port()) {
                return Err(io::Error::new(io::ErrorKind::AddrInUse, "port taken"));
            }
            Ok(Box::new(MemoryChannel {
                local: address,
                sent: self.sent.clone(),
                closed: self.closed.clone(),
            }))
        }
    }

    impl DatagramChannel for MemoryChannel {
        fn local_addr(&self) -> SocketAddr {
            self.local
        }
        fn send(&self, payload: &[u8], destination: SocketAddr) -> bool {
            self.sent.lock().push(SentDatagram {
                from: self.local,
                payload: payload.to_vec(),
                destination,
            });
            true
        }
        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Recorder {
        data_packets: AtomicUsize,
        compounds: AtomicUsize,
        apps: AtomicUsize,
        joins_from_data: AtomicUsize,
        joins_from_control: AtomicUsize,
        updates: AtomicUsize,
        lefts: AtomicUsize,
        deletions: AtomicUsize,
        conflicts: Mutex<Vec<(u32, u32)>>,
        terminations: Mutex<Vec<TerminationReason>>,
    }

    impl RtpSessionDataListener for Recorder {
        fn data_packet_received(
            &self,
            _session: &RtpSession,
            _participant: &Arc<RtpParticipant>,
            _packet: &RtpPacket,
        ) {
            self.data_packets.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl RtpSessionControlListener for Recorder {
        fn control_packet_received(&self, _session: &RtpSession, _compound: &RtcpCompoundPacket) {
            self.compounds.fetch_add(1, Ordering::SeqCst);
        }
        fn app_data_received(&self, _session: &RtpSession, _packet: &RtcpAppPacket) {
            self.apps.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl RtpSessionEventListener for Recorder {
        fn participant_joined_from_data(
            &self,
            _session: &RtpSession,
            _participant: &Arc<RtpParticipant>,
            _packet: &RtpPacket,
        ) {
            self.joins_from_data.fetch_add(1, Ordering::SeqCst);
        }
        fn participant_joined_from_control(
            &self,
            _session: &RtpSession,
            _participant: &Arc<RtpParticipant>,
            _chunk: &rtp_wire::rtcp::sdes::SDESChunk,
        ) {
            self.joins_from_control.fetch_add(1, Ordering::SeqCst);
        }
        fn participant_data_updated(
            &self,
            _session: &RtpSession,
            _participant: &Arc<RtpParticipant>,
        ) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
        fn participant_left(
            &self,
            _session: &RtpSession,
            _participant: &Arc<RtpParticipant>,
            _reason: Option<&str>,
        ) {
            self.lefts.fetch_add(1, Ordering::SeqCst);
        }
        fn participant_deleted(&self, _session: &RtpSession, _participant: &Arc<RtpParticipant>) {
            self.deletions.fetch_add(1, Ordering::SeqCst);
        }
        fn resolved_ssrc_conflict(&self, _session: &RtpSession, old_ssrc: u32, new_ssrc: u32) {
            self.conflicts.lock().push((old_ssrc, new_ssrc));
        }
        fn session_terminated(&self, _session: &RtpSession, cause: &TerminationReason) {
            self.terminations.lock().push(cause.clone());
        }
    }

    struct FixedGenerator(u32);

    impl SsrcGenerator for FixedGenerator {
        fn generate(&self) -> u32 {
            self.0
        }
    }

    const LOCAL_SSRC: u32 = 0x0badf00d;

    fn session_with_receiver(transport: &MemoryTransport) -> (RtpSession, Arc<RtpParticipant>) {
        let session = RtpSession::builder("test", addr(4000), Box::new(transport.clone()))
            .payload_type(8)
            .unwrap()
            .local_ssrc(LOCAL_SSRC)
            .build();
        let receiver = Arc::new(RtpParticipant::new_receiver(addr(8000), addr(8001)));
        assert!(session.add_receiver(receiver.clone()));
        (session, receiver)
    }

    fn data_packet(ssrc: u32, sequence_number: u16) -> RtpPacket {
        RtpPacket::builder()
            .payload_type(8)
            .unwrap()
            .ssrc(ssrc)
            .sequence_number(sequence_number)
            .timestamp(1000)
            .payload(&[0xd5; 6])
            .build()
    }

    fn cname_chunk(ssrc: u32, cname: &str) -> rtp_wire::rtcp::sdes::SDESChunk {
        rtp_wire::rtcp::sdes::SDESChunk {
            ssrc,
            items: vec![SDESItem::new(SDESItemType::CNAME, cname.to_string()).unwrap()],
        }
    }

    #[test]
    fn init_announces_local_source() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        assert_eq!(session.state(), SessionState::Running);

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, addr(4001));
        assert_eq!(sent[0].destination, addr(8001));

        let compound = RtcpCompoundPacket::decode(&sent[0].payload).unwrap();
        assert_eq!(compound.packets().len(), 2);
        match &compound.packets()[0] {
            RtcpPacket::ReceiverReport(report) => assert_eq!(report.sender_ssrc, LOCAL_SSRC),
            other => panic!("wrong packet type: {:?}", other),
        }
        match &compound.packets()[1] {
            RtcpPacket::SourceDescription(sdes) => {
                let cname = sdes.get_cname_of(LOCAL_SSRC).unwrap();
                assert!(cname.starts_with("rtp-session/test@"), "cname: {}", cname);
            }
            other => panic!("wrong packet type: {:?}", other),
        }
    }

    #[test]
    fn init_is_idempotent_while_running() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        session.init().unwrap();
        // only one announcement went out
        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[test]
    fn init_rolls_back_data_channel_when_control_bind_fails() {
        let transport = MemoryTransport {
            fail_port: Some(4001),
            ..Default::default()
        };
        let (session, _receiver) = session_with_receiver(&transport);
        let result = session.init();
        assert!(matches!(result, Err(RtpSessionError::Bind { .. })));
        assert_eq!(session.state(), SessionState::Created);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn send_data_stamps_header_and_fans_out() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        transport.sent.lock().clear();

        session.send_data(&[1, 2, 3, 4], 5000, true).unwrap();
        session.send_data(&[5, 6, 7, 8], 5160, false).unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].from, addr(4000));
        assert_eq!(sent[0].destination, addr(8000));

        let first = RtpPacket::decode(&sent[0].payload).unwrap();
        assert_eq!(first.header.payload_type, 8);
        assert_eq!(first.header.ssrc, LOCAL_SSRC);
        assert_eq!(first.header.sequence_number, 0);
        assert!(first.header.marker);

        let second = RtpPacket::decode(&sent[1].payload).unwrap();
        assert_eq!(second.header.sequence_number, 1);
        assert!(!second.header.marker);
    }

    #[test]
    fn send_data_requires_running_session() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        assert!(matches!(
            session.send_data(&[1], 0, false),
            Err(RtpSessionError::NotRunning)
        ));
    }

    #[test]
    fn out_of_order_packets_are_discarded() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        let recorder = Arc::new(Recorder::default());
        session.add_data_listener(recorder.clone());

        session.data_packet_received(addr(9000), data_packet(0x45, 10));
        session.data_packet_received(addr(9000), data_packet(0x45, 11));
        session.data_packet_received(addr(9000), data_packet(0x45, 10));

        assert_eq!(recorder.data_packets.load(Ordering::SeqCst), 2);
        let participant = session.participant(0x45).unwrap();
        assert_eq!(participant.last_sequence_number(), 11);
        assert_eq!(participant.received_packets(), 2);
    }

    #[test]
    fn foreign_payload_type_is_filtered() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        let recorder = Arc::new(Recorder::default());
        session.add_data_listener(recorder.clone());

        let mut packet = data_packet(0x45, 1);
        packet.header.payload_type = 96;
        session.data_packet_received(addr(9000), packet);
        assert_eq!(recorder.data_packets.load(Ordering::SeqCst), 0);
        assert!(session.participant(0x45).is_none());
    }

    #[test]
    fn ssrc_collision_is_resolved() {
        let transport = MemoryTransport::default();
        let session = RtpSession::builder("test", addr(4000), Box::new(transport.clone()))
            .payload_type(8)
            .unwrap()
            .local_ssrc(0x45)
            .ssrc_generator(Box::new(FixedGenerator(0x99)))
            .build();
        session.init().unwrap();
        let recorder = Arc::new(Recorder::default());
        session.add_event_listener(recorder.clone());
        session.add_data_listener(recorder.clone());

        // a remote source shows up with our ssrc
        session.data_packet_received(addr(9000), data_packet(0x45, 1));

        assert_eq!(session.local_ssrc(), 0x99);
        assert_eq!(*recorder.conflicts.lock(), vec![(0x45, 0x99)]);
        // the packet is still processed, the remote keeps the ssrc
        assert_eq!(recorder.data_packets.load(Ordering::SeqCst), 1);
        assert_eq!(session.participant(0x45).unwrap().ssrc(), Some(0x45));
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn looped_back_traffic_terminates_the_session() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        let recorder = Arc::new(Recorder::default());
        session.add_event_listener(recorder.clone());

        // own ssrc from our own data address
        session.data_packet_received(addr(4000), data_packet(LOCAL_SSRC, 1));

        assert_eq!(session.state(), SessionState::Terminated);
        let terminations = recorder.terminations.lock();
        assert_eq!(terminations.len(), 1);
        assert!(matches!(terminations[0], TerminationReason::LoopDetected(_)));
    }

    #[test]
    fn collision_threshold_terminates_the_session() {
        let transport = MemoryTransport::default();
        let session = RtpSession::builder("test", addr(4000), Box::new(transport.clone()))
            .payload_type(8)
            .unwrap()
            .local_ssrc(0x45)
            .max_collisions_before_loop(0)
            .build();
        session.init().unwrap();
        let recorder = Arc::new(Recorder::default());
        session.add_event_listener(recorder.clone());

        session.data_packet_received(addr(9000), data_packet(0x45, 1));

        assert_eq!(session.state(), SessionState::Terminated);
        assert!(matches!(
            recorder.terminations.lock()[0],
            TerminationReason::LoopDetected(_)
        ));
    }

    #[test]
    fn three_collisions_are_tolerated_by_default() {
        struct SequenceGenerator(AtomicU32);
        impl SsrcGenerator for SequenceGenerator {
            fn generate(&self) -> u32 {
                self.0.fetch_add(1, Ordering::SeqCst)
            }
        }

        let transport = MemoryTransport::default();
        let session = RtpSession::builder("test", addr(4000), Box::new(transport.clone()))
            .payload_type(8)
            .unwrap()
            .local_ssrc(0x10)
            .ssrc_generator(Box::new(SequenceGenerator(AtomicU32::new(0x50))))
            .build();
        session.init().unwrap();
        let recorder = Arc::new(Recorder::default());
        session.add_event_listener(recorder.clone());

        for colliding_ssrc in [0x10, 0x50, 0x51] {
            session.data_packet_received(addr(9000), data_packet(colliding_ssrc, 1));
        }
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(recorder.conflicts.lock().len(), 3);

        // the fourth one looks like a loop
        session.data_packet_received(addr(9000), data_packet(0x52, 1));
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(matches!(
            recorder.terminations.lock()[0],
            TerminationReason::LoopDetected(_)
        ));
    }

    #[test]
    fn terminate_says_goodbye_and_is_idempotent() {
        let transport = MemoryTransport::default();
        let (session, receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        let recorder = Arc::new(Recorder::default());
        session.add_event_listener(recorder.clone());

        // traffic in both directions; the receiver gets associated
        session.send_data(&[1, 2, 3, 4], 0, false).unwrap();
        session.data_packet_received(addr(8000), data_packet(0x46, 7));
        assert_eq!(receiver.ssrc(), Some(0x46));
        transport.sent.lock().clear();

        session.terminate();
        assert_eq!(session.state(), SessionState::Terminated);

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, addr(8001));
        let compound = RtcpCompoundPacket::decode(&sent[0].payload).unwrap();
        assert_eq!(compound.packets().len(), 3);
        match &compound.packets()[0] {
            RtcpPacket::SenderReport(report) => {
                assert_eq!(report.sender_ssrc, LOCAL_SSRC);
                assert_eq!(report.sender_info.sender_packet_count, 1);
                assert_eq!(report.sender_info.sender_octet_count, 4);
                assert_eq!(report.report_blocks.len(), 1);
                assert_eq!(report.report_blocks[0].ssrc, 0x46);
                assert_eq!(
                    report.report_blocks[0].extended_highest_sequence_number,
                    7
                );
            }
            other => panic!("wrong packet type: {:?}", other),
        }
        match &compound.packets()[2] {
            RtcpPacket::Bye(bye) => {
                assert_eq!(bye.ssrc_list, vec![LOCAL_SSRC]);
                assert_eq!(bye.reason.as_deref(), Some("Session terminated."));
            }
            other => panic!("wrong packet type: {:?}", other),
        }
        drop(sent);

        session.terminate();
        assert_eq!(recorder.terminations.lock().len(), 1);
    }

    #[test]
    fn farewell_uses_receiver_report_when_nothing_was_sent() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        transport.sent.lock().clear();

        session.terminate();
        let sent = transport.sent.lock();
        let compound = RtcpCompoundPacket::decode(&sent[0].payload).unwrap();
        assert!(matches!(
            compound.packets()[0],
            RtcpPacket::ReceiverReport(_)
        ));
    }

    #[test]
    fn explicit_control_is_gated_by_automated_handling() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        transport.sent.lock().clear();

        let compound = RtcpCompoundPacket::builder()
            .packet(RtcpPacket::ReceiverReport(
                RtcpReceiverReport::builder().ssrc(LOCAL_SSRC).build().unwrap(),
            ))
            .build()
            .unwrap();
        assert!(!session.send_control_packet(&compound).unwrap());
        assert!(transport.sent.lock().is_empty());

        // app packets go through regardless
        let app = RtcpAppPacket::builder()
            .subtype(1)
            .unwrap()
            .ssrc(LOCAL_SSRC)
            .name("sync")
            .unwrap()
            .build()
            .unwrap();
        session.send_app_packet(&app).unwrap();
        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[test]
    fn explicit_control_flows_when_automation_is_off() {
        let transport = MemoryTransport::default();
        let session = RtpSession::builder("test", addr(4000), Box::new(transport.clone()))
            .payload_type(8)
            .unwrap()
            .local_ssrc(LOCAL_SSRC)
            .automated_rtcp_handling(false)
            .build();
        let receiver = Arc::new(RtpParticipant::new_receiver(addr(8000), addr(8001)));
        session.add_receiver(receiver);
        session.init().unwrap();
        // no automated join announcement
        assert!(transport.sent.lock().is_empty());

        let compound = RtcpCompoundPacket::builder()
            .packet(RtcpPacket::ReceiverReport(
                RtcpReceiverReport::builder().ssrc(LOCAL_SSRC).build().unwrap(),
            ))
            .build()
            .unwrap();
        assert!(session.send_control_packet(&compound).unwrap());
        assert_eq!(transport.sent.lock().len(), 1);

        // inbound control passes through verbatim
        let recorder = Arc::new(Recorder::default());
        session.add_control_listener(recorder.clone());
        session.control_packet_received(addr(9001), compound);
        assert_eq!(recorder.compounds.load(Ordering::SeqCst), 1);
    }

    fn sdes_compound(chunk_ssrc: u32, cname: &str, note: Option<&str>) -> RtcpCompoundPacket {
        let mut builder = RtcpSourceDescriptionPacket::builder().chunk(cname_chunk(chunk_ssrc, cname));
        if let Some(note) = note {
            builder = builder.note(chunk_ssrc, note.to_string()).unwrap();
        }
        RtcpCompoundPacket::builder()
            .packet(RtcpPacket::ReceiverReport(
                RtcpReceiverReport::builder().ssrc(chunk_ssrc).build().unwrap(),
            ))
            .packet(RtcpPacket::SourceDescription(builder.build().unwrap()))
            .build()
            .unwrap()
    }

    #[test]
    fn sdes_creates_and_describes_participants() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        let recorder = Arc::new(Recorder::default());
        session.add_event_listener(recorder.clone());

        // a member first seen through data is not yet described
        session.data_packet_received(addr(9000), data_packet(0x45, 1));
        let participant = session.participant(0x45).unwrap();
        assert!(!participant.received_sdes());

        session.control_packet_received(addr(9001), sdes_compound(0x45, "cname@host", Some("one")));
        assert_eq!(recorder.updates.load(Ordering::SeqCst), 1);
        assert_eq!(participant.cname(), Some("cname@host".to_string()));
        assert_eq!(participant.info().note, Some("one".to_string()));

        // unknown source, created straight from the chunk
        session.control_packet_received(addr(9002), sdes_compound(0x46, "other@host", None));
        assert_eq!(recorder.joins_from_control.load(Ordering::SeqCst), 1);
        let other = session.participant(0x46).unwrap();
        assert_eq!(other.cname(), Some("other@host".to_string()));
    }

    #[test]
    fn first_source_description_is_authoritative() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        let recorder = Arc::new(Recorder::default());
        session.add_event_listener(recorder.clone());

        session.control_packet_received(addr(9001), sdes_compound(0x45, "cname@host", Some("original")));
        let participant = session.participant(0x45).unwrap();
        assert_eq!(participant.info().note, Some("original".to_string()));

        // a later chunk for an already described source changes nothing
        session.control_packet_received(addr(9001), sdes_compound(0x45, "cname@host", Some("overwritten")));
        assert_eq!(recorder.updates.load(Ordering::SeqCst), 0);
        assert_eq!(participant.info().note, Some("original".to_string()));
    }

    #[test]
    fn reports_from_unknown_senders_are_ignored() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();

        let report = RtcpCompoundPacket::builder()
            .packet(RtcpPacket::ReceiverReport(
                RtcpReceiverReport::builder()
                    .ssrc(0x99)
                    .report_block(
                        ReportBlock::builder()
                            .ssrc(LOCAL_SSRC)
                            .extended_highest_sequence_number(7)
                            .build(),
                    )
                    .build()
                    .unwrap(),
            ))
            .build()
            .unwrap();
        session.control_packet_received(addr(9001), report);

        // a report never creates membership
        assert_eq!(session.member_count(), 0);
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn bye_marks_the_participant_and_deletion_waits_for_cleanup() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        let recorder = Arc::new(Recorder::default());
        session.add_event_listener(recorder.clone());

        session.data_packet_received(addr(9000), data_packet(0x45, 1));
        assert_eq!(recorder.joins_from_data.load(Ordering::SeqCst), 1);
        assert!(session.participant(0x45).is_some());

        let goodbye = RtcpCompoundPacket::builder()
            .packet(RtcpPacket::ReceiverReport(
                RtcpReceiverReport::builder().ssrc(0x45).build().unwrap(),
            ))
            .packet(RtcpPacket::Bye(
                RtcpByePacket::builder()
                    .ssrc(0x45)
                    .reason("done".to_string())
                    .unwrap()
                    .build()
                    .unwrap(),
            ))
            .build()
            .unwrap();
        session.control_packet_received(addr(9001), goodbye);

        // the member is marked but stays, late reports still find it
        assert_eq!(recorder.lefts.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.deletions.load(Ordering::SeqCst), 0);
        let participant = session.participant(0x45).unwrap();
        assert!(participant.bye_received());

        session.cleanup();
        assert_eq!(recorder.deletions.load(Ordering::SeqCst), 1);
        assert!(session.participant(0x45).is_none());
    }

    #[test]
    fn fixed_remote_mode_drops_strangers() {
        let transport = MemoryTransport::default();
        let remote = Arc::new(RtpParticipant::with_ssrc(0x45));
        let session = RtpSession::builder("test", addr(4000), Box::new(transport.clone()))
            .payload_type(8)
            .unwrap()
            .local_ssrc(LOCAL_SSRC)
            .remote(remote.clone())
            .build();
        session.init().unwrap();
        let recorder = Arc::new(Recorder::default());
        session.add_data_listener(recorder.clone());

        session.data_packet_received(addr(9000), data_packet(0x46, 1));
        assert_eq!(recorder.data_packets.load(Ordering::SeqCst), 0);

        session.data_packet_received(addr(9000), data_packet(0x45, 1));
        assert_eq!(recorder.data_packets.load(Ordering::SeqCst), 1);
        assert_eq!(session.member_count(), 1);
    }

    #[test]
    fn origin_updates_destination_when_enabled() {
        let transport = MemoryTransport::default();
        let session = RtpSession::builder("test", addr(4000), Box::new(transport.clone()))
            .payload_type(8)
            .unwrap()
            .local_ssrc(LOCAL_SSRC)
            .update_destination_from_origin(true)
            .build();
        let receiver = Arc::new(RtpParticipant::new_receiver(addr(8000), addr(8001)));
        session.add_receiver(receiver.clone());
        session.init().unwrap();

        // the receiver rebinds and talks from a new port
        session.data_packet_received(addr(8000), data_packet(0x46, 1));
        session.data_packet_received(addr(8500), data_packet(0x46, 2));
        assert_eq!(receiver.data_destination(), Some(addr(8500)));
    }

    #[test]
    fn undecodable_datagrams_are_dropped_quietly() {
        let transport = MemoryTransport::default();
        let (session, _receiver) = session_with_receiver(&transport);
        session.init().unwrap();
        session.data_received(addr(9000), &[0x80, 0x88]);
        session.control_received(addr(9001), &[0x81]);
        assert_eq!(session.state(), SessionState::Running);
    }
}
