//! Reliability layer: sequencing, retries, rate limiting and duplicate
//! suppression on top of a lossy report link.
//!
//! The underlying protocol has no acknowledgment frame. A pending packet
//! counts as delivered once a newer packet of the same [`PacketClass`]
//! supersedes it. Until then it is retransmitted on an exponential schedule:
//!
//! ```text
//! age >= retry_base_ms << retries   and   retries < max_retries   -> retransmit
//! age >= max_age_ms                 or    retries >= max_retries  -> drop
//! ```
//!
//! Pending packets live in a fixed arena of [`RING_CAPACITY`] slots. When the
//! arena is full the oldest packet is dropped to make room.

use crc::{Crc, CRC_32_ISCSI};
use procon_proto::{semantic_span, PacketClass, MAX_REPORT_LEN};

use crate::output::{LinkError, ReportLink};

/// Milliseconds since boot.
pub type TimestampMillis = u64;

/// Number of pending packet slots.
pub const RING_CAPACITY: usize = 16;

/// Fast hash over the meaningful bytes of a report.
const HASHER: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Which transmissions the duplicate filter applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DedupScope {
    /// Only retransmissions are compared against the previous transmission.
    #[default]
    RetransmissionsOnly,
    /// Fresh input reports are filtered as well.
    AllTransmissions,
}

/// Reliability layer timing configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    /// First retry delay; doubles with each retry.
    pub retry_base_ms: u32,
    pub max_retries: u8,
    /// Pending packets older than this are dropped.
    pub max_age_ms: u32,
    /// Minimum spacing between two retransmissions.
    pub min_retransmit_interval_ms: u32,
    /// Identical input within this window counts as a duplicate.
    pub dedup_window_ms: u32,
    pub dedup_scope: DedupScope,
}

impl LinkConfig {
    pub const DEFAULT: Self = Self {
        retry_base_ms: 16,
        max_retries: 3,
        max_age_ms: 100,
        min_retransmit_interval_ms: 16,
        dedup_window_ms: 50,
        dedup_scope: DedupScope::RetransmissionsOnly,
    };

    /// Delay after the first send before retry number `retries + 1` is due.
    #[inline]
    #[must_use]
    pub fn retry_delay_ms(&self, retries: u8) -> u64 {
        u64::from(self.retry_base_ms) << retries.min(32)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Result of [`ReliableLink::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendOutcome {
    /// Transmitted and tracked under the given sequence number.
    Sent(u32),
    /// Identical input went out within the dedup window; nothing was sent.
    Suppressed,
    /// The transport refused the packet. It is still tracked for retry.
    Failed(u32, LinkError),
}

/// Result of one [`ReliableLink::poll_retries`] scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryScan {
    pub retransmitted: u8,
    pub suppressed: u8,
    pub dropped: u8,
}

/// Running counters, mainly for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    pub sent: u32,
    pub retransmitted: u32,
    pub suppressed: u32,
    pub superseded: u32,
    pub expired: u32,
    pub exhausted: u32,
    pub overflowed: u32,
    pub failed: u32,
}

#[derive(Clone, Copy, Debug)]
struct PendingPacket {
    seq: u32,
    class: PacketClass,
    first_sent: TimestampMillis,
    last_sent: TimestampMillis,
    retries: u8,
    len: usize,
    payload: [u8; MAX_REPORT_LEN],
}

impl PendingPacket {
    fn bytes(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}

#[derive(Clone, Copy, Debug)]
struct LastTransmission {
    hash: u32,
    at: TimestampMillis,
}

/// Reliability wrapper around a [`ReportLink`].
pub struct ReliableLink<T> {
    transport: T,
    config: LinkConfig,
    slots: [Option<PendingPacket>; RING_CAPACITY],
    next_seq: u32,
    last_input: Option<LastTransmission>,
    last_retransmit: Option<TimestampMillis>,
    stats: LinkStats,
}

impl<T: ReportLink> ReliableLink<T> {
    #[must_use]
    pub fn new(transport: T, config: LinkConfig) -> Self {
        Self {
            transport,
            config,
            slots: [None; RING_CAPACITY],
            next_seq: 0,
            last_input: None,
            last_retransmit: None,
            stats: LinkStats::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Number of packets awaiting supersession.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[inline]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Transmit `payload` now and track it for retry.
    ///
    /// Older pending packets of the same class are superseded.
    pub fn send(&mut self, class: PacketClass, payload: &[u8], now: TimestampMillis) -> SendOutcome {
        let payload = &payload[..payload.len().min(MAX_REPORT_LEN)];
        let hash = HASHER.checksum(semantic_span(payload));

        if class == PacketClass::Input
            && self.config.dedup_scope == DedupScope::AllTransmissions
            && self.is_duplicate(hash, now)
        {
            self.stats.suppressed += 1;
            return SendOutcome::Suppressed;
        }

        for slot in &mut self.slots {
            if slot.is_some_and(|p| p.class == class) {
                *slot = None;
                self.stats.superseded += 1;
            }
        }

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let mut packet = PendingPacket {
            seq,
            class,
            first_sent: now,
            last_sent: now,
            retries: 0,
            len: payload.len(),
            payload: [0; MAX_REPORT_LEN],
        };
        packet.payload[..payload.len()].copy_from_slice(payload);
        self.track(packet);

        if class == PacketClass::Input {
            self.last_input = Some(LastTransmission { hash, at: now });
        }

        match self.transport.try_transmit(payload) {
            Ok(()) => {
                self.stats.sent += 1;
                SendOutcome::Sent(seq)
            }
            Err(e) => {
                self.stats.failed += 1;
                debug!("send #{} failed: {}", seq, e);
                SendOutcome::Failed(seq, e)
            }
        }
    }

    /// Run one retry scan: evict stale packets and retransmit at most one
    /// due packet.
    pub fn poll_retries(&mut self, now: TimestampMillis) -> RetryScan {
        let mut scan = RetryScan::default();

        for slot in &mut self.slots {
            let Some(packet) = slot else { continue };
            let age = now.saturating_sub(packet.first_sent);
            if age >= u64::from(self.config.max_age_ms) {
                trace!("packet #{} expired after {} ms", packet.seq, age);
                self.stats.expired += 1;
                scan.dropped += 1;
                *slot = None;
            } else if packet.retries >= self.config.max_retries {
                trace!("packet #{} exhausted its retries", packet.seq);
                self.stats.exhausted += 1;
                scan.dropped += 1;
                *slot = None;
            }
        }

        if let Some(last) = self.last_retransmit {
            if now.saturating_sub(last) < u64::from(self.config.min_retransmit_interval_ms) {
                return scan;
            }
        }

        let Some(index) = self.next_due(now) else {
            return scan;
        };
        let Some(packet) = self.slots[index].as_mut() else {
            return scan;
        };

        packet.retries += 1;
        let packet = *packet;

        if packet.class == PacketClass::Input {
            let hash = HASHER.checksum(semantic_span(packet.bytes()));
            if self.is_duplicate(hash, now) {
                self.stats.suppressed += 1;
                scan.suppressed += 1;
                return scan;
            }
            self.last_input = Some(LastTransmission { hash, at: now });
        }

        if let Some(slot) = self.slots[index].as_mut() {
            slot.last_sent = now;
        }
        self.last_retransmit = Some(now);

        match self.transport.try_transmit(packet.bytes()) {
            Ok(()) => {
                trace!("retransmitted #{} (retry {})", packet.seq, packet.retries);
                self.stats.retransmitted += 1;
                scan.retransmitted += 1;
            }
            Err(e) => {
                debug!("retransmit #{} failed: {}", packet.seq, e);
                self.stats.failed += 1;
            }
        }
        scan
    }

    /// Due packet that waited longest since its last transmission.
    fn next_due(&self, now: TimestampMillis) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|p| (i, p)))
            .filter(|(_, p)| {
                p.retries < self.config.max_retries
                    && now.saturating_sub(p.first_sent) >= self.config.retry_delay_ms(p.retries)
            })
            .min_by_key(|(_, p)| (p.last_sent, self.next_seq.wrapping_sub(p.seq).wrapping_neg()))
            .map(|(i, _)| i)
    }

    fn is_duplicate(&self, hash: u32, now: TimestampMillis) -> bool {
        self.last_input.is_some_and(|last| {
            last.hash == hash && now.saturating_sub(last.at) < u64::from(self.config.dedup_window_ms)
        })
    }

    fn track(&mut self, packet: PendingPacket) {
        if let Some(free) = self.slots.iter_mut().find(|slot| slot.is_none()) {
            *free = Some(packet);
            return;
        }

        // Ring full: the oldest sequence number gives way.
        let next_seq = self.next_seq;
        if let Some(oldest) = self
            .slots
            .iter_mut()
            .max_by_key(|slot| slot.map_or(0, |p| next_seq.wrapping_sub(p.seq)))
        {
            warn!("pending ring full, dropping oldest packet");
            self.stats.overflowed += 1;
            *oldest = Some(packet);
        }
    }
}
