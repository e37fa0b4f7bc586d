use std::fmt;

use parking_lot::Mutex;

/// The independently cached remote resources, plus the write path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    State,
    Metrics,
    Summary,
    Settings,
    Control,
}

/// Which polling discipline a channel belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stream {
    Fast,
    Slow,
    Write,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::State,
        Channel::Metrics,
        Channel::Summary,
        Channel::Settings,
        Channel::Control,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::State => "state",
            Channel::Metrics => "metrics",
            Channel::Summary => "summary",
            Channel::Settings => "settings",
            Channel::Control => "control",
        }
    }

    pub fn stream(self) -> Stream {
        match self {
            Channel::State => Stream::Fast,
            Channel::Metrics | Channel::Summary | Channel::Settings => Stream::Slow,
            Channel::Control => Stream::Write,
        }
    }

    /// Higher is worse. A broken live view outranks a failed write, which
    /// outranks stale trends.
    pub fn severity(self) -> u8 {
        match self {
            Channel::State => 4,
            Channel::Control => 3,
            Channel::Metrics | Channel::Summary => 2,
            Channel::Settings => 1,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a fetch was asked for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Demand {
    /// A cycle tick. Dropped if a fetch for the channel is already pending.
    Scheduled,
    /// Follow-up to a successful write, or a manual refresh. Never dropped: if
    /// a fetch is pending, the holder of the slot runs one more once it lands.
    Eager,
}

#[derive(Debug, Default, Copy, Clone)]
struct Slot {
    busy: bool,
    rerun: bool,
}

/// Pending-fetch slots, one per channel.
///
/// A fetch only starts if it can claim its channel's slot. Eager demands that
/// find the slot busy are coalesced into a single rerun owed by the current
/// holder, so each resource has at most one request in flight and at most one
/// queued behind it.
#[derive(Debug, Default)]
pub struct InFlight {
    slots: Mutex<[Slot; 5]>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self, channel: Channel, demand: Demand) -> Option<InFlightGuard<'_>> {
        let mut slots = self.slots.lock();
        let slot = &mut slots[channel.index()];
        if slot.busy {
            if demand == Demand::Eager {
                slot.rerun = true;
            }
            return None;
        }
        slot.busy = true;
        Some(InFlightGuard {
            owner: self,
            channel,
            released: false,
        })
    }
}

#[derive(Debug)]
pub struct InFlightGuard<'a> {
    owner: &'a InFlight,
    channel: Channel,
    released: bool,
}

impl InFlightGuard<'_> {
    /// Settle the slot after a fetch lands. Returns `true` when an eager
    /// demand arrived meanwhile; the slot stays claimed for that rerun.
    /// Otherwise the slot is released. Both happen under one lock, so an
    /// eager demand is never lost between the check and the release.
    pub fn finish(&mut self) -> bool {
        let mut slots = self.owner.slots.lock();
        let slot = &mut slots[self.channel.index()];
        if slot.rerun {
            slot.rerun = false;
            return true;
        }
        slot.busy = false;
        self.released = true;
        false
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.owner.slots.lock()[self.channel.index()] = Slot::default();
        }
    }
}
