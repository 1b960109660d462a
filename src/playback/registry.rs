//! Bookkeeping of in-flight sound events.
//!
//! Entries live in a slab indexed by [`SourceKey`]. A key carries the
//! generation of its slot, so a key kept after its entry was reaped never
//! resolves to a newer entry reusing the same slot.

use crate::audio::{DeviceHandle, VoiceId};

/// Whether an event came from a tonal track or a drum lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceKind {
    Tonal,
    Drum,
}

/// A scheduled sound the engine is responsible for cleaning up.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSource {
    /// The voice on the device's master bus.
    pub voice: VoiceId,
    /// Peak level of the event's gain envelope.
    pub envelope_gain: f32,
    pub kind: VoiceKind,
    /// Absolute device time at which the voice stops.
    pub scheduled_stop_time: f64,
}

/// Handle to a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<ActiveSource>,
}

/// Owner of every [`ActiveSource`].
#[derive(Debug, Default)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked sources.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Tracks a new source.
    pub fn add(&mut self, source: ActiveSource) -> SourceKey {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(source);
            return SourceKey {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(source),
        });
        SourceKey {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, key: SourceKey) -> Option<&ActiveSource> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    /// Stops tracking a source without touching the device.
    pub fn remove(&mut self, key: SourceKey) -> Option<ActiveSource> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        Self::release(slot, key.index, &mut self.free);
        self.len -= 1;
        Some(entry)
    }

    fn release(slot: &mut Slot, index: u32, free: &mut Vec<u32>) {
        slot.generation = slot.generation.wrapping_add(1);
        free.push(index);
    }

    /// Iterates over tracked sources.
    pub fn iter(&self) -> impl Iterator<Item = (SourceKey, &ActiveSource)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    SourceKey {
                        index: i as u32,
                        generation: slot.generation,
                    },
                    entry,
                )
            })
        })
    }

    /// Disconnects and drops every source whose stop time has passed.
    ///
    /// Returns the number of sources reclaimed.
    pub fn reap(&mut self, device: &DeviceHandle) -> usize {
        let now = device.current_time();
        let mut reaped = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let finished = slot
                .entry
                .as_ref()
                .is_some_and(|entry| entry.scheduled_stop_time <= now);
            if !finished {
                continue;
            }
            if let Some(entry) = slot.entry.take() {
                // Already gone from the bus is fine
                let _ = device.disconnect(entry.voice);
                Self::release(slot, index as u32, &mut self.free);
                reaped += 1;
            }
        }
        self.len -= reaped;
        if reaped > 0 {
            tracing::debug!(reaped, remaining = self.len, "Reclaimed finished sources");
        }
        reaped
    }

    /// Force-stops and disconnects every source, then empties the registry.
    ///
    /// With no device (never opened or already closed) the entries are
    /// simply dropped. Slots keep their generations, so keys handed out
    /// before the call stay dead. Returns the number of sources stopped.
    pub fn stop_all(&mut self, device: Option<&DeviceHandle>) -> usize {
        let stopped = self.len;
        let now = device.map(DeviceHandle::current_time);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot.entry.take() else {
                continue;
            };
            if let (Some(device), Some(now)) = (device, now) {
                let _ = device.stop(entry.voice, now);
                let _ = device.disconnect(entry.voice);
            }
            Self::release(slot, index as u32, &mut self.free);
        }
        self.len = 0;
        stopped
    }
}
