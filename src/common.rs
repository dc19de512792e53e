/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

//! The shared event header and the algorithms common to all scheduled-event
//! tables.
//!
//! Every table stores an `[EventInfo; N]` array parallel to its payload array,
//! indexed identically. The free functions in this module operate on those
//! arrays directly so that both the generic [`crate::table::EventTable`] and
//! the bespoke price tables can delegate to the same logic.

use crate::time::DURATION_FOREVER;

/// "No pending events" sentinel returned by the due-time computations.
pub const NO_PENDING_EVENTS: u32 = u32::MAX;

/// The header record shared by every scheduled-event table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventInfo {
    /// Whether the slot holds live data.
    pub valid: bool,
    /// Monotonically-administered identifier; larger wins, but a slot whose id
    /// is already larger than an incoming one is never overwritten (except by
    /// explicit cancellation).
    pub issuer_event_id: u32,
    /// Opaque tag for the issuing authority; part of the matching key for
    /// some, not all, tables.
    pub provider_id: u32,
    /// UTC seconds since the Zigbee epoch, after duration-type adjustment.
    pub start_time: u32,
    /// Adjusted duration; [`DURATION_FOREVER`] means "until changed".
    pub duration_sec: u32,
    /// Set when the entry became due and the owning subsystem has not yet
    /// pushed the change out.
    pub actions_pending: bool,
}

impl EventInfo {
    pub const INVALID: Self = Self {
        valid: false,
        issuer_event_id: 0,
        provider_id: 0,
        start_time: 0,
        duration_sec: 0,
        actions_pending: false,
    };

    /// Whether the entry's window contains `now`.
    pub fn contains(&self, now: u32) -> bool {
        self.start_time <= now && !self.ended(now)
    }

    /// Whether the entry's window has fully elapsed.
    pub fn ended(&self, now: u32) -> bool {
        self.duration_sec != DURATION_FOREVER
            && (self.start_time as u64 + self.duration_sec as u64) <= now as u64
    }
}

impl Default for EventInfo {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Finds the slot an incoming `(provider_id, event_id)` event should land in.
///
/// Selection priority: an exact key match wins immediately (the event is an
/// update); otherwise the candidate with the smallest effective event id is
/// taken, where invalid slots qualify unconditionally (counting as id 0) and
/// valid slots only when their id is smaller than the incoming one. Returns
/// `None` when every slot holds data at least as new as the incoming event,
/// in which case the caller must drop it.
pub fn matching_or_unused_index(
    infos: &[EventInfo],
    provider_id: Option<u32>,
    event_id: u32,
) -> Option<usize> {
    let mut candidate: Option<(usize, u32)> = None;

    for (i, info) in infos.iter().enumerate() {
        if info.valid {
            if info.issuer_event_id == event_id
                && provider_id.is_none_or(|p| p == info.provider_id)
            {
                return Some(i);
            }
        }

        let effective_id = if info.valid { info.issuer_event_id } else { 0 };
        if (!info.valid || info.issuer_event_id < event_id)
            && candidate.is_none_or(|(_, id)| effective_id < id)
        {
            candidate = Some((i, effective_id));
        }
    }

    // Sanity check: never let stale data evict newer data. The candidate
    // selection above already guarantees this, but an explicit check keeps
    // the invariant local.
    match candidate {
        Some((i, _)) if !infos[i].valid || infos[i].issuer_event_id < event_id => Some(i),
        _ => None,
    }
}

/// Sorts both arrays in place by start time ascending, invalid entries last.
///
/// Selection sort; table capacities are single digits.
pub fn sort_by_start_time<P>(infos: &mut [EventInfo], payloads: &mut [P]) {
    debug_assert_eq!(infos.len(), payloads.len());

    let sort_key = |info: &EventInfo| {
        if info.valid {
            info.start_time as u64
        } else {
            u64::MAX
        }
    };

    for i in 0..infos.len() {
        let mut min = i;
        for j in i + 1..infos.len() {
            if sort_key(&infos[j]) < sort_key(&infos[min]) {
                min = j;
            }
        }
        if min != i {
            infos.swap(i, min);
            payloads.swap(i, min);
        }
    }
}

/// Truncates each entry's duration so it never overlaps the start of the next
/// valid entry. Assumes the table is sorted by start time.
pub fn trim_overlapping(infos: &mut [EventInfo]) {
    for i in 1..infos.len() {
        if !infos[i - 1].valid || !infos[i].valid {
            continue;
        }

        let next_start = infos[i].start_time;
        let prev = &mut infos[i - 1];
        let overlaps = prev.duration_sec == DURATION_FOREVER
            || prev.start_time as u64 + prev.duration_sec as u64 > next_start as u64;
        if overlaps {
            prev.duration_sec = next_start - prev.start_time;
        }
    }
}

/// Seconds until the entry at index 1 becomes active (i.e. until the entry at
/// index 0 should be retired). Assumes the table is sorted by start time.
/// Returns [`NO_PENDING_EVENTS`] when there is no second valid entry.
pub fn seconds_until_second_index_active(infos: &[EventInfo], now: u32) -> u32 {
    match infos.get(1) {
        Some(info) if info.valid => info.start_time.saturating_sub(now),
        _ => NO_PENDING_EVENTS,
    }
}

/// Collects into `out` the indices of entries suitable for a GetXxx response:
/// all entries with `issuer_event_id >= min_event_id` whose start time lies
/// after `earliest_start_time`, plus at most one already-started entry (the
/// last one scanned replaces any earlier one). A `max_count` of 0 means
/// unlimited. Returns the number of indices written.
pub fn find_valid_entries(
    out: &mut [u8],
    infos: &[EventInfo],
    earliest_start_time: u32,
    min_event_id: u32,
    max_count: u8,
) -> u8 {
    let mut count = 0;
    let mut started_at: Option<usize> = None;

    for (i, info) in infos.iter().enumerate() {
        if !info.valid || info.issuer_event_id < min_event_id {
            continue;
        }

        if info.start_time <= earliest_start_time {
            // Only the most recent already-started entry is kept.
            match started_at {
                Some(pos) => out[pos] = i as u8,
                None if count < out.len() => {
                    out[count] = i as u8;
                    started_at = Some(count);
                    count += 1;
                }
                None => {}
            }
        } else if count < out.len() {
            out[count] = i as u8;
            count += 1;
        }

        if max_count != 0 && count >= max_count as usize {
            break;
        }
    }

    count as u8
}

/// Index of the currently active entry: among valid entries whose window
/// contains `now`, the one with the largest issuer event id (ties broken by
/// scan order).
///
/// Unlike the de-facto Smart Energy behavior this *does* require the entry
/// not to have ended yet; an entry whose window elapsed with no successor is
/// not reported as active.
pub fn active_index(infos: &[EventInfo], now: u32) -> Option<usize> {
    let mut active: Option<usize> = None;

    for (i, info) in infos.iter().enumerate() {
        if info.valid
            && info.contains(now)
            && active.is_none_or(|a| infos[a].issuer_event_id < info.issuer_event_id)
        {
            active = Some(i);
        }
    }

    active
}

/// The nearest entry starting strictly after `now` and the seconds until it
/// starts.
pub fn future_index(infos: &[EventInfo], now: u32) -> Option<(usize, u32)> {
    let mut nearest: Option<(usize, u32)> = None;

    for (i, info) in infos.iter().enumerate() {
        if !info.valid || info.start_time <= now {
            continue;
        }

        let delta = info.start_time - now;
        if nearest.is_none_or(|(_, d)| delta < d) {
            nearest = Some((i, delta));
        }
    }

    nearest
}
