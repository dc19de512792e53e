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

//! The generic fixed-capacity scheduled-event table.
//!
//! One `EventTable` instance backs each of the per-kind managers (billing
//! periods, block periods, calorific values, ...). The table owns an
//! [`EventInfo`] header array and a parallel payload array and delegates all
//! of its scheduling logic to the free functions in [`crate::common`].

use core::fmt::Debug;

use crate::common::{
    active_index, find_valid_entries, future_index, matching_or_unused_index,
    seconds_until_second_index_active, sort_by_start_time, trim_overlapping, EventInfo,
};
use crate::error::{Error, ErrorCode};

/// A fixed-capacity event table: `N` header slots parallel to `N` payload
/// slots, sorted by start time with invalid slots at the end.
#[derive(Debug)]
pub struct EventTable<P, const N: usize> {
    infos: [EventInfo; N],
    payloads: [P; N],
}

impl<P: Default, const N: usize> Default for EventTable<P, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Default, const N: usize> EventTable<P, N> {
    pub fn new() -> Self {
        Self {
            infos: [EventInfo::INVALID; N],
            payloads: core::array::from_fn(|_| P::default()),
        }
    }

    /// Marks every slot invalid. Idempotent.
    pub fn clear(&mut self) {
        self.infos = [EventInfo::INVALID; N];
    }

    /// Inserts (or updates, on an exact key match) an event.
    ///
    /// `provider_id` of `None` matches on the issuer event id alone. The entry
    /// lands in the slot chosen by [`matching_or_unused_index`]; afterwards
    /// the table is re-sorted and overlapping durations are trimmed. Returns
    /// the post-sort index of the entry, or `ErrorCode::NoSpace` when every
    /// slot holds data at least as new as the incoming event.
    pub fn insert(
        &mut self,
        provider_id: Option<u32>,
        mut info: EventInfo,
        payload: P,
    ) -> Result<usize, Error> {
        let slot = matching_or_unused_index(&self.infos, provider_id, info.issuer_event_id)
            .ok_or(ErrorCode::NoSpace)?;

        info.valid = true;
        let event_id = info.issuer_event_id;

        self.infos[slot] = info;
        self.payloads[slot] = payload;

        sort_by_start_time(&mut self.infos, &mut self.payloads);
        trim_overlapping(&mut self.infos);

        let index = self
            .infos
            .iter()
            .position(|i| i.valid && i.issuer_event_id == event_id)
            .unwrap_or(slot);

        Ok(index)
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn infos(&self) -> &[EventInfo] {
        &self.infos
    }

    pub fn entry(&self, index: usize) -> Option<(&EventInfo, &P)> {
        self.infos
            .get(index)
            .filter(|i| i.valid)
            .map(|i| (i, &self.payloads[index]))
    }

    pub fn entry_by_event_id(&self, event_id: u32) -> Option<(&EventInfo, &P)> {
        let index = self
            .infos
            .iter()
            .position(|i| i.valid && i.issuer_event_id == event_id)?;

        Some((&self.infos[index], &self.payloads[index]))
    }

    pub fn info_mut(&mut self, index: usize) -> Option<&mut EventInfo> {
        self.infos.get_mut(index).filter(|i| i.valid)
    }

    /// Marks the entry invalid and restores the sort invariant.
    pub fn invalidate(&mut self, index: usize) {
        if let Some(info) = self.infos.get_mut(index) {
            *info = EventInfo::INVALID;
            sort_by_start_time(&mut self.infos, &mut self.payloads);
        }
    }

    pub fn active(&self, now: u32) -> Option<usize> {
        active_index(&self.infos, now)
    }

    pub fn future(&self, now: u32) -> Option<(usize, u32)> {
        future_index(&self.infos, now)
    }

    pub fn seconds_until_second_active(&self, now: u32) -> u32 {
        seconds_until_second_index_active(&self.infos, now)
    }

    pub fn find_valid(
        &self,
        out: &mut [u8],
        earliest_start_time: u32,
        min_event_id: u32,
        max_count: u8,
    ) -> u8 {
        find_valid_entries(out, &self.infos, earliest_start_time, min_event_id, max_count)
    }

    /// Seconds until something in this table needs attention: an entry with
    /// pending actions becoming (or already) due, or the second entry
    /// superseding the first. [`crate::common::NO_PENDING_EVENTS`] when idle.
    pub fn next_action_due(&self, now: u32) -> u32 {
        let mut due = seconds_until_second_index_active(&self.infos, now);

        for info in self.infos.iter().filter(|i| i.valid && i.actions_pending) {
            due = due.min(info.start_time.saturating_sub(now));
        }

        due
    }

    /// Retires the first entry if the second has become due, then reports the
    /// newly-active entry if its actions are still pending (clearing the
    /// flag). The per-kind refresh actions wrap this with their notification
    /// hooks.
    pub fn refresh(&mut self, now: u32) -> Option<usize> {
        if seconds_until_second_index_active(&self.infos, now) == 0 {
            self.infos[0] = EventInfo::INVALID;
            sort_by_start_time(&mut self.infos, &mut self.payloads);
            trim_overlapping(&mut self.infos);
        }

        let active = active_index(&self.infos, now)?;
        if self.infos[active].actions_pending {
            self.infos[active].actions_pending = false;
            Some(active)
        } else {
            None
        }
    }
}

impl<P: Debug, const N: usize> EventTable<P, N> {
    /// Diagnostic dump of one slot.
    pub fn log_entry(&self, label: &str, index: usize) {
        match self.infos.get(index) {
            Some(info) if info.valid => {
                info!(
                    "{}[{}]: event id {}, provider {}, start {}, duration {}, pending {}",
                    label,
                    index,
                    info.issuer_event_id,
                    info.provider_id,
                    info.start_time,
                    info.duration_sec,
                    info.actions_pending,
                );
            }
            Some(_) => info!("{}[{}]: <unused>", label, index),
            None => {}
        }
    }

    /// Diagnostic dump of the whole table.
    pub fn log(&self, label: &str) {
        for index in 0..N {
            self.log_entry(label, index);
        }
    }
}
