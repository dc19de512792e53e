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

use core::time::Duration;

/// The wall-clock seam: returns the time elapsed since the UNIX epoch.
///
/// All scheduling math in this crate is derived from a single `Epoch` call per
/// dispatch pass; tests inject their own function here.
pub type Epoch = fn() -> Duration;

/// Seconds from 1970/01/01 00:00:00 till 2000/01/01 00:00:00 UTC
/// (the Zigbee/Smart Energy epoch).
pub const ZIGBEE_EPOCH_SECS: u64 = 946684800;

pub fn dummy_epoch() -> Duration {
    Duration::from_secs(0)
}

#[cfg(feature = "std")]
pub fn sys_epoch() -> Duration {
    unwrap!(
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH),
        "System time is before UNIX_EPOCH"
    )
}

/// Returns the current UTC time as seconds since the Zigbee epoch.
///
/// Saturates at the ends, so an epoch source set before year 2000 reads as 0.
pub fn zigbee_now(epoch: Epoch) -> u32 {
    let secs = epoch().as_secs().saturating_sub(ZIGBEE_EPOCH_SECS);

    secs.min(u32::MAX as u64) as u32
}
