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

//! Client price table behavior: receipt, overlap resolution, eviction,
//! truncation handoff and the wake-up timer.

#[macro_use]
mod common;

use core::time::Duration;

use rs_price::client::{PriceClient, END_TIME_NEVER};
use rs_price::proto::{
    CppAuth, PriceControl, PublishCppEvent, Response, Status, PRICE_DURATION_UNTIL_CHANGED,
};

use common::{init_env_logger, price, ClientRecorder, RecordingSink, RecordingTimer};

const EP: u8 = 1;

#[test]
fn start_now_price_activates_and_acknowledges() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ClientRecorder::new();
    let mut client: PriceClient = PriceClient::new([EP], epoch, &timer, &sink, &hooks);

    let mut cmd = price(1, 0, PRICE_DURATION_UNTIL_CHANGED);
    cmd.price_control = PriceControl::ACK_REQUIRED;

    assert_eq!(client.publish_price(EP, &cmd), Status::Success);

    let entry = client.price_by_event_id(EP, 1).unwrap();
    assert!(entry.active);
    assert_eq!(entry.start_time, 1000);
    assert_eq!(entry.end_time, END_TIME_NEVER);
    assert!(entry.price.price_control.contains(PriceControl::STARTED_NOW));

    assert_eq!(*hooks.started.borrow(), vec![1]);

    match sink.last() {
        Some(Response::PriceAcknowledgement(ack)) => {
            assert_eq!(ack.issuer_event_id, 1);
            assert_eq!(ack.price_ack_time, 1000);
        }
        other => panic!("expected an acknowledgement, got {:?}", other),
    }

    // An until-changed price leaves nothing to wake up for.
    assert_eq!(timer.armed_for(EP), None);
}

#[test]
fn duplicate_event_id_is_rejected_without_changes() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ClientRecorder::new();
    let mut client: PriceClient = PriceClient::new([EP], epoch, &timer, &sink, &hooks);

    let cmd = price(7, 2000, 10);
    assert_eq!(client.publish_price(EP, &cmd), Status::Success);
    let before = client.price_by_event_id(EP, 7).unwrap().clone();

    let again = price(7, 3000, 20);
    assert_eq!(client.publish_price(EP, &again), Status::DuplicateExists);
    assert_eq!(sink.last(), Some(Response::Default(Status::DuplicateExists)));

    assert_eq!(client.price_by_event_id(EP, 7), Some(&before));
}

#[test]
fn wakeup_timer_is_armed_for_the_nearest_transition() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ClientRecorder::new();
    let mut client: PriceClient = PriceClient::new([EP], epoch, &timer, &sink, &hooks);

    assert_eq!(client.publish_price(EP, &price(1, 1100, 10)), Status::Success);
    assert_eq!(sink.last(), Some(Response::Default(Status::Success)));

    assert_eq!(timer.armed_for(EP), Some(Duration::from_secs(100)));

    // The timer fires: the price activates and the next wake-up is its end.
    set(1100);
    client.tick(EP);
    assert_eq!(*hooks.started.borrow(), vec![1]);
    assert_eq!(timer.armed_for(EP), Some(Duration::from_secs(600)));

    set(1700);
    client.tick(EP);
    assert_eq!(*hooks.expired.borrow(), vec![1]);
    assert_eq!(timer.armed_for(EP), None);
    assert!(client.price_by_event_id(EP, 1).is_none());
}

#[test]
fn newer_price_truncates_the_active_one() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ClientRecorder::new();
    let mut client: PriceClient = PriceClient::new([EP], epoch, &timer, &sink, &hooks);

    client.publish_price(EP, &price(1, 0, PRICE_DURATION_UNTIL_CHANGED));
    assert!(client.price_by_event_id(EP, 1).unwrap().active);

    assert_eq!(client.publish_price(EP, &price(2, 2000, 10)), Status::Success);

    // Graceful handoff: the active price now ends where the new one starts.
    let old = client.price_by_event_id(EP, 1).unwrap();
    assert!(old.active);
    assert_eq!(old.end_time, 2000);

    assert_eq!(timer.armed_for(EP), Some(Duration::from_secs(1000)));

    set(2000);
    client.tick(EP);
    assert_eq!(*hooks.expired.borrow(), vec![1]);
    assert_eq!(*hooks.started.borrow(), vec![1, 2]);
    assert!(client.price_by_event_id(EP, 2).unwrap().active);
}

#[test]
fn overlapping_older_event_wins_over_the_incoming_one() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ClientRecorder::new();
    let mut client: PriceClient = PriceClient::new([EP], epoch, &timer, &sink, &hooks);

    client.publish_price(EP, &price(10, 2000, 10));

    // Id 3 overlaps the window of the newer id 10.
    assert_eq!(client.publish_price(EP, &price(3, 2300, 10)), Status::Failure);
    assert!(client.price_by_event_id(EP, 3).is_none());
    assert!(client.price_by_event_id(EP, 10).is_some());
}

#[test]
fn full_table_evicts_the_latest_start_unless_the_incoming_is_later() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(500);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ClientRecorder::new();
    let mut client: PriceClient = PriceClient::new([EP], epoch, &timer, &sink, &hooks);

    for i in 1..=5u32 {
        let cmd = price(i, 1000 * i, 10);
        assert_eq!(client.publish_price(EP, &cmd), Status::Success);
    }

    // A sixth price starting before every table entry evicts the
    // latest-starting one.
    assert_eq!(client.publish_price(EP, &price(6, 600, 5)), Status::Success);
    assert!(client.price_by_event_id(EP, 5).is_none());
    assert!(client.price_by_event_id(EP, 6).is_some());

    // A price starting after every table entry has nothing to displace.
    assert_eq!(
        client.publish_price(EP, &price(7, 6000, 10)),
        Status::InsufficientSpace
    );
    assert!(client.price_by_event_id(EP, 7).is_none());
    assert!(client.price_by_event_id(EP, 6).is_some());
}

#[test]
fn until_changed_price_supersedes_a_full_schedule() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ClientRecorder::new();
    let mut client: PriceClient = PriceClient::new([EP], epoch, &timer, &sink, &hooks);

    // Fill the table with five consecutive 10-minute prices; the first one
    // starts now and activates.
    assert_eq!(client.publish_price(EP, &price(1, 0, 10)), Status::Success);
    for i in 2..=5u32 {
        let cmd = price(i, 1000 + 600 * (i - 1), 10);
        assert_eq!(client.publish_price(EP, &cmd), Status::Success);
    }
    assert_eq!(*hooks.started.borrow(), vec![1]);

    // A sixth, newer until-changed price starting now overlaps all five: the
    // active one expires, the scheduled ones vanish, and it takes over.
    let cmd = price(6, 0, PRICE_DURATION_UNTIL_CHANGED);
    assert_eq!(client.publish_price(EP, &cmd), Status::Success);

    for i in 1..=5u32 {
        assert!(client.price_by_event_id(EP, i).is_none());
    }
    assert_eq!(*hooks.expired.borrow(), vec![1]);
    assert_eq!(*hooks.started.borrow(), vec![1, 6]);

    let entry = client.price_by_event_id(EP, 6).unwrap();
    assert!(entry.active);
    assert_eq!(entry.end_time, END_TIME_NEVER);

    // Nothing left to wake up for.
    assert_eq!(timer.armed_for(EP), None);
}

#[test]
fn cpp_event_is_authorized_and_answered() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ClientRecorder::new();
    let mut client: PriceClient = PriceClient::new([EP], epoch, &timer, &sink, &hooks);

    let cmd = PublishCppEvent {
        provider_id: 1,
        issuer_event_id: 42,
        start_time: 0,
        duration_in_minutes: 30,
        tariff_type: 0,
        cpp_price_tier: 1,
        cpp_auth: CppAuth::Pending,
    };

    assert_eq!(client.publish_cpp_event(EP, &cmd), Status::Success);

    // The default authorization accepts.
    match sink.last() {
        Some(Response::CppEventResponse(resp)) => {
            assert_eq!(resp.issuer_event_id, 42);
            assert_eq!(resp.cpp_auth, CppAuth::Accepted);
        }
        other => panic!("expected a CPP event response, got {:?}", other),
    }

    let (event, auth) = client.cpp_event(EP).unwrap();
    assert_eq!(event.start_time, 1000);
    assert_eq!(*auth, CppAuth::Accepted);
}

#[test]
fn init_resets_the_table() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ClientRecorder::new();
    let mut client: PriceClient = PriceClient::new([EP], epoch, &timer, &sink, &hooks);

    client.publish_price(EP, &price(1, 2000, 10));
    assert!(client.price_by_event_id(EP, 1).is_some());

    client.init(EP);
    assert!(client.price_by_event_id(EP, 1).is_none());

    client.init(EP);
    assert!(client.price_entry(EP, 0).is_none());
}
