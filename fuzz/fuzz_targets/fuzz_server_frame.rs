#![no_main]

use libfuzzer_sys::fuzz_target;
use room_chat_client::protocol::{Envelope, ServerEvent};
use room_chat_client::room::{reduce, RoomEvent, RoomOptions, RoomState};

fuzz_target!(|data: &[u8]| {
    let Ok(envelope) = serde_json::from_slice::<Envelope>(data) else {
        return;
    };
    let Ok(Some(event)) = ServerEvent::from_parts(&envelope.event, envelope.data) else {
        return;
    };

    // Whatever decodes must fold without panicking and keep presence >= 1.
    let state = RoomState::new("fuzz", RoomOptions::default());
    let state = reduce(state, &RoomEvent::from(event), "1970-01-01T00:00:00Z");
    assert!(state.presence_count() >= 1);
});
