#![no_main]

use libfuzzer_sys::fuzz_target;
use room_chat_client::protocol::Envelope;
use room_chat_client::{Identity, Session, SessionConfig};

// One frame per line, fed to a session that has just connected.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut session = Session::new(SessionConfig::default());
    let Ok(identity) = Identity::new("fuzz", "room") else {
        return;
    };
    if session.join_room(identity).is_err() {
        return;
    }
    session.on_connected();

    for line in text.lines() {
        if let Ok(envelope) = serde_json::from_str::<Envelope>(line) {
            session.handle_frame(&envelope.event, envelope.data);
        }
        let _ = session.send_message(line);
        session.drain_outputs().for_each(drop);
    }
    if let Some(room) = session.room() {
        assert!(room.presence_count() >= 1);
    }
});
