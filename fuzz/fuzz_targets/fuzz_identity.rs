#![no_main]

use game_status_client::Identity;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(identity) = serde_json::from_str::<Identity>(s) {
            // Request paths render the id; this must never panic.
            let _ = identity.user_id().to_string();
        }
    }
});
