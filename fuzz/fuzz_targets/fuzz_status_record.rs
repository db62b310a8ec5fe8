#![no_main]

use game_status_client::protocol::StatusRecord;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The endpoint answers fetches with an array of records.
    let _ = serde_json::from_slice::<Vec<StatusRecord>>(data);

    // A record that decodes must encode back to the same status code.
    if let Ok(record) = serde_json::from_slice::<StatusRecord>(data) {
        let value = serde_json::to_value(&record).unwrap_or_default();
        assert_eq!(
            value.get("current_status").and_then(|v| v.as_u64()),
            Some(u64::from(record.current_status.code()))
        );
    }
});
