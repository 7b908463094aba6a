//! Fuzz target: `ZoneTable::decode`
//!
//! The zone table arrives from the web client and from whatever is on
//! the card.  Decoding must never panic, and anything it accepts must
//! survive a trip back through the client document form.
//!
//! cargo fuzz run fuzz_zone_table

#![no_main]

use libfuzzer_sys::fuzz_target;
use wellmon::zones::ZoneTable;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(table) = ZoneTable::decode(text) else {
        return;
    };

    let docs: Vec<_> = table.iter().map(|z| z.document()).collect();
    let json = serde_json::to_string(&docs).expect("documents serialise");
    let again = ZoneTable::decode(&json).expect("re-encoded table decodes");
    assert_eq!(again, table);
});
