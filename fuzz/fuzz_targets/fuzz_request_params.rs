//! Fuzz target: request query parsing and filename sanitising
//!
//! Any URI must split without panicking, and a sanitised filename must
//! never climb out of the card root.
//!
//! cargo fuzz run fuzz_request_params

#![no_main]

use libfuzzer_sys::fuzz_target;
use wellmon::api::{sanitize_filename, ApiRequest, Method};

fuzz_target!(|data: &[u8]| {
    let Ok(uri) = core::str::from_utf8(data) else {
        return;
    };
    let req = ApiRequest::new(Method::Get, uri, b"");
    if let Some(name) = req.param("filename") {
        if let Ok(path) = sanitize_filename(&name) {
            assert!(path.starts_with('/'));
            assert!(!path.contains(".."));
        }
    }
});
