#![no_main]

use libfuzzer_sys::fuzz_target;
use pgready::configure_session;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(config) = configure_session(s, false) {
        assert_eq!(config.runtime_param("timezone"), Some("UTC"));
        assert_eq!(config.runtime_param("search_path"), Some(""));
        assert!(config.max_connections >= 1);
    }
});
