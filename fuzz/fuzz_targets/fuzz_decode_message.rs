#![no_main]

use bytes::{Buf, BytesMut};
use libfuzzer_sys::fuzz_target;
use pgready::protocol::decode::decode_message;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Several messages may share one TCP segment
    while let Ok(Some((_, consumed))) = decode_message(&buf) {
        assert!(consumed >= 5 && consumed <= buf.len());
        buf.advance(consumed);
    }
});
