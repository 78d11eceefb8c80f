#![no_main]

use bytes::{Buf, BytesMut};
use libfuzzer_sys::arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use pgready::protocol::decode::decode_message;

#[derive(Debug)]
struct StreamingInput {
    data: Vec<u8>,
    split_points: Vec<u8>,
}

impl<'a> Arbitrary<'a> for StreamingInput {
    fn arbitrary(u: &mut Unstructured<'a>) -> libfuzzer_sys::arbitrary::Result<Self> {
        Ok(Self {
            data: u.arbitrary()?,
            split_points: u.arbitrary()?,
        })
    }
}

/// Decode everything available; `None` once the stream is invalid
fn drain(buf: &mut BytesMut, decoded: &mut usize) -> Option<()> {
    loop {
        match decode_message(buf) {
            Ok(Some((_, consumed))) => {
                buf.advance(consumed);
                *decoded += 1;
            }
            Ok(None) => return Some(()),
            Err(_) => return None,
        }
    }
}

fuzz_target!(|input: StreamingInput| {
    if input.data.is_empty() {
        return;
    }

    let mut splits: Vec<usize> = input
        .split_points
        .iter()
        .map(|&b| (b as usize) % (input.data.len() + 1))
        .collect();
    splits.push(0);
    splits.push(input.data.len());
    splits.sort_unstable();
    splits.dedup();

    // Chunked delivery must decode the same messages as one buffer
    let mut chunked = BytesMut::new();
    let mut chunked_count = 0;
    let mut chunked_ok = true;
    for window in splits.windows(2) {
        chunked.extend_from_slice(&input.data[window[0]..window[1]]);
        if drain(&mut chunked, &mut chunked_count).is_none() {
            chunked_ok = false;
            break;
        }
    }

    let mut whole = BytesMut::from(&input.data[..]);
    let mut whole_count = 0;
    let whole_ok = drain(&mut whole, &mut whole_count).is_some();

    assert_eq!(chunked_ok, whole_ok);
    if whole_ok {
        assert_eq!(chunked_count, whole_count);
    }
});
