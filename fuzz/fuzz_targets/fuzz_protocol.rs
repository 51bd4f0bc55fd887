#![no_main]

//! Fuzz target for request decoding.
//!
//! # Goal
//! Verify that decoding arbitrary client bytes:
//! - Never panics, whatever the header byte says
//! - Never consumes more bytes than were received
//! - Agrees with the streaming reader when the input arrives in chunks

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use stackserver_core::protocol::{Decoded, Header, MAX_REQUEST_LEN, decode, read_request};

#[derive(Arbitrary, Debug)]
struct FuzzProtocolInput {
    /// Bytes as the client sent them
    raw: Vec<u8>,
    /// Split points for chunked delivery
    splits: Vec<u8>,
}

fuzz_target!(|input: FuzzProtocolInput| {
    let raw = &input.raw[..input.raw.len().min(MAX_REQUEST_LEN * 2)];

    let decoded = decode(raw);
    if let Decoded::Complete { consumed, .. } = &decoded {
        assert!(*consumed <= raw.len());
        assert_eq!(*consumed, Header::new(raw[0]).request_len());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let streamed = runtime.block_on(async {
        let (mut client, mut server) = tokio::io::duplex(MAX_REQUEST_LEN * 2);
        let mut offset = 0;
        for split in &input.splits {
            let end = (offset + usize::from(*split)).min(raw.len());
            tokio::io::AsyncWriteExt::write_all(&mut client, &raw[offset..end])
                .await
                .expect("write");
            offset = end;
        }
        tokio::io::AsyncWriteExt::write_all(&mut client, &raw[offset..])
            .await
            .expect("write");
        drop(client);
        read_request(&mut server).await
    });

    match (decoded, streamed) {
        (Decoded::Complete { request, .. }, Ok(streamed)) => assert_eq!(request, streamed),
        (Decoded::Incomplete { .. }, Err(_)) => {}
        (decoded, streamed) => panic!("decode {decoded:?} disagrees with reader {streamed:?}"),
    }
});
