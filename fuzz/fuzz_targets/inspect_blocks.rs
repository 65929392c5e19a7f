#![no_main]

use docgraph::storage::reader::BlockStream;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut stream) = BlockStream::open(data) else {
        return;
    };
    while let Ok(Some(_)) = stream.next_block() {}
});
