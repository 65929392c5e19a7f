#![no_main]

use docgraph::storage::{read_main, write_main, Catalog};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Any input either fails cleanly or yields a graph that writes and
    // reads back to the same outline.
    let Ok(outcome) = read_main(data, Catalog::compiled()) else {
        return;
    };
    let mut bytes = Vec::new();
    write_main(&outcome.main, Catalog::compiled(), &mut bytes).unwrap();
    let again = read_main(bytes.as_slice(), Catalog::compiled()).unwrap();
    assert_eq!(again.main.outline(), outcome.main.outline());
});
