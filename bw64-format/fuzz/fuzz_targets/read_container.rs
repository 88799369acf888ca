#![no_main]
use bw64_fuzz::fuzz_reader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: Vec<u8>| {
    fuzz_reader(data);
});
