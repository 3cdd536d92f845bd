#![no_main]

use libfuzzer_sys::fuzz_target;
use pixelshift::InputFile;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // Declared mime is irrelevant to decoding; the signature decides
    let file = InputFile::new("fuzz.bin", "image/png", data.to_vec());
    let _ = file.decode();
});
