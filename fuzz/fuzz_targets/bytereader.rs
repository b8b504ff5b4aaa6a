#![no_main]

use bytestream::ByteReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = ByteReader::new(data);
    let mut idx = 0usize;

    // Input bytes pick the next read; the reader consumes the same input.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 7;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_u8();
            }
            1 => {
                let _ = reader.read_varu64();
            }
            2 => {
                let _ = reader.read_vars64();
            }
            3 => {
                let _ = reader.read_number();
            }
            4 => {
                let _ = reader.read_string_limited(256);
            }
            5 => {
                let _ = reader.read_cstring();
            }
            _ => {
                let _ = reader.read_f64();
            }
        }
    }
});
