use jam::{check_crc, execute, notes, Config, Host, MemorySource};
use std::env;
use std::fs;

/// Host with no JTAG cable attached, which prints what the program reports.
struct PrintHost {
    clocks: usize,
}

impl Host for PrintHost {
    fn jtag_io(&mut self, _tms: bool, _tdi: bool, _read_tdo: bool) -> bool {
        self.clocks += 1;
        false
    }

    fn message(&mut self, text: &str) {
        println!("{}", text);
    }

    fn export(&mut self, key: &str, value: i32) {
        println!("Export: {} = {}", key, value);
    }

    fn delay(&mut self, _microseconds: u32) {}
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let filename = &args[1];
    let mut config = Config::default();
    for arg in args[2..].iter() {
        if let Some(define) = arg.strip_prefix("-d") {
            config = config.define(define);
        }
    }

    let contents = fs::read(filename).unwrap();
    for note in notes(&mut MemorySource::new(&contents)).unwrap_or_default() {
        println!("NOTE {}: {}", note.key, note.value);
    }

    let crc = check_crc(&mut MemorySource::new(&contents)).unwrap();
    match crc.expected {
        Some(expected) if expected == crc.actual => println!("CRC {:04X} OK", expected),
        Some(expected) => println!("CRC mismatch: file has {:04X}, computed {:04X}",
                                   expected, crc.actual),
        None => println!("No CRC statement, computed {:04X}", crc.actual),
    }

    let mut host = PrintHost { clocks: 0 };
    match execute(MemorySource::new(&contents), &mut host, config) {
        Ok(code) => println!("Exit code {} after {} clocks", code, host.clocks),
        Err(e) => panic!("Error executing: {}", e),
    }
}
