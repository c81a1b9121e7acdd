// Copyright 2021 Adam Greig
// Licensed under the MIT license.

/// Hardware and reporting services used by a running JAM program.
///
/// Only `jtag_io`, `message`, `export`, and `delay` are required; hosts without
/// a parallel vector interface can rely on the default `vector_map` and
/// `vector_io`, which report that no signals are available.
pub trait Host {
    /// Apply one TCK cycle with the given TMS and TDI levels.
    ///
    /// Returns the TDO level when `read_tdo` is set; otherwise the return value is ignored.
    fn jtag_io(&mut self, tms: bool, tdi: bool, read_tdo: bool) -> bool;

    /// Deliver the text produced by a PRINT statement.
    fn message(&mut self, text: &str);

    /// Deliver a key/value pair produced by an EXPORT statement.
    fn export(&mut self, key: &str, value: i32);

    /// Wait for at least the given number of microseconds.
    fn delay(&mut self, microseconds: u32);

    /// Map the named signals to vector positions, returning how many were mapped.
    fn vector_map(&mut self, signals: &[String]) -> usize {
        let _ = signals;
        0
    }

    /// Drive `count` mapped signals with the given direction and data bits,
    /// packed least-significant-bit first into 32-bit words.
    ///
    /// Returns the number of signals driven.
    fn vector_io(&mut self, count: usize, dir: &[u32], data: &[u32],
                 capture: Option<&mut [u32]>) -> usize
    {
        let _ = (count, dir, data, capture);
        0
    }
}

impl<H: Host + ?Sized> Host for &mut H {
    fn jtag_io(&mut self, tms: bool, tdi: bool, read_tdo: bool) -> bool {
        (**self).jtag_io(tms, tdi, read_tdo)
    }
    fn message(&mut self, text: &str) {
        (**self).message(text)
    }
    fn export(&mut self, key: &str, value: i32) {
        (**self).export(key, value)
    }
    fn delay(&mut self, microseconds: u32) {
        (**self).delay(microseconds)
    }
    fn vector_map(&mut self, signals: &[String]) -> usize {
        (**self).vector_map(signals)
    }
    fn vector_io(&mut self, count: usize, dir: &[u32], data: &[u32],
                 capture: Option<&mut [u32]>) -> usize
    {
        (**self).vector_io(count, dir, data, capture)
    }
}

/// Host used by unit tests, which records every interaction.
#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub(crate) struct MockHost {
    /// Every (TMS, TDI) pair clocked.
    pub clocks: Vec<(bool, bool)>,
    /// TDO levels returned to clocks which read TDO, in order; false once empty.
    pub tdo: std::collections::VecDeque<bool>,
    pub messages: Vec<String>,
    pub exports: Vec<(String, i32)>,
    pub delays: Vec<u32>,
    /// Number of signals `vector_map` accepts.
    pub vector_signals: usize,
    pub vectors: Vec<(usize, Vec<u32>, Vec<u32>)>,
}

#[cfg(test)]
impl MockHost {
    pub fn tdi_bits(&self) -> Vec<bool> {
        self.clocks.iter().map(|(_, tdi)| *tdi).collect()
    }

    pub fn tms_bits(&self) -> Vec<bool> {
        self.clocks.iter().map(|(tms, _)| *tms).collect()
    }
}

#[cfg(test)]
impl Host for MockHost {
    fn jtag_io(&mut self, tms: bool, tdi: bool, read_tdo: bool) -> bool {
        self.clocks.push((tms, tdi));
        if read_tdo {
            self.tdo.pop_front().unwrap_or(false)
        } else {
            false
        }
    }

    fn message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }

    fn export(&mut self, key: &str, value: i32) {
        self.exports.push((key.to_string(), value));
    }

    fn delay(&mut self, microseconds: u32) {
        self.delays.push(microseconds);
    }

    fn vector_map(&mut self, signals: &[String]) -> usize {
        signals.len().min(self.vector_signals)
    }

    fn vector_io(&mut self, count: usize, dir: &[u32], data: &[u32],
                 _capture: Option<&mut [u32]>) -> usize
    {
        self.vectors.push((count, dir.to_vec(), data.to_vec()));
        count
    }
}
