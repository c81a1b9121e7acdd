// Copyright 2021 Adam Greig
// Licensed under the MIT license.

use log::{debug, trace};

use super::{Host, JamError, State};
use crate::heap::{bit, set_bit};

/// Longest path between any two TAP states.
const MAX_PATH_STEPS: usize = 9;

/// JTAG TAP controller model.
///
/// Tracks the current TAP state, the stop states used after IR and DR scans,
/// and the padding bits shifted before and after scan data, and converts
/// state changes and scans into single clocks on a [`Host`].
#[derive(Clone, Debug)]
pub struct Tap {
    /// Current state, or None until the first state change forces a reset.
    state: Option<State>,
    drstop: State,
    irstop: State,
    dr_preamble: u32,
    dr_postamble: u32,
    ir_preamble: u32,
    ir_postamble: u32,
}

impl Default for Tap {
    fn default() -> Self {
        Tap {
            state: None,
            drstop: State::IDLE,
            irstop: State::IDLE,
            dr_preamble: 0,
            dr_postamble: 0,
            ir_preamble: 0,
            ir_postamble: 0,
        }
    }
}

impl Tap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current TAP state, if known.
    pub fn state(&self) -> Option<State> {
        self.state
    }

    /// State entered after each DR scan.
    pub fn set_drstop(&mut self, state: State) {
        self.drstop = state;
    }

    /// State entered after each IR scan.
    pub fn set_irstop(&mut self, state: State) {
        self.irstop = state;
    }

    /// Set the number of bits shifted before and after DR and IR scan data.
    pub fn set_padding(&mut self, dr_preamble: u32, dr_postamble: u32,
                       ir_preamble: u32, ir_postamble: u32)
    {
        self.dr_preamble = dr_preamble;
        self.dr_postamble = dr_postamble;
        self.ir_preamble = ir_preamble;
        self.ir_postamble = ir_postamble;
    }

    fn clock<H: Host + ?Sized>(host: &mut H, tms: bool, tdi: bool, read_tdo: bool) -> bool {
        let tdo = host.jtag_io(tms, tdi, read_tdo);
        trace!("TCK tms={} tdi={} tdo={}", tms as u8, tdi as u8, tdo as u8);
        tdo
    }

    /// Force the TAP to RESET with five TMS=1 clocks, then move to IDLE.
    pub fn reset_idle<H: Host + ?Sized>(&mut self, host: &mut H) {
        for _ in 0..5 {
            Self::clock(host, true, false, false);
        }
        Self::clock(host, false, false, false);
        self.state = Some(State::IDLE);
    }

    /// Move the TAP to `target` along the shortest path.
    ///
    /// If the TAP is already in `target`, one extra clock is applied which
    /// keeps it there: TMS=1 for RESET and TMS=0 for the other stable states.
    pub fn goto_state<H: Host + ?Sized>(&mut self, host: &mut H, target: State)
        -> Result<(), JamError>
    {
        let mut state = match self.state {
            Some(state) => state,
            None => {
                self.reset_idle(host);
                State::IDLE
            },
        };

        if state == target {
            if target == State::RESET {
                Self::clock(host, true, false, false);
            } else if target.is_stable() {
                Self::clock(host, false, false, false);
            }
        } else {
            let mut steps = 0;
            while state != target && steps < MAX_PATH_STEPS {
                let tms = state.tms_toward(target);
                Self::clock(host, tms, false, false);
                state = state.next(tms);
                steps += 1;
            }
        }

        self.state = Some(state);
        if state == target {
            debug!("TAP now in {}", state);
            Ok(())
        } else {
            Err(JamError::InternalError)
        }
    }

    /// Shift `count` bits of `data`, starting at bit `start`, through a shift state.
    ///
    /// The scan is padded with `preamble` bits before and `postamble` bits after
    /// the data, each padding bit driving `fill`, and the last bit of the whole
    /// shift is clocked with TMS=1 to leave the shift state. When `capture` is
    /// given, TDO is stored for every data bit at `capture.1` onwards.
    #[allow(clippy::too_many_arguments)]
    fn shift<H: Host + ?Sized>(host: &mut H, count: u32, data: &[u32], start: usize,
                               preamble: u32, postamble: u32, fill: bool,
                               mut capture: Option<(&mut [u32], usize)>)
        -> Result<(), JamError>
    {
        let count = count as usize;
        let preamble = preamble as usize;
        let total = preamble + count + postamble as usize;
        if total == 0 || data.len() * 32 < start + count {
            return Err(JamError::BoundsError);
        }
        if let Some((out, out_start)) = &capture {
            if out.len() * 32 < out_start + count {
                return Err(JamError::BoundsError);
            }
        }

        for i in 0..total {
            let in_data = i >= preamble && i < preamble + count;
            let tdi = if in_data { bit(data, start + i - preamble) } else { fill };
            let tms = i == total - 1;
            let tdo = Self::clock(host, tms, tdi, capture.is_some());
            if in_data {
                if let Some((out, out_start)) = capture.as_mut() {
                    set_bit(out, *out_start + i - preamble, tdo);
                }
            }
        }
        Ok(())
    }

    /// Shift `count` bits of `data` from bit `start` into the instruction register.
    ///
    /// Padding bits are 1. Afterwards the TAP is moved to the IR stop state.
    pub fn irscan<H: Host + ?Sized>(&mut self, host: &mut H, count: u32, data: &[u32],
                                    start: usize)
        -> Result<(), JamError>
    {
        self.goto_state(host, State::IRSHIFT)?;
        Self::shift(host, count, data, start, self.ir_preamble, self.ir_postamble, true, None)?;
        self.state = Some(State::IREXIT1);
        self.goto_state(host, self.irstop)
    }

    /// Shift `count` bits of `data` from bit `start` into the data register.
    ///
    /// Padding bits are 0. Afterwards the TAP is moved to the DR stop state.
    pub fn drscan<H: Host + ?Sized>(&mut self, host: &mut H, count: u32, data: &[u32],
                                    start: usize)
        -> Result<(), JamError>
    {
        self.goto_state(host, State::DRSHIFT)?;
        Self::shift(host, count, data, start, self.dr_preamble, self.dr_postamble, false, None)?;
        self.state = Some(State::DREXIT1);
        self.goto_state(host, self.drstop)
    }

    /// Shift `count` bits of `data` into the data register while capturing
    /// the bits shifted out into `out`, starting at bit `out_start`.
    pub fn swap_dr<H: Host + ?Sized>(&mut self, host: &mut H, count: u32, data: &[u32],
                                     start: usize, out: &mut [u32], out_start: usize)
        -> Result<(), JamError>
    {
        self.goto_state(host, State::DRSHIFT)?;
        Self::shift(host, count, data, start, self.dr_preamble, self.dr_postamble, false,
                    Some((out, out_start)))?;
        self.state = Some(State::DREXIT1);
        self.goto_state(host, self.drstop)
    }

    /// Hold the TAP in `wait_state` for `cycles` clocks.
    pub fn wait_cycles<H: Host + ?Sized>(&mut self, host: &mut H, cycles: i32,
                                         wait_state: State)
        -> Result<(), JamError>
    {
        if self.state != Some(wait_state) {
            self.goto_state(host, wait_state)?;
        }
        let tms = wait_state == State::RESET;
        for _ in 0..cycles.max(0) {
            Self::clock(host, tms, false, false);
        }
        Ok(())
    }

    /// Hold the TAP in `wait_state` for at least `microseconds`.
    pub fn wait_microseconds<H: Host + ?Sized>(&mut self, host: &mut H, microseconds: i32,
                                               wait_state: State)
        -> Result<(), JamError>
    {
        if self.state != Some(wait_state) {
            self.goto_state(host, wait_state)?;
        }
        host.delay(microseconds.max(0) as u32);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockHost;
    use State::*;

    /// Tap which has already been reset into IDLE, with the reset clocks discarded.
    fn idle_tap(host: &mut MockHost) -> Tap {
        let mut tap = Tap::new();
        tap.reset_idle(host);
        host.clocks.clear();
        tap
    }

    #[test]
    fn test_first_goto_resets() {
        let mut host = MockHost::default();
        let mut tap = Tap::new();
        assert_eq!(tap.state(), None);
        tap.goto_state(&mut host, DRSHIFT).unwrap();
        assert_eq!(tap.state(), Some(DRSHIFT));
        assert_eq!(host.tms_bits(), vec![true, true, true, true, true, false,
                                         true, false, false]);
    }

    #[test]
    fn test_goto_every_pair() {
        for start in State::ALL.iter() {
            for target in State::ALL.iter() {
                let mut host = MockHost::default();
                let mut tap = idle_tap(&mut host);
                tap.goto_state(&mut host, *start).unwrap();
                host.clocks.clear();
                tap.goto_state(&mut host, *target).unwrap();
                assert_eq!(tap.state(), Some(*target));
                assert!(host.clocks.len() <= MAX_PATH_STEPS);
                if start == target {
                    let expected = if target.is_stable() { 1 } else { 0 };
                    assert_eq!(host.clocks.len(), expected, "{:?}", target);
                }
            }
        }
    }

    #[test]
    fn test_goto_same_state() {
        let mut host = MockHost::default();
        let mut tap = idle_tap(&mut host);
        tap.goto_state(&mut host, IDLE).unwrap();
        assert_eq!(host.clocks, vec![(false, false)]);
        tap.goto_state(&mut host, RESET).unwrap();
        host.clocks.clear();
        tap.goto_state(&mut host, RESET).unwrap();
        assert_eq!(host.clocks, vec![(true, false)]);
    }

    #[test]
    fn test_irscan_padding() {
        let mut host = MockHost::default();
        let mut tap = idle_tap(&mut host);
        tap.set_padding(0, 0, 2, 1);
        // Data 0b0110, 4 bits.
        tap.irscan(&mut host, 4, &[0b0110], 0).unwrap();
        assert_eq!(tap.state(), Some(IDLE));
        // IDLE -> IRSHIFT takes 4 clocks, then 7 shift clocks, then IREXIT1 -> IDLE.
        let shift = &host.clocks[4..11];
        assert_eq!(shift, &[(false, true), (false, true),
                            (false, false), (false, true), (false, true), (false, false),
                            (true, true)]);
        assert_eq!(host.tms_bits()[11..].to_vec(), vec![true, false]);
    }

    #[test]
    fn test_drscan_start_index() {
        let mut host = MockHost::default();
        let mut tap = idle_tap(&mut host);
        tap.set_drstop(DRPAUSE);
        tap.drscan(&mut host, 3, &[0b1011_0000], 4).unwrap();
        assert_eq!(tap.state(), Some(DRPAUSE));
        // IDLE -> DRSHIFT is 3 clocks.
        assert_eq!(&host.clocks[3..6], &[(false, true), (false, true), (true, false)]);
        // DREXIT1 -> DRPAUSE is one clock.
        assert_eq!(host.clocks.len(), 7);
    }

    #[test]
    fn test_swap_dr() {
        let mut host = MockHost::default();
        let mut tap = idle_tap(&mut host);
        tap.set_padding(1, 0, 0, 0);
        // One preamble clock plus four data clocks read TDO.
        host.tdo.extend([true, true, false, true, true].iter());
        let mut out = [0u32; 1];
        tap.swap_dr(&mut host, 4, &[0b0101], 0, &mut out, 0).unwrap();
        assert_eq!(out[0], 0b1101);
        assert_eq!(&host.clocks[3..8], &[(false, false), (false, true), (false, false),
                                        (false, true), (true, false)]);
    }

    #[test]
    fn test_scan_bounds() {
        let mut host = MockHost::default();
        let mut tap = idle_tap(&mut host);
        assert_eq!(tap.drscan(&mut host, 40, &[0], 0), Err(JamError::BoundsError));
    }

    #[test]
    fn test_wait() {
        let mut host = MockHost::default();
        let mut tap = idle_tap(&mut host);
        tap.wait_cycles(&mut host, 3, IDLE).unwrap();
        assert_eq!(host.clocks, vec![(false, false); 3]);
        host.clocks.clear();
        tap.wait_cycles(&mut host, 2, RESET).unwrap();
        // IDLE -> RESET is 3 clocks, then 2 held clocks with TMS=1.
        assert_eq!(host.tms_bits(), vec![true; 5]);
        tap.wait_microseconds(&mut host, 250, RESET).unwrap();
        assert_eq!(host.delays, vec![250]);
    }
}
