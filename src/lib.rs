// Copyright 2021 Adam Greig
// Licensed under the MIT license.

#![allow(clippy::upper_case_acronyms)]

//! # jam
//!
//! Interpreter for the JAM language, used to program devices over JTAG.
//!
//! A JAM program is read statement by statement from a [`Source`], and drives
//! hardware through a [`Host`] which provides single JTAG clocks, message and
//! export reporting, and real-time delays. Use [`execute`] to run a program
//! once, or build an [`Interpreter`] to inspect its variables afterwards.
//!
//! ```no_run
//! # struct Cable;
//! # impl jam::Host for Cable {
//! #     fn jtag_io(&mut self, _: bool, _: bool, _: bool) -> bool { false }
//! #     fn message(&mut self, text: &str) { println!("{}", text) }
//! #     fn export(&mut self, _: &str, _: i32) {}
//! #     fn delay(&mut self, _: u32) {}
//! # }
//! let program = b"PRINT \"hello\"; EXIT 0;";
//! let code = jam::execute(jam::MemorySource::new(program), Cable, jam::Config::default());
//! assert_eq!(code.unwrap(), 0);
//! ```
//!
//! [`notes`] and [`check_crc`] read the NOTE fields and verify the CRC
//! statement of a program without executing it.

mod display;
mod error;
mod expr;
mod heap;
mod host;
mod interp;
mod notes;
mod parser;
mod reader;
mod stack;
mod symbol;
mod tap;

pub use error::{ErrLoc, ExecError, JamError};
pub use expr::{ExprType, Value};
pub use heap::{ArrayHandle, Heap};
pub use host::Host;
pub use interp::{execute, Config, Interpreter};
pub use notes::{check_crc, notes, Crc, Note};
pub use reader::{IoSource, MemorySource, Source};
pub use symbol::{Symbol, SymbolId, SymbolKind, SymbolTable, SymbolValue};
pub use tap::Tap;

/// IEEE 1149.1 TAP states with JAM state names.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Test-Logic-Reset
    RESET,

    /// Run-Test/Idle
    IDLE,

    /// Select-DR-Scan
    DRSELECT,

    /// Capture-DR
    DRCAPTURE,

    /// Shift-DR
    DRSHIFT,

    /// Exit1-DR
    DREXIT1,

    /// Pause-DR
    DRPAUSE,

    /// Exit2-DR
    DREXIT2,

    /// Update-DR
    DRUPDATE,

    /// Select-IR-Scan
    IRSELECT,

    /// Capture-IR
    IRCAPTURE,

    /// Shift-IR
    IRSHIFT,

    /// Exit1-IR
    IREXIT1,

    /// Pause-IR
    IRPAUSE,

    /// Exit2-IR
    IREXIT2,

    /// Update-IR
    IRUPDATE,
}

impl State {
    /// All states, in the order used to index the path map.
    pub const ALL: [State; 16] = [
        State::RESET, State::IDLE,
        State::DRSELECT, State::DRCAPTURE, State::DRSHIFT, State::DREXIT1,
        State::DRPAUSE, State::DREXIT2, State::DRUPDATE,
        State::IRSELECT, State::IRCAPTURE, State::IRSHIFT, State::IREXIT1,
        State::IRPAUSE, State::IREXIT2, State::IRUPDATE,
    ];

    /// For each state, bit `i` is set if TMS must be high to move towards state `i`.
    const PATH_MAP: [u16; 16] = [
        0x0001, 0xFFFD, 0xFE01, 0xFFE7, 0xFFEF, 0xFF0F, 0xFFBF, 0xFF0F,
        0xFEFD, 0x0001, 0xF3FF, 0xF7FF, 0x87FF, 0xDFFF, 0x87FF, 0x7FFD,
    ];

    /// Check if the TAP can remain in this state indefinitely,
    /// which is true for RESET, IDLE, and the shift and pause states.
    pub fn is_stable(&self) -> bool {
        matches!(self, State::RESET | State::IDLE | State::DRSHIFT | State::DRPAUSE
                       | State::IRSHIFT | State::IRPAUSE)
    }

    /// Return the state reached from `self` after one clock with the given TMS level.
    pub fn next(&self, tms: bool) -> State {
        use State::*;
        match (self, tms) {
            (RESET, true)      => RESET,
            (RESET, false)     => IDLE,
            (IDLE, true)       => DRSELECT,
            (IDLE, false)      => IDLE,
            (DRSELECT, true)   => IRSELECT,
            (DRSELECT, false)  => DRCAPTURE,
            (DRCAPTURE, true)  => DREXIT1,
            (DRCAPTURE, false) => DRSHIFT,
            (DRSHIFT, true)    => DREXIT1,
            (DRSHIFT, false)   => DRSHIFT,
            (DREXIT1, true)    => DRUPDATE,
            (DREXIT1, false)   => DRPAUSE,
            (DRPAUSE, true)    => DREXIT2,
            (DRPAUSE, false)   => DRPAUSE,
            (DREXIT2, true)    => DRUPDATE,
            (DREXIT2, false)   => DRSHIFT,
            (DRUPDATE, true)   => DRSELECT,
            (DRUPDATE, false)  => IDLE,
            (IRSELECT, true)   => RESET,
            (IRSELECT, false)  => IRCAPTURE,
            (IRCAPTURE, true)  => IREXIT1,
            (IRCAPTURE, false) => IRSHIFT,
            (IRSHIFT, true)    => IREXIT1,
            (IRSHIFT, false)   => IRSHIFT,
            (IREXIT1, true)    => IRUPDATE,
            (IREXIT1, false)   => IRPAUSE,
            (IRPAUSE, true)    => IREXIT2,
            (IRPAUSE, false)   => IRPAUSE,
            (IREXIT2, true)    => IRUPDATE,
            (IREXIT2, false)   => IRSHIFT,
            (IRUPDATE, true)   => DRSELECT,
            (IRUPDATE, false)  => IDLE,
        }
    }

    /// Return the TMS level for the next clock on the shortest path from `self` to `target`.
    pub fn tms_toward(&self, target: State) -> bool {
        Self::PATH_MAP[*self as usize] & (1 << target as usize) != 0
    }

    /// Look up a state by its JAM name, which must already be upper case.
    pub fn from_name(name: &str) -> Option<State> {
        State::ALL.iter().copied().find(|s| s.name() == name)
    }

    /// JAM name of this state.
    pub fn name(&self) -> &'static str {
        use State::*;
        match self {
            RESET     => "RESET",
            IDLE      => "IDLE",
            DRSELECT  => "DRSELECT",
            DRCAPTURE => "DRCAPTURE",
            DRSHIFT   => "DRSHIFT",
            DREXIT1   => "DREXIT1",
            DRPAUSE   => "DRPAUSE",
            DREXIT2   => "DREXIT2",
            DRUPDATE  => "DRUPDATE",
            IRSELECT  => "IRSELECT",
            IRCAPTURE => "IRCAPTURE",
            IRSHIFT   => "IRSHIFT",
            IREXIT1   => "IREXIT1",
            IRPAUSE   => "IRPAUSE",
            IREXIT2   => "IREXIT2",
            IRUPDATE  => "IRUPDATE",
        }
    }
}
