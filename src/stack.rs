// Copyright 2021 Adam Greig
// Licensed under the MIT license.

use log::debug;

use super::{JamError, SymbolId};

/// Maximum number of records on the stack.
pub const DEPTH: usize = 16;

/// Bytes charged against the workspace for each stack record.
pub const RECORD_BYTES: usize = 20;

/// Control record saved by CALL, FOR, and PUSH.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StackRecord {
    /// Saved by CALL; RETURN resumes at `return_position`.
    Call { return_position: usize },

    /// Saved by FOR; NEXT jumps back to `jump` until the iterator passes `stop`.
    ForNext { iterator: SymbolId, jump: usize, stop: i32, step: i32 },

    /// Saved by PUSH, consumed by POP.
    Push { value: i32 },
}

/// Bounded LIFO of control records.
#[derive(Clone, Debug, Default)]
pub struct Stack {
    records: Vec<StackRecord>,
}

impl Stack {
    pub fn new() -> Self {
        Stack { records: Vec::with_capacity(DEPTH) }
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// Push a record, failing with `OutOfMemory` once the stack is full.
    pub fn push(&mut self, record: StackRecord) -> Result<(), JamError> {
        if self.records.len() >= DEPTH {
            return Err(JamError::OutOfMemory);
        }
        debug!("Push {:?}, depth {}", record, self.records.len() + 1);
        self.records.push(record);
        Ok(())
    }

    /// Most recently pushed record.
    pub fn peek(&self) -> Option<&StackRecord> {
        self.records.last()
    }

    /// Remove and return the most recently pushed record.
    pub fn pop(&mut self) -> Option<StackRecord> {
        let record = self.records.pop();
        debug!("Pop {:?}, depth {}", record, self.records.len());
        record
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
