// Copyright 2021 Adam Greig
// Licensed under the MIT license.

use log::{debug, warn};

use super::{ArrayHandle, JamError};

/// Number of slots in the symbol table.
pub const TABLE_SIZE: usize = 1021;

/// Bytes charged against the workspace for each symbol table slot.
pub const RECORD_BYTES: usize = 48;

/// Longest permitted symbol name.
pub const MAX_NAME_LENGTH: usize = 32;

/// Kind of a named symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Label,
    Integer,
    Boolean,
    IntegerArrayWritable,
    IntegerArrayInitialized,
    BooleanArrayWritable,
    BooleanArrayInitialized,
}

impl SymbolKind {
    pub fn is_array(&self) -> bool {
        !matches!(self, SymbolKind::Label | SymbolKind::Integer | SymbolKind::Boolean)
    }

    pub fn is_boolean_array(&self) -> bool {
        matches!(self, SymbolKind::BooleanArrayWritable | SymbolKind::BooleanArrayInitialized)
    }

    pub fn is_integer_array(&self) -> bool {
        matches!(self, SymbolKind::IntegerArrayWritable | SymbolKind::IntegerArrayInitialized)
    }

    /// Arrays declared with an initialiser may not be assigned to.
    pub fn is_initialized(&self) -> bool {
        matches!(self, SymbolKind::IntegerArrayInitialized | SymbolKind::BooleanArrayInitialized)
    }
}

/// Value held by a symbol: a number for labels and scalars,
/// or a heap reference for arrays.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolValue {
    Scalar(i32),
    Array(ArrayHandle),
}

/// One symbol table entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub value: SymbolValue,

    /// Source position of the declaring statement, or of the labelled statement.
    pub position: usize,
}

/// Reference to a slot in a [`SymbolTable`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SymbolId(pub(crate) usize);

/// Check if `c` may appear in a symbol name.
pub fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Check that `name` is a legal symbol name.
pub fn check_name(name: &str) -> Result<(), JamError> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH || !name.chars().all(is_name_char) {
        Err(JamError::IllegalSymbol)
    } else {
        Ok(())
    }
}

fn hash(name: &str) -> usize {
    let h = name.bytes().take(MAX_NAME_LENGTH).fold(0i32, |h, c| {
        h.wrapping_shl(1).wrapping_add((c & 0x1f) as i32)
    });
    (h.wrapping_abs() as u32 as usize) % TABLE_SIZE
}

/// Fixed-size open-addressed table of every label and variable.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    slots: Vec<Option<Symbol>>,
    init_list: Vec<String>,
}

impl SymbolTable {
    /// Create an empty table.
    ///
    /// Entries of `init_list` have the form `NAME=value` and override the
    /// initial value of the first Integer or Boolean scalar declared with that name.
    pub fn new(init_list: Vec<String>) -> Self {
        SymbolTable { slots: vec![None; TABLE_SIZE], init_list }
    }

    /// Remove every symbol.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    /// Add a symbol, or reassign it if it was already declared with the same
    /// kind at the same position.
    ///
    /// Returns the symbol's slot and whether it was newly created.
    pub fn add(&mut self, kind: SymbolKind, name: &str, value: SymbolValue, position: usize)
        -> Result<(SymbolId, bool), JamError>
    {
        check_name(name)?;

        let start = hash(name);
        let mut index = start;
        loop {
            match &mut self.slots[index] {
                None => break,
                Some(sym) if sym.name == name => {
                    if sym.kind == kind && sym.position == position {
                        sym.value = value;
                        return Ok((SymbolId(index), false));
                    } else {
                        return Err(JamError::RedefinedSymbol);
                    }
                },
                Some(_) => {
                    index = (index + 1) % TABLE_SIZE;
                    if index == start {
                        return Err(JamError::OutOfMemory);
                    }
                },
            }
        }

        let value = match (kind, value) {
            (SymbolKind::Integer, _) | (SymbolKind::Boolean, _) => {
                self.init_value(name).map(SymbolValue::Scalar).unwrap_or(value)
            },
            (_, value) => value,
        };
        debug!("Adding {} symbol {} at {}", kind, name, position);
        self.slots[index] = Some(Symbol { name: name.to_string(), kind, value, position });
        Ok((SymbolId(index), true))
    }

    /// Find the value in the init list for `name`, if any.
    ///
    /// Names are compared case-insensitively, and only the first entry whose
    /// name matches is considered.
    fn init_value(&self, name: &str) -> Option<i32> {
        let entry = self.init_list.iter().find(|entry| {
            let entry_name: String = entry.chars().take_while(|c| is_name_char(*c)).collect();
            entry_name.eq_ignore_ascii_case(name)
        })?;

        let rest = entry.trim_start_matches(is_name_char).trim_start();
        let rest = match rest.strip_prefix('=') {
            Some(rest) => rest.trim_start(),
            None => {
                warn!("Ignoring init list entry {:?} with no value", entry);
                return None;
            },
        };
        let (negate, rest) = match rest.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        match digits.parse::<i32>() {
            Ok(v) if negate => Some(v.wrapping_neg()),
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring init list entry {:?} with invalid value", entry);
                None
            },
        }
    }

    /// Find the slot holding `name`.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        if check_name(name).is_err() {
            return None;
        }
        let start = hash(name);
        let mut index = start;
        loop {
            match &self.slots[index] {
                None => return None,
                Some(sym) if sym.name == name => return Some(SymbolId(index)),
                Some(_) => {
                    index = (index + 1) % TABLE_SIZE;
                    if index == start {
                        return None;
                    }
                },
            }
        }
    }

    /// Symbol stored in slot `id`.
    pub fn get(&self, id: SymbolId) -> Result<&Symbol, JamError> {
        self.slots.get(id.0).and_then(|s| s.as_ref()).ok_or(JamError::InternalError)
    }

    /// Find the symbol named `name`, failing with `UndefinedSymbol`.
    pub fn find(&self, name: &str) -> Result<&Symbol, JamError> {
        self.lookup(name).map(|id| self.get(id)).unwrap_or(Err(JamError::UndefinedSymbol))
    }

    /// Value of the symbol named `name`.
    pub fn get_value(&self, name: &str) -> Result<SymbolValue, JamError> {
        Ok(self.find(name)?.value)
    }

    /// Replace the value of the existing symbol named `name`.
    pub fn set_value(&mut self, name: &str, value: SymbolValue) -> Result<(), JamError> {
        let id = self.lookup(name).ok_or(JamError::UndefinedSymbol)?;
        match self.slots[id.0].as_mut() {
            Some(sym) => {
                sym.value = value;
                Ok(())
            },
            None => Err(JamError::InternalError),
        }
    }

    /// Iterate over every symbol in the table, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }
}
