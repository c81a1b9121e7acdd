// Copyright 2021 Adam Greig
// Licensed under the MIT license.

use log::{debug, warn};

use super::{ArrayHandle, ErrLoc, ExecError, Heap, Host, JamError, Source, State};
use super::{ExprType, SymbolKind, SymbolTable, SymbolValue, Tap, Value};
use crate::expr::Expr;
use crate::heap::{bit, copy_bits, set_bit};
use crate::parser::{
    hex_bits, parse_statement, ArrayArg, ArraySlice, Declaration, Initializer, PrintItem,
    ScanAction, Statement, Target, WaitItem,
};
use crate::reader::{line_of_position, StatementReader};
use crate::stack::{self, Stack, StackRecord};
use crate::symbol::{self, TABLE_SIZE};

/// Default workspace size in bytes.
pub const DEFAULT_WORKSPACE_SIZE: usize = 256 * 1024;

/// Largest magnitude accepted by EXIT.
const MAX_EXIT_CODE: i32 = 32767;

/// Largest value accepted for each PADDING argument.
const MAX_PADDING: i32 = 1000;

/// Most signals a VMAP statement may name.
const MAX_VECTOR_SIGNALS: usize = 256;

/// Interpreter settings.
#[derive(Clone, Debug)]
pub struct Config {
    workspace_size: usize,
    init_list: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config { workspace_size: DEFAULT_WORKSPACE_SIZE, init_list: Vec::new() }
    }
}

impl Config {
    /// Set the total workspace size in bytes.
    ///
    /// The symbol table and stack are charged against the workspace first,
    /// and whatever remains holds arrays.
    pub fn workspace_size(mut self, bytes: usize) -> Self {
        self.workspace_size = bytes;
        self
    }

    /// Add an initial value override of the form `NAME=value`.
    pub fn define(mut self, entry: &str) -> Self {
        self.init_list.push(entry.to_string());
        self
    }
}

/// What the driver does after a statement.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit(i32),

    /// Run this text as the next statement without reading the source.
    Then(String),
}

/// Part of a Boolean array: `length` elements from element `start`.
#[derive(Copy, Clone, Debug)]
struct Region {
    handle: ArrayHandle,
    kind: SymbolKind,
    start: usize,
    length: usize,
}

/// Runs a JAM program from a [`Source`] against a [`Host`].
///
/// The interpreter owns every piece of run state: symbols, the control
/// stack, array storage, and the TAP model. Each call to [`Interpreter::run`]
/// starts from a clean state and executes from the start of the source.
pub struct Interpreter<S: Source, H: Host> {
    source: S,
    host: H,
    config: Config,
    reader: StatementReader,
    symbols: SymbolTable,
    stack: Stack,
    heap: Heap,
    tap: Tap,
    vector_signals: usize,
}

/// Run `source` once against `host`, returning its exit code.
pub fn execute<S: Source, H: Host>(source: S, host: H, config: Config)
    -> Result<i32, ExecError>
{
    Interpreter::new(source, host, config).run()
}

impl<S: Source, H: Host> Interpreter<S, H> {
    pub fn new(source: S, host: H, config: Config) -> Self {
        let symbols = SymbolTable::new(config.init_list.clone());
        Interpreter {
            source,
            host,
            config,
            reader: StatementReader::new(),
            symbols,
            stack: Stack::new(),
            heap: Heap::new(0),
            tap: Tap::new(),
            vector_signals: 0,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Symbols left by the most recent run.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Array storage left by the most recent run.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn tap(&self) -> &Tap {
        &self.tap
    }

    /// Give back the source and host.
    pub fn into_inner(self) -> (S, H) {
        (self.source, self.host)
    }

    /// Execute the program from the start until EXIT or an error.
    ///
    /// Returns the EXIT code. Errors carry the line of the statement which
    /// failed; running off the end of the source without EXIT is `UnexpectedEnd`.
    pub fn run(&mut self) -> Result<i32, ExecError> {
        debug!("Starting execution with {} byte workspace", self.config.workspace_size);
        if let Err(error) = self.reset() {
            return Err(ExecError { error, loc: ErrLoc { line: 1 } });
        }

        loop {
            match self.step() {
                Ok(Some(code)) => {
                    debug!("Exit code {}", code);
                    return Ok(code);
                },
                Ok(None) => (),
                Err(error) => {
                    let position = self.reader.statement_position();
                    let line = line_of_position(&mut self.source, position).unwrap_or(1);
                    debug!("Stopped by {} at offset {} (line {})", error, position, line);
                    return Err(ExecError { error, loc: ErrLoc { line } });
                },
            }
        }
    }

    /// Carve the workspace and return every subsystem to its initial state.
    fn reset(&mut self) -> Result<(), JamError> {
        let fixed = TABLE_SIZE * symbol::RECORD_BYTES + stack::DEPTH * stack::RECORD_BYTES;
        let heap_bytes = self.config.workspace_size.checked_sub(fixed)
                                                  .ok_or(JamError::OutOfMemory)?;
        self.symbols = SymbolTable::new(self.config.init_list.clone());
        self.stack.reset();
        self.heap = Heap::new(heap_bytes);
        self.tap = Tap::new();
        self.vector_signals = 0;
        self.reader.rewind(&mut self.source)
    }

    /// Read and execute one statement, returning the exit code once EXIT runs.
    fn step(&mut self) -> Result<Option<i32>, JamError> {
        let raw = self.reader.read_statement(&mut self.source)?;
        let position = self.reader.statement_position();
        if let Some(label) = &raw.label {
            self.add_label(label, position)?;
        }

        let mut body = raw.body;
        loop {
            let statement = parse_statement(&body)?;
            debug!("Executing `{}` at {}", statement, position);
            match self.execute(statement)? {
                Flow::Continue => return Ok(None),
                Flow::Exit(code) => return Ok(Some(code)),
                Flow::Then(text) => body = text,
            }
        }
    }

    fn add_label(&mut self, label: &str, position: usize) -> Result<(), JamError> {
        let (_, fresh) = self.symbols.add(SymbolKind::Label, label,
                                          SymbolValue::Scalar(position as i32), position)?;
        if fresh {
            debug!("Found label {} at {}", label, position);
        }
        Ok(())
    }

    fn execute(&mut self, statement: Statement) -> Result<Flow, JamError> {
        match statement {
            Statement::Boolean(decl) => self.declare(&decl, true)?,
            Statement::Integer(decl) => self.declare(&decl, false)?,
            Statement::Call(label) => self.jump(&label, true)?,
            Statement::Goto(label) => self.jump(&label, false)?,
            Statement::Crc => return Err(JamError::SyntaxError),
            Statement::DrScan { count, data, action } => self.drscan(&count, &data, &action)?,
            Statement::IrScan { count, data } => self.irscan(&count, &data)?,
            Statement::DrStop(state) => self.tap.set_drstop(state),
            Statement::IrStop(state) => self.tap.set_irstop(state),
            Statement::Exit(code) => return self.exit(&code),
            Statement::Export { key, value } => {
                let value = self.eval(&value)?;
                self.host.export(&key, value.value);
            },
            Statement::For { iterator, start, stop, step } => {
                self.for_loop(&iterator, &start, &stop, step.as_ref())?
            },
            Statement::Next(iterator) => self.next(&iterator)?,
            Statement::If { condition, then } => {
                if self.eval(&condition)?.as_boolean()? {
                    return Ok(Flow::Then(then));
                }
            },
            Statement::Let { target, value } => {
                let value = self.eval(&value)?;
                self.assign(&target, value)?;
            },
            Statement::LetArray { target, source } => self.copy_array(&target, &source)?,
            Statement::Note | Statement::Rem => (),
            Statement::Padding(values) => self.padding(&values)?,
            Statement::Pop(target) => self.pop(&target)?,
            Statement::Print(items) => self.print(&items)?,
            Statement::Push(value) => {
                let value = self.eval(&value)?;
                self.stack.push(StackRecord::Push { value: value.value })?;
            },
            Statement::Return => self.ret()?,
            Statement::State(path) => {
                for state in path {
                    self.tap.goto_state(&mut self.host, state)?;
                }
            },
            Statement::Vector { dir, data, action } => self.vector(&dir, &data, &action)?,
            Statement::Vmap(signals) => self.vmap(&signals)?,
            Statement::Wait(items) => self.wait(&items)?,
        }
        Ok(Flow::Continue)
    }

    fn eval(&self, expr: &Expr) -> Result<Value, JamError> {
        expr.evaluate(&self.symbols, &self.heap)
    }

    fn eval_integer(&self, expr: &Expr) -> Result<i32, JamError> {
        self.eval(expr)?.as_integer()
    }

    /// Evaluate `expr` as an element value for a Boolean or Integer target.
    fn eval_as(&self, expr: &Expr, boolean: bool) -> Result<i32, JamError> {
        let value = self.eval(expr)?;
        if boolean {
            Ok(value.as_boolean()? as i32)
        } else {
            value.as_integer()
        }
    }

    fn exit(&self, code: &Expr) -> Result<Flow, JamError> {
        let code = self.eval_integer(code)?;
        if !(-MAX_EXIT_CODE..=MAX_EXIT_CODE).contains(&code) {
            return Err(JamError::IntegerOverflow);
        }
        Ok(Flow::Exit(code))
    }

    fn declare(&mut self, decl: &Declaration, boolean: bool) -> Result<(), JamError> {
        let position = self.reader.statement_position();
        match &decl.dimension {
            None => {
                let value = match &decl.init {
                    None => 0,
                    Some(Initializer::Scalar(expr)) => self.eval_as(expr, boolean)?,
                    Some(_) => return Err(JamError::SyntaxError),
                };
                let kind = if boolean { SymbolKind::Boolean } else { SymbolKind::Integer };
                self.symbols.add(kind, &decl.name, SymbolValue::Scalar(value), position)?;
                Ok(())
            },
            Some(dimension) => self.declare_array(decl, boolean, dimension, position),
        }
    }

    /// Declare an array, reusing its storage when the same declaration runs again.
    fn declare_array(&mut self, decl: &Declaration, boolean: bool, dimension: &Expr,
                     position: usize)
        -> Result<(), JamError>
    {
        let dimension = self.eval_integer(dimension)?;
        if dimension < 1 {
            return Err(JamError::BoundsError);
        }
        let dimension = dimension as u32;
        let kind = match (boolean, decl.init.is_some()) {
            (true, false) => SymbolKind::BooleanArrayWritable,
            (true, true) => SymbolKind::BooleanArrayInitialized,
            (false, false) => SymbolKind::IntegerArrayWritable,
            (false, true) => SymbolKind::IntegerArrayInitialized,
        };

        let existing = match self.symbols.lookup(&decl.name) {
            Some(id) => {
                let sym = self.symbols.get(id)?;
                match sym.value {
                    SymbolValue::Array(handle) if sym.kind == kind && sym.position == position => {
                        if self.heap.dimension(handle)? == dimension { Some(handle) } else { None }
                    },
                    _ => None,
                }
            },
            None => None,
        };
        let handle = match existing {
            Some(handle) => {
                self.heap.data_mut(handle)?.iter_mut().for_each(|w| *w = 0);
                handle
            },
            None => self.heap.allocate(boolean, dimension)?,
        };
        self.symbols.add(kind, &decl.name, SymbolValue::Array(handle), position)?;

        if let Some(Initializer::List(values)) = &decl.init {
            if let Some(slice) = self.whole_array(values, boolean) {
                return self.load_slice(handle, &slice);
            }
        }
        match &decl.init {
            None => Ok(()),
            Some(Initializer::List(values)) => {
                if values.len() > dimension as usize {
                    return Err(JamError::BoundsError);
                }
                for (index, expr) in values.iter().enumerate() {
                    let value = self.eval_as(expr, boolean)?;
                    self.heap.set_element(handle, index as i32, value)?;
                }
                Ok(())
            },
            Some(Initializer::Hex(text)) => {
                let (bits, length) = hex_bits(text);
                self.load_bits(handle, &bits, 0, length as usize)
            },
            Some(Initializer::Binary(text)) => {
                let mut bits = vec![0u32; (text.len() + 31) / 32];
                for (index, c) in text.chars().rev().enumerate() {
                    set_bit(&mut bits, index, c == '1');
                }
                self.load_bits(handle, &bits, 0, text.len())
            },
            Some(Initializer::Array(slice)) => self.load_slice(handle, slice),
            Some(Initializer::Compressed) => Err(JamError::UnsupportedFeature),
            Some(Initializer::Scalar(_)) => Err(JamError::SyntaxError),
        }
    }

    /// A Boolean array initialised from a single bare name copies that array
    /// when the name is a Boolean array.
    fn whole_array(&self, values: &[Expr], boolean: bool) -> Option<ArraySlice> {
        match values {
            [Expr::Symbol(name)] if boolean => {
                let sym = self.symbols.find(name).ok()?;
                if sym.kind.is_boolean_array() {
                    Some(ArraySlice { name: name.clone(), range: None })
                } else {
                    None
                }
            },
            _ => None,
        }
    }

    fn load_slice(&mut self, handle: ArrayHandle, slice: &ArraySlice) -> Result<(), JamError> {
        let region = self.resolve_slice(slice)?;
        let bits = self.heap.data(region.handle)?.to_vec();
        self.load_bits(handle, &bits, region.start, region.length)
    }

    /// Copy up to `length` bits from `bits` into the start of a Boolean array,
    /// stopping at the end of the array.
    fn load_bits(&mut self, handle: ArrayHandle, bits: &[u32], start: usize, length: usize)
        -> Result<(), JamError>
    {
        let count = length.min(self.heap.dimension(handle)? as usize);
        copy_bits(bits, start, self.heap.data_mut(handle)?, 0, count);
        Ok(())
    }

    /// Find the Boolean array named by `slice` and check its range.
    fn resolve_slice(&self, slice: &ArraySlice) -> Result<Region, JamError> {
        let sym = self.symbols.find(&slice.name)?;
        let handle = match sym.value {
            SymbolValue::Array(handle) if sym.kind.is_boolean_array() => handle,
            _ => return Err(JamError::TypeMismatch),
        };
        let kind = sym.kind;
        let dimension = self.heap.dimension(handle)? as usize;
        match &slice.range {
            None => Ok(Region { handle, kind, start: 0, length: dimension }),
            Some((a, b)) => {
                let a = self.eval_integer(a)?;
                let b = self.eval_integer(b)?;
                if a < 0 || b < a || b as usize >= dimension {
                    return Err(JamError::BoundsError);
                }
                Ok(Region { handle, kind, start: a as usize, length: (b - a + 1) as usize })
            },
        }
    }

    /// Words and start bit of scan data for `count` bits.
    ///
    /// Literals shorter than `count` are zero-extended unless `exact` is set.
    /// Named ranges must hold `count` bits from their start, and with `exact`
    /// must be exactly `count` bits long.
    fn scan_data(&self, arg: &ArrayArg, count: usize, exact: bool)
        -> Result<(Vec<u32>, usize), JamError>
    {
        match arg {
            ArrayArg::Literal { bits, length } => {
                if exact && (*length as usize) < count {
                    return Err(JamError::BoundsError);
                }
                let mut words = bits.clone();
                let needed = (count + 31) / 32;
                if words.len() < needed {
                    words.resize(needed, 0);
                }
                Ok((words, 0))
            },
            ArrayArg::Slice(slice) => {
                let region = self.resolve_slice(slice)?;
                let dimension = self.heap.dimension(region.handle)? as usize;
                if region.start + count > dimension || (exact && region.length != count) {
                    return Err(JamError::BoundsError);
                }
                Ok((self.heap.data(region.handle)?.to_vec(), region.start))
            },
        }
    }

    fn scan_count(&self, count: &Expr) -> Result<usize, JamError> {
        let count = self.eval_integer(count)?;
        if count < 0 {
            return Err(JamError::BoundsError);
        }
        Ok(count as usize)
    }

    fn irscan(&mut self, count: &Expr, data: &ArrayArg) -> Result<(), JamError> {
        let count = self.scan_count(count)?;
        let (data, start) = self.scan_data(data, count, true)?;
        self.tap.irscan(&mut self.host, count as u32, &data, start)
    }

    fn drscan(&mut self, count: &Expr, data: &ArrayArg, action: &Option<ScanAction>)
        -> Result<(), JamError>
    {
        let count = self.scan_count(count)?;
        let (data, start) = self.scan_data(data, count, false)?;
        match action {
            None => self.tap.drscan(&mut self.host, count as u32, &data, start),
            Some(ScanAction::Capture(slice)) => {
                let region = self.resolve_slice(slice)?;
                if region.kind.is_initialized() {
                    return Err(JamError::AssignToConst);
                }
                if region.length != count {
                    return Err(JamError::BoundsError);
                }
                let out = self.heap.data_mut(region.handle)?;
                self.tap.swap_dr(&mut self.host, count as u32, &data, start, out, region.start)
            },
            Some(ScanAction::Compare { expected, mask, result }) => {
                let (expected, expected_start) = self.scan_data(expected, count, true)?;
                let (mask, mask_start) = self.scan_data(mask, count, true)?;
                if self.symbols.find(result)?.kind != SymbolKind::Boolean {
                    return Err(JamError::TypeMismatch);
                }
                let mut captured = self.heap.scratch(count as u32)?;
                self.tap.swap_dr(&mut self.host, count as u32, &data, start, &mut captured, 0)?;
                let matched = (0..count).all(|i| {
                    !bit(&mask, mask_start + i)
                        || bit(&captured, i) == bit(&expected, expected_start + i)
                });
                debug!("DR compare of {} bits {}", count, if matched { "passed" } else { "failed" });
                self.symbols.set_value(result, SymbolValue::Scalar(matched as i32))
            },
        }
    }

    /// Assign a value to a scalar or array element.
    fn assign(&mut self, target: &Target, value: Value) -> Result<(), JamError> {
        match target {
            Target::Scalar(name) => {
                let value = match self.symbols.find(name)?.kind {
                    SymbolKind::Integer => value.as_integer()?,
                    SymbolKind::Boolean => value.as_boolean()? as i32,
                    _ => return Err(JamError::TypeMismatch),
                };
                self.symbols.set_value(name, SymbolValue::Scalar(value))
            },
            Target::Element(name, index) => {
                let index = self.eval_integer(index)?;
                let sym = self.symbols.find(name)?;
                let handle = match sym.value {
                    SymbolValue::Array(handle) if sym.kind.is_array() => handle,
                    _ => return Err(JamError::TypeMismatch),
                };
                if sym.kind.is_initialized() {
                    return Err(JamError::AssignToConst);
                }
                let value = if sym.kind.is_boolean_array() {
                    value.as_boolean()? as i32
                } else {
                    value.as_integer()?
                };
                self.heap.set_element(handle, index, value)
            },
        }
    }

    /// Copy bits into all or part of a Boolean array.
    fn copy_array(&mut self, target: &ArraySlice, source: &ArrayArg) -> Result<(), JamError> {
        let kind = self.symbols.find(&target.name)?.kind;
        if kind.is_integer_array() {
            return Err(JamError::SyntaxError);
        }
        let dst = self.resolve_slice(target)?;
        if dst.kind.is_initialized() {
            return Err(JamError::AssignToConst);
        }
        let (bits, start, length) = match source {
            ArrayArg::Literal { bits, length } => (bits.clone(), 0, *length as usize),
            ArrayArg::Slice(slice) => {
                let src = self.resolve_slice(slice)?;
                (self.heap.data(src.handle)?.to_vec(), src.start, src.length)
            },
        };
        let count = length.min(dst.length);
        if count == 0 {
            return Err(JamError::BoundsError);
        }
        copy_bits(&bits, start, self.heap.data_mut(dst.handle)?, dst.start, count);
        Ok(())
    }

    fn pop(&mut self, target: &Target) -> Result<(), JamError> {
        let value = match self.stack.peek() {
            Some(&StackRecord::Push { value }) => value,
            _ => return Err(JamError::PopUnexpected),
        };
        self.stack.pop();
        let value = match value {
            0 | 1 => Value { value, ty: ExprType::IntOrBool },
            _ => Value::integer(value),
        };
        self.assign(target, value)
    }

    fn ret(&mut self) -> Result<(), JamError> {
        let position = match self.stack.peek() {
            Some(&StackRecord::Call { return_position }) => return_position,
            _ => return Err(JamError::ReturnUnexpected),
        };
        self.stack.pop();
        self.reader.seek(&mut self.source, position)
    }

    /// Position of `label` if it has already been seen.
    fn label_position(&self, label: &str) -> Result<Option<usize>, JamError> {
        match self.symbols.lookup(label) {
            None => Ok(None),
            Some(id) => {
                let sym = self.symbols.get(id)?;
                if sym.kind == SymbolKind::Label {
                    Ok(Some(sym.position))
                } else {
                    Err(JamError::TypeMismatch)
                }
            },
        }
    }

    /// Read ahead until `label` is found, recording every label on the way.
    ///
    /// If the source ends first, reading resumes at `origin` and the label
    /// is `UndefinedSymbol`.
    fn find_label_ahead(&mut self, label: &str, origin: usize) -> Result<usize, JamError> {
        debug!("Scanning ahead for label {}", label);
        loop {
            match self.reader.read_statement(&mut self.source) {
                Ok(raw) => if let Some(found) = raw.label {
                    let position = self.reader.statement_position();
                    self.add_label(&found, position)?;
                    if found == label {
                        return Ok(position);
                    }
                },
                Err(JamError::UnexpectedEnd) => {
                    self.reader.restart_at(&mut self.source, origin)?;
                    return Err(JamError::UndefinedSymbol);
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// GOTO or CALL `label`.
    fn jump(&mut self, label: &str, call: bool) -> Result<(), JamError> {
        let return_position = self.reader.next_statement_position();
        let origin = self.reader.statement_position();
        let target = match self.label_position(label)? {
            Some(position) => position,
            None => self.find_label_ahead(label, origin)?,
        };
        if call {
            self.stack.push(StackRecord::Call { return_position })?;
        }
        self.reader.seek(&mut self.source, target)
    }

    fn for_loop(&mut self, iterator: &str, start: &Expr, stop: &Expr, step: Option<&Expr>)
        -> Result<(), JamError>
    {
        let id = self.symbols.lookup(iterator).ok_or(JamError::UndefinedSymbol)?;
        if self.symbols.get(id)?.kind != SymbolKind::Integer {
            return Err(JamError::TypeMismatch);
        }
        let start = self.eval_integer(start)?;
        let stop = self.eval_integer(stop)?;
        let step = match step {
            Some(step) => self.eval_integer(step)?,
            None => 1,
        };
        if step == 0 {
            return Err(JamError::SyntaxError);
        }

        self.symbols.set_value(iterator, SymbolValue::Scalar(start))?;
        if (step > 0 && start > stop) || (step < 0 && start < stop) {
            return self.skip_loop();
        }
        let jump = self.reader.next_statement_position();
        self.stack.push(StackRecord::ForNext { iterator: id, jump, stop, step })
    }

    /// Skip forward past the NEXT which closes the current FOR.
    fn skip_loop(&mut self) -> Result<(), JamError> {
        let origin = self.reader.statement_position();
        let mut depth = 0usize;
        loop {
            let raw = match self.reader.read_statement(&mut self.source) {
                Ok(raw) => raw,
                Err(JamError::UnexpectedEnd) => {
                    self.reader.restart_at(&mut self.source, origin)?;
                    return Err(JamError::UnexpectedEnd);
                },
                Err(e) => return Err(e),
            };
            if let Some(label) = &raw.label {
                self.add_label(label, self.reader.statement_position())?;
            }
            match parse_statement(&raw.body) {
                Ok(Statement::For { .. }) => depth += 1,
                Ok(Statement::Next(_)) if depth == 0 => return Ok(()),
                Ok(Statement::Next(_)) => depth -= 1,
                _ => (),
            }
        }
    }

    /// Advance the innermost loop, which must belong to `iterator`.
    ///
    /// The loop ends once another step would pass its stop value.
    fn next(&mut self, iterator: &str) -> Result<(), JamError> {
        let id = self.symbols.lookup(iterator).ok_or(JamError::UndefinedSymbol)?;
        let sym = self.symbols.get(id)?;
        let value = match (sym.kind, sym.value) {
            (SymbolKind::Integer, SymbolValue::Scalar(v)) => v,
            _ => return Err(JamError::TypeMismatch),
        };
        let (jump, stop, step) = match self.stack.peek() {
            Some(&StackRecord::ForNext { iterator, jump, stop, step }) if iterator == id => {
                (jump, stop, step)
            },
            _ => return Err(JamError::NextUnexpected),
        };

        let next = value as i64 + step as i64;
        if (step > 0 && next > stop as i64) || (step < 0 && next < stop as i64) {
            self.stack.pop();
            Ok(())
        } else {
            self.symbols.set_value(iterator, SymbolValue::Scalar(next as i32))?;
            self.reader.seek(&mut self.source, jump)
        }
    }

    fn print(&mut self, items: &[PrintItem]) -> Result<(), JamError> {
        let mut text = String::new();
        for item in items {
            match item {
                PrintItem::Text(s) => text.push_str(s),
                PrintItem::Expr(expr) => text.push_str(&self.eval(expr)?.value.to_string()),
                PrintItem::Chr(expr) => {
                    let mut code = self.eval_integer(expr)?;
                    if !(0..=127).contains(&code) {
                        warn!("CHR$ argument {} out of range, using 127", code);
                        code = 127;
                    }
                    text.push(char::from(code as u8));
                },
            }
        }
        self.host.message(&text);
        Ok(())
    }

    fn padding(&mut self, values: &[Expr; 4]) -> Result<(), JamError> {
        let mut padding = [0u32; 4];
        for (out, expr) in padding.iter_mut().zip(values.iter()) {
            let value = self.eval_integer(expr)?;
            if !(0..=MAX_PADDING).contains(&value) {
                return Err(JamError::SyntaxError);
            }
            *out = value as u32;
        }
        self.tap.set_padding(padding[0], padding[1], padding[2], padding[3]);
        Ok(())
    }

    /// Wait in a stable state for a number of clocks and/or microseconds.
    ///
    /// A state before the first count selects the wait state, IDLE by default.
    /// A state after the counts is entered afterwards, unless it is IDLE.
    fn wait(&mut self, items: &[WaitItem]) -> Result<(), JamError> {
        let mut wait_state = None;
        let mut end_state = None;
        let mut counts = Vec::new();
        for item in items {
            match item {
                WaitItem::State(state) if counts.is_empty() && wait_state.is_none() => {
                    wait_state = Some(*state);
                },
                WaitItem::State(state) if !counts.is_empty() && end_state.is_none() => {
                    end_state = Some(*state);
                },
                WaitItem::State(_) => return Err(JamError::SyntaxError),
                _ if end_state.is_some() => return Err(JamError::SyntaxError),
                count => counts.push(count),
            }
        }
        if counts.is_empty() {
            return Err(JamError::SyntaxError);
        }

        let wait_state = wait_state.unwrap_or(State::IDLE);
        for count in counts {
            match count {
                WaitItem::Cycles(expr) => {
                    let cycles = self.eval_integer(expr)?;
                    self.tap.wait_cycles(&mut self.host, cycles, wait_state)?;
                },
                WaitItem::Microseconds(expr) => {
                    let usec = self.eval_integer(expr)?;
                    self.tap.wait_microseconds(&mut self.host, usec, wait_state)?;
                },
                WaitItem::State(_) => return Err(JamError::InternalError),
            }
        }
        match end_state {
            Some(state) if state != State::IDLE => self.tap.goto_state(&mut self.host, state),
            _ => Ok(()),
        }
    }

    fn vmap(&mut self, signals: &[String]) -> Result<(), JamError> {
        if signals.len() > MAX_VECTOR_SIGNALS {
            return Err(JamError::SyntaxError);
        }
        let mapped = self.host.vector_map(signals);
        if mapped == signals.len() {
            self.vector_signals = mapped;
            Ok(())
        } else {
            warn!("Host mapped {} of {} vector signals", mapped, signals.len());
            self.vector_signals = 0;
            Err(JamError::UnsupportedFeature)
        }
    }

    /// Words of a VECTOR argument, which must start at element 0.
    fn vector_data(&self, arg: &ArrayArg) -> Result<Vec<u32>, JamError> {
        match arg {
            ArrayArg::Literal { bits, .. } => Ok(bits.clone()),
            ArrayArg::Slice(slice) => {
                let region = self.resolve_slice(slice)?;
                if region.start != 0 {
                    return Err(JamError::UnsupportedFeature);
                }
                Ok(self.heap.data(region.handle)?.to_vec())
            },
        }
    }

    /// Drive the signals mapped by VMAP. Capturing or comparing the
    /// signals read back is not supported.
    fn vector(&mut self, dir: &ArrayArg, data: &ArrayArg, action: &Option<ScanAction>)
        -> Result<(), JamError>
    {
        if action.is_some() || self.vector_signals == 0 {
            return Err(JamError::UnsupportedFeature);
        }
        let count = self.vector_signals;
        let dir = self.vector_data(dir)?;
        let data = self.vector_data(data)?;
        let driven = self.host.vector_io(count, &dir, &data, None);
        if driven != count {
            warn!("Host drove {} of {} vector signals", driven, count);
            return Err(JamError::UnsupportedFeature);
        }
        Ok(())
    }
}
