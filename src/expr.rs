// Copyright 2021 Adam Greig
// Licensed under the MIT license.

use super::{Heap, JamError, SymbolKind, SymbolTable, SymbolValue};

/// Type inferred for an evaluated expression.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExprType {
    Integer,
    Boolean,

    /// The literals 0 and 1, which are accepted where either an Integer
    /// or a Boolean is required.
    IntOrBool,
}

/// Result of evaluating an expression.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Value {
    pub value: i32,
    pub ty: ExprType,
}

impl Value {
    pub fn integer(value: i32) -> Self {
        Value { value, ty: ExprType::Integer }
    }

    pub fn boolean(value: bool) -> Self {
        Value { value: value as i32, ty: ExprType::Boolean }
    }

    /// Check if the value may be used as an Integer.
    pub fn is_integer(&self) -> bool {
        self.ty != ExprType::Boolean
    }

    /// Check if the value may be used as a Boolean.
    pub fn is_boolean(&self) -> bool {
        self.ty != ExprType::Integer
    }

    /// The value as an Integer, or `TypeMismatch`.
    pub fn as_integer(&self) -> Result<i32, JamError> {
        if self.is_integer() { Ok(self.value) } else { Err(JamError::TypeMismatch) }
    }

    /// The value as a Boolean, or `TypeMismatch`.
    pub fn as_boolean(&self) -> Result<bool, JamError> {
        if self.is_boolean() { Ok(self.value != 0) } else { Err(JamError::TypeMismatch) }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Function {
    Abs,
    Log2,
    Sqrt,
    Ceil,
    Floor,
}

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Literal(i32),
    Symbol(String),
    Index(String, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Box<Expr>),
}

impl Expr {
    /// Evaluate this expression against the current symbols and arrays.
    pub fn evaluate(&self, symbols: &SymbolTable, heap: &Heap) -> Result<Value, JamError> {
        match self {
            Expr::Literal(v @ 0..=1) => Ok(Value { value: *v, ty: ExprType::IntOrBool }),
            Expr::Literal(v) => Ok(Value::integer(*v)),
            Expr::Symbol(name) => {
                let sym = symbols.find(name)?;
                match (sym.kind, sym.value) {
                    (SymbolKind::Integer, SymbolValue::Scalar(v)) => Ok(Value::integer(v)),
                    (SymbolKind::Boolean, SymbolValue::Scalar(v)) => Ok(Value::boolean(v != 0)),
                    (SymbolKind::Label, _) => Err(JamError::SyntaxError),
                    _ => Err(JamError::TypeMismatch),
                }
            },
            Expr::Index(name, index) => {
                let index = index.evaluate(symbols, heap)?.as_integer()?;
                let sym = symbols.find(name)?;
                match sym.value {
                    SymbolValue::Array(handle) if sym.kind.is_array() => {
                        let v = heap.element(handle, index)?;
                        if sym.kind.is_boolean_array() {
                            Ok(Value::boolean(v != 0))
                        } else {
                            Ok(Value::integer(v))
                        }
                    },
                    _ => Err(JamError::TypeMismatch),
                }
            },
            Expr::Unary(op, a) => {
                let a = a.evaluate(symbols, heap)?;
                match op {
                    UnaryOp::Neg => a.as_integer()?.checked_neg()
                                     .map(Value::integer).ok_or(JamError::IntegerOverflow),
                    UnaryOp::Not => Ok(Value::boolean(!a.as_boolean()?)),
                    UnaryOp::BitNot => Ok(Value::integer(!a.as_integer()?)),
                }
            },
            Expr::Binary(op, a, b) => {
                let a = a.evaluate(symbols, heap)?;
                let b = b.evaluate(symbols, heap)?;
                binary(*op, a, b)
            },
            Expr::Call(f, a) => call(*f, a, symbols, heap),
        }
    }
}

fn binary(op: BinaryOp, a: Value, b: Value) -> Result<Value, JamError> {
    use BinaryOp::*;
    match op {
        Or => Ok(Value::boolean(a.as_boolean()? || b.as_boolean()?)),
        And => Ok(Value::boolean(a.as_boolean()? && b.as_boolean()?)),
        Eq | Ne => {
            let equal = if a.is_integer() && b.is_integer() {
                a.value == b.value
            } else if a.is_boolean() && b.is_boolean() {
                (a.value != 0) == (b.value != 0)
            } else {
                return Err(JamError::TypeMismatch);
            };
            Ok(Value::boolean(equal == (op == Eq)))
        },
        Lt => compare(a, b, |x, y| x < y),
        Gt => compare(a, b, |x, y| x > y),
        Le => compare(a, b, |x, y| x <= y),
        Ge => compare(a, b, |x, y| x >= y),
        BitOr => arithmetic(a, b, |x, y| Some(x | y)),
        BitXor => arithmetic(a, b, |x, y| Some(x ^ y)),
        BitAnd => arithmetic(a, b, |x, y| Some(x & y)),
        Shl => arithmetic(a, b, |x, y| Some(shift_left(x, y))),
        Shr => arithmetic(a, b, |x, y| Some(shift_right(x, y))),
        Add => arithmetic(a, b, i32::checked_add),
        Sub => arithmetic(a, b, i32::checked_sub),
        Mul => arithmetic(a, b, i32::checked_mul),
        Div | Mod => {
            if b.as_integer()? == 0 && a.is_integer() {
                return Err(JamError::DivideByZero);
            }
            if op == Div {
                arithmetic(a, b, i32::checked_div)
            } else {
                arithmetic(a, b, i32::checked_rem)
            }
        },
    }
}

fn compare(a: Value, b: Value, f: impl Fn(i32, i32) -> bool) -> Result<Value, JamError> {
    Ok(Value::boolean(f(a.as_integer()?, b.as_integer()?)))
}

/// Apply an integer operation which returns None on overflow.
fn arithmetic(a: Value, b: Value, f: impl Fn(i32, i32) -> Option<i32>)
    -> Result<Value, JamError>
{
    let (x, y) = (a.as_integer()?, b.as_integer()?);
    f(x, y).map(Value::integer).ok_or(JamError::IntegerOverflow)
}

/// Shift amounts outside 0..32 shift every bit out.
fn shift_left(x: i32, y: i32) -> i32 {
    if (0..32).contains(&y) { x << y } else { 0 }
}

fn shift_right(x: i32, y: i32) -> i32 {
    if (0..32).contains(&y) { x >> y } else { x >> 31 }
}

fn call(f: Function, arg: &Expr, symbols: &SymbolTable, heap: &Heap)
    -> Result<Value, JamError>
{
    match f {
        Function::Abs => {
            let n = arg.evaluate(symbols, heap)?.as_integer()?;
            n.checked_abs().map(Value::integer).ok_or(JamError::IntegerOverflow)
        },
        Function::Log2 => {
            let n = arg.evaluate(symbols, heap)?.as_integer()?;
            let (floor, exact) = log2(n)?;
            Ok(Value::integer(if exact { floor } else { floor + 1 }))
        },
        Function::Sqrt => {
            let n = arg.evaluate(symbols, heap)?.as_integer()?;
            Ok(Value::integer(sqrt(n)?))
        },
        // CEIL and FLOOR round the exact result of a division, square root,
        // or logarithm; any other argument is passed through unchanged.
        Function::Ceil => match arg {
            Expr::Binary(BinaryOp::Div, a, b) => {
                let (x, y) = division_operands(a, b, symbols, heap)?;
                let q = x.checked_div(y).ok_or(JamError::IntegerOverflow)?;
                let round_up = x % y != 0 && (x < 0) == (y < 0);
                Ok(Value::integer(if round_up { q + 1 } else { q }))
            },
            Expr::Call(Function::Sqrt, n) => {
                let n = n.evaluate(symbols, heap)?.as_integer()?;
                let r = sqrt(n)?;
                Ok(Value::integer(if r * r < n { r + 1 } else { r }))
            },
            _ => Ok(Value::integer(arg.evaluate(symbols, heap)?.as_integer()?)),
        },
        Function::Floor => match arg {
            Expr::Binary(BinaryOp::Div, a, b) => {
                let (x, y) = division_operands(a, b, symbols, heap)?;
                let q = x.checked_div(y).ok_or(JamError::IntegerOverflow)?;
                let round_down = x % y != 0 && (x < 0) != (y < 0);
                Ok(Value::integer(if round_down { q - 1 } else { q }))
            },
            Expr::Call(Function::Log2, n) => {
                let n = n.evaluate(symbols, heap)?.as_integer()?;
                Ok(Value::integer(log2(n)?.0))
            },
            _ => Ok(Value::integer(arg.evaluate(symbols, heap)?.as_integer()?)),
        },
    }
}

fn division_operands(a: &Expr, b: &Expr, symbols: &SymbolTable, heap: &Heap)
    -> Result<(i32, i32), JamError>
{
    let x = a.evaluate(symbols, heap)?.as_integer()?;
    let y = b.evaluate(symbols, heap)?.as_integer()?;
    if y == 0 {
        Err(JamError::DivideByZero)
    } else {
        Ok((x, y))
    }
}

/// Floor of log2(n), and whether n is an exact power of two.
fn log2(n: i32) -> Result<(i32, bool), JamError> {
    if n <= 0 {
        return Err(JamError::IntegerOverflow);
    }
    let floor = 31 - n.leading_zeros() as i32;
    Ok((floor, n.count_ones() == 1))
}

/// Integer square root, rounded down, built one result bit at a time.
fn sqrt(n: i32) -> Result<i32, JamError> {
    if n < 0 {
        return Err(JamError::IntegerOverflow);
    }
    let mut rem = n as u32;
    let mut root = 0u32;
    let mut bit = 1u32 << 30;
    while bit > rem {
        bit >>= 2;
    }
    while bit != 0 {
        if rem >= root + bit {
            rem -= root + bit;
            root = (root >> 1) + bit;
        } else {
            root >>= 1;
        }
        bit >>= 2;
    }
    Ok(root as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn eval_with(text: &str, symbols: &SymbolTable, heap: &Heap) -> Result<Value, JamError> {
        parse_expression(text)?.evaluate(symbols, heap)
    }

    fn eval(text: &str) -> Result<Value, JamError> {
        eval_with(text, &SymbolTable::new(vec![]), &Heap::new(1024))
    }

    fn int(v: i32) -> Result<Value, JamError> {
        Ok(Value::integer(v))
    }

    fn boolean(v: bool) -> Result<Value, JamError> {
        Ok(Value::boolean(v))
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("0"), Ok(Value { value: 0, ty: ExprType::IntOrBool }));
        assert_eq!(eval("1"), Ok(Value { value: 1, ty: ExprType::IntOrBool }));
        assert_eq!(eval("2"), int(2));
        assert_eq!(eval("2147483648"), Err(JamError::IntegerOverflow));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("2+2"), int(4));
        assert_eq!(eval("2+3*4"), int(14));
        assert_eq!(eval("(2+3)*4"), int(20));
        assert_eq!(eval("10-2-3"), int(5));
        assert_eq!(eval("7/2"), int(3));
        assert_eq!(eval("-7/2"), int(-3));
        assert_eq!(eval("7%3"), int(1));
        assert_eq!(eval("-5"), int(-5));
        assert_eq!(eval("7/0"), Err(JamError::DivideByZero));
        assert_eq!(eval("7%0"), Err(JamError::DivideByZero));
        assert_eq!(eval("2147483647+1"), Err(JamError::IntegerOverflow));
        assert_eq!(eval("0-2147483647-2"), Err(JamError::IntegerOverflow));
        assert_eq!(eval("65536*65536"), Err(JamError::IntegerOverflow));
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(eval("12&10"), int(8));
        assert_eq!(eval("12|10"), int(14));
        assert_eq!(eval("12^10"), int(6));
        assert_eq!(eval("~0"), int(-1));
        assert_eq!(eval("1<<4"), int(16));
        assert_eq!(eval("256>>4"), int(16));
        assert_eq!(eval("1<<40"), int(0));
        assert_eq!(eval("1|2==3"), Err(JamError::TypeMismatch));
    }

    #[test]
    fn test_logic_and_comparison() {
        assert_eq!(eval("1==1"), boolean(true));
        assert_eq!(eval("2!=2"), boolean(false));
        assert_eq!(eval("3>2 && 2>=2"), boolean(true));
        assert_eq!(eval("3<2 || 2<=1"), boolean(false));
        assert_eq!(eval("3<2 OR 1"), boolean(true));
        assert_eq!(eval("1 AND !0"), boolean(true));
        assert_eq!(eval("!(2>1)"), boolean(false));
        assert_eq!(eval("2 && 1"), Err(JamError::TypeMismatch));
        assert_eq!(eval("!2"), Err(JamError::TypeMismatch));
        assert_eq!(eval("(1==1)+1"), Err(JamError::TypeMismatch));
        assert_eq!(eval("(1==1)==1"), boolean(true));
        assert_eq!(eval("(1==1)==2"), Err(JamError::TypeMismatch));
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("ABS(-4)"), int(4));
        assert_eq!(eval("LOG2(8)"), int(3));
        assert_eq!(eval("LOG2(9)"), int(4));
        assert_eq!(eval("LOG2(1)"), int(0));
        assert_eq!(eval("LOG2(0)"), Err(JamError::IntegerOverflow));
        assert_eq!(eval("SQRT(16)"), int(4));
        assert_eq!(eval("SQRT(17)"), int(4));
        assert_eq!(eval("SQRT(2147483647)"), int(46340));
        assert_eq!(eval("SQRT(-1)"), Err(JamError::IntegerOverflow));
    }

    #[test]
    fn test_ceil_floor() {
        assert_eq!(eval("CEIL(7/2)"), int(4));
        assert_eq!(eval("CEIL(8/2)"), int(4));
        assert_eq!(eval("CEIL(-7/2)"), int(-3));
        assert_eq!(eval("FLOOR(-7/2)"), int(-4));
        assert_eq!(eval("FLOOR(7/2)"), int(3));
        assert_eq!(eval("CEIL(SQRT(17))"), int(5));
        assert_eq!(eval("CEIL(SQRT(16))"), int(4));
        assert_eq!(eval("CEIL(LOG2(9))"), int(4));
        assert_eq!(eval("FLOOR(LOG2(9))"), int(3));
        assert_eq!(eval("FLOOR(LOG2(8))"), int(3));
        assert_eq!(eval("FLOOR(SQRT(17))"), int(4));
        assert_eq!(eval("CEIL(5)"), int(5));
        assert_eq!(eval("CEIL(7/0)"), Err(JamError::DivideByZero));
    }

    #[test]
    fn test_symbols() {
        let mut symbols = SymbolTable::new(vec![]);
        let mut heap = Heap::new(1024);
        symbols.add(SymbolKind::Integer, "N", SymbolValue::Scalar(12), 0).unwrap();
        symbols.add(SymbolKind::Boolean, "B", SymbolValue::Scalar(5), 0).unwrap();
        symbols.add(SymbolKind::Label, "L", SymbolValue::Scalar(0), 0).unwrap();
        let ints = heap.allocate(false, 3).unwrap();
        heap.set_element(ints, 2, 99).unwrap();
        symbols.add(SymbolKind::IntegerArrayWritable, "A", SymbolValue::Array(ints), 0).unwrap();
        let bits = heap.allocate(true, 8).unwrap();
        heap.set_element(bits, 1, 1).unwrap();
        symbols.add(SymbolKind::BooleanArrayInitialized, "F", SymbolValue::Array(bits), 0)
               .unwrap();

        assert_eq!(eval_with("N*2", &symbols, &heap), int(24));
        assert_eq!(eval_with("B", &symbols, &heap), boolean(true));
        assert_eq!(eval_with("A[2]+1", &symbols, &heap), int(100));
        assert_eq!(eval_with("A[N-11]", &symbols, &heap), int(0));
        assert_eq!(eval_with("F[1] && B", &symbols, &heap), boolean(true));
        assert_eq!(eval_with("A[3]", &symbols, &heap), Err(JamError::BoundsError));
        assert_eq!(eval_with("A", &symbols, &heap), Err(JamError::TypeMismatch));
        assert_eq!(eval_with("N[0]", &symbols, &heap), Err(JamError::TypeMismatch));
        assert_eq!(eval_with("L", &symbols, &heap), Err(JamError::SyntaxError));
        assert_eq!(eval_with("M", &symbols, &heap), Err(JamError::UndefinedSymbol));
    }
}
