// Copyright 2021 Adam Greig
// Licensed under the MIT license.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_till, take_while1, take_while_m_n},
    character::complete::{char as nom_char, hex_digit1, one_of, satisfy, space0, space1},
    combinator::{all_consuming, map, map_opt, map_res, not, opt, peek, rest, value, verify},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    error::{ErrorKind, ParseError, FromExternalError},
};
use nom_locate::LocatedSpan;

use super::{JamError, State};
use crate::expr::{BinaryOp, Expr, Function, UnaryOp};
use crate::symbol::is_name_char;

// Alias Span for brevity.
type Span<'a> = LocatedSpan<&'a str>;

impl<'a> ParseError<Span<'a>> for JamError {
    fn from_error_kind(_: Span<'a>, _: ErrorKind) -> Self {
        JamError::SyntaxError
    }
    fn append(_: Span<'a>, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<'a> From<(Span<'a>, ErrorKind)> for JamError {
    fn from(_: (Span<'a>, ErrorKind)) -> Self {
        JamError::SyntaxError
    }
}

impl<I> FromExternalError<I, JamError> for JamError {
    fn from_external_error(_: I, _: ErrorKind, e: JamError) -> Self {
        e
    }
}

/// Type alias IResult to use JamError by default.
type IResult<I, O, E = JamError> = Result<(I, O), nom::Err<E>>;

/// Names of every instruction, in the order used to resolve abbreviations.
const INSTRUCTIONS: [&str; 26] = [
    "BOOLEAN", "CALL", "CRC", "DRSCAN", "DRSTOP", "EXIT", "EXPORT", "FOR", "GOTO", "IF",
    "INTEGER", "IRSCAN", "IRSTOP", "LET", "NEXT", "NOTE", "PADDING", "POP", "PRINT", "PUSH",
    "REM", "RETURN", "STATE", "VECTOR", "VMAP", "WAIT",
];

/// Source of Boolean array data for scans, copies, and initialisers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArrayArg {
    /// Hexadecimal literal such as `0F3`, packed with bit 0 in the least
    /// significant bit of the last digit. `length` is four bits per digit.
    Literal { bits: Vec<u32>, length: u32 },

    /// All or part of a named array.
    Slice(ArraySlice),
}

/// Named array, optionally restricted to the inclusive index range `a..b`.
///
/// `NAME`, `NAME[]`, and a missing range all refer to the whole array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArraySlice {
    pub name: String,
    pub range: Option<(Expr, Expr)>,
}

/// Assignment target for LET and POP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Scalar(String),
    Element(String, Expr),
}

/// Value given after `=` in a BOOLEAN or INTEGER declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Initializer {
    /// Scalar declarations.
    Scalar(Expr),

    /// `"A5"` or `$A5`, hexadecimal text in literal bit order.
    Hex(String),

    /// `#0101`, binary text with element 0 as the rightmost digit.
    Binary(String),

    /// `%...` run-length or `@...` compressed data.
    Compressed,

    /// Copy of another Boolean array, `NAME[]` or `NAME[a..b]`.
    Array(ArraySlice),

    /// Element values in order from element 0.
    List(Vec<Expr>),
}

/// BOOLEAN or INTEGER declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub dimension: Option<Expr>,
    pub init: Option<Initializer>,
}

/// What to do with the bits shifted out by a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanAction {
    Capture(ArraySlice),
    Compare { expected: ArrayArg, mask: ArrayArg, result: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrintItem {
    Text(String),
    Chr(Expr),
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitItem {
    State(State),
    Cycles(Expr),
    Microseconds(Expr),
}

/// One parsed statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Boolean(Declaration),
    Call(String),
    Crc,
    DrScan { count: Expr, data: ArrayArg, action: Option<ScanAction> },
    DrStop(State),
    Exit(Expr),
    Export { key: String, value: Expr },
    For { iterator: String, start: Expr, stop: Expr, step: Option<Expr> },
    Goto(String),

    /// The statement after THEN is kept as text and only parsed if the
    /// condition holds.
    If { condition: Expr, then: String },
    Integer(Declaration),
    IrScan { count: Expr, data: ArrayArg },
    IrStop(State),
    Let { target: Target, value: Expr },
    LetArray { target: ArraySlice, source: ArrayArg },
    Next(String),
    Note,
    Padding([Expr; 4]),
    Pop(Target),
    Print(Vec<PrintItem>),
    Push(Expr),
    Rem,
    Return,
    State(Vec<State>),
    Vector { dir: ArrayArg, data: ArrayArg, action: Option<ScanAction> },
    Vmap(Vec<String>),
    Wait(Vec<WaitItem>),
}

/// Parse a complete expression.
pub fn parse_expression(text: &str) -> Result<Expr, JamError> {
    finish(all_consuming(delimited(space0, or_expr, space0))(Span::new(text)))
}

/// Parse one statement body as produced by the statement reader,
/// including its terminating semicolon.
pub fn parse_statement(body: &str) -> Result<Statement, JamError> {
    finish(statement(Span::new(body)))
}

/// Parse the key and value of a NOTE statement.
pub fn parse_note(body: &str) -> Result<(String, String), JamError> {
    finish(preceded(
        pair(keyword("NOTE"), space0),
        terminated(
            separated_pair(alt((quoted, name)), space0, quoted),
            end,
        ),
    )(Span::new(body)))
}

/// Parse the expected checksum given by a CRC statement.
pub fn parse_crc(body: &str) -> Result<u16, JamError> {
    finish(preceded(
        pair(keyword("CRC"), space1),
        terminated(
            map_res(take_while_m_n(4, 4, |c: char| c.is_ascii_hexdigit()),
                    |s: Span| u16::from_str_radix(s.fragment(), 16).map_err(|_| JamError::SyntaxError)),
            end,
        ),
    )(Span::new(body)))
}

/// Convert a parser result into the error it carries.
fn finish<O>(result: IResult<Span, O>) -> Result<O, JamError> {
    match result {
        Ok((_, out)) => Ok(out),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e),
        Err(nom::Err::Incomplete(_)) => Err(JamError::SyntaxError),
    }
}

/// Pack hexadecimal digits into words, with bit 0 the least significant
/// bit of the last digit.
///
/// Returns the words and the number of bits, four per digit.
pub fn hex_bits(digits: &str) -> (Vec<u32>, u32) {
    let mut bits = vec![0u32; (digits.len() + 7) / 8];
    for (i, c) in digits.chars().rev().enumerate() {
        let nibble = c.to_digit(16).unwrap_or(0);
        bits[i / 8] |= nibble << ((i % 8) * 4);
    }
    (bits, digits.len() as u32 * 4)
}

/// Match a word, which must not be followed by another name character.
fn keyword<'a>(word: &'static str) -> impl FnMut(Span<'a>) -> IResult<Span<'a>, Span<'a>> {
    terminated(tag_no_case(word), not(satisfy(is_name_char)))
}

/// Parse a symbol name, returned in upper case.
fn name(input: Span) -> IResult<Span, String> {
    map(take_while1(is_name_char), |s: Span| s.fragment().to_ascii_uppercase())(input)
}

/// Parse a double-quoted string, returning its contents.
fn quoted(input: Span) -> IResult<Span, String> {
    map(
        delimited(nom_char('"'), take_till(|c: char| c == '"'), nom_char('"')),
        |s: Span| s.fragment().to_string(),
    )(input)
}

/// Parse a TAP state name.
fn state_name(input: Span) -> IResult<Span, State> {
    map_opt(take_while1(is_name_char),
            |s: Span| State::from_name(&s.fragment().to_ascii_uppercase()))(input)
}

/// Consume a comma and the spaces either side of it.
fn comma(input: Span) -> IResult<Span, ()> {
    value((), tuple((space0, nom_char(','), space0)))(input)
}

/// Consume an assignment `=`, which must not be the start of `==`.
fn assign(input: Span) -> IResult<Span, ()> {
    value((), tuple((space0, terminated(nom_char('='), not(nom_char('='))), space0)))(input)
}

/// Consume the terminating semicolon, which must end the statement.
fn end(input: Span) -> IResult<Span, ()> {
    value((), all_consuming(preceded(space0, nom_char(';'))))(input)
}

/// Parse an expression in square brackets.
fn bracketed(input: Span) -> IResult<Span, Expr> {
    preceded(space0, delimited(pair(nom_char('['), space0), or_expr, pair(space0, nom_char(']'))))(input)
}

/// Parse one level of left-associative binary operators.
fn binary_level<'a>(
    input: Span<'a>,
    operand: fn(Span<'a>) -> IResult<Span<'a>, Expr>,
    operator: fn(Span<'a>) -> IResult<Span<'a>, BinaryOp>,
) -> IResult<Span<'a>, Expr> {
    let (mut input, mut expr) = operand(input)?;
    loop {
        match preceded(space0, operator)(input) {
            Ok((i, op)) => {
                let (i, rhs) = preceded(space0, operand)(i)?;
                expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
                input = i;
            },
            Err(nom::Err::Error(_)) => return Ok((input, expr)),
            Err(e) => return Err(e),
        }
    }
}

/// Parse a full expression; OR binds loosest.
fn or_expr(input: Span) -> IResult<Span, Expr> {
    binary_level(input, and_expr, |i| value(BinaryOp::Or, alt((tag("||"), keyword("OR"))))(i))
}

fn and_expr(input: Span) -> IResult<Span, Expr> {
    binary_level(input, bitor_expr, |i| value(BinaryOp::And, alt((tag("&&"), keyword("AND"))))(i))
}

fn bitor_expr(input: Span) -> IResult<Span, Expr> {
    binary_level(input, bitxor_expr,
                 |i| value(BinaryOp::BitOr, terminated(tag("|"), not(tag("|"))))(i))
}

fn bitxor_expr(input: Span) -> IResult<Span, Expr> {
    binary_level(input, bitand_expr, |i| value(BinaryOp::BitXor, tag("^"))(i))
}

fn bitand_expr(input: Span) -> IResult<Span, Expr> {
    binary_level(input, equality_expr,
                 |i| value(BinaryOp::BitAnd, terminated(tag("&"), not(tag("&"))))(i))
}

fn equality_expr(input: Span) -> IResult<Span, Expr> {
    binary_level(input, relational_expr, |i| alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
    ))(i))
}

fn relational_expr(input: Span) -> IResult<Span, Expr> {
    binary_level(input, shift_expr, |i| alt((
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, terminated(tag("<"), not(tag("<")))),
        value(BinaryOp::Gt, terminated(tag(">"), not(tag(">")))),
    ))(i))
}

fn shift_expr(input: Span) -> IResult<Span, Expr> {
    binary_level(input, additive_expr, |i| alt((
        value(BinaryOp::Shl, tag("<<")),
        value(BinaryOp::Shr, tag(">>")),
    ))(i))
}

fn additive_expr(input: Span) -> IResult<Span, Expr> {
    binary_level(input, multiplicative_expr, |i| alt((
        value(BinaryOp::Add, tag("+")),
        value(BinaryOp::Sub, tag("-")),
    ))(i))
}

fn multiplicative_expr(input: Span) -> IResult<Span, Expr> {
    binary_level(input, unary_expr, |i| alt((
        value(BinaryOp::Mul, tag("*")),
        value(BinaryOp::Div, tag("/")),
        value(BinaryOp::Mod, tag("%")),
    ))(i))
}

/// Parse a unary minus, logical NOT, or bitwise NOT, or a primary expression.
fn unary_expr(input: Span) -> IResult<Span, Expr> {
    let op = alt((
        value(UnaryOp::Neg, nom_char('-')),
        value(UnaryOp::Not, terminated(nom_char('!'), not(nom_char('=')))),
        value(UnaryOp::BitNot, nom_char('~')),
    ));
    alt((
        map(pair(op, preceded(space0, unary_expr)), |(op, e)| Expr::Unary(op, Box::new(e))),
        primary,
    ))(input)
}

fn primary(input: Span) -> IResult<Span, Expr> {
    alt((
        delimited(pair(nom_char('('), space0), or_expr, pair(space0, nom_char(')'))),
        function_call,
        operand,
    ))(input)
}

/// Parse ABS, LOG2, SQRT, CEIL, or FLOOR applied to a bracketed argument.
fn function_call(input: Span) -> IResult<Span, Expr> {
    map(
        pair(
            alt((
                value(Function::Abs, tag_no_case("ABS")),
                value(Function::Log2, tag_no_case("LOG2")),
                value(Function::Sqrt, tag_no_case("SQRT")),
                value(Function::Ceil, tag_no_case("CEIL")),
                value(Function::Floor, tag_no_case("FLOOR")),
            )),
            preceded(space0, delimited(pair(nom_char('('), space0), or_expr,
                                       pair(space0, nom_char(')')))),
        ),
        |(f, arg)| Expr::Call(f, Box::new(arg)),
    )(input)
}

/// Parse a decimal literal, a symbol, or an indexed array element.
///
/// A run of name characters is only a literal if every character is a digit.
/// Literals which do not fit in 32 bits fail with `IntegerOverflow`.
fn operand(input: Span) -> IResult<Span, Expr> {
    let (i, word) = take_while1(is_name_char)(input)?;
    let text = *word.fragment();
    if text.bytes().all(|b| b.is_ascii_digit()) {
        return match text.parse::<i32>() {
            Ok(v) => Ok((i, Expr::Literal(v))),
            Err(_) => Err(nom::Err::Failure(JamError::IntegerOverflow)),
        };
    }
    let name = text.to_ascii_uppercase();
    match opt(bracketed)(i)? {
        (i, Some(index)) => Ok((i, Expr::Index(name, Box::new(index)))),
        (i, None) => Ok((i, Expr::Symbol(name))),
    }
}

/// Parse a hexadecimal array literal, which must start with a decimal digit.
fn literal_array(input: Span) -> IResult<Span, ArrayArg> {
    map(preceded(peek(satisfy(|c| c.is_ascii_digit())), hex_digit1), |digits: Span| {
        let (bits, length) = hex_bits(digits.fragment());
        ArrayArg::Literal { bits, length }
    })(input)
}

/// Parse `NAME[]` or `NAME[a..b]`.
fn bracketed_slice(input: Span) -> IResult<Span, ArraySlice> {
    let (i, name) = terminated(name, tuple((space0, nom_char('['), space0)))(input)?;
    let (i, range) = alt((
        value(None, nom_char(']')),
        map(
            terminated(
                separated_pair(or_expr, tuple((space0, tag(".."), space0)), or_expr),
                pair(space0, nom_char(']')),
            ),
            Some,
        ),
    ))(i)?;
    Ok((i, ArraySlice { name, range }))
}

/// Parse an array slice, which may also be a bare array name.
fn slice(input: Span) -> IResult<Span, ArraySlice> {
    alt((bracketed_slice, map(name, |name| ArraySlice { name, range: None })))(input)
}

fn array_arg(input: Span) -> IResult<Span, ArrayArg> {
    alt((literal_array, map(slice, ArrayArg::Slice)))(input)
}

fn target(input: Span) -> IResult<Span, Target> {
    let (i, name) = name(input)?;
    match opt(bracketed)(i)? {
        (i, Some(index)) => Ok((i, Target::Element(name, index))),
        (i, None) => Ok((i, Target::Scalar(name))),
    }
}

/// Parse the leading instruction name, which may be abbreviated to any
/// prefix; the first instruction it matches is used.
fn instruction(input: Span) -> IResult<Span, &'static str> {
    let (i, letters) = terminated(
        take_while_m_n(1, 7, |c: char| c.is_ascii_alphabetic()),
        not(satisfy(|c| c.is_ascii_alphabetic())),
    )(input)?;
    let letters = letters.fragment().to_ascii_uppercase();
    match INSTRUCTIONS.iter().find(|name| name.starts_with(&letters)) {
        Some(name) => Ok((i, *name)),
        None => Err(nom::Err::Error(JamError::SyntaxError)),
    }
}

fn statement(input: Span) -> IResult<Span, Statement> {
    let (i, instr) = terminated(instruction, space0)(input)?;
    match instr {
        "BOOLEAN" => map(boolean_declaration, Statement::Boolean)(i),
        "CALL" => map(terminated(name, end), Statement::Call)(i),
        "CRC" => Ok((i, Statement::Crc)),
        "DRSCAN" => drscan(i),
        "DRSTOP" => map(terminated(state_name, end), Statement::DrStop)(i),
        "EXIT" => map(terminated(or_expr, end), Statement::Exit)(i),
        "EXPORT" => map(
            terminated(separated_pair(quoted, comma, or_expr), end),
            |(key, value)| Statement::Export { key, value },
        )(i),
        "FOR" => for_statement(i),
        "GOTO" => map(terminated(name, end), Statement::Goto)(i),
        "IF" => map(
            tuple((or_expr, preceded(space0, keyword("THEN")), preceded(space0, rest))),
            |(condition, _, then): (Expr, Span, Span)| {
                Statement::If { condition, then: then.fragment().to_string() }
            },
        )(i),
        "INTEGER" => map(integer_declaration, Statement::Integer)(i),
        "IRSCAN" => map(
            terminated(separated_pair(or_expr, comma, array_arg), end),
            |(count, data)| Statement::IrScan { count, data },
        )(i),
        "IRSTOP" => map(terminated(state_name, end), Statement::IrStop)(i),
        "LET" => let_statement(i),
        "NEXT" => map(terminated(name, end), Statement::Next)(i),
        "NOTE" => Ok((i, Statement::Note)),
        "PADDING" => map(
            terminated(
                tuple((or_expr, preceded(comma, or_expr), preceded(comma, or_expr),
                       preceded(comma, or_expr))),
                end,
            ),
            |(a, b, c, d)| Statement::Padding([a, b, c, d]),
        )(i),
        "POP" => map(terminated(target, end), Statement::Pop)(i),
        "PRINT" => map(terminated(separated_list0(comma, print_item), end), Statement::Print)(i),
        "PUSH" => map(terminated(or_expr, end), Statement::Push)(i),
        "REM" => Ok((i, Statement::Rem)),
        "RETURN" => value(Statement::Return, end)(i),
        "STATE" => map(terminated(separated_list1(comma, state_name), end), Statement::State)(i),
        "VECTOR" => map(
            terminated(
                tuple((array_arg, preceded(comma, array_arg), opt(preceded(comma, scan_action)))),
                end,
            ),
            |(dir, data, action)| Statement::Vector { dir, data, action },
        )(i),
        "VMAP" => map(
            terminated(separated_list1(comma, verify(quoted, |s: &str| !s.is_empty())), end),
            Statement::Vmap,
        )(i),
        "WAIT" => map(terminated(separated_list1(comma, wait_item), end), Statement::Wait)(i),
        _ => Err(nom::Err::Error(JamError::SyntaxError)),
    }
}

fn boolean_declaration(input: Span) -> IResult<Span, Declaration> {
    declaration(input, true)
}

fn integer_declaration(input: Span) -> IResult<Span, Declaration> {
    declaration(input, false)
}

/// Parse the body of a BOOLEAN or INTEGER declaration.
fn declaration(input: Span, boolean: bool) -> IResult<Span, Declaration> {
    let (i, name) = name(input)?;
    let (i, dimension) = opt(bracketed)(i)?;
    let (i, init) = match (dimension.is_some(), boolean) {
        (false, _) => opt(preceded(assign, map(or_expr, Initializer::Scalar)))(i)?,
        (true, false) => opt(preceded(assign, list_init))(i)?,
        (true, true) => opt(preceded(assign, boolean_array_init))(i)?,
    };
    let (i, _) = end(i)?;
    Ok((i, Declaration { name, dimension, init }))
}

fn list_init(input: Span) -> IResult<Span, Initializer> {
    map(separated_list1(comma, or_expr), Initializer::List)(input)
}

fn boolean_array_init(input: Span) -> IResult<Span, Initializer> {
    alt((
        map(delimited(nom_char('"'), hex_digit1, nom_char('"')),
            |s: Span| Initializer::Hex(s.fragment().to_string())),
        map(preceded(nom_char('$'), hex_digit1),
            |s: Span| Initializer::Hex(s.fragment().to_string())),
        map(preceded(nom_char('#'), take_while1(|c: char| c == '0' || c == '1')),
            |s: Span| Initializer::Binary(s.fragment().to_string())),
        value(Initializer::Compressed, pair(one_of("%@"), take_till(|c: char| c == ';'))),
        map(terminated(bracketed_slice, peek(end)), Initializer::Array),
        list_init,
    ))(input)
}

fn drscan(input: Span) -> IResult<Span, Statement> {
    map(
        terminated(
            tuple((or_expr, preceded(comma, array_arg), opt(preceded(comma, scan_action)))),
            end,
        ),
        |(count, data, action)| Statement::DrScan { count, data, action },
    )(input)
}

/// Parse `CAPTURE array` or `COMPARE expected, mask, result`.
fn scan_action(input: Span) -> IResult<Span, ScanAction> {
    alt((
        map(preceded(pair(keyword("CAPTURE"), space0), slice), ScanAction::Capture),
        map(
            tuple((
                preceded(pair(keyword("COMPARE"), space0), array_arg),
                preceded(comma, array_arg),
                preceded(comma, name),
            )),
            |(expected, mask, result)| ScanAction::Compare { expected, mask, result },
        ),
    ))(input)
}

/// Parse `FOR var = start TO stop [STEP step];`.
fn for_statement(input: Span) -> IResult<Span, Statement> {
    map(
        terminated(
            tuple((
                name,
                preceded(assign, or_expr),
                preceded(tuple((space0, keyword("TO"), space0)), or_expr),
                opt(preceded(tuple((space0, keyword("STEP"), space0)), or_expr)),
            )),
            end,
        ),
        |(iterator, start, stop, step)| Statement::For { iterator, start, stop, step },
    )(input)
}

/// Parse either an array copy `LET a[..] = source;` or an assignment.
fn let_statement(input: Span) -> IResult<Span, Statement> {
    alt((
        map(
            terminated(separated_pair(bracketed_slice, assign, array_arg), end),
            |(target, source)| Statement::LetArray { target, source },
        ),
        map(
            terminated(separated_pair(target, assign, or_expr), end),
            |(target, value)| Statement::Let { target, value },
        ),
    ))(input)
}

fn print_item(input: Span) -> IResult<Span, PrintItem> {
    alt((
        map(quoted, PrintItem::Text),
        map(preceded(pair(tag_no_case("CHR$"), space0), or_expr), PrintItem::Chr),
        map(or_expr, PrintItem::Expr),
    ))(input)
}

/// Parse a wait state, or a count followed by CYCLES or USEC.
fn wait_item(input: Span) -> IResult<Span, WaitItem> {
    alt((
        map(terminated(state_name, peek(preceded(space0, one_of(",;")))), WaitItem::State),
        map(
            pair(
                or_expr,
                preceded(space0, alt((value(true, keyword("CYCLES")), value(false, keyword("USEC"))))),
            ),
            |(count, cycles)| if cycles {
                WaitItem::Cycles(count)
            } else {
                WaitItem::Microseconds(count)
            },
        ),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assert that parsing the input $i with the parser $p
    /// produces the remaining output $r and possibly an output $o.
    macro_rules! assert_parse {
        ($p:expr, $i:expr, $r:expr, $o:expr) => {
            match $p(Span::new($i)) {
                Ok((rem, out)) => {
                    assert_eq!(rem.fragment(), &$r);
                    assert_eq!(out, $o);
                }
                Err(e) => panic!("Parse failure: {:?}", e),
            }
        };

        ($p:expr, $i:expr, $r:expr) => {
            match $p(Span::new($i)) {
                Ok((rem, _)) => assert_eq!(rem.fragment(), &$r),
                Err(e) => panic!("Parse failure: {:?}", e),
            }
        };
    }

    /// Assert that parsing the input $i with the parser $p fails,
    /// optionally with the error $e.
    macro_rules! assert_parse_err {
        ($p:expr, $i:literal) => {
            assert!($p(Span::new($i)).is_err());
        };
        ($p:expr, $i:literal, $e:expr) => {
            assert_eq!($p(Span::new($i)).map(|(_, o)| o), Err(nom::Err::Error($e)));
        };
    }

    fn sym(name: &str) -> Expr {
        Expr::Symbol(name.to_string())
    }

    fn lit(v: i32) -> Expr {
        Expr::Literal(v)
    }

    fn bin(op: BinaryOp, a: Expr, b: Expr) -> Expr {
        Expr::Binary(op, Box::new(a), Box::new(b))
    }

    fn whole(name: &str) -> ArraySlice {
        ArraySlice { name: name.to_string(), range: None }
    }

    #[test]
    fn test_keyword() {
        assert_parse!(keyword("TO"), "TO 5", " 5");
        assert_parse_err!(keyword("TO"), "TOP");
    }

    #[test]
    fn test_name() {
        assert_parse!(name, "abc_1 = 2", " = 2", "ABC_1".to_string());
        assert_parse_err!(name, "= 2");
    }

    #[test]
    fn test_state_name() {
        assert_parse!(state_name, "IRPAUSE;", ";", State::IRPAUSE);
        assert_parse!(state_name, "drshift,", ",", State::DRSHIFT);
        assert_parse_err!(state_name, "SHIFTDR;");
    }

    #[test]
    fn test_operand() {
        assert_parse!(operand, "123+", "+", lit(123));
        assert_parse!(operand, "1ABC", "", sym("1ABC"));
        assert_parse!(operand, "a [ i + 1 ]", "",
                      Expr::Index("A".to_string(), Box::new(bin(BinaryOp::Add, sym("I"), lit(1)))));
        assert_parse!(operand, "A[0..7]", "[0..7]", sym("A"));
        assert_eq!(operand(Span::new("4294967296")).map(|(_, o)| o),
                   Err(nom::Err::Failure(JamError::IntegerOverflow)));
    }

    #[test]
    fn test_precedence() {
        assert_parse!(or_expr, "1+2*3", "", bin(BinaryOp::Add, lit(1), bin(BinaryOp::Mul, lit(2), lit(3))));
        assert_parse!(or_expr, "A || B && C", "",
                      bin(BinaryOp::Or, sym("A"), bin(BinaryOp::And, sym("B"), sym("C"))));
        assert_parse!(or_expr, "1 | 2 ^ 3 & 4", "",
                      bin(BinaryOp::BitOr, lit(1),
                          bin(BinaryOp::BitXor, lit(2), bin(BinaryOp::BitAnd, lit(3), lit(4)))));
        assert_parse!(or_expr, "1 << 2 < 3", "",
                      bin(BinaryOp::Lt, bin(BinaryOp::Shl, lit(1), lit(2)), lit(3)));
        assert_parse!(or_expr, "-X", "", Expr::Unary(UnaryOp::Neg, Box::new(sym("X"))));
        assert_parse!(or_expr, "1 TO 5", " TO 5", lit(1));
        assert_parse!(or_expr, "0..7", "..7", lit(0));
        assert_parse!(or_expr, "CEIL(N / 2)", "",
                      Expr::Call(Function::Ceil, Box::new(bin(BinaryOp::Div, sym("N"), lit(2)))));
        assert_parse!(or_expr, "ABSENT", "", sym("ABSENT"));
    }

    #[test]
    fn test_parse_expression() {
        assert_eq!(parse_expression(" 2 + 2 "), Ok(bin(BinaryOp::Add, lit(2), lit(2))));
        assert_eq!(parse_expression("2 +"), Err(JamError::SyntaxError));
        assert_eq!(parse_expression("(1"), Err(JamError::SyntaxError));
        assert_eq!(parse_expression("2147483648"), Err(JamError::IntegerOverflow));
    }

    #[test]
    fn test_array_arg() {
        assert_parse!(array_arg, "0A5;", ";", ArrayArg::Literal { bits: vec![0x0A5], length: 12 });
        assert_parse!(array_arg, "123456789;", ";",
                      ArrayArg::Literal { bits: vec![0x2345_6789, 0x1], length: 36 });
        assert_parse!(array_arg, "X[];", ";", ArrayArg::Slice(whole("X")));
        assert_parse!(array_arg, "X;", ";", ArrayArg::Slice(whole("X")));
        assert_parse!(array_arg, "X[ 2 .. N-1 ];", ";", ArrayArg::Slice(ArraySlice {
            name: "X".to_string(),
            range: Some((lit(2), bin(BinaryOp::Sub, sym("N"), lit(1)))),
        }));
    }

    #[test]
    fn test_instruction() {
        assert_parse!(instruction, "PRINT \"x\";", " \"x\";", "PRINT");
        assert_parse!(instruction, "DRS 8, 0;", " 8, 0;", "DRSCAN");
        assert_parse!(instruction, "I = 5;", " = 5;", "IF");
        assert_parse!(instruction, "EXIT0;", "0;", "EXIT");
        assert_parse_err!(instruction, "BOOLEANS X;", JamError::SyntaxError);
        assert_parse_err!(instruction, "XYZ;", JamError::SyntaxError);
    }

    #[test]
    fn test_declarations() {
        assert_eq!(parse_statement("INTEGER I;"), Ok(Statement::Integer(Declaration {
            name: "I".to_string(), dimension: None, init: None,
        })));
        assert_eq!(parse_statement("BOOLEAN B = 1 & C;"), Ok(Statement::Boolean(Declaration {
            name: "B".to_string(),
            dimension: None,
            init: Some(Initializer::Scalar(bin(BinaryOp::BitAnd, lit(1), sym("C")))),
        })));
        assert_eq!(parse_statement("INTEGER A[3] = 1, 2, 3;"), Ok(Statement::Integer(Declaration {
            name: "A".to_string(),
            dimension: Some(lit(3)),
            init: Some(Initializer::List(vec![lit(1), lit(2), lit(3)])),
        })));

        let init = |body| match parse_statement(body) {
            Ok(Statement::Boolean(Declaration { init, .. })) => init,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(init("BOOLEAN X[8] = \"a5\";"), Some(Initializer::Hex("a5".to_string())));
        assert_eq!(init("BOOLEAN X[8] = $A5;"), Some(Initializer::Hex("A5".to_string())));
        assert_eq!(init("BOOLEAN X[4] = #0101;"), Some(Initializer::Binary("0101".to_string())));
        assert_eq!(init("BOOLEAN X[4] = %abc;"), Some(Initializer::Compressed));
        assert_eq!(init("BOOLEAN X[4] = y[];"), Some(Initializer::Array(whole("Y"))));
        assert_eq!(init("BOOLEAN X[4] = Y;"), Some(Initializer::List(vec![sym("Y")])));
        assert_eq!(init("BOOLEAN X[2] = Y[1], 0;"), Some(Initializer::List(vec![
            Expr::Index("Y".to_string(), Box::new(lit(1))), lit(0),
        ])));
        assert_eq!(init("BOOLEAN X[8];"), None);
        assert_eq!(parse_statement("BOOLEAN X[8] =;"), Err(JamError::SyntaxError));
    }

    #[test]
    fn test_scans() {
        assert_eq!(parse_statement("IRSCAN 10, 3FF;"), Ok(Statement::IrScan {
            count: lit(10),
            data: ArrayArg::Literal { bits: vec![0x3FF], length: 12 },
        }));
        assert_eq!(parse_statement("DRSCAN 8, D[0..7], CAPTURE Q[8..15];"), Ok(Statement::DrScan {
            count: lit(8),
            data: ArrayArg::Slice(ArraySlice { name: "D".to_string(), range: Some((lit(0), lit(7))) }),
            action: Some(ScanAction::Capture(ArraySlice {
                name: "Q".to_string(), range: Some((lit(8), lit(15))),
            })),
        }));
        assert_eq!(parse_statement("DRSCAN 4, 0, COMPARE 5, F, OK;"), Ok(Statement::DrScan {
            count: lit(4),
            data: ArrayArg::Literal { bits: vec![0], length: 4 },
            action: Some(ScanAction::Compare {
                expected: ArrayArg::Literal { bits: vec![5], length: 4 },
                mask: ArrayArg::Slice(whole("F")),
                result: "OK".to_string(),
            }),
        }));
        assert_eq!(parse_statement("DRSCAN 4, 0, CAPTURE;"), Err(JamError::SyntaxError));
        assert_eq!(parse_statement("IRSCAN 4;"), Err(JamError::SyntaxError));
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(parse_statement("GOTO done;"), Ok(Statement::Goto("DONE".to_string())));
        assert_eq!(parse_statement("CALL SUB ;"), Ok(Statement::Call("SUB".to_string())));
        assert_eq!(parse_statement("RETURN;"), Ok(Statement::Return));
        assert_eq!(parse_statement("RETURN 1;"), Err(JamError::SyntaxError));
        assert_eq!(parse_statement("FOR I = 1 TO N STEP -1;"), Ok(Statement::For {
            iterator: "I".to_string(),
            start: lit(1),
            stop: sym("N"),
            step: Some(Expr::Unary(UnaryOp::Neg, Box::new(lit(1)))),
        }));
        assert_eq!(parse_statement("FOR I = 0 TO 3;"), Ok(Statement::For {
            iterator: "I".to_string(), start: lit(0), stop: lit(3), step: None,
        }));
        assert_eq!(parse_statement("NEXT I;"), Ok(Statement::Next("I".to_string())));
        assert_eq!(parse_statement("IF A == 2 THEN GOTO X;"), Ok(Statement::If {
            condition: bin(BinaryOp::Eq, sym("A"), lit(2)),
            then: "GOTO X;".to_string(),
        }));
        assert_eq!(parse_statement("IF A GOTO X;"), Err(JamError::SyntaxError));
        assert_eq!(parse_statement("EXIT 3;"), Ok(Statement::Exit(lit(3))));
        assert_eq!(parse_statement("EXIT;"), Err(JamError::SyntaxError));
    }

    #[test]
    fn test_assignments() {
        assert_eq!(parse_statement("LET A = A + 1;"), Ok(Statement::Let {
            target: Target::Scalar("A".to_string()),
            value: bin(BinaryOp::Add, sym("A"), lit(1)),
        }));
        assert_eq!(parse_statement("LET A[3] = 1 == 1;"), Ok(Statement::Let {
            target: Target::Element("A".to_string(), lit(3)),
            value: bin(BinaryOp::Eq, lit(1), lit(1)),
        }));
        assert_eq!(parse_statement("LET A[] = B[4..7];"), Ok(Statement::LetArray {
            target: whole("A"),
            source: ArrayArg::Slice(ArraySlice {
                name: "B".to_string(), range: Some((lit(4), lit(7))),
            }),
        }));
        assert_eq!(parse_statement("LET A == 1;"), Err(JamError::SyntaxError));
        assert_eq!(parse_statement("PUSH 5;"), Ok(Statement::Push(lit(5))));
        assert_eq!(parse_statement("POP A[1];"),
                   Ok(Statement::Pop(Target::Element("A".to_string(), lit(1)))));
    }

    #[test]
    fn test_output() {
        assert_eq!(parse_statement("PRINT \"X=\", 5, CHR$(65);"), Ok(Statement::Print(vec![
            PrintItem::Text("X=".to_string()),
            PrintItem::Expr(lit(5)),
            PrintItem::Chr(lit(65)),
        ])));
        assert_eq!(parse_statement("PRINT;"), Ok(Statement::Print(vec![])));
        assert_eq!(parse_statement("PRINT \"a\" \"b\";"), Err(JamError::SyntaxError));
        assert_eq!(parse_statement("EXPORT \"key\", 1;"), Ok(Statement::Export {
            key: "key".to_string(), value: lit(1),
        }));
        assert_eq!(parse_statement("NOTE anything at all;"), Ok(Statement::Note));
        assert_eq!(parse_statement("REM;"), Ok(Statement::Rem));
        assert_eq!(parse_statement("CRC 1234;"), Ok(Statement::Crc));
    }

    #[test]
    fn test_jtag_statements() {
        assert_eq!(parse_statement("STATE RESET, IDLE;"),
                   Ok(Statement::State(vec![State::RESET, State::IDLE])));
        assert_eq!(parse_statement("STATE;"), Err(JamError::SyntaxError));
        assert_eq!(parse_statement("DRSTOP DRPAUSE;"), Ok(Statement::DrStop(State::DRPAUSE)));
        assert_eq!(parse_statement("IRSTOP NOWHERE;"), Err(JamError::SyntaxError));
        assert!(matches!(parse_statement("PADDING 1, 2, 3, 4;"), Ok(Statement::Padding(_))));
        assert_eq!(parse_statement("PADDING 1, 2, 3;"), Err(JamError::SyntaxError));
        assert_eq!(parse_statement("WAIT IDLE, 10 CYCLES, 5 USEC, DRPAUSE;"), Ok(Statement::Wait(vec![
            WaitItem::State(State::IDLE),
            WaitItem::Cycles(lit(10)),
            WaitItem::Microseconds(lit(5)),
            WaitItem::State(State::DRPAUSE),
        ])));
        assert_eq!(parse_statement("WAIT 10;"), Err(JamError::SyntaxError));
    }

    #[test]
    fn test_vectors() {
        assert_eq!(parse_statement("VMAP \"TCK\", \"TDI\";"),
                   Ok(Statement::Vmap(vec!["TCK".to_string(), "TDI".to_string()])));
        assert_eq!(parse_statement("VMAP \"\";"), Err(JamError::SyntaxError));
        assert_eq!(parse_statement("VECTOR 3, D;"), Ok(Statement::Vector {
            dir: ArrayArg::Literal { bits: vec![3], length: 4 },
            data: ArrayArg::Slice(whole("D")),
            action: None,
        }));
    }

    #[test]
    fn test_note_and_crc() {
        assert_eq!(parse_note("NOTE \"DEVICE\" \"EPM7128S\";"),
                   Ok(("DEVICE".to_string(), "EPM7128S".to_string())));
        assert_eq!(parse_note("NOTE CREATOR \"me\";"),
                   Ok(("CREATOR".to_string(), "me".to_string())));
        assert_eq!(parse_note("NOTE \"X\";"), Err(JamError::SyntaxError));
        assert_eq!(parse_crc("CRC 9A3F;"), Ok(0x9A3F));
        assert_eq!(parse_crc("CRC 9A3;"), Err(JamError::SyntaxError));
    }

    #[test]
    fn test_hex_bits() {
        assert_eq!(hex_bits("A5"), (vec![0xA5], 8));
        assert_eq!(hex_bits("1FFFFFFFF"), (vec![0xFFFF_FFFF, 1], 36));
        assert_eq!(hex_bits(""), (vec![], 0));
    }
}
