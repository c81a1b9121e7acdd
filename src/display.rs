// Copyright 2021 Adam Greig
// Licensed under the MIT license.

use std::fmt;

use super::{ExprType, State, SymbolKind};
use crate::expr::{BinaryOp, Expr, Function, UnaryOp};
use crate::parser::{
    ArrayArg,
    ArraySlice,
    Declaration,
    Initializer,
    PrintItem,
    ScanAction,
    Statement,
    Target,
    WaitItem,
};

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            SymbolKind::Label => "label",
            SymbolKind::Integer => "integer",
            SymbolKind::Boolean => "Boolean",
            SymbolKind::IntegerArrayWritable => "integer array",
            SymbolKind::IntegerArrayInitialized => "initialized integer array",
            SymbolKind::BooleanArrayWritable => "Boolean array",
            SymbolKind::BooleanArrayInitialized => "initialized Boolean array",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ExprType::Integer => "integer",
            ExprType::Boolean => "Boolean",
            ExprType::IntOrBool => "integer or Boolean",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_ascii_uppercase())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Symbol(name) => write!(f, "{}", name),
            Expr::Index(name, index) => write!(f, "{}[{}]", name, index),
            Expr::Unary(op, e) => write!(f, "{}{}", op, e),
            // Binary expressions are always bracketed so precedence is explicit.
            Expr::Binary(op, a, b) => write!(f, "({} {} {})", a, op, b),
            Expr::Call(func, e) => write!(f, "{}({})", func, e),
        }
    }
}

impl fmt::Display for ArraySlice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.range {
            Some((a, b)) => write!(f, "{}[{}..{}]", self.name, a, b),
            None => write!(f, "{}[]", self.name),
        }
    }
}

impl fmt::Display for ArrayArg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArrayArg::Literal { bits, length } => {
                // Literals always start with a digit, so keep the leading zero nibble.
                write!(f, "0")?;
                for digit in (0..(*length as usize + 3) / 4).rev() {
                    let word = bits.get(digit / 8).copied().unwrap_or(0);
                    write!(f, "{:X}", (word >> ((digit % 8) * 4)) & 0xF)?;
                }
                Ok(())
            },
            ArrayArg::Slice(slice) => slice.fmt(f),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Target::Scalar(name) => write!(f, "{}", name),
            Target::Element(name, index) => write!(f, "{}[{}]", name, index),
        }
    }
}

impl fmt::Display for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Initializer::Scalar(e) => write!(f, "{}", e),
            Initializer::Hex(text) => write!(f, "${}", text),
            Initializer::Binary(text) => write!(f, "#{}", text),
            Initializer::Compressed => write!(f, "@..."),
            Initializer::Array(slice) => write!(f, "{}", slice),
            Initializer::List(list) => write_list(f, list),
        }
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(dim) = &self.dimension {
            write!(f, "[{}]", dim)?;
        }
        if let Some(init) = &self.init {
            write!(f, " = {}", init)?;
        }
        Ok(())
    }
}

impl fmt::Display for ScanAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScanAction::Capture(slice) => write!(f, "CAPTURE {}", slice),
            ScanAction::Compare { expected, mask, result } =>
                write!(f, "COMPARE {}, {}, {}", expected, mask, result),
        }
    }
}

impl fmt::Display for PrintItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrintItem::Text(text) => write!(f, "\"{}\"", text),
            PrintItem::Chr(e) => write!(f, "CHR$({})", e),
            PrintItem::Expr(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for WaitItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WaitItem::State(state) => write!(f, "{}", state),
            WaitItem::Cycles(e) => write!(f, "{} CYCLES", e),
            WaitItem::Microseconds(e) => write!(f, "{} USEC", e),
        }
    }
}

/// Write items separated by commas.
fn write_list<T: fmt::Display>(f: &mut fmt::Formatter, items: &[T]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Statement::Boolean(decl) => write!(f, "BOOLEAN {};", decl),
            Statement::Call(label) => write!(f, "CALL {};", label),
            Statement::Crc => write!(f, "CRC;"),
            Statement::DrScan { count, data, action } => {
                write!(f, "DRSCAN {}, {}", count, data)?;
                if let Some(action) = action {
                    write!(f, ", {}", action)?;
                }
                write!(f, ";")
            },
            Statement::DrStop(state) => write!(f, "DRSTOP {};", state),
            Statement::Exit(code) => write!(f, "EXIT {};", code),
            Statement::Export { key, value } => write!(f, "EXPORT \"{}\", {};", key, value),
            Statement::For { iterator, start, stop, step } => {
                write!(f, "FOR {} = {} TO {}", iterator, start, stop)?;
                if let Some(step) = step {
                    write!(f, " STEP {}", step)?;
                }
                write!(f, ";")
            },
            Statement::Goto(label) => write!(f, "GOTO {};", label),
            Statement::If { condition, then } => write!(f, "IF {} THEN {}", condition, then),
            Statement::Integer(decl) => write!(f, "INTEGER {};", decl),
            Statement::IrScan { count, data } => write!(f, "IRSCAN {}, {};", count, data),
            Statement::IrStop(state) => write!(f, "IRSTOP {};", state),
            Statement::Let { target, value } => write!(f, "LET {} = {};", target, value),
            Statement::LetArray { target, source } => write!(f, "LET {} = {};", target, source),
            Statement::Next(name) => write!(f, "NEXT {};", name),
            Statement::Note => write!(f, "NOTE;"),
            Statement::Padding(values) => {
                write!(f, "PADDING ")?;
                write_list(f, values)?;
                write!(f, ";")
            },
            Statement::Pop(target) => write!(f, "POP {};", target),
            Statement::Print(items) => {
                write!(f, "PRINT ")?;
                write_list(f, items)?;
                write!(f, ";")
            },
            Statement::Push(value) => write!(f, "PUSH {};", value),
            Statement::Rem => write!(f, "REM;"),
            Statement::Return => write!(f, "RETURN;"),
            Statement::State(path) => {
                write!(f, "STATE ")?;
                write_list(f, path)?;
                write!(f, ";")
            },
            Statement::Vector { dir, data, action } => {
                write!(f, "VECTOR {}, {}", dir, data)?;
                if let Some(action) = action {
                    write!(f, ", {}", action)?;
                }
                write!(f, ";")
            },
            Statement::Vmap(names) => {
                write!(f, "VMAP ")?;
                for (idx, name) in names.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\"", name)?;
                }
                write!(f, ";")
            },
            Statement::Wait(items) => {
                write!(f, "WAIT ")?;
                write_list(f, items)?;
                write!(f, ";")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse_statement;

    /// Parse `text` and display the resulting statement.
    fn redisplay(text: &str) -> String {
        format!("{}", parse_statement(text).unwrap())
    }

    #[test]
    fn test_display_state() {
        assert_eq!(format!("{}", super::State::DRPAUSE), "DRPAUSE");
        assert_eq!(format!("{}", super::SymbolKind::BooleanArrayWritable), "Boolean array");
    }

    #[test]
    fn test_display_expressions() {
        assert_eq!(redisplay("LET A = 1+2*B[I];"), "LET A = (1 + (2 * B[I]));");
        assert_eq!(redisplay("PUSH !(X == 1) && CEIL(N/2);"), "PUSH (!(X == 1) && CEIL((N / 2)));");
    }

    #[test]
    fn test_display_statements() {
        assert_eq!(redisplay("DRSCAN 8,D[0..7],CAPTURE Q[];"), "DRSCAN 8, D[0..7], CAPTURE Q[];");
        assert_eq!(redisplay("IRSCAN 10, 3FF;"), "IRSCAN 10, 03FF;");
        assert_eq!(redisplay("WAIT IDLE,10 CYCLES;"), "WAIT IDLE, 10 CYCLES;");
        assert_eq!(redisplay("PRINT \"N=\",N,CHR$(10);"), "PRINT \"N=\", N, CHR$(10);");
        assert_eq!(redisplay("BOOLEAN X[8] = $a5;"), "BOOLEAN X[8] = $a5;");
        assert_eq!(redisplay("FOR I = 0 TO 3 STEP 2;"), "FOR I = 0 TO 3 STEP 2;");
        assert_eq!(redisplay("VMAP \"TCK\",\"TDI\";"), "VMAP \"TCK\", \"TDI\";");
    }
}
