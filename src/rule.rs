// src/rule.rs - Allow-listed rule expression evaluator
//
// Rules are boolean expressions over snapshot fields, e.g.
// "outTemp >= 30.0" or "int(txBatteryStatus) & 0x02". The grammar is a
// narrow, fixed subset: literals, snapshot identifiers, a small built-in
// function set, and arithmetic/bitwise/comparison/boolean operators.
// There is deliberately no host evaluation, no assignment, and no access
// to anything outside the snapshot.
//
// Rules parse to a small AST which is then walked against the snapshot.
// `or`/`and` short-circuit, so guard idioms like
// "outTemp != 0 and 10 / outTemp > 1" never evaluate the guarded side.

use crate::error::{AlarmError, Result};
use crate::snapshot::Snapshot;
use crate::value::Value;

/// Functions callable from a rule. All pure, all total over their
/// accepted input types.
const BUILTINS: &[(&str, usize)] = &[
    ("int", 1),
    ("float", 1),
    ("abs", 1),
    ("bool", 1),
    ("min", 2),
    ("max", 2),
];

/// Evaluate a rule against a snapshot, reducing the result to a boolean
/// by truthiness. Any lex, parse, or runtime problem comes back as
/// [`AlarmError::Eval`] carrying the rule text.
pub fn evaluate(rule: &str, snapshot: &Snapshot) -> Result<bool> {
    let expr = parse(rule).map_err(|reason| AlarmError::eval(rule, reason))?;
    let value = eval(&expr, snapshot).map_err(|reason| AlarmError::eval(rule, reason))?;
    Ok(value.as_bool())
}

fn parse(rule: &str) -> std::result::Result<Expr, String> {
    let tokens = lex(rule)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression()?;
    parser.expect_end()?;
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Or,
    And,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Tilde,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Neg,
    BitNot,
    Not,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Var(String),
    Call(&'static str, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
}

type LexResult = std::result::Result<Vec<Token>, String>;
type ParseResult = std::result::Result<Expr, String>;
type EvalResult = std::result::Result<Value, String>;

fn lex(input: &str) -> LexResult {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '~' => {
                chars.next();
                tokens.push(Token::Tilde);
            }
            '^' => {
                chars.next();
                tokens.push(Token::BitXor);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Eq);
                } else {
                    return Err("assignment '=' not allowed (use '==')".into());
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Token::Le);
                    }
                    Some('<') => {
                        chars.next();
                        tokens.push(Token::Shl);
                    }
                    _ => tokens.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Token::Ge);
                    }
                    Some('>') => {
                        chars.next();
                        tokens.push(Token::Shr);
                    }
                    _ => tokens.push(Token::Gt),
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::Or);
                } else {
                    tokens.push(Token::BitOr);
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::And);
                } else {
                    tokens.push(Token::BitAnd);
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(e) if e == quote || e == '\\' => s.push(e),
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(e) => {
                                s.push('\\');
                                s.push(e);
                            }
                            None => return Err("unterminated string literal".into()),
                        },
                        Some(e) if e == quote => break,
                        Some(e) => s.push(e),
                        None => return Err("unterminated string literal".into()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' | '.' => {
                tokens.push(lex_number(&mut chars)?);
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match name.as_str() {
                    "or" => Token::Or,
                    "and" => Token::And,
                    "not" => Token::Not,
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    _ => Token::Ident(name),
                });
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

fn lex_number(chars: &mut std::iter::Peekable<std::str::Chars>) -> std::result::Result<Token, String> {
    let mut text = String::new();

    // hex literal, e.g. bitmask constants like 0x02
    if chars.peek() == Some(&'0') {
        text.push('0');
        chars.next();
        if matches!(chars.peek(), Some('x') | Some('X')) {
            chars.next();
            let mut hex = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_ascii_hexdigit() {
                    hex.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if hex.is_empty() {
                return Err("malformed hex literal".into());
            }
            return i64::from_str_radix(&hex, 16)
                .map(Token::Int)
                .map_err(|_| format!("hex literal out of range: 0x{}", hex));
        }
    }

    let mut is_float = false;
    while let Some(&ch) = chars.peek() {
        match ch {
            '0'..='9' => {
                text.push(ch);
                chars.next();
            }
            '.' => {
                if is_float {
                    break;
                }
                is_float = true;
                text.push(ch);
                chars.next();
            }
            'e' | 'E' => {
                is_float = true;
                text.push(ch);
                chars.next();
                if let Some(&sign @ ('+' | '-')) = chars.peek() {
                    text.push(sign);
                    chars.next();
                }
            }
            _ => break,
        }
    }

    if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| format!("malformed number '{}'", text))
    } else {
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|_| format!("malformed number '{}'", text))
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, t: &Token) -> bool {
        if self.peek() == Some(t) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_end(&self) -> std::result::Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(format!("unexpected trailing input near {:?}", t)),
        }
    }

    // or_expr := and_expr ('or' and_expr)*
    fn expression(&mut self) -> ParseResult {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::Or) {
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> ParseResult {
        let mut lhs = self.not_expr()?;
        while self.eat(&Token::And) {
            let rhs = self.not_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> ParseResult {
        if self.eat(&Token::Not) {
            let v = self.not_expr()?;
            Ok(Expr::Unary(UnaryOp::Not, Box::new(v)))
        } else {
            self.comparison()
        }
    }

    // single comparison, no chaining
    fn comparison(&mut self) -> ParseResult {
        let lhs = self.bit_or()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.bit_or()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn bit_or(&mut self) -> ParseResult {
        let mut lhs = self.bit_xor()?;
        while self.eat(&Token::BitOr) {
            let rhs = self.bit_xor()?;
            lhs = Expr::Binary(BinOp::BitOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bit_xor(&mut self) -> ParseResult {
        let mut lhs = self.bit_and()?;
        while self.eat(&Token::BitXor) {
            let rhs = self.bit_and()?;
            lhs = Expr::Binary(BinOp::BitXor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bit_and(&mut self) -> ParseResult {
        let mut lhs = self.shift()?;
        while self.eat(&Token::BitAnd) {
            let rhs = self.shift()?;
            lhs = Expr::Binary(BinOp::BitAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn shift(&mut self) -> ParseResult {
        let mut lhs = self.additive()?;
        loop {
            let op = if self.eat(&Token::Shl) {
                BinOp::Shl
            } else if self.eat(&Token::Shr) {
                BinOp::Shr
            } else {
                return Ok(lhs);
            };
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive(&mut self) -> ParseResult {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinOp::Add
            } else if self.eat(&Token::Minus) {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> ParseResult {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat(&Token::Star) {
                BinOp::Mul
            } else if self.eat(&Token::Slash) {
                BinOp::Div
            } else if self.eat(&Token::Percent) {
                BinOp::Rem
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> ParseResult {
        if self.eat(&Token::Minus) {
            let v = self.unary()?;
            Ok(Expr::Unary(UnaryOp::Neg, Box::new(v)))
        } else if self.eat(&Token::Tilde) {
            let v = self.unary()?;
            Ok(Expr::Unary(UnaryOp::BitNot, Box::new(v)))
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> ParseResult {
        match self.advance() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::LParen) => {
                let v = self.expression()?;
                if self.eat(&Token::RParen) {
                    Ok(v)
                } else {
                    Err("missing closing parenthesis".into())
                }
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    self.call(&name)
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(t) => Err(format!("unexpected token {:?}", t)),
            None => Err("unexpected end of expression".into()),
        }
    }

    // function name and arity are static properties, checked at parse time
    fn call(&mut self, name: &str) -> ParseResult {
        let Some(&(builtin, arity)) = BUILTINS.iter().find(|(n, _)| *n == name) else {
            return Err(format!("unknown function '{}'", name));
        };

        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                if self.eat(&Token::RParen) {
                    break;
                }
                return Err(format!("malformed argument list for '{}'", name));
            }
        }

        if args.len() != arity {
            return Err(format!(
                "'{}' expects {} argument(s), got {}",
                name,
                arity,
                args.len()
            ));
        }

        Ok(Expr::Call(builtin, args))
    }
}

fn eval(expr: &Expr, snapshot: &Snapshot) -> EvalResult {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) => match snapshot.get(name) {
            Some(v) => Ok(v.clone()),
            None => Err(format!("undefined variable '{}'", name)),
        },
        // short-circuit: the right side is untouched when the left
        // decides, so guards protect undefined fields and division
        Expr::Or(lhs, rhs) => {
            if eval(lhs, snapshot)?.as_bool() {
                Ok(Value::Bool(true))
            } else {
                Ok(Value::Bool(eval(rhs, snapshot)?.as_bool()))
            }
        }
        Expr::And(lhs, rhs) => {
            if !eval(lhs, snapshot)?.as_bool() {
                Ok(Value::Bool(false))
            } else {
                Ok(Value::Bool(eval(rhs, snapshot)?.as_bool()))
            }
        }
        Expr::Unary(op, inner) => {
            let v = eval(inner, snapshot)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.as_bool())),
                UnaryOp::BitNot => Ok(Value::Int(!int_operand(&v, "~")?)),
                UnaryOp::Neg => match v {
                    Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    Value::Bool(b) => Ok(Value::Int(-(b as i64))),
                    other => Err(type_error("unary -", &other)),
                },
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let a = eval(lhs, snapshot)?;
            let b = eval(rhs, snapshot)?;
            binary(*op, &a, &b)
        }
        Expr::Call(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, snapshot)?);
            }
            builtin(name, &values)
        }
    }
}

fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> EvalResult {
    match op {
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            compare(op, lhs, rhs)
        }
        BinOp::BitOr => Ok(Value::Int(int_operand(lhs, "|")? | int_operand(rhs, "|")?)),
        BinOp::BitXor => Ok(Value::Int(int_operand(lhs, "^")? ^ int_operand(rhs, "^")?)),
        BinOp::BitAnd => Ok(Value::Int(int_operand(lhs, "&")? & int_operand(rhs, "&")?)),
        BinOp::Shl | BinOp::Shr => {
            let a = int_operand(lhs, "shift")?;
            let b = int_operand(rhs, "shift")?;
            if !(0..64).contains(&b) {
                return Err(format!("shift amount {} out of range", b));
            }
            Ok(Value::Int(if op == BinOp::Shl { a << b } else { a >> b }))
        }
        BinOp::Add => add(lhs, rhs),
        BinOp::Sub => numeric_op(lhs, rhs, "-", |a, b| a - b, |a, b| Some(a.wrapping_sub(b))),
        BinOp::Mul => numeric_op(lhs, rhs, "*", |a, b| a * b, |a, b| Some(a.wrapping_mul(b))),
        BinOp::Div => {
            let b = rhs.as_float().ok_or_else(|| type_error("/", rhs))?;
            if b == 0.0 {
                return Err("division by zero".into());
            }
            let a = lhs.as_float().ok_or_else(|| type_error("/", lhs))?;
            Ok(Value::Float(a / b))
        }
        BinOp::Rem => numeric_op(
            lhs,
            rhs,
            "%",
            |a, b| a % b,
            // wrapping_rem: i64::MIN % -1 is 0, not an overflow trap
            |a, b| if b == 0 { None } else { Some(a.wrapping_rem(b)) },
        ),
    }
}

fn builtin(name: &str, args: &[Value]) -> EvalResult {
    match name {
        "int" => args[0]
            .as_int()
            .map(Value::Int)
            .ok_or_else(|| format!("cannot convert {} to int", args[0].type_name())),
        "float" => args[0]
            .as_float()
            .map(Value::Float)
            .ok_or_else(|| format!("cannot convert {} to float", args[0].type_name())),
        "bool" => Ok(Value::Bool(args[0].as_bool())),
        "abs" => match &args[0] {
            Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            Value::Bool(b) => Ok(Value::Int(*b as i64)),
            other => Err(type_error("abs", other)),
        },
        "min" | "max" => {
            let a = args[0]
                .as_float()
                .ok_or_else(|| type_error(name, &args[0]))?;
            let b = args[1]
                .as_float()
                .ok_or_else(|| type_error(name, &args[1]))?;
            let pick_first = if name == "min" { a <= b } else { a >= b };
            Ok(if pick_first {
                args[0].clone()
            } else {
                args[1].clone()
            })
        }
        _ => unreachable!("allow-list checked at parse time"),
    }
}

fn type_error(op: &str, v: &Value) -> String {
    format!("unsupported operand type {} for '{}'", v.type_name(), op)
}

/// Bitwise and shift operators accept only integral operands.
fn int_operand(v: &Value, op: &str) -> std::result::Result<i64, String> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(*b as i64),
        other => Err(type_error(op, other)),
    }
}

fn add(lhs: &Value, rhs: &Value) -> EvalResult {
    if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
        return Ok(Value::Str(format!("{}{}", a, b)));
    }
    numeric_op(lhs, rhs, "+", |a, b| a + b, |a, b| Some(a.wrapping_add(b)))
}

/// Int op when both operands are integral, float op otherwise.
fn numeric_op(
    lhs: &Value,
    rhs: &Value,
    op: &str,
    float_op: fn(f64, f64) -> f64,
    int_op: fn(i64, i64) -> Option<i64>,
) -> EvalResult {
    match (lhs, rhs) {
        (Value::Float(_), _) | (_, Value::Float(_)) => {
            let a = lhs.as_float().ok_or_else(|| type_error(op, lhs))?;
            let b = rhs.as_float().ok_or_else(|| type_error(op, rhs))?;
            Ok(Value::Float(float_op(a, b)))
        }
        _ => {
            let a = int_operand(lhs, op)?;
            let b = int_operand(rhs, op)?;
            int_op(a, b)
                .map(Value::Int)
                .ok_or_else(|| "division by zero".to_string())
        }
    }
}

fn compare(op: BinOp, lhs: &Value, rhs: &Value) -> EvalResult {
    // string/string compares lexically; anything numeric compares as float;
    // equality between incomparable types is simply false
    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Str(_), _) | (_, Value::Str(_)) => None,
        _ => {
            let a = lhs.as_float().ok_or_else(|| type_error("compare", lhs))?;
            let b = rhs.as_float().ok_or_else(|| type_error("compare", rhs))?;
            a.partial_cmp(&b)
        }
    };

    let result = match (op, ordering) {
        (BinOp::Eq, Some(ord)) => ord == std::cmp::Ordering::Equal,
        (BinOp::Ne, Some(ord)) => ord != std::cmp::Ordering::Equal,
        (BinOp::Eq, None) => false,
        (BinOp::Ne, None) => true,
        (_, None) => {
            return Err(format!(
                "cannot order {} against {}",
                lhs.type_name(),
                rhs.type_name()
            ))
        }
        (BinOp::Lt, Some(ord)) => ord == std::cmp::Ordering::Less,
        (BinOp::Le, Some(ord)) => ord != std::cmp::Ordering::Greater,
        (BinOp::Gt, Some(ord)) => ord == std::cmp::Ordering::Greater,
        (BinOp::Ge, Some(ord)) => ord != std::cmp::Ordering::Less,
        _ => unreachable!("comparison op checked by caller"),
    };
    Ok(Value::Bool(result))
}
