//! Expression syntax shared by the translator and the interpreted right-hand side.
//!
//! Model equations reference species through positional markers (`__s0`,
//! `__s12`) and parameters by name. After translation every reference is a
//! slot in one of two flat arrays, `y[i]` for the state and `p[j]` for the
//! parameters, and the tree renders to text that is both valid Rust and valid
//! input for [`parse_assignments`].

use std::fmt;

/// Prefix of a positional species marker, followed by the species index.
pub const SPECIES_MARKER: &str = "__s";

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Ident(String),         // e.g. k1, t
    Species(usize),        // __s3
    Index {                // y[0], p[2] before they are resolved
        array: String,
        index: usize,
    },
    State(usize),
    Param(usize),
    Time,
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "^",
        }
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Pow => a.powf(b),
        }
    }
}

/// Builtin functions understood by both derivative paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Sin,
    Cos,
    Tan,
    Pow,
    Min,
    Max,
}

/// Every accepted function name with its arity.
pub const FUNCTIONS: &[(&str, usize)] = &[
    ("exp", 1),
    ("log", 1),
    ("ln", 1),
    ("log10", 1),
    ("sqrt", 1),
    ("abs", 1),
    ("sin", 1),
    ("cos", 1),
    ("tan", 1),
    ("pow", 2),
    ("min", 2),
    ("max", 2),
];

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let func = match name {
            "exp" => Function::Exp,
            "log" | "ln" => Function::Ln,
            "log10" => Function::Log10,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "pow" => Function::Pow,
            "min" => Function::Min,
            "max" => Function::Max,
            _ => return None,
        };
        Some(func)
    }

    pub fn arity(self) -> usize {
        match self {
            Function::Pow | Function::Min | Function::Max => 2,
            _ => 1,
        }
    }

    /// Apply to `a` (and `b` for binary functions).
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Function::Exp => a.exp(),
            Function::Ln => a.ln(),
            Function::Log10 => a.log10(),
            Function::Sqrt => a.sqrt(),
            Function::Abs => a.abs(),
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Pow => a.powf(b),
            Function::Min => a.min(b),
            Function::Max => a.max(b),
        }
    }
}

/// Evaluate a builtin by name; `None` for unknown names or a wrong arity.
pub fn call(name: &str, args: &[f64]) -> Option<f64> {
    let func = Function::from_name(name)?;
    match (func.arity(), args) {
        (1, [a]) => Some(func.apply(*a, 0.0)),
        (2, [a, b]) => Some(func.apply(*a, *b)),
        _ => None,
    }
}

impl Expr {
    /// Rebuild the tree bottom-up, passing every node through `f` after its
    /// children have been rewritten.
    pub fn rewrite<E, F>(self, f: &mut F) -> Result<Expr, E>
    where
        F: FnMut(Expr) -> Result<Expr, E>,
    {
        let node = match self {
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.rewrite(f)?)),
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op,
                lhs: Box::new(lhs.rewrite(f)?),
                rhs: Box::new(rhs.rewrite(f)?),
            },
            Expr::Call { name, args } => {
                let mut rewritten = Vec::with_capacity(args.len());
                for arg in args {
                    rewritten.push(arg.rewrite(f)?);
                }
                Expr::Call {
                    name,
                    args: rewritten,
                }
            }
            leaf => leaf,
        };
        f(node)
    }

    /// Visit every node, parents before children.
    pub fn visit<F>(&self, f: &mut F)
    where
        F: FnMut(&Expr),
    {
        f(self);
        match self {
            Expr::Neg(inner) => inner.visit(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.visit(f);
                }
            }
            _ => {}
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary {
                op: BinOp::Add | BinOp::Sub,
                ..
            } => 1,
            Expr::Binary {
                op: BinOp::Mul | BinOp::Div,
                ..
            } => 2,
            Expr::Neg(_) => 3,
            Expr::Number(v) if v.is_sign_negative() => 3,
            _ => 4,
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Debug formatting always yields a float literal (`2.0`, `1e-7`)
            Expr::Number(v) => write!(f, "{:?}", v),
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Species(index) => write!(f, "{}{}", SPECIES_MARKER, index),
            Expr::Index { array, index } => write!(f, "{}[{}]", array, index),
            Expr::State(index) => write!(f, "y[{}]", index),
            Expr::Param(index) => write!(f, "p[{}]", index),
            Expr::Time => write!(f, "t"),
            Expr::Neg(inner) => {
                write!(f, "-")?;
                write_operand(f, inner, inner.precedence() < 3)
            }
            // Rust has no infix power operator
            Expr::Binary {
                op: BinOp::Pow,
                lhs,
                rhs,
            } => write!(f, "pow({}, {})", lhs, rhs),
            Expr::Binary { op, lhs, rhs } => {
                let prec = self.precedence();
                write_operand(f, lhs, lhs.precedence() < prec)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs, rhs.precedence() <= prec)
            }
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// `lhs[index] = value;`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub array: String,
    pub index: usize,
    pub value: Expr,
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] = {};", self.array, self.index, self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Ident(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Op(char),
    Assign,
    Semicolon,
    Invalid(char),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// Byte offset into the source text; its length when the input ended early
    pub pos: usize,
    pub found: Option<Token>,
    pub expected: Vec<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.found, self.expected.is_empty()) {
            (Some(tok), false) => write!(
                f,
                "parse error at pos {} found={:?} expected={:?}",
                self.pos, tok, self.expected
            ),
            (None, false) => write!(
                f,
                "parse error at pos {} found=<end> expected={:?}",
                self.pos, self.expected
            ),
            (Some(tok), true) => write!(f, "parse error at pos {} found={:?}", self.pos, tok),
            (None, true) => write!(f, "parse error at pos {} found=<end>", self.pos),
        }
    }
}

impl std::error::Error for ParseError {}

/// Index of a canonical species marker (`__s7`, but not `__s07` or `__s7a`).
pub fn species_marker(ident: &str) -> Option<usize> {
    let digits = ident.strip_prefix(SPECIES_MARKER)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

/// Whether `name` lexes as a single identifier token.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn tokenize(s: &str) -> Result<Vec<Token>, ParseError> {
    Ok(lex(s)?.into_iter().map(|(_, tok)| tok).collect())
}

/// Tokens paired with the byte offset they start at.
fn lex(s: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let mut toks = Vec::new();
    let mut chars = s.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            let mut num = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit()
                    || d == '.'
                    || d == 'e'
                    || d == 'E'
                    || ((d == '+' || d == '-') && (num.ends_with('e') || num.ends_with('E')))
                {
                    num.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            match num.parse::<f64>() {
                Ok(v) => toks.push((pos, Token::Num(v))),
                Err(_) => {
                    return Err(ParseError {
                        pos,
                        found: Some(Token::Invalid(c)),
                        expected: vec!["number".to_string()],
                    })
                }
            }
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut id = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_alphanumeric() || d == '_' {
                    id.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            toks.push((pos, Token::Ident(id)));
            continue;
        }
        chars.next();
        let tok = match c {
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '=' => Token::Assign,
            '*' => {
                // `**` is accepted as power
                if let Some(&(_, '*')) = chars.peek() {
                    chars.next();
                    Token::Op('^')
                } else {
                    Token::Op('*')
                }
            }
            '+' | '-' | '/' | '^' => Token::Op(c),
            _ => {
                return Err(ParseError {
                    pos,
                    found: Some(Token::Invalid(c)),
                    expected: Vec::new(),
                })
            }
        };
        toks.push((pos, tok));
    }
    Ok(toks)
}

/// Recursive-descent parser over the tokens of one source string.
pub struct Parser {
    tokens: Vec<Token>,
    offsets: Vec<usize>,
    end: usize,
    pos: usize,
    expected: Vec<String>,
}

impl Parser {
    pub fn new(src: &str) -> Result<Self, ParseError> {
        let (offsets, tokens) = lex(src)?.into_iter().unzip();
        Ok(Self {
            tokens,
            offsets,
            end: src.len(),
            pos: 0,
            expected: Vec::new(),
        })
    }

    fn expected_push(&mut self, s: &str) {
        if !self.expected.iter().any(|e| e == s) {
            self.expected.push(s.to_string());
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self) -> ParseError {
        ParseError {
            pos: self.offsets.get(self.pos).copied().unwrap_or(self.end),
            found: self.peek().cloned(),
            expected: self.expected.clone(),
        }
    }

    fn expect(&mut self, tok: Token, label: &str) -> Option<()> {
        if self.peek() == Some(&tok) {
            self.pos += 1;
            Some(())
        } else {
            self.expected_push(label);
            None
        }
    }

    pub fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_add_sub()
    }

    /// Parse one expression spanning the whole token stream.
    pub fn parse_expr_result(&mut self) -> Result<Expr, ParseError> {
        match self.parse_expr() {
            Some(expr) if self.peek().is_none() => Ok(expr),
            Some(_) => {
                self.expected_push("end of expression");
                Err(self.error())
            }
            None => Err(self.error()),
        }
    }

    fn parse_add_sub(&mut self) -> Option<Expr> {
        let mut node = self.parse_mul_div()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op('+')) => BinOp::Add,
                Some(Token::Op('-')) => BinOp::Sub,
                _ => break,
            };
            self.next();
            let rhs = self.parse_mul_div()?;
            node = Expr::Binary {
                op,
                lhs: Box::new(node),
                rhs: Box::new(rhs),
            };
        }
        Some(node)
    }

    fn parse_mul_div(&mut self) -> Option<Expr> {
        let mut node = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op('*')) => BinOp::Mul,
                Some(Token::Op('/')) => BinOp::Div,
                _ => break,
            };
            self.next();
            let rhs = self.parse_unary()?;
            node = Expr::Binary {
                op,
                lhs: Box::new(node),
                rhs: Box::new(rhs),
            };
        }
        Some(node)
    }

    // unary minus binds looser than power: -x^2 == -(x^2)
    fn parse_unary(&mut self) -> Option<Expr> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.next();
                let rhs = self.parse_unary()?;
                Some(Expr::Neg(Box::new(rhs)))
            }
            Some(Token::Op('+')) => {
                self.next();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Option<Expr> {
        let base = self.parse_primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.next();
            let exponent = self.parse_unary()?;
            return Some(Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Some(base)
    }

    fn parse_index(&mut self) -> Option<usize> {
        match self.peek() {
            Some(&Token::Num(v)) if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 => {
                self.pos += 1;
                Some(v as usize)
            }
            _ => {
                self.expected_push("non-negative integer index");
                None
            }
        }
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let tok = match self.next() {
            Some(tok) => tok,
            None => {
                self.expected_push("number|identifier|'('");
                return None;
            }
        };
        let node = match tok {
            Token::Num(v) => Expr::Number(v),
            Token::Ident(id) => match self.peek() {
                Some(Token::LParen) => {
                    self.next();
                    let mut args = Vec::new();
                    if let Some(Token::RParen) = self.peek() {
                        self.next();
                    } else {
                        loop {
                            args.push(self.parse_expr()?);
                            match self.peek() {
                                Some(Token::Comma) => self.pos += 1,
                                Some(Token::RParen) => {
                                    self.pos += 1;
                                    break;
                                }
                                _ => {
                                    self.expected_push(",|)");
                                    return None;
                                }
                            }
                        }
                    }
                    Expr::Call { name: id, args }
                }
                Some(Token::LBracket) => {
                    self.next();
                    let index = self.parse_index()?;
                    self.expect(Token::RBracket, "]")?;
                    Expr::Index { array: id, index }
                }
                _ => match species_marker(&id) {
                    Some(index) => Expr::Species(index),
                    None => Expr::Ident(id),
                },
            },
            Token::LParen => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen, ")")?;
                expr
            }
            _ => {
                // point at the token just consumed
                self.pos -= 1;
                self.expected_push("number|identifier|'('");
                return None;
            }
        };
        Some(node)
    }

    /// Parse a sequence of `name[index] = expr;` statements.
    pub fn parse_assignments(&mut self) -> Option<Vec<Assignment>> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            let array = match self.peek() {
                Some(Token::Ident(name)) => name.clone(),
                _ => {
                    self.expected_push("identifier");
                    return None;
                }
            };
            self.pos += 1;
            self.expect(Token::LBracket, "[")?;
            let index = self.parse_index()?;
            self.expect(Token::RBracket, "]")?;
            self.expect(Token::Assign, "=")?;
            let value = self.parse_expr()?;
            self.expect(Token::Semicolon, ";")?;
            stmts.push(Assignment {
                array,
                index,
                value,
            });
        }
        Some(stmts)
    }

    pub fn parse_assignments_result(&mut self) -> Result<Vec<Assignment>, ParseError> {
        self.parse_assignments().ok_or_else(|| self.error())
    }
}

pub fn parse_expr(src: &str) -> Result<Expr, ParseError> {
    Parser::new(src)?.parse_expr_result()
}

pub fn parse_assignments(src: &str) -> Result<Vec<Assignment>, ParseError> {
    Parser::new(src)?.parse_assignments_result()
}
