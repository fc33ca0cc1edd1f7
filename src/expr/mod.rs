//! Infix expression compiler and evaluator.
//!
//! Expression strings travel inside SET and IF instructions with variable
//! references already rewritten to `@id` form by the packer. [`compile`]
//! turns such a string into an [`Expr`] tree once, at load time; the engine
//! evaluates the tree against a [`Fetch`] implementation that resolves
//! variable ids in the owning context.
//!
//! Operator groups, loosest binding first: `&&` `||`, comparisons, `+` `-`,
//! unary `-` `!`, `*` `/` `%`, `^`, `<<` `>>`. Runs of signs and of `!`
//! collapse by parity before matching. `^` and the intrinsics compute in
//! the internal double width.

mod intrinsics;
mod lexer;
mod ops;

pub use intrinsics::{constant, Intrinsic};
pub use ops::{BinaryOp, CastPolicy, UnaryOp, Width};

use std::fmt;

use mplbin::Value;

use lexer::{tokenize, Token};

#[derive(Clone, Debug, PartialEq)]
pub enum ExprError {
    Syntax { pos: usize, message: String },
    Type { message: String },
    UnknownName(String),
    BadArity { name: &'static str, got: usize },
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExprError::Syntax { pos, message } => {
                write!(f, "Syntax error at offset {}: {}", pos, message)
            }
            ExprError::Type { message } => write!(f, "Type error: {}", message),
            ExprError::UnknownName(name) => write!(f, "Unknown name \"{}\".", name),
            ExprError::BadArity { name, got } => {
                write!(f, "Wrong number of arguments for {} ({} given).", name, got)
            }
        }
    }
}

impl std::error::Error for ExprError {}

#[derive(Clone, Debug, PartialEq)]
pub enum EvalError {
    Type { message: String },
    DivisionByZero,
    Undefined(u32),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EvalError::Type { message } => write!(f, "Type error: {}", message),
            EvalError::DivisionByZero => f.write_str("Division by zero."),
            EvalError::Undefined(id) => write!(f, "Variable @{} does not exist.", id),
        }
    }
}

impl std::error::Error for EvalError {}

/// An evaluation-time operand. Wider than [`Value`] by the internal double
/// width, which exists only between operators.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    Str(String),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "BOOL",
            Scalar::Int(_) => "INT",
            Scalar::Float(_) => "FLOAT",
            Scalar::Double(_) => "DOUBLE",
            Scalar::Str(_) => "STRING",
        }
    }

    pub fn width(&self) -> Result<Width, EvalError> {
        match self {
            Scalar::Bool(_) => Ok(Width::Bool),
            Scalar::Int(_) => Ok(Width::Int),
            Scalar::Float(_) => Ok(Width::Float),
            Scalar::Double(_) => Ok(Width::Double),
            Scalar::Str(_) => Err(EvalError::Type {
                message: "STRING values take part in WRITE only.".to_string(),
            }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Scalar::Bool(b) => Ok(*b),
            Scalar::Int(i) => Ok(*i != 0),
            Scalar::Float(x) => Ok(*x != 0.0),
            Scalar::Double(x) => Ok(*x != 0.0),
            Scalar::Str(_) => Err(EvalError::Type {
                message: "Cannot read a STRING value as BOOL.".to_string(),
            }),
        }
    }

    pub fn as_i32(&self) -> Result<i32, EvalError> {
        match self {
            Scalar::Bool(b) => Ok(*b as i32),
            Scalar::Int(i) => Ok(*i),
            Scalar::Float(x) => Ok(*x as i32),
            Scalar::Double(x) => Ok(*x as i32),
            Scalar::Str(_) => Err(EvalError::Type {
                message: "Cannot read a STRING value as INT.".to_string(),
            }),
        }
    }

    pub fn as_f32(&self) -> Result<f32, EvalError> {
        match self {
            Scalar::Bool(b) => Ok(*b as i32 as f32),
            Scalar::Int(i) => Ok(*i as f32),
            Scalar::Float(x) => Ok(*x),
            Scalar::Double(x) => Ok(*x as f32),
            Scalar::Str(_) => Err(EvalError::Type {
                message: "Cannot read a STRING value as FLOAT.".to_string(),
            }),
        }
    }

    pub fn as_f64(&self) -> Result<f64, EvalError> {
        match self {
            Scalar::Bool(b) => Ok(*b as i32 as f64),
            Scalar::Int(i) => Ok(f64::from(*i)),
            Scalar::Float(x) => Ok(f64::from(*x)),
            Scalar::Double(x) => Ok(*x),
            Scalar::Str(_) => Err(EvalError::Type {
                message: "Cannot read a STRING value as a number.".to_string(),
            }),
        }
    }

    pub fn to_width(&self, width: Width) -> Result<Scalar, EvalError> {
        Ok(match width {
            Width::Bool => Scalar::Bool(self.as_bool()?),
            Width::Int => Scalar::Int(self.as_i32()?),
            Width::Float => Scalar::Float(self.as_f32()?),
            Width::Double => Scalar::Double(self.as_f64()?),
        })
    }
}

impl From<Value> for Scalar {
    fn from(value: Value) -> Scalar {
        match value {
            Value::Bool(b) => Scalar::Bool(b),
            Value::Int(i) => Scalar::Int(i),
            Value::Float(x) => Scalar::Float(x),
            Value::Str(s) => Scalar::Str(s),
        }
    }
}

/// Resolves `@id` references during evaluation.
pub trait Fetch {
    fn fetch(&mut self, id: u32) -> Result<Scalar, EvalError>;
}

/// A compiled expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Const(Scalar),
    Var(u32),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        cast: CastPolicy,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Intrinsic,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn eval(&self, vars: &mut dyn Fetch) -> Result<Scalar, EvalError> {
        match self {
            Expr::Const(scalar) => Ok(scalar.clone()),
            Expr::Var(id) => vars.fetch(*id),
            Expr::Unary { op, operand } => ops::eval_unary(*op, operand.eval(vars)?),
            Expr::Binary { op, cast, lhs, rhs } => {
                let l = lhs.eval(vars)?;
                let r = rhs.eval(vars)?;
                ops::eval_binary(*op, *cast, l, r)
            }
            Expr::Call { func, args } => {
                let mut xs = Vec::with_capacity(args.len());
                for arg in args {
                    xs.push(arg.eval(vars)?.as_f64()?);
                }
                Ok(Scalar::Double(func.apply(&xs)))
            }
        }
    }
}

/// Reserved names that never denote user variables: the boolean literals,
/// the math intrinsics and the math constants.
pub fn is_reserved(name: &str) -> bool {
    name == "TRUE"
        || name == "FALSE"
        || constant(name).is_some()
        || Intrinsic::lookup(name).is_some()
}

pub fn compile(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
    };
    let expr = parser.expression()?;
    if parser.pos != tokens.len() {
        return Err(ExprError::Syntax {
            pos: parser.pos,
            message: "Trailing input after expression.".to_string(),
        });
    }
    check(&expr)?;
    Ok(expr)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let cast = ops::resolve_policy(
        op,
        matches!(lhs, Expr::Var(_)),
        matches!(rhs, Expr::Var(_)),
    );
    Expr::Binary {
        op,
        cast,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn syntax(&self, message: &str) -> ExprError {
        ExprError::Syntax {
            pos: self.pos,
            message: message.to_string(),
        }
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        self.logical()
    }

    fn logical(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::And) => BinaryOp::And,
                Some(Token::Or) => BinaryOp::Or,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.comparison()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    /// Prefix operators. Runs collapse by parity: an even count of `-`
    /// cancels out, as does an even count of `!`.
    fn unary(&mut self) -> Result<Expr, ExprError> {
        let mut prefix = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Plus) | Some(Token::Minus) => {
                    let mut negative = false;
                    while let Some(token) = self.peek() {
                        match token {
                            Token::Plus => {}
                            Token::Minus => negative = !negative,
                            _ => break,
                        }
                        self.pos += 1;
                    }
                    if negative {
                        prefix.push(UnaryOp::Neg);
                    }
                }
                Some(Token::Not) => {
                    let mut negated = false;
                    while let Some(Token::Not) = self.peek() {
                        negated = !negated;
                        self.pos += 1;
                    }
                    if negated {
                        prefix.push(UnaryOp::Not);
                    }
                }
                _ => break,
            }
        }
        let mut expr = self.multiplicative()?;
        for op in prefix.into_iter().rev() {
            expr = Expr::Unary {
                op,
                operand: Box::new(expr),
            };
        }
        Ok(expr)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.power()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.power()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn power(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.shift()?;
        while let Some(Token::Caret) = self.peek() {
            self.pos += 1;
            let rhs = self.shift()?;
            lhs = binary(BinaryOp::Pow, lhs, rhs);
        }
        Ok(lhs)
    }

    fn shift(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.atom()?;
        loop {
            let op = match self.peek() {
                Some(Token::Shl) => BinaryOp::Shl,
                Some(Token::Shr) => BinaryOp::Shr,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.atom()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn atom(&mut self) -> Result<Expr, ExprError> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.syntax("Expected an operand.")),
        };
        self.pos += 1;
        match token {
            Token::LParen => {
                let expr = self.expression()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(expr)
                    }
                    _ => Err(self.syntax("Expected \")\".")),
                }
            }
            Token::Int(i) => Ok(Expr::Const(Scalar::Int(i))),
            Token::Float(x) => Ok(Expr::Const(Scalar::Float(x))),
            Token::Bool(b) => Ok(Expr::Const(Scalar::Bool(b))),
            Token::Var(id) => Ok(Expr::Var(id)),
            Token::Name(name) => {
                if let Some(value) = constant(&name) {
                    Ok(Expr::Const(Scalar::Double(value)))
                } else if let Some(func) = Intrinsic::lookup(&name) {
                    self.call(func)
                } else {
                    Err(ExprError::UnknownName(name))
                }
            }
            _ => Err(self.syntax("Expected an operand.")),
        }
    }

    fn call(&mut self, func: Intrinsic) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::LParen) => self.pos += 1,
            _ => return Err(self.syntax("Expected \"(\" after intrinsic name.")),
        }
        let mut args = vec![self.expression()?];
        loop {
            match self.peek() {
                Some(Token::Semi) => {
                    self.pos += 1;
                    args.push(self.expression()?);
                }
                Some(Token::RParen) => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.syntax("Expected \";\" or \")\" in argument list.")),
            }
        }
        func.check_arity(args.len())?;
        Ok(Expr::Call { func, args })
    }
}

/// Static validation: rejects operand types that are known at compile time
/// and outside the operator's allowable set. Variable fetches are dynamic
/// and check at evaluation time instead.
fn check(expr: &Expr) -> Result<Option<Width>, ExprError> {
    match expr {
        Expr::Const(scalar) => match scalar.width() {
            Ok(width) => Ok(Some(width)),
            Err(_) => Err(ExprError::Type {
                message: "STRING values take part in WRITE only.".to_string(),
            }),
        },
        Expr::Var(_) => Ok(None),
        Expr::Unary { op, operand } => {
            let width = check(operand)?;
            match op {
                UnaryOp::Not => Ok(Some(Width::Bool)),
                UnaryOp::Neg => Ok(width.map(|w| w.max(Width::Int))),
            }
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let lw = check(lhs)?;
            let rw = check(rhs)?;
            match op {
                BinaryOp::Shl | BinaryOp::Shr => {
                    for width in [lw, rw].iter().flatten() {
                        if *width != Width::Int {
                            return Err(ExprError::Type {
                                message: "Shift operands must be INT.".to_string(),
                            });
                        }
                    }
                    Ok(Some(Width::Int))
                }
                BinaryOp::And | BinaryOp::Or => Ok(Some(Width::Bool)),
                BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Le
                | BinaryOp::Ge => Ok(Some(Width::Bool)),
                BinaryOp::Pow => Ok(Some(Width::Double)),
                _ => match (lw, rw) {
                    (Some(l), Some(r)) => Ok(Some(l.max(r).max(Width::Int))),
                    _ => Ok(None),
                },
            }
        }
        Expr::Call { args, .. } => {
            for arg in args {
                check(arg)?;
            }
            Ok(Some(Width::Double))
        }
    }
}
