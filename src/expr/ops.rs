use super::{EvalError, Scalar};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Shl,
    Shr,
}

/// Numeric widths, narrowest first. Double is internal only; it never
/// reaches a variable cell without passing through the declared type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Width {
    Bool,
    Int,
    Float,
    Double,
}

/// How a binary operator aligns its two operand types before evaluating.
///
/// A dynamic variable fetch is never a cast target: when only one side is a
/// fetch, the compiler picks the directional policy that casts the fetched
/// value to the static side's type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastPolicy {
    None,
    LeftToRight,
    RightToLeft,
    Minimum,
    Maximum,
}

pub(crate) fn resolve_policy(op: BinaryOp, lhs_dynamic: bool, rhs_dynamic: bool) -> CastPolicy {
    match op {
        BinaryOp::And | BinaryOp::Or => CastPolicy::Minimum,
        BinaryOp::Shl | BinaryOp::Shr => CastPolicy::None,
        _ => {
            if lhs_dynamic && !rhs_dynamic {
                CastPolicy::LeftToRight
            } else if rhs_dynamic && !lhs_dynamic {
                CastPolicy::RightToLeft
            } else {
                CastPolicy::Maximum
            }
        }
    }
}

fn require_int(scalar: &Scalar) -> Result<i32, EvalError> {
    match scalar {
        Scalar::Int(i) => Ok(*i),
        other => Err(EvalError::Type {
            message: format!("Shift operands must be INT, found {}.", other.type_name()),
        }),
    }
}

fn align(
    cast: CastPolicy,
    lhs: Scalar,
    rhs: Scalar,
    floor: Option<Width>,
) -> Result<(Scalar, Scalar), EvalError> {
    let lw = lhs.width()?;
    let rw = rhs.width()?;
    let mut width = match cast {
        CastPolicy::LeftToRight => rw,
        CastPolicy::RightToLeft => lw,
        CastPolicy::Minimum => lw.min(rw),
        CastPolicy::Maximum => lw.max(rw),
        CastPolicy::None => unreachable!(),
    };
    if let Some(floor) = floor {
        width = width.max(floor);
    }
    Ok((lhs.to_width(width)?, rhs.to_width(width)?))
}

macro_rules! compare {
    ($op:expr, $a:expr, $b:expr) => {
        match $op {
            BinaryOp::Eq => $a == $b,
            BinaryOp::Ne => $a != $b,
            BinaryOp::Lt => $a < $b,
            BinaryOp::Gt => $a > $b,
            BinaryOp::Le => $a <= $b,
            BinaryOp::Ge => $a >= $b,
            _ => unreachable!(),
        }
    };
}

fn eval_compare(op: BinaryOp, lhs: &Scalar, rhs: &Scalar) -> bool {
    match (lhs, rhs) {
        (Scalar::Bool(a), Scalar::Bool(b)) => compare!(op, a, b),
        (Scalar::Int(a), Scalar::Int(b)) => compare!(op, a, b),
        (Scalar::Float(a), Scalar::Float(b)) => compare!(op, a, b),
        (Scalar::Double(a), Scalar::Double(b)) => compare!(op, a, b),
        _ => unreachable!(),
    }
}

fn eval_int_arith(op: BinaryOp, a: i32, b: i32) -> Result<i32, EvalError> {
    Ok(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        _ => unreachable!(),
    })
}

fn eval_float_arith(op: BinaryOp, a: f64, b: f64) -> Result<f64, EvalError> {
    Ok(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
        BinaryOp::Rem => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a % b
        }
        _ => unreachable!(),
    })
}

pub(crate) fn eval_binary(
    op: BinaryOp,
    cast: CastPolicy,
    lhs: Scalar,
    rhs: Scalar,
) -> Result<Scalar, EvalError> {
    match op {
        BinaryOp::And => Ok(Scalar::Bool(lhs.as_bool()? && rhs.as_bool()?)),
        BinaryOp::Or => Ok(Scalar::Bool(lhs.as_bool()? || rhs.as_bool()?)),
        BinaryOp::Pow => Ok(Scalar::Double(lhs.as_f64()?.powf(rhs.as_f64()?))),
        BinaryOp::Shl => Ok(Scalar::Int(
            require_int(&lhs)?.wrapping_shl(require_int(&rhs)? as u32),
        )),
        BinaryOp::Shr => Ok(Scalar::Int(
            require_int(&lhs)?.wrapping_shr(require_int(&rhs)? as u32),
        )),
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Gt
        | BinaryOp::Le
        | BinaryOp::Ge => {
            let (l, r) = align(cast, lhs, rhs, None)?;
            Ok(Scalar::Bool(eval_compare(op, &l, &r)))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (l, r) = align(cast, lhs, rhs, Some(Width::Int))?;
            match (l, r) {
                (Scalar::Int(a), Scalar::Int(b)) => Ok(Scalar::Int(eval_int_arith(op, a, b)?)),
                (Scalar::Float(a), Scalar::Float(b)) => Ok(Scalar::Float(eval_float_arith(
                    op,
                    f64::from(a),
                    f64::from(b),
                )? as f32)),
                (Scalar::Double(a), Scalar::Double(b)) => {
                    Ok(Scalar::Double(eval_float_arith(op, a, b)?))
                }
                _ => unreachable!(),
            }
        }
    }
}

pub(crate) fn eval_unary(op: UnaryOp, operand: Scalar) -> Result<Scalar, EvalError> {
    match op {
        UnaryOp::Not => Ok(Scalar::Bool(!operand.as_bool()?)),
        UnaryOp::Neg => match operand {
            Scalar::Bool(b) => Ok(Scalar::Int(-(b as i32))),
            Scalar::Int(i) => Ok(Scalar::Int(i.wrapping_neg())),
            Scalar::Float(x) => Ok(Scalar::Float(-x)),
            Scalar::Double(x) => Ok(Scalar::Double(-x)),
            Scalar::Str(_) => Err(EvalError::Type {
                message: "Cannot negate a STRING value.".to_string(),
            }),
        },
    }
}
