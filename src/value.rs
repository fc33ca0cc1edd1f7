use mplbin::constants::STRING_MAX;
use mplbin::{TypeTag, Value};

use crate::expr::{EvalError, Scalar};

/// Coerces an evaluation result into a variable's declared type.
///
/// BOOL and INT map through 0/1 (any nonzero reads as true), FLOAT and the
/// internal double width truncate towards zero when narrowed to INT, and
/// STRING neither converts to nor from the numeric types.
pub fn coerce(scalar: Scalar, ty: TypeTag) -> Result<Value, EvalError> {
    match ty {
        TypeTag::BOOL => Ok(Value::Bool(scalar.as_bool()?)),
        TypeTag::INT => Ok(Value::Int(scalar.as_i32()?)),
        TypeTag::FLOAT => Ok(Value::Float(scalar.as_f32()?)),
        TypeTag::STRING => match scalar {
            Scalar::Str(s) => Ok(Value::Str(s)),
            other => Err(EvalError::Type {
                message: format!("Cannot store {} into a STRING variable.", other.type_name()),
            }),
        },
    }
}

/// Parses one console line as the declared type of an INPUT target.
///
/// Floats accept both `.` and `,` as the fraction separator. Booleans
/// accept the language literals and 0/1. Returns `None` when the line does
/// not parse; the engine turns that into a fatal arithmetic error.
pub fn parse_input(line: &str, ty: TypeTag) -> Option<Value> {
    let text = line.trim();
    match ty {
        TypeTag::BOOL => match text.to_uppercase().as_str() {
            "TRUE" | "1" => Some(Value::Bool(true)),
            "FALSE" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        TypeTag::INT => text.parse::<i32>().ok().map(Value::Int),
        TypeTag::FLOAT => text.replace(',', ".").parse::<f32>().ok().map(Value::Float),
        TypeTag::STRING => {
            if line.len() <= STRING_MAX {
                Some(Value::Str(line.to_string()))
            } else {
                None
            }
        }
    }
}
