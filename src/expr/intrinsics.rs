use super::ExprError;

/// Math intrinsics. All of them take and return the internal double width;
/// the enclosing variable's declared type narrows the result on store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intrinsic {
    Abs,
    Sqrt,
    Floor,
    Ceiling,
    Sin,
    Cos,
    Tan,
    Min2,
    Max2,
    MinX,
    MaxX,
}

impl Intrinsic {
    pub fn lookup(name: &str) -> Option<Intrinsic> {
        Some(match name {
            "abs" => Intrinsic::Abs,
            "sqrt" => Intrinsic::Sqrt,
            "floor" => Intrinsic::Floor,
            "ceiling" => Intrinsic::Ceiling,
            "sin" => Intrinsic::Sin,
            "cos" => Intrinsic::Cos,
            "tan" => Intrinsic::Tan,
            "min2" => Intrinsic::Min2,
            "max2" => Intrinsic::Max2,
            "minx" => Intrinsic::MinX,
            "maxx" => Intrinsic::MaxX,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Abs => "abs",
            Intrinsic::Sqrt => "sqrt",
            Intrinsic::Floor => "floor",
            Intrinsic::Ceiling => "ceiling",
            Intrinsic::Sin => "sin",
            Intrinsic::Cos => "cos",
            Intrinsic::Tan => "tan",
            Intrinsic::Min2 => "min2",
            Intrinsic::Max2 => "max2",
            Intrinsic::MinX => "minx",
            Intrinsic::MaxX => "maxx",
        }
    }

    pub(crate) fn check_arity(self, count: usize) -> Result<(), ExprError> {
        let valid = match self {
            Intrinsic::Min2 | Intrinsic::Max2 => count == 2,
            Intrinsic::MinX | Intrinsic::MaxX => count >= 1,
            _ => count == 1,
        };
        if valid {
            Ok(())
        } else {
            Err(ExprError::BadArity {
                name: self.name(),
                got: count,
            })
        }
    }

    /// Applies the intrinsic. The argument count has been checked at
    /// compile time.
    pub(crate) fn apply(self, args: &[f64]) -> f64 {
        match self {
            Intrinsic::Abs => args[0].abs(),
            Intrinsic::Sqrt => args[0].sqrt(),
            Intrinsic::Floor => args[0].floor(),
            Intrinsic::Ceiling => args[0].ceil(),
            Intrinsic::Sin => args[0].sin(),
            Intrinsic::Cos => args[0].cos(),
            Intrinsic::Tan => args[0].tan(),
            Intrinsic::Min2 => args[0].min(args[1]),
            Intrinsic::Max2 => args[0].max(args[1]),
            Intrinsic::MinX => args.iter().cloned().fold(f64::INFINITY, f64::min),
            Intrinsic::MaxX => args.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Named math constants, substituted as literals where they appear.
pub fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}
