use std::fmt;
use std::io;
use std::path::PathBuf;

use mpl::expr::ExprError;

/// Fatal packing errors. Parse and name-resolution problems are not fatal;
/// they become [`Diagnostic`]s and packing continues.
#[derive(Debug)]
pub enum Error {
    Io(PathBuf, io::Error),
    Bin(PathBuf, mplbin::Error),
    Encoding(PathBuf),
    Type(String, ExprError),
    CyclicInclude(String),
    BadIncludePath(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(path, err) => write!(f, "Reading \"{}\" failed: {}", path.display(), err),
            Error::Bin(path, err) => {
                write!(f, "Writing module \"{}\" failed: {}", path.display(), err)
            }
            Error::Encoding(path) => write!(
                f,
                "\"{}\" is not valid in the selected encoding.",
                path.display()
            ),
            Error::Type(expr, err) => write!(f, "In expression \"{}\": {}", expr, err),
            Error::CyclicInclude(name) => write!(f, "Include cycle through \"{}\".", name),
            Error::BadIncludePath(path) => write!(
                f,
                "Include path \"{}\" must end in .txt or .bin.",
                path
            ),
        }
    }
}

impl std::error::Error for Error {}

/// Non-fatal findings collected while packing. Each is reported once on
/// standard error by the harness; any diagnostic makes the exit non-zero.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    Parse { line: u32, text: String },
    Expr { text: String, message: String },
    Unresolved { name: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Diagnostic::Parse { line, text } => {
                write!(f, "line {}: unrecognized command \"{}\"", line, text)
            }
            Diagnostic::Expr { text, message } => {
                write!(f, "invalid expression \"{}\": {}", text, message)
            }
            Diagnostic::Unresolved { name } => write!(f, "object {} not found", name),
        }
    }
}
