//! Harness glue for the MPL toolchain: pack a source file, run a module.

use std::fmt;
use std::path::{Path, PathBuf};

use mpl::{Engine, ExitCode, StdConsole};
use mplc::{Encoding, PackReport};

#[derive(Debug)]
pub enum Error {
    Pack(mplc::Error),
    Run(mpl::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Pack(err) => write!(f, "{}", err),
            Error::Run(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {}

/// Compiles `input` into a binary module at `output`.
pub fn pack_file(input: &Path, output: &Path, encoding: Encoding) -> Result<PackReport, Error> {
    mplc::pack(input, output, encoding).map_err(Error::Pack)
}

/// Loads and executes a packed module. Includes resolve against `root`,
/// defaulting to the module's own directory.
pub fn run_file(program: &Path, root: Option<&Path>) -> Result<ExitCode, Error> {
    let root = root
        .map(Path::to_owned)
        .or_else(|| program.parent().map(Path::to_owned))
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."));
    let mut engine = Engine::with_root(root, Box::new(StdConsole));
    engine.execute_file(program).map_err(Error::Run)
}
