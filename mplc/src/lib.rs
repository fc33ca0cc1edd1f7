//! Front-end for the MPL toy language: parses line-oriented source, lowers
//! it to instruction blobs, and packs binary modules.
//!
//! The main entry point is [`pack`], which compiles one source file into a
//! module file. `%include%` directives are resolved at pack time: a source
//! include is recursively packed (its `.bin` lands next to its source), a
//! binary include only contributes its data segment. Either way the
//! included module's symbol descriptor feeds the post-pass, which resolves
//! names that are not defined locally into imported symbols.
//!
//! Parsing uses [pest] with one ordered-choice rule per command shape, so a
//! line is recognized by the first shape that matches, in a fixed priority
//! order. Lines matching no shape compile to a NOP and are reported as
//! diagnostics without stopping the pack, so one run surfaces several
//! errors.
//!
//! [pest]: https://docs.rs/pest/

mod builder;
mod error;
mod line;
mod parser;
mod postpass;


pub use builder::IncludeInfo;
pub use error::{Diagnostic, Error};

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;

use mplbin::Module;
use util::ParseEnumError;

use builder::Builder;
use line::{parse_line, Command};

pub type Result<T> = std::result::Result<T, Error>;

/// Source text encoding. UTF-8 unless the harness says otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
}

impl Default for Encoding {
    fn default() -> Encoding {
        Encoding::Utf8
    }
}

impl FromStr for Encoding {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Encoding, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            _ => Err(ParseEnumError {
                value: s.to_string(),
                enum_name: "Encoding",
            }),
        }
    }
}

impl Encoding {
    fn decode(self, bytes: Vec<u8>, path: &Path) -> Result<String> {
        match self {
            Encoding::Utf8 => {
                String::from_utf8(bytes).map_err(|_| Error::Encoding(path.to_owned()))
            }
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// Outcome of a successful pack: the module was written, but diagnostics
/// may still warrant a non-zero exit.
#[derive(Debug)]
pub struct PackReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl PackReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Drives module compilation, deduplicating includes by base name within
/// one run and refusing include cycles.
pub struct Packer {
    root: PathBuf,
    encoding: Encoding,
    cache: HashMap<String, Rc<IncludeInfo>>,
    in_progress: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

impl Packer {
    pub fn new(root: PathBuf, encoding: Encoding) -> Packer {
        Packer {
            root,
            encoding,
            cache: HashMap::new(),
            in_progress: HashSet::new(),
            diagnostics: Vec::new(),
        }
    }

    fn pack_module(&mut self, source: &Path) -> Result<Module> {
        let stem = stem_of(source);
        self.in_progress.insert(stem.clone());
        let bytes = fs::read(source).map_err(|err| Error::Io(source.to_owned(), err))?;
        let text = self.encoding.decode(bytes, source)?;
        let module = self.pack_source(&text)?;
        self.in_progress.remove(&stem);
        Ok(module)
    }

    fn pack_source(&mut self, text: &str) -> Result<Module> {
        let mut builder = Builder::new();
        for raw in text.lines() {
            builder.begin_line();
            match parse_line(raw) {
                Err(_) => builder.invalid(raw),
                Ok(None) => builder.nop(),
                Ok(Some(Command::Include { path })) => {
                    let (bin_path, info) = self.resolve_include(path)?;
                    builder.include(bin_path, info);
                }
                Ok(Some(cmd)) => builder.command(cmd),
            }
        }
        let (module, diagnostics) = postpass::finish(builder)?;
        self.diagnostics.extend(diagnostics);
        Ok(module)
    }

    /// Resolves one `%include%` directive: packs a source include (writing
    /// its `.bin` next to it) or reads a binary include's data segment.
    /// Returns the path recorded in the INCLUDE instruction (always with a
    /// `.bin` extension) and the include's symbol descriptor.
    fn resolve_include(&mut self, text: &str) -> Result<(String, Rc<IncludeInfo>)> {
        let relative = Path::new(text);
        let stem = stem_of(relative);
        if self.in_progress.contains(&stem) {
            return Err(Error::CyclicInclude(stem));
        }
        let bin_path = relative
            .with_extension("bin")
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| Error::BadIncludePath(text.to_string()))?;
        if let Some(info) = self.cache.get(&stem) {
            return Ok((bin_path, Rc::clone(info)));
        }

        let full = self.root.join(relative);
        let extension = relative.extension().and_then(|e| e.to_str()).unwrap_or("");
        let info = match extension {
            "txt" => {
                let module = self.pack_module(&full)?;
                let out = full.with_extension("bin");
                mplbin::write_file(&out, &module).map_err(|err| Error::Bin(out, err))?;
                Rc::new(IncludeInfo::from_entries(module.data()))
            }
            "bin" => {
                let module =
                    mplbin::read_file(&full).map_err(|err| Error::Bin(full.clone(), err))?;
                Rc::new(IncludeInfo::from_entries(module.data()))
            }
            _ => return Err(Error::BadIncludePath(text.to_string())),
        };
        self.cache.insert(stem, Rc::clone(&info));
        Ok((bin_path, info))
    }
}

/// Compiles `source` into a binary module at `output`.
pub fn pack<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    output: Q,
    encoding: Encoding,
) -> Result<PackReport> {
    let source = source.as_ref();
    let root = source
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_owned();
    let mut packer = Packer::new(root, encoding);
    let module = packer.pack_module(source)?;
    mplbin::write_file(output.as_ref(), &module)
        .map_err(|err| Error::Bin(output.as_ref().to_owned(), err))?;
    Ok(PackReport {
        diagnostics: packer.diagnostics,
    })
}

/// Compiles source text directly; include paths resolve against `root`.
pub fn pack_str(source: &str, root: &Path) -> Result<(Module, PackReport)> {
    let mut packer = Packer::new(root.to_owned(), Encoding::Utf8);
    let module = packer.pack_source(source)?;
    Ok((
        module,
        PackReport {
            diagnostics: packer.diagnostics,
        },
    ))
}
