//! On-disk module format for packed MPL programs.
//!
//! A module file holds three segments:
//!
//! ```text
//! [include instructions...] 0xFF [runtime instructions... EOF] [data entries...] 0xFF
//! ```
//!
//! Instructions are variable length; byte 0 is `opcode << 4 | flags` and the
//! payload depends on both (see [`Instr`]). The runtime segment always ends
//! with exactly one EOF instruction (byte `0xF0`), which doubles as the
//! segment terminator. Multi-byte integers and floats are little-endian.
//! Strings are prefixed with a single length byte, so they carry at most 255
//! bytes of UTF-8.
//!
//! This layout is the stable boundary between the compiler and the
//! execution engine: packing the same source must produce byte-identical
//! files, and [`write`] followed by [`read`] round-trips exactly.

pub mod constants;
mod data;
mod instr;

#[cfg(test)]
mod test;

pub use data::DataEntry;
pub use instr::{IfCond, Instr, Opcode, TypeTag, Value};

use std::fmt;
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use byteorder::ReadBytesExt;

use constants::SEGMENT_END;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    InvalidOpcode(u8),
    InvalidTypeTag(u8),
    InvalidString,
    StringTooLong(usize),
    TooManyIntersections(usize),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "{}", err),
            Error::InvalidOpcode(byte) => write!(f, "Invalid opcode byte 0x{:02X}.", byte),
            Error::InvalidTypeTag(byte) => write!(f, "Invalid type tag in flags 0x{:02X}.", byte),
            Error::InvalidString => f.write_str("String payload is not valid UTF-8."),
            Error::StringTooLong(len) => {
                write!(f, "String of {} bytes exceeds the length prefix.", len)
            }
            Error::TooManyIntersections(len) => {
                write!(f, "Intersection vector of {} entries exceeds the count prefix.", len)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A packed module: include instructions, runtime instructions, data segment.
#[derive(Debug, PartialEq)]
pub struct Module {
    includes: Vec<Instr>,
    instructions: Vec<Instr>,
    data: Vec<DataEntry>,
}

impl Module {
    /// Builds a module, normalizing the runtime segment so it ends with
    /// exactly one EOF. Anything after a mid-stream EOF is unreachable and
    /// dropped, keeping the `0xF0` terminator unique.
    pub fn from(includes: Vec<Instr>, mut instructions: Vec<Instr>, data: Vec<DataEntry>) -> Module {
        match instructions.iter().position(|i| *i == Instr::Eof) {
            Some(pos) => instructions.truncate(pos + 1),
            None => instructions.push(Instr::Eof),
        }
        Module {
            includes,
            instructions,
            data,
        }
    }

    pub fn includes(&self) -> &[Instr] {
        &self.includes[..]
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.instructions[..]
    }

    pub fn data(&self) -> &[DataEntry] {
        &self.data[..]
    }
}

pub fn read<R: Read>(reader: &mut R) -> Result<Module> {
    let mut includes = Vec::new();
    loop {
        let first = reader.read_u8()?;
        if first == SEGMENT_END {
            break;
        }
        includes.push(Instr::decode(first, reader)?);
    }

    let mut instructions = Vec::new();
    loop {
        let first = reader.read_u8()?;
        let instr = Instr::decode(first, reader)?;
        let eof = instr == Instr::Eof;
        instructions.push(instr);
        if eof {
            break;
        }
    }

    let mut data = Vec::new();
    loop {
        let preamble = reader.read_u8()?;
        if preamble == SEGMENT_END {
            break;
        }
        data.push(DataEntry::decode(preamble, reader)?);
    }

    Ok(Module {
        includes,
        instructions,
        data,
    })
}

pub fn write<W: Write>(writer: &mut W, module: &Module) -> Result<()> {
    for instr in &module.includes {
        instr.encode(writer)?;
    }
    writer.write_all(&[SEGMENT_END])?;
    for instr in &module.instructions {
        instr.encode(writer)?;
    }
    for entry in &module.data {
        entry.encode(writer)?;
    }
    writer.write_all(&[SEGMENT_END])?;
    Ok(())
}

pub trait ReadBinExt: Read + Sized {
    fn read_bin(&mut self) -> Result<Module> {
        read(self)
    }
}

impl<R: Read + Sized> ReadBinExt for R {}

pub trait WriteBinExt: Write + Sized {
    fn write_bin(&mut self, module: &Module) -> Result<()> {
        write(self, module)
    }
}

impl<W: Write + Sized> WriteBinExt for W {}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Module> {
    BufReader::new(File::open(path)?).read_bin()
}

pub fn write_file<P: AsRef<Path>>(path: P, module: &Module) -> Result<()> {
    BufWriter::new(File::create(path)?).write_bin(module)
}
