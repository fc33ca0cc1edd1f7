use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use util::Endian;

use crate::constants::*;
use crate::instr::{read_str, write_str};
use crate::{Error, Result};

/// One data segment record: a symbol the module defines or imports.
///
/// The preamble byte carries `PRE_PROCEDURE`, `PRE_MEETS_INCLUDES` and
/// `PRE_IMPORTED`. Variables that are also defined by an include carry the
/// intersection vector `(include index, remote variable id)` used for
/// writeback at context switches. Imported symbols carry the owning include
/// index; their remote id is re-resolved by name at load time.
#[derive(Clone, Debug, PartialEq)]
pub struct DataEntry {
    pub id: u32,
    pub name: String,
    pub procedure: bool,
    pub intersections: Vec<(u32, u32)>,
    pub import: Option<u32>,
}

impl DataEntry {
    pub fn variable(id: u32, name: &str) -> DataEntry {
        DataEntry {
            id,
            name: name.to_string(),
            procedure: false,
            intersections: Vec::new(),
            import: None,
        }
    }

    pub fn procedure(id: u32, name: &str) -> DataEntry {
        DataEntry {
            procedure: true,
            ..DataEntry::variable(id, name)
        }
    }

    fn preamble(&self) -> u8 {
        let mut bits = 0;
        if self.procedure {
            bits |= PRE_PROCEDURE;
        }
        if !self.intersections.is_empty() {
            bits |= PRE_MEETS_INCLUDES;
        }
        if self.import.is_some() {
            bits |= PRE_IMPORTED;
        }
        bits
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.preamble())?;
        writer.write_u32::<Endian>(self.id)?;
        write_str(writer, &self.name)?;
        if !self.intersections.is_empty() {
            if self.intersections.len() > STRING_MAX {
                return Err(Error::TooManyIntersections(self.intersections.len()));
            }
            writer.write_u8(self.intersections.len() as u8)?;
            for (include, remote) in &self.intersections {
                writer.write_u32::<Endian>(*include)?;
                writer.write_u32::<Endian>(*remote)?;
            }
        }
        if let Some(include) = self.import {
            writer.write_u32::<Endian>(include)?;
        }
        Ok(())
    }

    /// Decodes the entry whose preamble byte has already been read.
    pub fn decode<R: Read>(preamble: u8, reader: &mut R) -> Result<DataEntry> {
        let id = reader.read_u32::<Endian>()?;
        let name = read_str(reader)?;
        let mut intersections = Vec::new();
        if preamble & PRE_MEETS_INCLUDES != 0 {
            let count = reader.read_u8()? as usize;
            intersections.reserve(count);
            for _ in 0..count {
                let include = reader.read_u32::<Endian>()?;
                let remote = reader.read_u32::<Endian>()?;
                intersections.push((include, remote));
            }
        }
        let import = if preamble & PRE_IMPORTED != 0 {
            Some(reader.read_u32::<Endian>()?)
        } else {
            None
        };
        Ok(DataEntry {
            id,
            name,
            procedure: preamble & PRE_PROCEDURE != 0,
            intersections,
            import,
        })
    }
}
