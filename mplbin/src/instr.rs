use std::fmt;
use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use util::{Endian, EnumFromStr};
use util_derive::EnumFromStr;

use crate::constants::*;
use crate::{Error, Result};

// Instruction layout
//
//          +--------+--------+----------------------------+
//          | bits   | 7-4    | 3-0                        |
//          +--------+--------+----------------------------+
// Byte 0   | opcode | flags (type tag / linked / expr ...) |
//          +--------+--------+----------------------------+
// Payload  | variable length, depends on opcode and flags |
//          +----------------------------------------------+

/// Instruction opcodes, one nibble each.
///
/// `IFS` is the inline conditional; the builder expands it in place, so it
/// never appears in a serialized module.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum Opcode {
    NOP = 0,
    SET = 1,
    PUSH = 2,
    JUMP = 3,
    IF = 4,
    ELSE = 5,
    IFS = 6,
    END = 7,
    DEFINE = 8,
    RET = 9,
    CALL = 10,
    WRITE = 11,
    INPUT = 12,
    INCLUDE = 13,
    EOF = 15,
}

/// Declared type of a variable, as stored in the low flag bits.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive, EnumFromStr)]
pub enum TypeTag {
    BOOL = 0,
    INT = 1,
    FLOAT = 2,
    STRING = 3,
}

macro_rules! impl_enum_display {
    ($e:ty) => {
        impl fmt::Display for $e {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

impl_enum_display!(Opcode);
impl_enum_display!(TypeTag);

/// An immediate value: one of the four language types.
///
/// Wire form: BOOL is a single byte 0/1, INT a little-endian i32, FLOAT a
/// little-endian f32, STRING one length byte followed by UTF-8 bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
}

impl Value {
    pub fn tag(&self) -> TypeTag {
        match *self {
            Value::Bool(_) => TypeTag::BOOL,
            Value::Int(_) => TypeTag::INT,
            Value::Float(_) => TypeTag::FLOAT,
            Value::Str(_) => TypeTag::STRING,
        }
    }
}

/// Console rendering, as used by WRITE: booleans print as the language's
/// own literals, floats with a `.` fraction separator.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(true) => f.write_str("TRUE"),
            Value::Bool(false) => f.write_str("FALSE"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
        }
    }
}

/// Condition operand of an IF instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum IfCond {
    Var(u32),
    Expr(String),
}

/// A decoded instruction.
///
/// Targets and start indices are instruction indices into the runtime
/// segment; [`UNRESOLVED_TARGET`] marks a forward reference that was never
/// patched.
#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    Nop,
    SetValue { var: u32, value: Value },
    SetLinked { var: u32, ty: TypeTag, linked: u32 },
    SetExpr { var: u32, ty: TypeTag, expr: String },
    Push { id: u32, procedure: bool },
    Jump { target: i32 },
    If { target: i32, cond: IfCond },
    Else,
    End,
    Define { id: u32, start: i32 },
    Ret,
    Call { id: u32 },
    WriteStr(String),
    WriteVar(u32),
    Input { var: u32, ty: TypeTag },
    Include { index: u32, path: String },
    Eof,
}

fn tag_bits(ty: TypeTag) -> u8 {
    ty.to_u8().unwrap()
}

fn first_byte(opcode: Opcode, flags: u8) -> u8 {
    (opcode.to_u8().unwrap() << OPCODE_OFFSET) | (flags & FLAG_MASK)
}

pub(crate) fn write_str<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    if s.len() > STRING_MAX {
        return Err(Error::StringTooLong(s.len()));
    }
    writer.write_u8(s.len() as u8)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

pub(crate) fn read_str<R: Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_u8()? as usize;
    let mut bytes = vec![0; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| Error::InvalidString)
}

fn write_value<W: Write>(writer: &mut W, value: &Value) -> Result<()> {
    match value {
        Value::Bool(b) => writer.write_u8(*b as u8)?,
        Value::Int(i) => writer.write_i32::<Endian>(*i)?,
        Value::Float(x) => writer.write_f32::<Endian>(*x)?,
        Value::Str(s) => write_str(writer, s)?,
    }
    Ok(())
}

fn read_value<R: Read>(reader: &mut R, ty: TypeTag) -> Result<Value> {
    Ok(match ty {
        TypeTag::BOOL => Value::Bool(reader.read_u8()? != 0),
        TypeTag::INT => Value::Int(reader.read_i32::<Endian>()?),
        TypeTag::FLOAT => Value::Float(reader.read_f32::<Endian>()?),
        TypeTag::STRING => Value::Str(read_str(reader)?),
    })
}

fn read_tag(flags: u8) -> Result<TypeTag> {
    TypeTag::from_u8(flags & FLAG_TYPE_MASK).ok_or(Error::InvalidTypeTag(flags))
}

impl Instr {
    pub fn opcode(&self) -> Opcode {
        match *self {
            Instr::Nop => Opcode::NOP,
            Instr::SetValue { .. } | Instr::SetLinked { .. } | Instr::SetExpr { .. } => Opcode::SET,
            Instr::Push { .. } => Opcode::PUSH,
            Instr::Jump { .. } => Opcode::JUMP,
            Instr::If { .. } => Opcode::IF,
            Instr::Else => Opcode::ELSE,
            Instr::End => Opcode::END,
            Instr::Define { .. } => Opcode::DEFINE,
            Instr::Ret => Opcode::RET,
            Instr::Call { .. } => Opcode::CALL,
            Instr::WriteStr(_) | Instr::WriteVar(_) => Opcode::WRITE,
            Instr::Input { .. } => Opcode::INPUT,
            Instr::Include { .. } => Opcode::INCLUDE,
            Instr::Eof => Opcode::EOF,
        }
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Instr::Nop => writer.write_u8(first_byte(Opcode::NOP, 0))?,
            Instr::SetValue { var, value } => {
                writer.write_u8(first_byte(Opcode::SET, tag_bits(value.tag())))?;
                writer.write_u32::<Endian>(*var)?;
                write_value(writer, value)?;
            }
            Instr::SetLinked { var, ty, linked } => {
                writer.write_u8(first_byte(Opcode::SET, tag_bits(*ty) | FLAG_LINKED))?;
                writer.write_u32::<Endian>(*var)?;
                writer.write_u32::<Endian>(*linked)?;
            }
            Instr::SetExpr { var, ty, expr } => {
                writer.write_u8(first_byte(Opcode::SET, tag_bits(*ty) | FLAG_EXPR))?;
                writer.write_u32::<Endian>(*var)?;
                write_str(writer, expr)?;
            }
            Instr::Push { id, procedure } => {
                let flags = if *procedure { FLAG_PROCEDURE } else { 0 };
                writer.write_u8(first_byte(Opcode::PUSH, flags))?;
                writer.write_u32::<Endian>(*id)?;
            }
            Instr::Jump { target } => {
                writer.write_u8(first_byte(Opcode::JUMP, 0))?;
                writer.write_i32::<Endian>(*target)?;
            }
            Instr::If { target, cond } => match cond {
                IfCond::Var(var) => {
                    writer.write_u8(first_byte(Opcode::IF, 0))?;
                    writer.write_i32::<Endian>(*target)?;
                    writer.write_u32::<Endian>(*var)?;
                }
                IfCond::Expr(expr) => {
                    writer.write_u8(first_byte(Opcode::IF, FLAG_EXPR))?;
                    writer.write_i32::<Endian>(*target)?;
                    write_str(writer, expr)?;
                }
            },
            Instr::Else => writer.write_u8(first_byte(Opcode::ELSE, 0))?,
            Instr::End => writer.write_u8(first_byte(Opcode::END, 0))?,
            Instr::Define { id, start } => {
                writer.write_u8(first_byte(Opcode::DEFINE, 0))?;
                writer.write_u32::<Endian>(*id)?;
                writer.write_i32::<Endian>(*start)?;
            }
            Instr::Ret => writer.write_u8(first_byte(Opcode::RET, 0))?,
            Instr::Call { id } => {
                writer.write_u8(first_byte(Opcode::CALL, 0))?;
                writer.write_u32::<Endian>(*id)?;
            }
            Instr::WriteStr(text) => {
                writer.write_u8(first_byte(Opcode::WRITE, 0))?;
                write_str(writer, text)?;
            }
            Instr::WriteVar(var) => {
                writer.write_u8(first_byte(Opcode::WRITE, FLAG_BY_ID))?;
                writer.write_u32::<Endian>(*var)?;
            }
            Instr::Input { var, ty } => {
                writer.write_u8(first_byte(Opcode::INPUT, tag_bits(*ty)))?;
                writer.write_u32::<Endian>(*var)?;
            }
            Instr::Include { index, path } => {
                writer.write_u8(first_byte(Opcode::INCLUDE, 0))?;
                writer.write_u32::<Endian>(*index)?;
                write_str(writer, path)?;
            }
            Instr::Eof => writer.write_u8(first_byte(Opcode::EOF, 0))?,
        }
        Ok(())
    }

    /// Decodes the instruction whose first byte has already been read.
    pub fn decode<R: Read>(first: u8, reader: &mut R) -> Result<Instr> {
        let opcode =
            Opcode::from_u8(first >> OPCODE_OFFSET).ok_or(Error::InvalidOpcode(first))?;
        let flags = first & FLAG_MASK;

        Ok(match opcode {
            Opcode::NOP => Instr::Nop,
            Opcode::SET => {
                let var = reader.read_u32::<Endian>()?;
                if flags & FLAG_EXPR != 0 {
                    Instr::SetExpr {
                        var,
                        ty: read_tag(flags)?,
                        expr: read_str(reader)?,
                    }
                } else if flags & FLAG_LINKED != 0 {
                    Instr::SetLinked {
                        var,
                        ty: read_tag(flags)?,
                        linked: reader.read_u32::<Endian>()?,
                    }
                } else {
                    Instr::SetValue {
                        var,
                        value: read_value(reader, read_tag(flags)?)?,
                    }
                }
            }
            Opcode::PUSH => Instr::Push {
                id: reader.read_u32::<Endian>()?,
                procedure: flags & FLAG_PROCEDURE != 0,
            },
            Opcode::JUMP => Instr::Jump {
                target: reader.read_i32::<Endian>()?,
            },
            Opcode::IF => {
                let target = reader.read_i32::<Endian>()?;
                let cond = if flags & FLAG_EXPR != 0 {
                    IfCond::Expr(read_str(reader)?)
                } else {
                    IfCond::Var(reader.read_u32::<Endian>()?)
                };
                Instr::If { target, cond }
            }
            Opcode::ELSE => Instr::Else,
            Opcode::IFS => return Err(Error::InvalidOpcode(first)),
            Opcode::END => Instr::End,
            Opcode::DEFINE => Instr::Define {
                id: reader.read_u32::<Endian>()?,
                start: reader.read_i32::<Endian>()?,
            },
            Opcode::RET => Instr::Ret,
            Opcode::CALL => Instr::Call {
                id: reader.read_u32::<Endian>()?,
            },
            Opcode::WRITE => {
                if flags & FLAG_BY_ID != 0 {
                    Instr::WriteVar(reader.read_u32::<Endian>()?)
                } else {
                    Instr::WriteStr(read_str(reader)?)
                }
            }
            Opcode::INPUT => Instr::Input {
                var: reader.read_u32::<Endian>()?,
                ty: read_tag(flags)?,
            },
            Opcode::INCLUDE => Instr::Include {
                index: reader.read_u32::<Endian>()?,
                path: read_str(reader)?,
            },
            Opcode::EOF => Instr::Eof,
        })
    }
}
