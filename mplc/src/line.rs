use pest::iterators::Pair;
use pest::Parser;

use mplbin::TypeTag;
use util::EnumFromStr;

use crate::parser::{MplParser, Rule};

/// One recognized source line.
#[derive(Debug, PartialEq)]
pub enum Command<'i> {
    Set {
        name: &'i str,
        rvalue: Rvalue<'i>,
        ty: TypeTag,
    },
    Push {
        name: &'i str,
    },
    Write {
        arg: WriteArg<'i>,
    },
    Input {
        name: &'i str,
        ty: TypeTag,
    },
    Jump {
        line: u32,
    },
    Define {
        name: &'i str,
    },
    Ret,
    Call {
        name: &'i str,
    },
    EndElse,
    End,
    IfBlock {
        cond: CondSrc<'i>,
    },
    IfInline {
        cond: CondSrc<'i>,
        left: Box<Command<'i>>,
        right: Box<Command<'i>>,
    },
    Include {
        path: &'i str,
    },
}

#[derive(Debug, PartialEq)]
pub enum Rvalue<'i> {
    Expr(&'i str),
    Name(&'i str),
    Literal(LiteralKind, &'i str),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LiteralKind {
    Int,
    Float,
    Bool,
    Str,
}

#[derive(Debug, PartialEq)]
pub enum WriteArg<'i> {
    Literal(&'i str),
    Name(&'i str),
}

#[derive(Debug, PartialEq)]
pub enum CondSrc<'i> {
    Expr(&'i str),
    Name(&'i str),
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_set
            | Rule::kw_push
            | Rule::kw_write
            | Rule::kw_input
            | Rule::kw_jump
            | Rule::kw_define
            | Rule::kw_ret
            | Rule::kw_call
            | Rule::kw_end
            | Rule::kw_if
    )
}

fn args<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn type_tag(pair: &Pair<Rule>) -> TypeTag {
    match TypeTag::from_str(pair.as_str()) {
        Ok(ty) => ty,
        Err(_) => unreachable!(),
    }
}

fn string_text<'i>(pair: Pair<'i, Rule>) -> &'i str {
    match pair.into_inner().next() {
        Some(inner) => inner.as_str(),
        None => unreachable!(),
    }
}

fn convert_rvalue<'i>(pair: Pair<'i, Rule>) -> Rvalue<'i> {
    let inner = match pair.into_inner().next() {
        Some(inner) => inner,
        None => unreachable!(),
    };
    match inner.as_rule() {
        Rule::expression => Rvalue::Expr(inner.as_str()),
        Rule::identifier => Rvalue::Name(inner.as_str()),
        Rule::string => Rvalue::Literal(LiteralKind::Str, string_text(inner)),
        Rule::float => Rvalue::Literal(LiteralKind::Float, inner.as_str()),
        Rule::int => Rvalue::Literal(LiteralKind::Int, inner.as_str()),
        Rule::boolean => Rvalue::Literal(LiteralKind::Bool, inner.as_str()),
        _ => unreachable!(),
    }
}

fn convert_condition<'i>(pair: Pair<'i, Rule>) -> CondSrc<'i> {
    let inner = match pair.into_inner().next() {
        Some(inner) => inner,
        None => unreachable!(),
    };
    match inner.as_rule() {
        Rule::expression => CondSrc::Expr(inner.as_str()),
        Rule::identifier => CondSrc::Name(inner.as_str()),
        _ => unreachable!(),
    }
}

fn convert_command<'i>(pair: Pair<'i, Rule>) -> Command<'i> {
    let rule = pair.as_rule();
    let mut pairs = args(pair);
    let mut next = || match pairs.next() {
        Some(pair) => pair,
        None => unreachable!(),
    };
    match rule {
        Rule::set => {
            let name = next().as_str();
            let rvalue = convert_rvalue(next());
            let ty = type_tag(&next());
            Command::Set { name, rvalue, ty }
        }
        Rule::push => Command::Push {
            name: next().as_str(),
        },
        Rule::write => {
            let arg = next();
            let arg = match arg.as_rule() {
                Rule::string => WriteArg::Literal(string_text(arg)),
                Rule::identifier => WriteArg::Name(arg.as_str()),
                _ => unreachable!(),
            };
            Command::Write { arg }
        }
        Rule::input => {
            let name = next().as_str();
            let ty = type_tag(&next());
            Command::Input { name, ty }
        }
        Rule::jump => Command::Jump {
            line: next().as_str().parse().unwrap_or(u32::max_value()),
        },
        Rule::define => Command::Define {
            name: next().as_str(),
        },
        Rule::ret => Command::Ret,
        Rule::call => Command::Call {
            name: next().as_str(),
        },
        Rule::end_else => Command::EndElse,
        Rule::end_cmd => Command::End,
        Rule::if_block => Command::IfBlock {
            cond: convert_condition(next()),
        },
        Rule::if_inline => {
            let cond = convert_condition(next());
            let left = convert_simple(next());
            let right = convert_simple(next());
            Command::IfInline {
                cond,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        Rule::include => Command::Include {
            path: next().as_str(),
        },
        _ => unreachable!(),
    }
}

fn convert_simple<'i>(pair: Pair<'i, Rule>) -> Command<'i> {
    match pair.into_inner().next() {
        Some(inner) => convert_command(inner),
        None => unreachable!(),
    }
}

/// Parses one source line. `Ok(None)` is a blank or comment-only line;
/// `Err` is a line that matches no command shape.
pub fn parse_line(text: &str) -> Result<Option<Command>, pest::error::Error<Rule>> {
    let mut pairs = MplParser::parse(Rule::line, text)?;
    let line = match pairs.next() {
        Some(line) => line,
        None => return Ok(None),
    };
    Ok(line
        .into_inner()
        .find(|p| p.as_rule() != Rule::EOI)
        .map(convert_command))
}
