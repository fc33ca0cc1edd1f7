use super::ExprError;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Int(i32),
    Float(f32),
    Bool(bool),
    Var(u32),
    Name(String),
    LParen,
    RParen,
    Semi,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
}

fn syntax(pos: usize, message: &str) -> ExprError {
    ExprError::Syntax {
        pos,
        message: message.to_string(),
    }
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        match c {
            b' ' | b'\t' => pos += 1,
            b'(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            b';' => {
                tokens.push(Token::Semi);
                pos += 1;
            }
            b'+' => {
                tokens.push(Token::Plus);
                pos += 1;
            }
            b'-' => {
                tokens.push(Token::Minus);
                pos += 1;
            }
            b'*' => {
                tokens.push(Token::Star);
                pos += 1;
            }
            b'/' => {
                tokens.push(Token::Slash);
                pos += 1;
            }
            b'%' => {
                tokens.push(Token::Percent);
                pos += 1;
            }
            b'^' => {
                tokens.push(Token::Caret);
                pos += 1;
            }
            b'&' => {
                if bytes.get(pos + 1) == Some(&b'&') {
                    tokens.push(Token::And);
                    pos += 2;
                } else {
                    return Err(syntax(pos, "Expected \"&&\"."));
                }
            }
            b'|' => {
                if bytes.get(pos + 1) == Some(&b'|') {
                    tokens.push(Token::Or);
                    pos += 2;
                } else {
                    return Err(syntax(pos, "Expected \"||\"."));
                }
            }
            b'=' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Eq);
                    pos += 2;
                } else {
                    return Err(syntax(pos, "Expected \"==\"."));
                }
            }
            b'!' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Ne);
                    pos += 2;
                } else {
                    tokens.push(Token::Not);
                    pos += 1;
                }
            }
            b'<' => match bytes.get(pos + 1) {
                Some(&b'=') => {
                    tokens.push(Token::Le);
                    pos += 2;
                }
                Some(&b'<') => {
                    tokens.push(Token::Shl);
                    pos += 2;
                }
                _ => {
                    tokens.push(Token::Lt);
                    pos += 1;
                }
            },
            b'>' => match bytes.get(pos + 1) {
                Some(&b'=') => {
                    tokens.push(Token::Ge);
                    pos += 2;
                }
                Some(&b'>') => {
                    tokens.push(Token::Shr);
                    pos += 2;
                }
                _ => {
                    tokens.push(Token::Gt);
                    pos += 1;
                }
            },
            b'@' => {
                let start = pos + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end == start {
                    return Err(syntax(pos, "Expected a variable id after \"@\"."));
                }
                let id = src[start..end]
                    .parse::<u32>()
                    .map_err(|_| syntax(pos, "Variable id is out of range."))?;
                tokens.push(Token::Var(id));
                pos = end;
            }
            b'0'..=b'9' => {
                let start = pos;
                let mut end = pos;
                let mut fraction = false;
                while end < bytes.len() {
                    match bytes[end] {
                        b'0'..=b'9' => end += 1,
                        b'.' if !fraction => {
                            fraction = true;
                            end += 1;
                        }
                        _ => break,
                    }
                }
                let text = &src[start..end];
                if fraction {
                    let value = text
                        .parse::<f32>()
                        .map_err(|_| syntax(start, "Invalid float literal."))?;
                    tokens.push(Token::Float(value));
                } else {
                    let value = text
                        .parse::<i32>()
                        .map_err(|_| syntax(start, "Integer literal is out of range."))?;
                    tokens.push(Token::Int(value));
                }
                pos = end;
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                let start = pos;
                let mut end = pos;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                let name = &src[start..end];
                match name {
                    "TRUE" => tokens.push(Token::Bool(true)),
                    "FALSE" => tokens.push(Token::Bool(false)),
                    _ => tokens.push(Token::Name(name.to_string())),
                }
                pos = end;
            }
            _ => return Err(syntax(pos, "Unexpected character.")),
        }
    }

    Ok(tokens)
}
