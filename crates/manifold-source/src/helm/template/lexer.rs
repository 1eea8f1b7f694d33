//! Splits template source into text and action tokens

/// Top-level piece of a template
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Text(String),
    Action { tokens: Vec<Token>, line: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Function name or keyword
    Ident(String),
    /// `.a.b` relative to dot; empty for `.` itself
    Field(Vec<String>),
    /// `.a.b` directly after a closing parenthesis
    Chain(Vec<String>),
    /// `$name.a.b`; the name keeps its `$`
    Variable(String, Vec<String>),
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    LeftParen,
    RightParen,
    Pipe,
    Declare,
    Assign,
    Comma,
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

pub fn lex(input: &str) -> Result<Vec<Item>, String> {
    let mut items = Vec::new();
    let mut rest = input;
    let mut line = 1;

    while let Some(start) = rest.find(OPEN) {
        let mut text = &rest[..start];
        line += text.matches('\n').count();
        let after = &rest[start + OPEN.len()..];

        let trim_left = after.starts_with('-') && after[1..].starts_with(char::is_whitespace);
        if trim_left {
            text = text.trim_end();
        }
        if !text.is_empty() {
            items.push(Item::Text(text.to_string()));
        }

        let body = if trim_left { &after[1..] } else { after };
        let action = lex_action(body, line)?;
        line += body[..action.consumed].matches('\n').count();

        rest = &body[action.consumed..];
        if action.trim_right {
            let trimmed = rest.trim_start();
            line += rest[..rest.len() - trimmed.len()].matches('\n').count();
            rest = trimmed;
        }
        if let Some(tokens) = action.tokens {
            items.push(Item::Action {
                tokens,
                line: action.line,
            });
        }
    }

    if !rest.is_empty() {
        items.push(Item::Text(rest.to_string()));
    }
    Ok(items)
}

struct Action {
    /// `None` for a comment
    tokens: Option<Vec<Token>>,
    /// Bytes of the body up to and including the closing delimiter
    consumed: usize,
    trim_right: bool,
    line: usize,
}

/// Tokenize one action body; `body` starts right after `{{` (and its trim
/// marker)
fn lex_action(body: &str, line: usize) -> Result<Action, String> {
    let leading = body.len() - body.trim_start().len();
    if body[leading..].starts_with("/*") {
        let end = body[leading..]
            .find("*/")
            .ok_or_else(|| format!("line {}: unclosed comment", line))?;
        let after = leading + end + 2;
        let (consumed, trim_right) = close_delimiter(body, after)
            .ok_or_else(|| format!("line {}: comment must be followed by }}}}", line))?;
        return Ok(Action {
            tokens: None,
            consumed,
            trim_right,
            line,
        });
    }

    let chars: Vec<(usize, char)> = body.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut after_paren = false;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c.is_whitespace() || c == '}' {
            if let Some((consumed, trim_right)) = close_delimiter(body, offset) {
                return Ok(Action {
                    tokens: Some(tokens),
                    consumed,
                    trim_right,
                    line,
                });
            }
        }
        if c.is_whitespace() {
            after_paren = false;
            i += 1;
            continue;
        }

        let chained = after_paren;
        after_paren = false;

        match c {
            '(' => {
                tokens.push(Token::LeftParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RightParen);
                after_paren = true;
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            ':' if matches!(chars.get(i + 1), Some((_, '='))) => {
                tokens.push(Token::Declare);
                i += 2;
            }
            '"' => {
                let (value, next) = lex_quoted(&chars, i + 1, line)?;
                tokens.push(Token::String(value));
                i = next;
            }
            '`' => {
                let mut value = String::new();
                i += 1;
                while i < chars.len() && chars[i].1 != '`' {
                    value.push(chars[i].1);
                    i += 1;
                }
                if i == chars.len() {
                    return Err(format!("line {}: unterminated raw string", line));
                }
                tokens.push(Token::String(value));
                i += 1;
            }
            '\'' => {
                let ch = chars
                    .get(i + 1)
                    .map(|(_, ch)| *ch)
                    .filter(|_| matches!(chars.get(i + 2), Some((_, '\''))))
                    .ok_or_else(|| format!("line {}: malformed character constant", line))?;
                tokens.push(Token::Int(ch as i64));
                i += 3;
            }
            '.' if chars.get(i + 1).map_or(true, |(_, n)| !n.is_ascii_digit()) => {
                let (fields, next) = lex_fields(&chars, i);
                tokens.push(if chained {
                    Token::Chain(fields)
                } else {
                    Token::Field(fields)
                });
                i = next;
            }
            '$' => {
                let mut name = String::from("$");
                i += 1;
                while i < chars.len() && is_ident_char(chars[i].1) {
                    name.push(chars[i].1);
                    i += 1;
                }
                let (fields, next) = lex_fields(&chars, i);
                tokens.push(Token::Variable(name, fields));
                i = next;
            }
            c if c.is_ascii_digit()
                || c == '.'
                || ((c == '-' || c == '+')
                    && chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit() || *n == '.')) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() {
                    let ch = chars[i].1;
                    let exponent_sign = (ch == '-' || ch == '+')
                        && matches!(chars[i - 1].1, 'e' | 'E')
                        && !chars[start..i].iter().any(|(_, c)| matches!(c, 'x' | 'X'));
                    if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || exponent_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let end = chars.get(i).map_or(body.len(), |(offset, _)| *offset);
                tokens.push(lex_number(&body[offset..end], line)?);
            }
            c if is_ident_start(c) => {
                let mut name = String::new();
                while i < chars.len() && is_ident_char(chars[i].1) {
                    name.push(chars[i].1);
                    i += 1;
                }
                tokens.push(match name.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "nil" => Token::Nil,
                    _ => Token::Ident(name),
                });
            }
            other => return Err(format!("line {}: unexpected {:?} in action", line, other)),
        }
    }

    Err(format!("line {}: unclosed action", line))
}

/// Match `}}` or `-}}` (after whitespace) at `offset`, skipping whitespace
fn close_delimiter(body: &str, offset: usize) -> Option<(usize, bool)> {
    let rest = &body[offset..];
    let trimmed = rest.trim_start();
    let at = offset + rest.len() - trimmed.len();
    let had_space = at > offset;
    if trimmed.starts_with(CLOSE) {
        return Some((at + CLOSE.len(), false));
    }
    if had_space && trimmed.starts_with("-}}") {
        return Some((at + 1 + CLOSE.len(), true));
    }
    None
}

fn lex_fields(chars: &[(usize, char)], mut i: usize) -> (Vec<String>, usize) {
    let mut fields = Vec::new();
    while i < chars.len() && chars[i].1 == '.' {
        i += 1;
        let mut name = String::new();
        while i < chars.len() && is_ident_char(chars[i].1) {
            name.push(chars[i].1);
            i += 1;
        }
        if name.is_empty() {
            break;
        }
        fields.push(name);
    }
    (fields, i)
}

fn lex_quoted(chars: &[(usize, char)], mut i: usize, line: usize) -> Result<(String, usize), String> {
    let mut value = String::new();
    while i < chars.len() {
        match chars[i].1 {
            '"' => return Ok((value, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .map(|(_, c)| *c)
                    .ok_or_else(|| format!("line {}: unterminated string", line))?;
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    '\'' => value.push('\''),
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
                i += 2;
            }
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err(format!("line {}: unterminated string", line))
}

fn lex_number(text: &str, line: usize) -> Result<Token, String> {
    let cleaned = text.replace('_', "");
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    let sign = if negative { -1 } else { 1 };

    let radix = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)]
        .iter()
        .find_map(|(prefix, radix)| digits.strip_prefix(prefix).map(|d| (d, *radix)));
    if let Some((digits, radix)) = radix {
        return i64::from_str_radix(digits, radix)
            .map(|n| Token::Int(sign * n))
            .map_err(|_| format!("line {}: bad number syntax: {:?}", line, text));
    }

    if let Ok(n) = cleaned.parse::<i64>() {
        return Ok(Token::Int(n));
    }
    cleaned
        .parse::<f64>()
        .map(Token::Float)
        .map_err(|_| format!("line {}: bad number syntax: {:?}", line, text))
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
