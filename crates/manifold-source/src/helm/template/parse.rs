//! Builds the template tree from lexed items

use super::lexer::{Item, Token};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Action(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    With {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Template {
        name: String,
        pipe: Option<Pipeline>,
    },
}

/// `[$a[, $b] :=|=] command | command ...`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    pub decl: Vec<String>,
    pub assign: bool,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Field(Vec<String>),
    Variable(String, Vec<String>),
    Function(String),
    Literal(Value),
    Nested(Box<Pipeline>, Vec<String>),
}

/// A parsed template file: its body plus the blocks it defines
#[derive(Debug, Clone, Default)]
pub struct Tree {
    pub root: Vec<Node>,
    pub defines: Vec<(String, Vec<Node>)>,
}

enum Terminator {
    End,
    Else(Vec<Token>, usize),
    Eof,
}

struct Parser {
    items: std::vec::IntoIter<Item>,
    defines: Vec<(String, Vec<Node>)>,
}

pub fn parse(items: Vec<Item>) -> Result<Tree, String> {
    let mut parser = Parser {
        items: items.into_iter(),
        defines: Vec::new(),
    };
    let (root, terminator) = parser.list()?;
    match terminator {
        Terminator::Eof => Ok(Tree {
            root,
            defines: parser.defines,
        }),
        Terminator::End => Err("unexpected {{end}}".to_string()),
        Terminator::Else(_, line) => Err(format!("line {}: unexpected {{{{else}}}}", line)),
    }
}

impl Parser {
    fn list(&mut self) -> Result<(Vec<Node>, Terminator), String> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            let (tokens, line) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { tokens, line } => (tokens, line),
            };

            let keyword = match tokens.first() {
                Some(Token::Ident(name)) => name.as_str(),
                _ => "",
            };
            let rest = tokens.get(1..).unwrap_or_default().to_vec();
            match keyword {
                "end" => return Ok((nodes, Terminator::End)),
                "else" => return Ok((nodes, Terminator::Else(rest, line))),
                "if" => nodes.push(self.if_chain(rest, line)?),
                "with" => {
                    let pipe = pipeline(&rest, line)?;
                    let (body, otherwise) = self.body_with_else(line, "with")?;
                    nodes.push(Node::With { pipe, body, otherwise });
                }
                "range" => {
                    let pipe = pipeline(&rest, line)?;
                    let (body, otherwise) = self.body_with_else(line, "range")?;
                    nodes.push(Node::Range { pipe, body, otherwise });
                }
                "define" => {
                    let name = template_name(&rest, line)?;
                    let (body, terminator) = self.list()?;
                    expect_end(terminator, line, "define")?;
                    self.defines.push((name, body));
                }
                "block" => {
                    let name = template_name(&rest, line)?;
                    let pipe = optional_pipeline(&rest[1..], line)?;
                    let (body, terminator) = self.list()?;
                    expect_end(terminator, line, "block")?;
                    self.defines.push((name.clone(), body));
                    nodes.push(Node::Template { name, pipe });
                }
                "template" => {
                    let name = template_name(&rest, line)?;
                    let pipe = optional_pipeline(&rest[1..], line)?;
                    nodes.push(Node::Template { name, pipe });
                }
                "break" | "continue" => {
                    return Err(format!("line {}: {{{{{}}}}} is not supported", line, keyword))
                }
                _ => nodes.push(Node::Action(pipeline(&tokens, line)?)),
            }
        }
        Ok((nodes, Terminator::Eof))
    }

    /// `if` with any number of `else if` branches and an optional `else`
    fn if_chain(&mut self, condition: Vec<Token>, line: usize) -> Result<Node, String> {
        let mut branches = Vec::new();
        let mut condition = pipeline(&condition, line)?;
        loop {
            let (body, terminator) = self.list()?;
            branches.push((condition, body));
            match terminator {
                Terminator::End => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    })
                }
                Terminator::Else(tokens, else_line) if tokens.is_empty() => {
                    let (otherwise, terminator) = self.list()?;
                    expect_end(terminator, else_line, "else")?;
                    return Ok(Node::If { branches, otherwise });
                }
                Terminator::Else(tokens, else_line) => match tokens.first() {
                    Some(Token::Ident(keyword)) if keyword == "if" => {
                        condition = pipeline(&tokens[1..], else_line)?;
                    }
                    _ => return Err(format!("line {}: expected {{{{else if}}}}", else_line)),
                },
                Terminator::Eof => return Err(format!("line {}: unclosed {{{{if}}}}", line)),
            }
        }
    }

    fn body_with_else(&mut self, line: usize, keyword: &str) -> Result<(Vec<Node>, Vec<Node>), String> {
        let (body, terminator) = self.list()?;
        match terminator {
            Terminator::End => Ok((body, Vec::new())),
            Terminator::Else(tokens, else_line) if tokens.is_empty() => {
                let (otherwise, terminator) = self.list()?;
                expect_end(terminator, else_line, keyword)?;
                Ok((body, otherwise))
            }
            Terminator::Else(_, else_line) => Err(format!(
                "line {}: chained else is not supported in {{{{{}}}}}",
                else_line, keyword
            )),
            Terminator::Eof => Err(format!("line {}: unclosed {{{{{}}}}}", line, keyword)),
        }
    }
}

fn expect_end(terminator: Terminator, line: usize, keyword: &str) -> Result<(), String> {
    match terminator {
        Terminator::End => Ok(()),
        _ => Err(format!("line {}: missing {{{{end}}}} for {{{{{}}}}}", line, keyword)),
    }
}

fn template_name(tokens: &[Token], line: usize) -> Result<String, String> {
    match tokens.first() {
        Some(Token::String(name)) => Ok(name.clone()),
        _ => Err(format!("line {}: expected template name string", line)),
    }
}

fn optional_pipeline(tokens: &[Token], line: usize) -> Result<Option<Pipeline>, String> {
    if tokens.is_empty() {
        Ok(None)
    } else {
        pipeline(tokens, line).map(Some)
    }
}

pub fn pipeline(tokens: &[Token], line: usize) -> Result<Pipeline, String> {
    let mut decl = Vec::new();
    let mut assign = false;
    let mut rest = tokens;

    // `$x :=`, `$x =` or `$k, $v :=`
    let declared = match tokens {
        [Token::Variable(a, fa), Token::Comma, Token::Variable(b, fb), op @ (Token::Declare | Token::Assign), ..]
            if fa.is_empty() && fb.is_empty() =>
        {
            Some((vec![a.clone(), b.clone()], op, 4))
        }
        [Token::Variable(a, fa), op @ (Token::Declare | Token::Assign), ..] if fa.is_empty() => {
            Some((vec![a.clone()], op, 2))
        }
        _ => None,
    };
    if let Some((names, op, consumed)) = declared {
        decl = names;
        assign = matches!(op, Token::Assign);
        rest = &tokens[consumed..];
    }

    let mut commands = Vec::new();
    let mut current: Vec<Arg> = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        match &rest[i] {
            Token::Pipe => {
                if current.is_empty() {
                    return Err(format!("line {}: missing command before |", line));
                }
                commands.push(Command {
                    args: std::mem::take(&mut current),
                });
                i += 1;
            }
            Token::LeftParen => {
                let close = matching_paren(rest, i)
                    .ok_or_else(|| format!("line {}: unclosed left paren", line))?;
                let inner = pipeline(&rest[i + 1..close], line)?;
                i = close + 1;
                let chain = match rest.get(i) {
                    Some(Token::Chain(fields)) => {
                        i += 1;
                        fields.clone()
                    }
                    _ => Vec::new(),
                };
                current.push(Arg::Nested(Box::new(inner), chain));
            }
            token => {
                current.push(operand(token, line)?);
                i += 1;
            }
        }
    }
    if current.is_empty() {
        return Err(format!("line {}: missing value for command", line));
    }
    commands.push(Command { args: current });

    Ok(Pipeline {
        decl,
        assign,
        commands,
    })
}

fn operand(token: &Token, line: usize) -> Result<Arg, String> {
    Ok(match token {
        Token::Field(fields) => Arg::Field(fields.clone()),
        Token::Variable(name, fields) => Arg::Variable(name.clone(), fields.clone()),
        Token::Ident(name) => Arg::Function(name.clone()),
        Token::String(value) => Arg::Literal(Value::String(value.clone())),
        Token::Int(value) => Arg::Literal(Value::from(*value)),
        Token::Float(value) => Arg::Literal(
            serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        ),
        Token::Bool(value) => Arg::Literal(Value::Bool(*value)),
        Token::Nil => Arg::Literal(Value::Null),
        other => return Err(format!("line {}: unexpected {:?} in operand", line, other)),
    })
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0;
    for (index, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LeftParen => depth += 1,
            Token::RightParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}
