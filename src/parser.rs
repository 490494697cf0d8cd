use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::{Token, TokenKind};
use tracing::trace;

/// Builds the node tree from a token slice.
///
/// Block boundaries are found by depth counting over the flat token list,
/// then each body range is parsed recursively.
pub struct Parser<'t> {
    tokens: &'t [Token],
}

/// Where the branches of one `if` block start and end.
struct IfBranches {
    else_ifs: Vec<usize>,
    else_index: Option<usize>,
    end_index: usize,
}

impl IfBranches {
    /// First token after the range starting at `from`: the next branch
    /// marker, else the closing `eif`.
    fn boundary_after(&self, from: usize) -> usize {
        self.else_ifs
            .iter()
            .copied()
            .find(|&i| i > from)
            .or(self.else_index.filter(|&i| i > from))
            .unwrap_or(self.end_index)
    }
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        Self { tokens }
    }

    pub fn parse(&self) -> Result<Template, ParserError> {
        let nodes = self.parse_range(0, self.tokens.len())?;
        trace!(nodes = nodes.len(), "parsed");
        Ok(nodes)
    }

    /// Parse tokens in `[start, end)`.
    pub fn parse_range(&self, start: usize, end: usize) -> Result<Template, ParserError> {
        let mut nodes = Vec::new();
        let mut i = start;
        while i < end {
            let token = &self.tokens[i];
            match token.kind {
                TokenKind::Plain => {
                    nodes.push(Node::Plain(token.value().to_string()));
                    i += 1;
                }
                TokenKind::Expression => {
                    nodes.push(Node::Expression {
                        expr: Expression::compile(token.value()),
                        location: token.location.clone(),
                    });
                    i += 1;
                }
                TokenKind::For => {
                    let end_for = self.find_end_for(i, end)?;
                    let (variable, iterable) = split_for(token)?;
                    nodes.push(Node::For {
                        variable,
                        iterable: Expression::compile(iterable),
                        body: self.parse_range(i + 1, end_for)?,
                        location: token.location.clone(),
                    });
                    i = end_for + 1;
                }
                TokenKind::If => {
                    let branches = self.find_if_branches(i, end)?;
                    nodes.push(self.build_if(i, &branches)?);
                    i = branches.end_index + 1;
                }
                TokenKind::EndFor | TokenKind::ElseIf | TokenKind::Else | TokenKind::EndIf => {
                    return Err(ParserError::new(
                        format!("unexpected {} tag", token.kind),
                        token.location.clone(),
                    ));
                }
            }
        }
        Ok(nodes)
    }

    fn find_end_for(&self, for_index: usize, end: usize) -> Result<usize, ParserError> {
        let mut depth = 0;
        for i in for_index + 1..end {
            match self.tokens[i].kind {
                TokenKind::For => depth += 1,
                TokenKind::EndFor if depth == 0 => return Ok(i),
                TokenKind::EndFor => depth -= 1,
                _ => {}
            }
        }
        Err(ParserError::new(
            "could not find Efor tag for For tag",
            self.tokens[for_index].location.clone(),
        ))
    }

    fn find_if_branches(&self, if_index: usize, end: usize) -> Result<IfBranches, ParserError> {
        let mut else_ifs = Vec::new();
        let mut else_index: Option<usize> = None;
        let mut depth = 0;
        for i in if_index + 1..end {
            let token = &self.tokens[i];
            if token.kind == TokenKind::If {
                depth += 1;
                continue;
            }
            if depth > 0 {
                if token.kind == TokenKind::EndIf {
                    depth -= 1;
                }
                continue;
            }
            match token.kind {
                TokenKind::ElseIf if else_index.is_some() => {
                    return Err(ParserError::new(
                        "Else If tag after Else tag",
                        token.location.clone(),
                    ));
                }
                TokenKind::ElseIf => else_ifs.push(i),
                TokenKind::Else if else_index.is_some() => {
                    return Err(ParserError::new(
                        "multiple Else tags for If tag",
                        token.location.clone(),
                    ));
                }
                TokenKind::Else => else_index = Some(i),
                TokenKind::EndIf => {
                    return Ok(IfBranches {
                        else_ifs,
                        else_index,
                        end_index: i,
                    })
                }
                _ => {}
            }
        }
        Err(ParserError::new(
            "could not find Eif tag for If tag",
            self.tokens[if_index].location.clone(),
        ))
    }

    fn build_if(&self, if_index: usize, branches: &IfBranches) -> Result<Node, ParserError> {
        let token = &self.tokens[if_index];
        let body = self.parse_range(if_index + 1, branches.boundary_after(if_index))?;

        let mut else_ifs = Vec::with_capacity(branches.else_ifs.len());
        for &index in &branches.else_ifs {
            let branch = &self.tokens[index];
            else_ifs.push(ElseIf {
                condition: Expression::compile(branch.value()),
                body: self.parse_range(index + 1, branches.boundary_after(index))?,
                location: branch.location.clone(),
            });
        }

        let else_body = match branches.else_index {
            Some(index) => Some(self.parse_range(index + 1, branches.end_index)?),
            None => None,
        };

        Ok(Node::If {
            condition: Expression::compile(token.value()),
            body,
            else_ifs,
            else_body,
            location: token.location.clone(),
        })
    }
}

/// Split `x in xs` on the first ` in `.
fn split_for(token: &Token) -> Result<(String, &str), ParserError> {
    let invalid = || {
        ParserError::new(
            "invalid For tag, expected '<variable> in <expression>'",
            token.location.clone(),
        )
    };
    let value = token.value();
    let (variable, iterable) = value.split_once(" in ").ok_or_else(invalid)?;
    let variable = variable.trim();
    let is_identifier = variable
        .chars()
        .next()
        .map_or(false, |c| c.is_alphabetic() || c == '_' || c == '$')
        && variable
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if !is_identifier {
        return Err(invalid());
    }
    Ok((variable.to_string(), iterable.trim()))
}

/// Parse a full token sequence.
pub fn parse(tokens: &[Token]) -> Result<Template, ParserError> {
    Parser::new(tokens).parse()
}
