//! 规则表达式词法分析

use super::RuleError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    True,
    False,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier `{}`", name),
            Token::Str(_) => "string literal".to_string(),
            Token::True => "`true`".to_string(),
            Token::False => "`false`".to_string(),
            Token::In => "`in`".to_string(),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
            Token::LBracket => "`[`".to_string(),
            Token::RBracket => "`]`".to_string(),
            Token::Comma => "`,`".to_string(),
            Token::Dot => "`.`".to_string(),
            Token::EqEq => "`==`".to_string(),
            Token::NotEq => "`!=`".to_string(),
            Token::AndAnd => "`&&`".to_string(),
            Token::OrOr => "`||`".to_string(),
            Token::Bang => "`!`".to_string(),
        }
    }
}

/// 带起始字节偏移的 token
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, RuleError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match c {
            '(' => single(&mut chars, Token::LParen),
            ')' => single(&mut chars, Token::RParen),
            '[' => single(&mut chars, Token::LBracket),
            ']' => single(&mut chars, Token::RBracket),
            ',' => single(&mut chars, Token::Comma),
            '.' => single(&mut chars, Token::Dot),
            '=' => pair(&mut chars, '=', Token::EqEq, offset)?,
            '&' => pair(&mut chars, '&', Token::AndAnd, offset)?,
            '|' => pair(&mut chars, '|', Token::OrOr, offset)?,
            '!' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, next)| next == '=') {
                    chars.next();
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            '"' | '\'' => string(&mut chars, c, offset)?,
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "in" => Token::In,
                    _ => Token::Ident(ident),
                }
            }
            other => {
                return Err(RuleError::UnexpectedChar {
                    found: other,
                    offset,
                })
            }
        };
        tokens.push(Spanned { token, offset });
    }

    Ok(tokens)
}

type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn single(chars: &mut Chars<'_>, token: Token) -> Token {
    chars.next();
    token
}

fn pair(chars: &mut Chars<'_>, second: char, token: Token, offset: usize) -> Result<Token, RuleError> {
    chars.next();
    match chars.next() {
        Some((_, c)) if c == second => Ok(token),
        Some((at, c)) => Err(RuleError::UnexpectedChar { found: c, offset: at }),
        None => Err(RuleError::UnexpectedEnd {
            expected: "operator",
            offset,
        }),
    }
}

fn string(chars: &mut Chars<'_>, quote: char, offset: usize) -> Result<Token, RuleError> {
    chars.next();
    let mut value = String::new();
    loop {
        match chars.next() {
            None => return Err(RuleError::UnterminatedString { offset }),
            Some((_, c)) if c == quote => return Ok(Token::Str(value)),
            Some((at, '\\')) => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, c @ ('\\' | '"' | '\''))) => value.push(c),
                Some((_, other)) => {
                    return Err(RuleError::InvalidEscape {
                        found: other,
                        offset: at,
                    })
                }
                None => return Err(RuleError::UnterminatedString { offset }),
            },
            Some((_, c)) => value.push(c),
        }
    }
}
