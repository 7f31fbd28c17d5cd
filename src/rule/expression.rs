//! 表达式规则 - CEL 子集的解析、类型检查与求值
//!
//! 语法：
//! ```text
//! or      := and ("||" and)*
//! and     := rel ("&&" rel)*
//! rel     := unary (("==" | "!=") unary | "in" list)?
//! unary   := "!" unary | member
//! member  := primary ("." ident "(" args? ")")*
//! primary := ident | string | "true" | "false" | "(" or ")"
//! list    := "[" (string ("," string)*)? "]"
//! ```
//! 变量只有 `type`（别名 `category`）和 `text`。类型检查在编译期完成，
//! 求值对任意记录都不会失败。

use std::borrow::Cow;

use regex::Regex;

use super::lexer::{tokenize, Spanned, Token};
use super::{MatchRule, RuleError};
use crate::notification::NotificationRecord;

/// 未做类型检查的语法树
#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Var(String, usize),
    Str(String, usize),
    Bool(bool, usize),
    Not(Box<Ast>, usize),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Eq {
        lhs: Box<Ast>,
        rhs: Box<Ast>,
        negated: bool,
        offset: usize,
    },
    In {
        lhs: Box<Ast>,
        list: Vec<String>,
        offset: usize,
    },
    Call {
        receiver: Box<Ast>,
        method: String,
        args: Vec<Ast>,
        offset: usize,
    },
}

impl Ast {
    fn offset(&self) -> usize {
        match self {
            Ast::Var(_, o) | Ast::Str(_, o) | Ast::Bool(_, o) | Ast::Not(_, o) => *o,
            Ast::And(lhs, _) | Ast::Or(lhs, _) => lhs.offset(),
            Ast::Eq { offset, .. } | Ast::In { offset, .. } | Ast::Call { offset, .. } => *offset,
        }
    }

    /// 语法树高度，叶子为 1
    fn height(&self) -> usize {
        let children = match self {
            Ast::Var(..) | Ast::Str(..) | Ast::Bool(..) => 0,
            Ast::Not(inner, _) | Ast::In { lhs: inner, .. } => inner.height(),
            Ast::And(lhs, rhs) | Ast::Or(lhs, rhs) | Ast::Eq { lhs, rhs, .. } => {
                lhs.height().max(rhs.height())
            }
            Ast::Call { receiver, args, .. } => args
                .iter()
                .map(Ast::height)
                .fold(receiver.height(), usize::max),
        };
        children + 1
    }

    /// 语法上可确定的结果类型
    fn ty(&self) -> Ty {
        match self {
            Ast::Var(..) | Ast::Str(..) => Ty::String,
            Ast::Call { method, .. } if method == "lowerAscii" => Ty::String,
            _ => Ty::Bool,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Bool,
    String,
}

impl Ty {
    fn name(self) -> &'static str {
        match self {
            Ty::Bool => "bool",
            Ty::String => "string",
        }
    }
}

/// 表达式允许的最大嵌套深度
pub const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    nesting: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>, end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
            nesting: 0,
        }
    }

    /// 进入括号、`!` 或参数列表
    fn enter(&mut self, offset: usize) -> Result<(), RuleError> {
        if self.nesting >= MAX_DEPTH {
            return Err(RuleError::TooDeep {
                max: MAX_DEPTH,
                offset,
            });
        }
        self.nesting += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    /// 链式的 `||`、`&&` 和方法调用在循环中向左加深，构造时检查高度
    fn build(&self, ast: Ast, offset: usize) -> Result<Ast, RuleError> {
        if ast.height() > MAX_DEPTH {
            return Err(RuleError::TooDeep {
                max: MAX_DEPTH,
                offset,
            });
        }
        Ok(ast)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.offset)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), RuleError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &'static str) -> RuleError {
        match self.tokens.get(self.pos) {
            Some(spanned) => RuleError::UnexpectedToken {
                found: spanned.token.describe(),
                expected,
                offset: spanned.offset,
            },
            None => RuleError::UnexpectedEnd {
                expected,
                offset: self.end,
            },
        }
    }

    fn parse_or(&mut self) -> Result<Ast, RuleError> {
        let mut lhs = self.parse_and()?;
        loop {
            let offset = self.offset();
            if !self.eat(&Token::OrOr) {
                break;
            }
            let rhs = self.parse_and()?;
            lhs = self.build(Ast::Or(Box::new(lhs), Box::new(rhs)), offset)?;
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Ast, RuleError> {
        let mut lhs = self.parse_rel()?;
        loop {
            let offset = self.offset();
            if !self.eat(&Token::AndAnd) {
                break;
            }
            let rhs = self.parse_rel()?;
            lhs = self.build(Ast::And(Box::new(lhs), Box::new(rhs)), offset)?;
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> Result<Ast, RuleError> {
        let lhs = self.parse_unary()?;
        let offset = self.offset();
        match self.peek() {
            Some(Token::EqEq) | Some(Token::NotEq) => {
                let negated = self.peek() == Some(&Token::NotEq);
                self.pos += 1;
                let rhs = self.parse_unary()?;
                let eq = Ast::Eq {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    negated,
                    offset,
                };
                self.build(eq, offset)
            }
            Some(Token::In) => {
                self.pos += 1;
                let list = self.parse_list()?;
                let membership = Ast::In {
                    lhs: Box::new(lhs),
                    list,
                    offset,
                };
                self.build(membership, offset)
            }
            _ => Ok(lhs),
        }
    }

    fn parse_unary(&mut self) -> Result<Ast, RuleError> {
        let offset = self.offset();
        if self.eat(&Token::Bang) {
            self.enter(offset)?;
            let operand = self.parse_unary()?;
            self.leave();
            return self.build(Ast::Not(Box::new(operand), offset), offset);
        }
        self.parse_member()
    }

    fn parse_member(&mut self) -> Result<Ast, RuleError> {
        let mut receiver = self.parse_primary()?;
        loop {
            let offset = self.offset();
            if !self.eat(&Token::Dot) {
                return Ok(receiver);
            }
            let method = match self.peek().cloned() {
                Some(Token::Ident(name)) => {
                    self.pos += 1;
                    name
                }
                _ => return Err(self.unexpected("method name")),
            };
            self.expect(Token::LParen, "`(`")?;
            let mut args = Vec::new();
            if !self.eat(&Token::RParen) {
                self.enter(offset)?;
                loop {
                    args.push(self.parse_or()?);
                    if self.eat(&Token::RParen) {
                        break;
                    }
                    self.expect(Token::Comma, "`,` or `)`")?;
                }
                self.leave();
            }
            let call = Ast::Call {
                receiver: Box::new(receiver),
                method,
                args,
                offset,
            };
            receiver = self.build(call, offset)?;
        }
    }

    fn parse_primary(&mut self) -> Result<Ast, RuleError> {
        let offset = self.offset();
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(Ast::Var(name, offset))
            }
            Some(Token::Str(value)) => {
                self.pos += 1;
                Ok(Ast::Str(value, offset))
            }
            Some(Token::True) => {
                self.pos += 1;
                Ok(Ast::Bool(true, offset))
            }
            Some(Token::False) => {
                self.pos += 1;
                Ok(Ast::Bool(false, offset))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                self.enter(offset)?;
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "`)`")?;
                self.leave();
                Ok(inner)
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<String>, RuleError> {
        self.expect(Token::LBracket, "`[`")?;
        let mut items = Vec::new();
        if self.eat(&Token::RBracket) {
            return Ok(items);
        }
        loop {
            match self.peek().cloned() {
                Some(Token::Str(value)) => {
                    self.pos += 1;
                    items.push(value);
                }
                _ => return Err(self.unexpected("string literal")),
            }
            if self.eat(&Token::RBracket) {
                return Ok(items);
            }
            self.expect(Token::Comma, "`,` or `]`")?;
        }
    }
}

/// 类型检查后的字符串表达式
#[derive(Debug, Clone)]
enum StrExpr {
    Category,
    Text,
    Literal(String),
    Lower(Box<StrExpr>),
}

impl StrExpr {
    fn eval<'a>(&'a self, record: &'a NotificationRecord) -> Cow<'a, str> {
        match self {
            StrExpr::Category => Cow::Borrowed(record.category.as_str()),
            StrExpr::Text => Cow::Borrowed(record.text.as_str()),
            StrExpr::Literal(value) => Cow::Borrowed(value.as_str()),
            StrExpr::Lower(inner) => Cow::Owned(inner.eval(record).to_ascii_lowercase()),
        }
    }
}

/// 类型检查后的布尔表达式
#[derive(Debug, Clone)]
enum BoolExpr {
    Const(bool),
    Not(Box<BoolExpr>),
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
    StrEq(StrExpr, StrExpr),
    BoolEq(Box<BoolExpr>, Box<BoolExpr>),
    In(StrExpr, Vec<String>),
    Contains(StrExpr, StrExpr),
    StartsWith(StrExpr, StrExpr),
    EndsWith(StrExpr, StrExpr),
    Matches(StrExpr, Regex),
}

impl BoolExpr {
    fn eval(&self, record: &NotificationRecord) -> bool {
        match self {
            BoolExpr::Const(value) => *value,
            BoolExpr::Not(inner) => !inner.eval(record),
            BoolExpr::And(lhs, rhs) => lhs.eval(record) && rhs.eval(record),
            BoolExpr::Or(lhs, rhs) => lhs.eval(record) || rhs.eval(record),
            BoolExpr::StrEq(lhs, rhs) => lhs.eval(record) == rhs.eval(record),
            BoolExpr::BoolEq(lhs, rhs) => lhs.eval(record) == rhs.eval(record),
            BoolExpr::In(value, list) => {
                let value = value.eval(record);
                list.iter().any(|item| item.as_str() == value)
            }
            BoolExpr::Contains(haystack, needle) => {
                haystack.eval(record).contains(&*needle.eval(record))
            }
            BoolExpr::StartsWith(haystack, prefix) => {
                haystack.eval(record).starts_with(&*prefix.eval(record))
            }
            BoolExpr::EndsWith(haystack, suffix) => {
                haystack.eval(record).ends_with(&*suffix.eval(record))
            }
            BoolExpr::Matches(haystack, pattern) => pattern.is_match(&haystack.eval(record)),
        }
    }
}

fn check_bool(ast: Ast) -> Result<BoolExpr, RuleError> {
    match ast {
        Ast::Bool(value, _) => Ok(BoolExpr::Const(value)),
        Ast::Not(inner, _) => Ok(BoolExpr::Not(Box::new(check_bool(*inner)?))),
        Ast::And(lhs, rhs) => Ok(BoolExpr::And(
            Box::new(check_bool(*lhs)?),
            Box::new(check_bool(*rhs)?),
        )),
        Ast::Or(lhs, rhs) => Ok(BoolExpr::Or(
            Box::new(check_bool(*lhs)?),
            Box::new(check_bool(*rhs)?),
        )),
        Ast::Eq {
            lhs,
            rhs,
            negated,
            offset,
        } => {
            let (lhs_ty, rhs_ty) = (lhs.ty(), rhs.ty());
            if lhs_ty != rhs_ty {
                return Err(RuleError::TypeMismatch {
                    expected: lhs_ty.name(),
                    found: rhs_ty.name(),
                    offset: rhs.offset().max(offset),
                });
            }
            let eq = match lhs_ty {
                Ty::String => BoolExpr::StrEq(check_str(*lhs)?, check_str(*rhs)?),
                Ty::Bool => BoolExpr::BoolEq(Box::new(check_bool(*lhs)?), Box::new(check_bool(*rhs)?)),
            };
            Ok(if negated { BoolExpr::Not(Box::new(eq)) } else { eq })
        }
        Ast::In { lhs, list, .. } => Ok(BoolExpr::In(check_str(*lhs)?, list)),
        Ast::Call {
            receiver,
            method,
            args,
            offset,
        } => {
            let build: fn(StrExpr, StrExpr) -> BoolExpr = match method.as_str() {
                "contains" => BoolExpr::Contains,
                "startsWith" => BoolExpr::StartsWith,
                "endsWith" => BoolExpr::EndsWith,
                "matches" => return check_matches(*receiver, args, offset),
                "lowerAscii" => {
                    return Err(RuleError::TypeMismatch {
                        expected: "bool",
                        found: "string",
                        offset,
                    })
                }
                _ => return Err(RuleError::UnknownMethod { name: method.clone(), offset }),
            };
            let [arg] = one_arg(&method, args, offset)?;
            Ok(build(check_str(*receiver)?, check_str(arg)?))
        }
        other @ (Ast::Var(..) | Ast::Str(..)) => Err(RuleError::TypeMismatch {
            expected: "bool",
            found: "string",
            offset: other.offset(),
        }),
    }
}

fn check_str(ast: Ast) -> Result<StrExpr, RuleError> {
    match ast {
        Ast::Var(name, offset) => match name.as_str() {
            "type" | "category" => Ok(StrExpr::Category),
            "text" => Ok(StrExpr::Text),
            _ => Err(RuleError::UnknownVariable { name, offset }),
        },
        Ast::Str(value, _) => Ok(StrExpr::Literal(value)),
        Ast::Call {
            receiver,
            method,
            args,
            offset,
        } if method == "lowerAscii" => {
            if !args.is_empty() {
                return Err(RuleError::Arity {
                    method,
                    expected: 0,
                    found: args.len(),
                    offset,
                });
            }
            Ok(StrExpr::Lower(Box::new(check_str(*receiver)?)))
        }
        Ast::Call { method, offset, .. }
            if !matches!(method.as_str(), "contains" | "startsWith" | "endsWith" | "matches") =>
        {
            Err(RuleError::UnknownMethod { name: method, offset })
        }
        other => Err(RuleError::TypeMismatch {
            expected: "string",
            found: "bool",
            offset: other.offset(),
        }),
    }
}

fn check_matches(receiver: Ast, args: Vec<Ast>, offset: usize) -> Result<BoolExpr, RuleError> {
    let [pattern] = one_arg("matches", args, offset)?;
    let Ast::Str(pattern, pattern_offset) = pattern else {
        return Err(RuleError::NonLiteralPattern { offset });
    };
    let regex = Regex::new(&pattern).map_err(|e| RuleError::InvalidRegex {
        message: e.to_string(),
        offset: pattern_offset,
    })?;
    Ok(BoolExpr::Matches(check_str(receiver)?, regex))
}

fn one_arg(method: &str, args: Vec<Ast>, offset: usize) -> Result<[Ast; 1], RuleError> {
    let found = args.len();
    <[Ast; 1]>::try_from(args).map_err(|_| RuleError::Arity {
        method: method.to_string(),
        expected: 1,
        found,
        offset,
    })
}

/// 编译后的表达式规则，不可变，可反复求值
#[derive(Debug, Clone)]
pub struct ExpressionRule {
    source: String,
    root: BoolExpr,
}

impl ExpressionRule {
    pub fn compile(source: &str) -> Result<Self, RuleError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(RuleError::Empty);
        }
        let mut parser = Parser::new(tokens, source.len());
        let ast = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.unexpected("end of expression"));
        }
        let root = check_bool(ast)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl MatchRule for ExpressionRule {
    fn evaluate(&self, record: &NotificationRecord) -> bool {
        self.root.eval(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Category;

    fn eval(source: &str, category: Category, text: &str) -> bool {
        ExpressionRule::compile(source)
            .unwrap()
            .evaluate(&NotificationRecord::new(category, text))
    }

    #[test]
    fn test_default_rule() {
        let rule = r#"type == "error" && text.contains("BacklogWiki")"#;
        assert!(eval(rule, Category::Error, "BacklogWiki の同期に失敗"));
        assert!(!eval(rule, Category::Warning, "BacklogWiki の同期に失敗"));
        assert!(!eval(rule, Category::Error, "unrelated"));
    }

    #[test]
    fn test_precedence_and_grouping() {
        assert!(eval("true || false && false", Category::Info, ""));
        assert!(!eval("(true || false) && false", Category::Info, ""));
        assert!(eval("!false == true", Category::Info, ""));
    }

    #[test]
    fn test_negation_and_not_equal() {
        assert!(eval("type != 'error'", Category::Info, "x"));
        assert!(eval("!text.contains('x')", Category::Info, "abc"));
    }

    #[test]
    fn test_in_list() {
        let rule = "category in ['error', 'warning']";
        assert!(eval(rule, Category::Warning, ""));
        assert!(!eval(rule, Category::Success, ""));
        assert!(!eval("type in []", Category::Error, ""));
    }

    #[test]
    fn test_string_methods() {
        assert!(eval("text.startsWith('Backlog')", Category::Info, "BacklogWiki"));
        assert!(eval("text.endsWith('Wiki')", Category::Info, "BacklogWiki"));
        assert!(eval("text.lowerAscii().contains('backlogwiki')", Category::Info, "BacklogWiki"));
        assert!(eval(r"text.matches('^Wiki\\s+\\d+$')", Category::Info, "Wiki 42"));
        assert!(!eval(r"text.matches('^Wiki\\s+\\d+$')", Category::Info, "Wiki x"));
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(ExpressionRule::compile("   ").unwrap_err(), RuleError::Empty);
        assert_eq!(
            ExpressionRule::compile("text").unwrap_err(),
            RuleError::TypeMismatch { expected: "bool", found: "string", offset: 0 }
        );
        assert_eq!(
            ExpressionRule::compile("severity == 'error'").unwrap_err(),
            RuleError::UnknownVariable { name: "severity".into(), offset: 0 }
        );
        assert_eq!(
            ExpressionRule::compile("text.includes('x')").unwrap_err(),
            RuleError::UnknownMethod { name: "includes".into(), offset: 4 }
        );
        assert!(matches!(
            ExpressionRule::compile("text.contains('a', 'b')").unwrap_err(),
            RuleError::Arity { expected: 1, found: 2, .. }
        ));
        assert!(matches!(
            ExpressionRule::compile("type == true").unwrap_err(),
            RuleError::TypeMismatch { expected: "string", found: "bool", .. }
        ));
        assert!(matches!(
            ExpressionRule::compile("type == 'error' &&").unwrap_err(),
            RuleError::UnexpectedEnd { .. }
        ));
        assert!(matches!(
            ExpressionRule::compile("type == 'error' 'x'").unwrap_err(),
            RuleError::UnexpectedToken { expected: "end of expression", .. }
        ));
    }

    #[test]
    fn test_matches_requires_valid_literal() {
        assert!(matches!(
            ExpressionRule::compile("text.matches(type)").unwrap_err(),
            RuleError::NonLiteralPattern { .. }
        ));
        assert!(matches!(
            ExpressionRule::compile("text.matches('(')").unwrap_err(),
            RuleError::InvalidRegex { offset: 13, .. }
        ));
    }

    #[test]
    fn test_source_is_kept() {
        let rule = ExpressionRule::compile("type == 'info'").unwrap();
        assert_eq!(rule.source(), "type == 'info'");
    }
}
