//! Tokenizer for the guest script language, built on logos.

use logos::{FilterResult, Lexer, Logos};
use std::ops::Range;

use crate::error::{Result, ScriptError};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f\u{feff}]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    /// Never emitted: the callback skips the comment or fails when it is unterminated.
    #[token("/*", block_comment)]
    BlockComment,

    // Keywords
    #[token("var")]
    Var,
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("while")]
    While,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("throw")]
    Throw,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("new")]
    New,
    #[token("typeof")]
    Typeof,
    #[token("this")]
    This,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"0[xX][0-9a-fA-F]+", |lex| i64::from_str_radix(&lex.slice()[2..], 16).ok().map(|n| n as f64))]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(strip_quotes(lex.slice())))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| unescape(strip_quotes(lex.slice())))]
    Str(String),

    /// Raw template body between the backticks; split into parts by the parser.
    #[regex(r"`([^`\\]|\\.)*`", |lex| strip_quotes(lex.slice()).to_string())]
    Template(String),

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("?.")]
    QuestionDot,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,
    #[token("=>")]
    Arrow,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("!")]
    Bang,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NotEqEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("??")]
    QuestionQuestion,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
}

/// A token with its byte range and whether a line break precedes it.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Range<usize>,
    pub newline_before: bool,
}

/// Maps byte offsets back to 1-based line/column pairs.
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (pos, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(pos + 1);
            }
        }
        Self { line_starts }
    }

    pub fn position(&self, offset: usize) -> (usize, usize) {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => (line + 1, 1),
            Err(line) => (line, offset - self.line_starts[line - 1] + 1),
        }
    }
}

pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>> {
    let map = SourceMap::new(source);
    let mut tokens = Vec::new();
    let mut last_end = 0;

    let mut lexer = Token::lexer(source);
    while let Some(token) = lexer.next() {
        let span = lexer.span();
        let Ok(token) = token else {
            let (line, column) = map.position(span.start);
            return Err(ScriptError::Syntax {
                message: format!("unexpected character {:?}", lexer.slice()),
                line,
                column,
            });
        };
        let newline_before = source[last_end..span.start].contains('\n');
        last_end = span.end;
        tokens.push(SpannedToken {
            token,
            span,
            newline_before,
        });
    }

    Ok(tokens)
}

fn block_comment(lex: &mut Lexer<Token>) -> FilterResult<(), ()> {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            FilterResult::Skip
        }
        None => FilterResult::Error(()),
    }
}

fn strip_quotes(raw: &str) -> &str {
    &raw[1..raw.len() - 1]
}

/// Resolves backslash escapes in a string or template literal body.
pub(crate) fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            '\n' => {}
            other => out.push(other),
        }
    }
    Some(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn keywords_win_over_identifiers() {
        assert_eq!(
            kinds("const constant = true"),
            vec![
                Token::Const,
                Token::Ident("constant".into()),
                Token::Assign,
                Token::True
            ]
        );
    }

    #[test]
    fn longest_operator_is_chosen() {
        assert_eq!(
            kinds("a !== b === c ?? d?.e"),
            vec![
                Token::Ident("a".into()),
                Token::NotEqEq,
                Token::Ident("b".into()),
                Token::EqEqEq,
                Token::Ident("c".into()),
                Token::QuestionQuestion,
                Token::Ident("d".into()),
                Token::QuestionDot,
                Token::Ident("e".into()),
            ]
        );
    }

    #[test]
    fn strings_are_unescaped() {
        assert_eq!(
            kinds(r#"'it\'s' "a\tb" "A""#),
            vec![
                Token::Str("it's".into()),
                Token::Str("a\tb".into()),
                Token::Str("A".into())
            ]
        );
    }

    #[test]
    fn comments_are_skipped_and_newlines_tracked() {
        let tokens = tokenize("a // trailing\n/* block\n */ b").unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn block_comments() {
        assert_eq!(
            kinds("/* x */ 1 /** doc\n * more */ / 2 /**/"),
            vec![Token::Number(1.0), Token::Slash, Token::Number(2.0)]
        );
    }

    #[test]
    fn unterminated_block_comment_is_a_syntax_error() {
        let err = tokenize("a\n/* open").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { line: 2, column: 1, .. }));
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("1 2.5 1e3 0x1F .5"),
            vec![
                Token::Number(1.0),
                Token::Number(2.5),
                Token::Number(1000.0),
                Token::Number(31.0),
                Token::Number(0.5)
            ]
        );
    }

    #[test]
    fn unexpected_character_reports_position() {
        let err = tokenize("a\n  #").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Syntax {
                message: "unexpected character \"#\"".into(),
                line: 2,
                column: 3
            }
        );
    }
}
