// Hand-written lexer for the rule-source dialect.
// Tracks the indentation stack (emitting Indent/Dedent pairs) and
// suppresses newlines inside brackets so multi-line outcome lists lex as
// one logical line.

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Newline,
    Indent,
    Dedent,
    Eof,

    Name(String),
    Int(i64),
    Float(f64),
    Str(String),

    // keywords
    Def,
    Class,
    Return,
    If,
    Elif,
    Else,
    For,
    While,
    In,
    Not,
    And,
    Or,
    Is,
    Lambda,
    Pass,
    NoneKw,
    True,
    False,
    Import,
    From,
    As,
    With,

    // punctuation and operators
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    EqEq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
}

pub fn lex(source: &str) -> Result<Vec<Tok>> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
    indents: Vec<usize>,
    toks: Vec<Tok>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            depth: 0,
            indents: vec![0],
            toks: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn run(mut self) -> Result<Vec<Tok>> {
        self.handle_line_start()?;
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.pos += 1;
                }
                '#' => self.skip_comment(),
                '\\' if matches!(self.peek_at(1), Some('\n')) => {
                    self.pos += 2;
                }
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.toks.push(Tok::Newline);
                        self.handle_line_start()?;
                    }
                }
                '\'' | '"' => self.lex_string(c)?,
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if matches!(self.peek_at(1), Some(d) if d.is_ascii_digit()) => {
                    self.lex_number()?
                }
                c if c.is_alphabetic() || c == '_' => self.lex_name(),
                _ => self.lex_operator()?,
            }
        }
        // close out the final logical line and any open blocks
        if !matches!(self.toks.last(), Some(Tok::Newline) | None) {
            self.toks.push(Tok::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.toks.push(Tok::Dedent);
        }
        self.toks.push(Tok::Eof);
        Ok(self.toks)
    }

    /// Measure leading whitespace at a (physical) line start, skipping
    /// blank and comment-only lines, then emit Indent/Dedent tokens.
    fn handle_line_start(&mut self) -> Result<()> {
        loop {
            let mut width = 0usize;
            loop {
                match self.peek() {
                    Some(' ') => {
                        width += 1;
                        self.pos += 1;
                    }
                    Some('\t') => {
                        width = (width / 8 + 1) * 8;
                        self.pos += 1;
                    }
                    Some('\r') => {
                        self.pos += 1;
                    }
                    _ => break,
                }
            }
            match self.peek() {
                // blank line: swallow and keep scanning
                Some('\n') => {
                    self.pos += 1;
                    continue;
                }
                Some('#') => {
                    self.skip_comment();
                    continue;
                }
                None => return Ok(()),
                _ => {}
            }
            let current = *self.indents.last().unwrap();
            if width > current {
                self.indents.push(width);
                self.toks.push(Tok::Indent);
            } else if width < current {
                while *self.indents.last().unwrap() > width {
                    self.indents.pop();
                    self.toks.push(Tok::Dedent);
                }
                if *self.indents.last().unwrap() != width {
                    return Err(anyhow!("inconsistent indentation (width {})", width));
                }
            }
            return Ok(());
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<()> {
        // triple-quoted strings (docstrings) span lines
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        if triple {
            self.pos += 3;
            let mut out = String::new();
            loop {
                if self.peek().is_none() {
                    return Err(anyhow!("unterminated triple-quoted string"));
                }
                if self.peek() == Some(quote)
                    && self.peek_at(1) == Some(quote)
                    && self.peek_at(2) == Some(quote)
                {
                    self.pos += 3;
                    break;
                }
                out.push(self.bump().unwrap());
            }
            self.toks.push(Tok::Str(out));
            return Ok(());
        }

        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(anyhow!("unterminated string literal")),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err(anyhow!("unterminated string literal")),
                },
                Some(c) if c == quote => break,
                Some(c) => out.push(c),
            }
        }
        self.toks.push(Tok::Str(out));
        Ok(())
    }

    fn lex_number(&mut self) -> Result<()> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == '.' && !is_float {
                is_float = true;
                self.pos += 1;
            } else if (c == 'e' || c == 'E')
                && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit() || d == '+' || d == '-')
            {
                is_float = true;
                self.pos += 2;
                while matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                    self.pos += 1;
                }
                break;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            let v: f64 = text
                .parse()
                .map_err(|_| anyhow!("invalid float literal: {text}"))?;
            self.toks.push(Tok::Float(v));
        } else {
            let v: i64 = text
                .parse()
                .map_err(|_| anyhow!("invalid integer literal: {text}"))?;
            self.toks.push(Tok::Int(v));
        }
        Ok(())
    }

    fn lex_name(&mut self) {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let tok = match text.as_str() {
            "def" => Tok::Def,
            "class" => Tok::Class,
            "return" => Tok::Return,
            "if" => Tok::If,
            "elif" => Tok::Elif,
            "else" => Tok::Else,
            "for" => Tok::For,
            "while" => Tok::While,
            "in" => Tok::In,
            "not" => Tok::Not,
            "and" => Tok::And,
            "or" => Tok::Or,
            "is" => Tok::Is,
            "lambda" => Tok::Lambda,
            "pass" => Tok::Pass,
            "None" => Tok::NoneKw,
            "True" => Tok::True,
            "False" => Tok::False,
            "import" => Tok::Import,
            "from" => Tok::From,
            "as" => Tok::As,
            "with" => Tok::With,
            _ => Tok::Name(text),
        };
        self.toks.push(tok);
    }

    fn lex_operator(&mut self) -> Result<()> {
        let c = self.bump().unwrap();
        let next = self.peek();
        let tok = match (c, next) {
            ('(', _) => {
                self.depth += 1;
                Tok::LParen
            }
            (')', _) => {
                self.depth = self.depth.saturating_sub(1);
                Tok::RParen
            }
            ('[', _) => {
                self.depth += 1;
                Tok::LBracket
            }
            (']', _) => {
                self.depth = self.depth.saturating_sub(1);
                Tok::RBracket
            }
            ('{', _) => {
                self.depth += 1;
                Tok::LBrace
            }
            ('}', _) => {
                self.depth = self.depth.saturating_sub(1);
                Tok::RBrace
            }
            (',', _) => Tok::Comma,
            (':', _) => Tok::Colon,
            ('.', _) => Tok::Dot,
            ('=', Some('=')) => {
                self.pos += 1;
                Tok::EqEq
            }
            ('=', _) => Tok::Assign,
            ('!', Some('=')) => {
                self.pos += 1;
                Tok::NotEq
            }
            ('<', Some('=')) => {
                self.pos += 1;
                Tok::LtE
            }
            ('<', _) => Tok::Lt,
            ('>', Some('=')) => {
                self.pos += 1;
                Tok::GtE
            }
            ('>', _) => Tok::Gt,
            ('+', Some('=')) => {
                self.pos += 1;
                Tok::PlusEq
            }
            ('+', _) => Tok::Plus,
            ('-', Some('=')) => {
                self.pos += 1;
                Tok::MinusEq
            }
            ('-', _) => Tok::Minus,
            ('*', Some('*')) => {
                self.pos += 1;
                Tok::StarStar
            }
            ('*', Some('=')) => {
                self.pos += 1;
                Tok::StarEq
            }
            ('*', _) => Tok::Star,
            ('/', Some('=')) => {
                self.pos += 1;
                Tok::SlashEq
            }
            ('/', _) => Tok::Slash,
            _ => return Err(anyhow!("unexpected character: {c:?}")),
        };
        self.toks.push(tok);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_dedent() {
        let toks = lex("def f(self):\n    return\n").unwrap();
        assert_eq!(
            toks,
            vec![
                Tok::Def,
                Tok::Name("f".to_string()),
                Tok::LParen,
                Tok::Name("self".to_string()),
                Tok::RParen,
                Tok::Colon,
                Tok::Newline,
                Tok::Indent,
                Tok::Return,
                Tok::Newline,
                Tok::Dedent,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_brackets_join_lines() {
        let toks = lex("x = [\n    1,\n    2,\n]\n").unwrap();
        assert!(!toks.iter().any(|t| matches!(t, Tok::Indent)));
        assert_eq!(toks.iter().filter(|t| **t == Tok::Newline).count(), 1);
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        let toks = lex("a = 1\n\n# comment\nb = 2\n").unwrap();
        let newlines = toks.iter().filter(|t| **t == Tok::Newline).count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn test_string_escapes_and_triple() {
        let toks = lex("s = 'a\\nb'\n").unwrap();
        assert!(toks.contains(&Tok::Str("a\nb".to_string())));
        let toks = lex("\"\"\"doc\nstring\"\"\"\n").unwrap();
        assert!(toks.contains(&Tok::Str("doc\nstring".to_string())));
    }

    #[test]
    fn test_numbers() {
        let toks = lex("x = 3 + 0.25 + 1e3\n").unwrap();
        assert!(toks.contains(&Tok::Int(3)));
        assert!(toks.contains(&Tok::Float(0.25)));
        assert!(toks.contains(&Tok::Float(1000.0)));
    }
}
