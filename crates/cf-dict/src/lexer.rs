//! Tokenizer for the dictionary file grammar.
//!
//! Whitespace and comments (`//`, `/* */`) are insignificant apart from line
//! accounting. Bare words follow the solver convention of starting with a
//! letter or underscore and then running until whitespace or one of the
//! structural stop characters, which lets keywords such as
//! `laplacian(nuEff,U)` and `div(phi,U)` lex as single tokens.

use crate::{DictError, DictResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Word(String),
    /// Quoted string literal, stored without the quotes.
    Str(String),
    Int(i64),
    Float(f64),
    /// `$`-prefixed macro reference, verbatim including the sigil.
    Macro(String),
    /// `#`-prefixed directive name, verbatim including the hash.
    Directive(String),
    /// `List<T>` list type tag.
    ListType(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Semi,
}

impl Tok {
    /// Short rendering for error messages.
    pub fn describe(&self) -> String {
        match self {
            Tok::Word(s) => format!("'{}'", s),
            Tok::Str(s) => format!("\"{}\"", s),
            Tok::Int(v) => v.to_string(),
            Tok::Float(v) => v.to_string(),
            Tok::Macro(s) | Tok::Directive(s) | Tok::ListType(s) => format!("'{}'", s),
            Tok::LBrace => "'{'".into(),
            Tok::RBrace => "'}'".into(),
            Tok::LParen => "'('".into(),
            Tok::RParen => "')'".into(),
            Tok::LBracket => "'['".into(),
            Tok::RBracket => "']'".into(),
            Tok::Semi => "';'".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

/// Characters that terminate a bare word.
fn is_word_stop(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '"' | ';' | '{' | '}' | '[' | ']')
}

pub struct Lexer<'a> {
    input: &'a str,
    /// Byte offset of the cursor; always on a char boundary.
    pos: usize,
    line: usize,
    file: String,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str, file: &str) -> Self {
        Lexer {
            input: text,
            pos: 0,
            line: 1,
            file: file.to_string(),
        }
    }

    /// Tokenize the entire input.
    pub fn tokenize(mut self) -> DictResult<Vec<Token>> {
        let mut out = Vec::new();
        while let Some(tok) = self.next_token()? {
            out.push(tok);
        }
        Ok(out)
    }

    fn error(&self, msg: impl Into<String>) -> DictError {
        DictError::Syntax {
            msg: msg.into(),
            file: self.file.clone(),
            line: self.line,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn next_token(&mut self) -> DictResult<Option<Token>> {
        self.skip_trivia()?;
        let line = self.line;
        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(None),
        };

        let tok = match ch {
            '{' => {
                self.bump();
                Tok::LBrace
            }
            '}' => {
                self.bump();
                Tok::RBrace
            }
            '(' => {
                self.bump();
                Tok::LParen
            }
            ')' => {
                self.bump();
                Tok::RParen
            }
            '[' => {
                self.bump();
                Tok::LBracket
            }
            ']' => {
                self.bump();
                Tok::RBracket
            }
            ';' => {
                self.bump();
                Tok::Semi
            }
            '"' => self.lex_string()?,
            '$' => self.lex_macro(),
            '#' => self.lex_directive()?,
            _ if ch.is_ascii_digit() => self.lex_number()?,
            '-' | '+' | '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.lex_number()?
            }
            _ if ch.is_ascii_alphabetic() || ch == '_' => self.lex_word(),
            _ => return Err(self.error(format!("Illegal character '{}'", ch))),
        };
        Ok(Some(Token { tok, line }))
    }

    fn skip_trivia(&mut self) -> DictResult<()> {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start_line = self.line;
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => {
                                self.line = start_line;
                                return Err(self.error("Unmatched multi-line comment"));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_string(&mut self) -> DictResult<Tok> {
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(Tok::Str(out)),
                Some('\\') => {
                    out.push('\\');
                    if let Some(next) = self.bump() {
                        out.push(next);
                    }
                }
                Some('\n') | None => return Err(self.error("Unmatched '\"'")),
                Some(ch) => out.push(ch),
            }
        }
    }

    fn lex_macro(&mut self) -> Tok {
        let mut out = String::from('$');
        self.bump();
        if self.peek() == Some('{') {
            while let Some(ch) = self.peek() {
                if ch.is_whitespace() || ch == ';' || ch == '"' {
                    break;
                }
                self.bump();
                out.push(ch);
            }
        } else {
            while let Some(ch) = self.peek() {
                if is_word_stop(ch) || ch == '(' || ch == ')' {
                    break;
                }
                self.bump();
                out.push(ch);
            }
        }
        Tok::Macro(out)
    }

    fn lex_directive(&mut self) -> DictResult<Tok> {
        let mut out = String::from('#');
        self.bump();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.bump();
                out.push(ch);
            } else {
                break;
            }
        }
        if out.len() == 1 {
            return Err(self.error("Expected directive name after '#'"));
        }
        Ok(Tok::Directive(out))
    }

    fn lex_number(&mut self) -> DictResult<Tok> {
        let start = self.pos;
        let mut has_dot = false;
        let mut has_exp = false;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.bump();
        }
        while let Some(ch) = self.peek() {
            match ch {
                '0'..='9' => {
                    self.bump();
                }
                '.' if !has_dot && !has_exp => {
                    has_dot = true;
                    self.bump();
                }
                'e' | 'E' if !has_exp => {
                    has_exp = true;
                    self.bump();
                    if matches!(self.peek(), Some('-') | Some('+')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        let text = &self.input[start..self.pos];

        // A trailing word character means this is not a number after all
        // (e.g. `0simulation` as an odd bare word); reject outright since the
        // grammar has no such tokens.
        if self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
            return Err(self.error(format!("Malformed number near '{}'", text)));
        }

        if !has_dot && !has_exp {
            if let Ok(v) = text.parse::<i64>() {
                return Ok(Tok::Int(v));
            }
        }
        text.parse::<f64>()
            .map(Tok::Float)
            .map_err(|_| self.error(format!("Malformed number '{}'", text)))
    }

    fn lex_word(&mut self) -> Tok {
        let mut out = String::new();
        let mut paren_depth = 0usize;
        while let Some(ch) = self.peek() {
            if is_word_stop(ch) {
                break;
            }
            // A '(' that is part of the word (no intervening space) is
            // consumed; a standalone '(' never reaches here because words
            // start with a letter.
            if ch == '(' {
                paren_depth += 1;
            } else if ch == ')' {
                if paren_depth == 0 {
                    break;
                }
                paren_depth -= 1;
            } else if ch == '/' && self.peek_at(1) == Some('/') {
                break;
            }
            self.bump();
            out.push(ch);
        }
        if out.starts_with("List<") && out.ends_with('>') {
            Tok::ListType(out)
        } else {
            Tok::Word(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(text: &str) -> Vec<Tok> {
        Lexer::new(text, "<test>")
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn scalars_and_punctuation() {
        assert_eq!(
            toks("deltaT 0.005;"),
            vec![Tok::Word("deltaT".into()), Tok::Float(0.005), Tok::Semi]
        );
        assert_eq!(
            toks("endTime 10;"),
            vec![Tok::Word("endTime".into()), Tok::Int(10), Tok::Semi]
        );
        assert_eq!(
            toks("p 1.013e5;"),
            vec![Tok::Word("p".into()), Tok::Float(1.013e5), Tok::Semi]
        );
    }

    #[test]
    fn compound_keywords_keep_parens() {
        assert_eq!(
            toks("laplacian(nuEff,U) Gauss;"),
            vec![
                Tok::Word("laplacian(nuEff,U)".into()),
                Tok::Word("Gauss".into()),
                Tok::Semi
            ]
        );
    }

    #[test]
    fn lists_split_parens() {
        assert_eq!(
            toks("(8.0 0 0)"),
            vec![
                Tok::LParen,
                Tok::Float(8.0),
                Tok::Int(0),
                Tok::Int(0),
                Tok::RParen
            ]
        );
    }

    #[test]
    fn comments_are_skipped_with_line_tracking() {
        let tokens = Lexer::new("// header\n/* multi\nline */\nkey value;", "<test>")
            .tokenize()
            .unwrap();
        assert_eq!(tokens[0].tok, Tok::Word("key".into()));
        assert_eq!(tokens[0].line, 4);
    }

    #[test]
    fn macros_and_directives() {
        assert_eq!(
            toks("value $internalField;"),
            vec![
                Tok::Word("value".into()),
                Tok::Macro("$internalField".into()),
                Tok::Semi
            ]
        );
        assert_eq!(
            toks("#include \"initialConditions\""),
            vec![
                Tok::Directive("#include".into()),
                Tok::Str("initialConditions".into())
            ]
        );
        assert_eq!(toks("$:a;"), vec![Tok::Macro("$:a".into()), Tok::Semi]);
    }

    #[test]
    fn list_type_tags() {
        assert_eq!(
            toks("nonuniform List<vector> 2"),
            vec![
                Tok::Word("nonuniform".into()),
                Tok::ListType("List<vector>".into()),
                Tok::Int(2)
            ]
        );
    }

    #[test]
    fn multibyte_text_survives_lexing() {
        assert_eq!(
            toks("title \"résultats Δt=0.5µs\";"),
            vec![
                Tok::Word("title".into()),
                Tok::Str("résultats Δt=0.5µs".into()),
                Tok::Semi
            ]
        );
        // Non-ASCII inside a bare word body is carried through intact.
        let tokens = Lexer::new("naïveScheme Gauss;", "<test>").tokenize().unwrap();
        assert_eq!(tokens[0].tok, Tok::Word("naïveScheme".into()));
    }

    #[test]
    fn unmatched_quote_is_an_error() {
        let err = Lexer::new("bad \"unterminated\n", "<test>").tokenize();
        assert!(err.is_err());
    }
}
