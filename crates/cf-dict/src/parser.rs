//! Recursive-descent parser for dictionary files.
//!
//! The grammar is a flat sequence of `key value;` / `key { ... }` entries.
//! `#include "path"` directives are resolved against the including file's
//! directory and their parsed entries spliced in place; all other directives
//! and `$macro` references are preserved verbatim for the solver to handle.

use std::path::{Path, PathBuf};

use crate::lexer::{Lexer, Tok, Token};
use crate::value::{Dictionary, Dimensions, Field, Value};
use crate::{DictError, DictResult};

/// Parse dictionary text. Includes are resolved against the current working
/// directory.
pub fn parse_str(text: &str) -> DictResult<Dictionary> {
    let base = std::env::current_dir().ok();
    Parser::new(text, "<input>", base)?.parse()
}

/// Parse a dictionary file from disk. Includes are resolved against the
/// file's parent directory.
pub fn parse_file(path: &Path) -> DictResult<Dictionary> {
    if !path.exists() {
        return Err(DictError::FileNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let base = path.parent().map(Path::to_path_buf);
    Parser::new(&text, &path.display().to_string(), base)?.parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
    base_dir: Option<PathBuf>,
}

impl Parser {
    fn new(text: &str, file: &str, base_dir: Option<PathBuf>) -> DictResult<Self> {
        let tokens = Lexer::new(text, file).tokenize()?;
        Ok(Parser {
            tokens,
            pos: 0,
            file: file.to_string(),
            base_dir,
        })
    }

    fn parse(mut self) -> DictResult<Dictionary> {
        let mut dict = Dictionary::new();
        self.parse_entries(&mut dict, true)?;
        Ok(dict)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map(|t| t.line).unwrap_or(1)
    }

    fn error(&self, msg: impl Into<String>, line: usize) -> DictError {
        DictError::Syntax {
            msg: msg.into(),
            file: self.file.clone(),
            line,
        }
    }

    fn unexpected(&self, tok: &Token) -> DictError {
        self.error(format!("Before: {}", tok.tok.describe()), tok.line)
    }

    fn premature_end(&self) -> DictError {
        self.error("Premature end of input", self.last_line())
    }

    fn expect_semi(&mut self) -> DictResult<()> {
        match self.bump() {
            Some(Token { tok: Tok::Semi, .. }) => Ok(()),
            Some(tok) => Err(self.error(
                format!("Expected ';', found {}", tok.tok.describe()),
                tok.line,
            )),
            None => Err(self.premature_end()),
        }
    }

    fn eat_semi(&mut self) {
        if matches!(self.peek(), Some(Token { tok: Tok::Semi, .. })) {
            self.pos += 1;
        }
    }

    /// Parse entries into `dict` until end of input (top level) or a closing
    /// brace (nested scope, left for the caller to consume).
    fn parse_entries(&mut self, dict: &mut Dictionary, top: bool) -> DictResult<()> {
        loop {
            let token = match self.peek() {
                Some(t) => t.clone(),
                None if top => return Ok(()),
                None => return Err(self.premature_end()),
            };
            match token.tok {
                Tok::RBrace if !top => return Ok(()),
                Tok::Directive(ref name) if name == "#include" => {
                    self.bump();
                    self.parse_include(dict, token.line)?;
                }
                Tok::Directive(name) => {
                    self.bump();
                    let arg = self.parse_atom()?;
                    self.eat_semi();
                    dict.insert_generated(
                        "directive",
                        Value::Directive {
                            name,
                            arg: Box::new(arg),
                        },
                    );
                }
                Tok::Macro(mvar) => {
                    self.bump();
                    self.eat_semi();
                    dict.insert_generated("macro", Value::Macro(mvar));
                }
                Tok::Word(key) | Tok::Str(key) => {
                    self.bump();
                    let value = self.parse_rhs()?;
                    if dict.contains_key(&key) {
                        return Err(DictError::DuplicateKey {
                            key,
                            file: self.file.clone(),
                            line: token.line,
                        });
                    }
                    dict.insert(key, value);
                }
                _ => return Err(self.unexpected(&token)),
            }
        }
    }

    fn parse_include(&mut self, dict: &mut Dictionary, line: usize) -> DictResult<()> {
        let path = match self.bump() {
            Some(Token {
                tok: Tok::Str(path),
                ..
            }) => path,
            Some(tok) => {
                return Err(self.error(
                    format!("#include expects a quoted path, found {}", tok.tok.describe()),
                    tok.line,
                ))
            }
            None => return Err(self.premature_end()),
        };
        let resolved = match &self.base_dir {
            Some(base) => base.join(&path),
            None => PathBuf::from(&path),
        };
        if !resolved.exists() {
            return Err(DictError::IncludeNotFound {
                path,
                file: self.file.clone(),
                line,
            });
        }
        let included = parse_file(&resolved)?;
        for (key, value) in included {
            if let Some(prefix) = generated_prefix(&key) {
                dict.insert_generated(prefix, value);
            } else if dict.contains_key(&key) {
                return Err(DictError::DuplicateKey {
                    key,
                    file: self.file.clone(),
                    line,
                });
            } else {
                dict.insert(key, value);
            }
        }
        Ok(())
    }

    /// Parse the right-hand side of an entry whose key has been consumed.
    fn parse_rhs(&mut self) -> DictResult<Value> {
        match self.peek().map(|t| t.tok.clone()) {
            Some(Tok::LBrace) => {
                self.bump();
                let mut nested = Dictionary::new();
                self.parse_entries(&mut nested, false)?;
                self.bump(); // closing brace
                self.eat_semi();
                Ok(Value::Dict(nested))
            }
            Some(Tok::Word(w)) if w == "uniform" => {
                self.bump();
                let value = self.parse_atom()?;
                self.expect_semi()?;
                Ok(Value::Field(Field::uniform(value)))
            }
            Some(Tok::Word(w)) if w == "nonuniform" => {
                self.bump();
                let value = self.parse_nonuniform()?;
                self.expect_semi()?;
                Ok(value)
            }
            _ => self.parse_value_list(),
        }
    }

    fn parse_nonuniform(&mut self) -> DictResult<Value> {
        let list_type = match self.peek().map(|t| t.tok.clone()) {
            Some(Tok::ListType(tag)) => {
                self.bump();
                Some(tag)
            }
            _ => None,
        };
        // Optional element count before the parenthesized payload.
        if matches!(self.peek(), Some(Token { tok: Tok::Int(_), .. })) {
            self.bump();
        }
        let payload = self.parse_list()?;
        Ok(Value::Field(Field::nonuniform(list_type, payload)))
    }

    /// Collect RHS atoms up to the terminating semicolon and classify the
    /// aggregate (single value, dimensioned value, or multi-token value).
    fn parse_value_list(&mut self) -> DictResult<Value> {
        let mut atoms: Vec<Value> = Vec::new();
        loop {
            let token = match self.peek() {
                Some(t) => t.clone(),
                None => return Err(self.premature_end()),
            };
            match token.tok {
                Tok::Semi => {
                    self.bump();
                    break;
                }
                Tok::LBrace => {
                    self.bump();
                    let mut nested = Dictionary::new();
                    self.parse_entries(&mut nested, false)?;
                    self.bump();
                    atoms.push(Value::Dict(nested));
                    // `key { ... }` form has no trailing semicolon
                    if atoms.len() == 1 && !matches!(self.peek(), Some(Token { tok: Tok::Semi, .. }))
                    {
                        break;
                    }
                }
                Tok::RBrace => return Err(self.unexpected(&token)),
                _ => {
                    let atom = self.parse_atom()?;
                    atoms.push(atom);
                }
            }
        }
        Ok(classify_atoms(atoms))
    }

    /// Parse one value atom: scalar, word, string, macro, inline directive,
    /// list, or dimension block.
    fn parse_atom(&mut self) -> DictResult<Value> {
        let token = match self.bump() {
            Some(t) => t,
            None => return Err(self.premature_end()),
        };
        match token.tok {
            Tok::Int(v) => {
                // `N ( ... )` is a size-prefixed list; the count is implied
                // by the payload on re-serialization.
                if matches!(self.peek(), Some(Token { tok: Tok::LParen, .. })) {
                    return self.parse_list();
                }
                Ok(Value::Int(v))
            }
            Tok::Float(v) => Ok(Value::Float(v)),
            Tok::Word(w) => Ok(Value::Word(w)),
            Tok::Str(s) => Ok(Value::Str(s)),
            Tok::Macro(m) => Ok(Value::Macro(m)),
            Tok::ListType(tag) => Ok(Value::Word(tag)),
            Tok::Directive(name) => {
                let arg = self.parse_atom()?;
                Ok(Value::Directive {
                    name,
                    arg: Box::new(arg),
                })
            }
            Tok::LParen => {
                self.pos -= 1;
                self.parse_list()
            }
            Tok::LBracket => {
                self.pos -= 1;
                self.parse_dimensions()
            }
            _ => Err(self.unexpected(&token)),
        }
    }

    /// Parse a parenthesized list, densifying homogeneous numeric payloads.
    fn parse_list(&mut self) -> DictResult<Value> {
        self.bump(); // '('
        let mut items: Vec<Value> = Vec::new();
        loop {
            let token = match self.peek() {
                Some(t) => t.clone(),
                None => return Err(self.premature_end()),
            };
            match token.tok {
                Tok::RParen => {
                    self.bump();
                    break;
                }
                Tok::Word(w) => {
                    self.bump();
                    // `word { ... }` inside a list is a single-pair dictionary
                    if matches!(self.peek(), Some(Token { tok: Tok::LBrace, .. })) {
                        self.bump();
                        let mut nested = Dictionary::new();
                        self.parse_entries(&mut nested, false)?;
                        self.bump();
                        let mut pair = Dictionary::new();
                        pair.insert(w, Value::Dict(nested));
                        items.push(Value::Dict(pair));
                    } else {
                        items.push(Value::Word(w));
                    }
                }
                Tok::Semi => return Err(self.unexpected(&token)),
                _ => items.push(self.parse_atom()?),
            }
        }
        Ok(densify_list(items))
    }

    fn parse_dimensions(&mut self) -> DictResult<Value> {
        let open = match self.bump() {
            Some(t) => t, // '['
            None => return Err(self.premature_end()),
        };
        let mut units: Vec<i64> = Vec::new();
        let mut tag: Option<String> = None;
        loop {
            let token = match self.bump() {
                Some(t) => t,
                None => return Err(self.premature_end()),
            };
            match token.tok {
                Tok::RBracket => break,
                Tok::Int(v) => units.push(v),
                Tok::Word(w) if units.is_empty() && tag.is_none() => tag = Some(w),
                _ => return Err(self.unexpected(&token)),
            }
        }
        if let Some(tag) = tag {
            return Ok(Value::Dimensions(Dimensions::Tag(tag)));
        }
        if units.len() != 5 && units.len() != 7 {
            return Err(self.error(
                format!("Dimension block expects 5 or 7 entries, found {}", units.len()),
                open.line,
            ));
        }
        Ok(Value::Dimensions(Dimensions::from_units(&units)))
    }
}

fn generated_prefix(key: &str) -> Option<&'static str> {
    if key.starts_with("directive_") {
        Some("directive")
    } else if key.starts_with("macro_") {
        Some("macro")
    } else {
        None
    }
}

fn classify_atoms(mut atoms: Vec<Value>) -> Value {
    match atoms.len() {
        1 => match atoms.pop() {
            Some(v) => v,
            None => Value::Multi(atoms),
        },
        3 => {
            // `name [dims] value` dimensioned quantity
            let mut it = atoms.into_iter();
            match (it.next(), it.next(), it.next()) {
                (Some(Value::Word(name)), Some(Value::Dimensions(dims)), Some(value)) => {
                    Value::DimValue {
                        name,
                        dims,
                        value: Box::new(value),
                    }
                }
                (a, b, c) => Value::Multi([a, b, c].into_iter().flatten().collect()),
            }
        }
        _ => Value::Multi(atoms),
    }
}

fn densify_list(items: Vec<Value>) -> Value {
    if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Int(_))) {
        return Value::IntList(items.iter().filter_map(Value::as_int).collect());
    }
    if !items.is_empty()
        && items
            .iter()
            .all(|v| matches!(v, Value::Int(_) | Value::Float(_)))
    {
        return Value::FloatList(items.iter().filter_map(Value::as_float).collect());
    }
    Value::List(items)
}
