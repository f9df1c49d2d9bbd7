//! Parser for Valve's KeyValues text format.
//!
//! Steam stores its library manifest (`steamapps/libraryfolders.vdf`) in this
//! format:
//!
//! ```text
//! "libraryfolders"
//! {
//!     "0"
//!     {
//!         "path"   "C:\\Program Files (x86)\\Steam"
//!         "apps"
//!         {
//!             "2580190"   "1234567"
//!         }
//!     }
//! }
//! ```
//!
//! Entries keep their declared order and keys compare case-insensitively.
//! Platform conditionals (`[$WIN32]`) are accepted and ignored.

use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

/// Errors produced while parsing a KeyValues document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: unterminated string")]
    UnterminatedString { line: usize },

    #[error("line {line}: unterminated conditional")]
    UnterminatedConditional { line: usize },

    #[error("line {line}: unexpected '{found}'")]
    Unexpected { line: usize, found: char },

    #[error("line {line}: key '{key}' has no value")]
    MissingValue { line: usize, key: String },

    #[error("line {line}: unclosed block")]
    UnclosedBlock { line: usize },
}

/// A value: either a leaf string or a nested block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Block(Block),
}

impl Value {
    /// Leaf text, if this is not a block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Block(_) => None,
        }
    }

    /// Nested block, if this is not a leaf.
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Value::Block(b) => Some(b),
            Value::Text(_) => None,
        }
    }
}

/// An ordered list of key/value pairs. Duplicate keys are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    entries: Vec<(String, Value)>,
}

impl Block {
    /// Entries in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// First value whose key matches, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// First nested block under `key`.
    pub fn block(&self, key: &str) -> Option<&Block> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .find_map(|(_, v)| v.as_block())
    }

    /// First leaf text under `key`.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .find_map(|(_, v)| v.as_text())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a whole document into its root block.
pub fn parse(input: &str) -> Result<Block, ParseError> {
    let mut lexer = Lexer::new(input);
    let root = parse_block(&mut lexer, None)?;
    Ok(root)
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Str(String),
    Open,
    Close,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        Self {
            chars: input.chars().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Skip whitespace, `//` comments and `[$COND]` tags.
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if ahead.peek() != Some(&'/') {
                        return Ok(());
                    }
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('[') => {
                    let line = self.line;
                    loop {
                        match self.bump() {
                            Some(']') => break,
                            Some(_) => {}
                            None => return Err(ParseError::UnterminatedConditional { line }),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Next token and the line it starts on.
    fn next_token(&mut self) -> Result<Option<(usize, Token)>, ParseError> {
        self.skip_trivia()?;
        let Some(&c) = self.chars.peek() else {
            return Ok(None);
        };
        let line = self.line;

        let token = match c {
            '{' => {
                self.bump();
                Token::Open
            }
            '}' => {
                self.bump();
                Token::Close
            }
            '"' => {
                self.bump();
                Token::Str(self.quoted()?)
            }
            _ => Token::Str(self.bare()),
        };
        Ok(Some((line, token)))
    }

    fn quoted(&mut self) -> Result<String, ParseError> {
        let line = self.line;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::UnterminatedString { line }),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err(ParseError::UnterminatedString { line }),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn bare(&mut self) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | '"') {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }
}

/// Parse entries until `}` (nested) or end of input (root).
fn parse_block(lexer: &mut Lexer<'_>, opened_at: Option<usize>) -> Result<Block, ParseError> {
    let mut block = Block::default();

    loop {
        let (line, key) = match lexer.next_token()? {
            None => {
                return match opened_at {
                    Some(line) => Err(ParseError::UnclosedBlock { line }),
                    None => Ok(block),
                };
            }
            Some((line, Token::Close)) => {
                return match opened_at {
                    Some(_) => Ok(block),
                    None => Err(ParseError::Unexpected { line, found: '}' }),
                };
            }
            Some((line, Token::Open)) => return Err(ParseError::Unexpected { line, found: '{' }),
            Some((line, Token::Str(key))) => (line, key),
        };

        let value = match lexer.next_token()? {
            Some((_, Token::Str(text))) => Value::Text(text),
            Some((open_line, Token::Open)) => Value::Block(parse_block(lexer, Some(open_line))?),
            Some((_, Token::Close)) | None => {
                return Err(ParseError::MissingValue { line, key });
            }
        };

        block.entries.push((key, value));
    }
}
