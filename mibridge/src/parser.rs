/// GDB/MI output parser
///
/// Parses single lines of GDB/MI output into records and assembles
/// consecutive records into one `MiOutput` chunk per `(gdb)` prompt.

use regex::Regex;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

use crate::types::{
    AsyncClass, AsyncRecord, MiOutput, OobRecord, ResultClass, ResultRecord, StreamKind,
    StreamRecord, Value,
};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("unrecognized MI output: {0}")]
    Unrecognized(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// One parsed line of MI output.
#[derive(Debug, Clone, PartialEq)]
pub enum MiRecord {
    /// The `(gdb)` prompt line terminating a chunk.
    Prompt,
    Oob(OobRecord),
    Result(ResultRecord),
}

/// Parse a single line of GDB/MI output.
pub fn parse_mi_line(line: &str) -> Result<MiRecord> {
    let line = line.trim();

    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    if line == "(gdb)" {
        return Ok(MiRecord::Prompt);
    }

    if let Some(stream) = parse_stream_record(line) {
        return Ok(MiRecord::Oob(OobRecord::Stream(stream)));
    }

    let (token, rest) = split_token(line);
    match rest.chars().next() {
        Some('*') | Some('=') => {
            parse_async_record(token, rest).map(|r| MiRecord::Oob(OobRecord::Async(r)))
        }
        Some('^') => parse_result_record(line).map(MiRecord::Result),
        _ => Err(ParseError::Unrecognized(line.to_string())),
    }
}

/// Split an optional leading numeric token off a record line.
fn split_token(line: &str) -> (Option<u32>, &str) {
    let digits_end = line
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(line.len());
    let (digits, rest) = line.split_at(digits_end);
    if digits.is_empty() {
        (None, line)
    } else {
        (digits.parse().ok(), rest)
    }
}

/// Parse a stream record (console, target, or log output).
fn parse_stream_record(line: &str) -> Option<StreamRecord> {
    if line.len() < 2 {
        return None;
    }

    let (kind, content) = match line.chars().next()? {
        '~' => (StreamKind::Console, &line[1..]),
        '@' => (StreamKind::Target, &line[1..]),
        '&' => (StreamKind::Log, &line[1..]),
        _ => return None,
    };

    // Stream payloads are C-strings; fall back to the raw text for
    // debugger versions that omit the quoting.
    let text = parse_c_string(content).unwrap_or_else(|| content.to_string());

    Some(StreamRecord { kind, text })
}

/// Parse a result record (`[token]^class[,results]`).
fn parse_result_record(line: &str) -> Result<ResultRecord> {
    let re = Regex::new(r"^(?:(\d+))?\^(done|running|connected|error|exit)(?:,(.*))?$")
        .map_err(|e| ParseError::Malformed(e.to_string()))?;

    let caps = re
        .captures(line)
        .ok_or_else(|| ParseError::Malformed(format!("invalid result record: {line}")))?;

    let token = caps.get(1).and_then(|m| m.as_str().parse().ok());

    let class = match caps.get(2).map(|m| m.as_str()) {
        Some("done") => ResultClass::Done,
        Some("running") => ResultClass::Running,
        Some("connected") => ResultClass::Connected,
        Some("error") => ResultClass::Error,
        Some("exit") => ResultClass::Exit,
        other => {
            return Err(ParseError::Malformed(format!(
                "unknown result class: {other:?}"
            )))
        }
    };

    let results = match caps.get(3) {
        Some(m) => parse_results(m.as_str())?,
        None => HashMap::new(),
    };

    Ok(ResultRecord {
        token,
        class,
        results,
    })
}

/// Parse an async record (`[token](*|=)class[,results]`).
fn parse_async_record(token: Option<u32>, rest: &str) -> Result<AsyncRecord> {
    let body = &rest[1..];

    let (class_str, results_str) = match body.find(',') {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };

    if class_str.is_empty() {
        return Err(ParseError::Malformed("async record without class".into()));
    }

    let results = match results_str {
        Some(s) => parse_results(s)?,
        None => HashMap::new(),
    };

    Ok(AsyncRecord {
        token,
        class: AsyncClass::from_class_str(class_str),
        results,
    })
}

/// Parse comma-separated `variable=value` pairs.
fn parse_results(input: &str) -> Result<HashMap<String, Value>> {
    let mut scanner = Scanner::new(input);
    let mut results = HashMap::new();

    while scanner.peek().is_some() {
        scanner.skip_spaces();
        if scanner.peek().is_none() {
            break;
        }

        let key = scanner.identifier()?;
        scanner.expect('=')?;
        let value = scanner.value()?;
        results.insert(key, value);

        scanner.skip(',');
    }

    Ok(results)
}

/// Cursor over a record's result text.
struct Scanner<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Scanner {
            chars: input.chars().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.chars.next();
        }
    }

    fn skip(&mut self, ch: char) {
        if self.peek() == Some(ch) {
            self.chars.next();
        }
    }

    fn expect(&mut self, ch: char) -> Result<()> {
        if self.chars.next() == Some(ch) {
            Ok(())
        } else {
            Err(ParseError::Malformed(format!("expected '{ch}'")))
        }
    }

    fn identifier(&mut self) -> Result<String> {
        let mut ident = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                ident.push(ch);
                self.chars.next();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(ParseError::Malformed("empty identifier".into()));
        }
        Ok(ident)
    }

    fn value(&mut self) -> Result<Value> {
        match self.peek() {
            Some('"') => self.quoted_string().map(Value::String),
            Some('[') => self.list(),
            Some('{') => self.tuple(),
            Some(_) => self.bare_string().map(Value::String),
            None => Err(ParseError::Malformed("empty value".into())),
        }
    }

    fn quoted_string(&mut self) -> Result<String> {
        self.chars.next(); // opening quote
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some('\\') => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err(ParseError::Malformed("unterminated string".into())),
                },
                Some('"') => return Ok(out),
                Some(ch) => out.push(ch),
                None => return Err(ParseError::Malformed("unterminated string".into())),
            }
        }
    }

    fn list(&mut self) -> Result<Value> {
        self.chars.next(); // opening bracket
        let mut items = Vec::new();

        while let Some(ch) = self.peek() {
            if ch == ']' {
                break;
            }
            // List elements may be named (`bkpt={...}` inside a breakpoint
            // table body). The name adds nothing to the element itself.
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                let word = self.identifier()?;
                if self.peek() == Some('=') {
                    self.chars.next();
                    items.push(self.value()?);
                } else {
                    items.push(Value::String(word));
                }
            } else {
                items.push(self.value()?);
            }
            self.skip(',');
        }

        self.expect(']')?;
        Ok(Value::List(items))
    }

    fn tuple(&mut self) -> Result<Value> {
        self.chars.next(); // opening brace
        let mut fields = HashMap::new();

        while let Some(ch) = self.peek() {
            if ch == '}' {
                break;
            }
            let key = self.identifier()?;
            self.expect('=')?;
            let value = self.value()?;
            fields.insert(key, value);
            self.skip(',');
        }

        self.expect('}')?;
        Ok(Value::Tuple(fields))
    }

    fn bare_string(&mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if ch == ',' || ch == ']' || ch == '}' || ch == ' ' {
                break;
            }
            out.push(ch);
            self.chars.next();
        }
        if out.is_empty() {
            return Err(ParseError::Malformed("empty value".into()));
        }
        Ok(out)
    }
}

/// Parse a C-style string (strips quotes, resolves escape sequences).
fn parse_c_string(input: &str) -> Option<String> {
    if input.len() < 2 || !input.starts_with('"') || !input.ends_with('"') {
        return None;
    }

    let content = &input[1..input.len() - 1];
    let mut out = String::new();
    let mut chars = content.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }

    Some(out)
}

/// Groups parsed lines into `MiOutput` chunks.
///
/// MI output between two `(gdb)` prompts forms one delivery unit: zero or
/// more out-of-band records plus at most one result record.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    oob_records: Vec<OobRecord>,
    result_record: Option<ResultRecord>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw output line. Returns the completed chunk when the
    /// line is the terminating prompt.
    pub fn push_line(&mut self, line: &str) -> Result<Option<MiOutput>> {
        match parse_mi_line(line)? {
            MiRecord::Prompt => Ok(Some(self.flush())),
            MiRecord::Oob(record) => {
                self.oob_records.push(record);
                Ok(None)
            }
            MiRecord::Result(record) => {
                if self.result_record.is_some() {
                    log::warn!("multiple result records in one chunk, keeping the last");
                }
                self.result_record = Some(record);
                Ok(None)
            }
        }
    }

    /// Take the accumulated records as one chunk.
    pub fn flush(&mut self) -> MiOutput {
        MiOutput {
            oob_records: std::mem::take(&mut self.oob_records),
            result_record: self.result_record.take(),
        }
    }
}
