//! The meta format shared by all Tor directory documents.
//!
//! A document is a sequence of *items*. Each item is a keyword line,
//! optionally followed by an *object*, a base64 block framed by
//! `-----BEGIN <TAG>-----` and `-----END <TAG>-----` lines. The [`Scanner`]
//! splits raw text into items lazily and knows nothing about what the
//! keywords mean.

use std::ops::Range;

use lazy_static::lazy_static;
use memchr::memchr;
use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::space1,
    combinator::{eof, map, rest},
    sequence::preceded,
    IResult,
};
use regex::Regex;

use crate::error::DocumentParseError;

lazy_static! {
    static ref BEGIN_MARKER: Regex = Regex::new(r"^-----BEGIN ([A-Za-z0-9 ]+)-----$").unwrap();
    static ref END_MARKER: Regex = Regex::new(r"^-----END ([A-Za-z0-9 ]+)-----$").unwrap();
}

/// An armored object attached to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Object<'a> {
    /// The tag of the begin/end markers, e.g. `RSA PUBLIC KEY`
    pub tag: &'a str,
    /// The base64 lines between the markers, newlines included
    pub body: &'a str,
}

impl<'a> Object<'a> {
    /// Decode the base64 body.
    pub fn decode(&self) -> Result<Vec<u8>, DocumentParseError> {
        let joined: String = self.body.split_ascii_whitespace().collect();
        Ok(base64::decode(joined)?)
    }
}

/// A single item of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item<'a> {
    pub keyword: &'a str,
    pub arguments: Option<&'a str>,
    pub object: Option<Object<'a>>,
    /// 1-based line number of the keyword line
    pub line: usize,
    /// Byte range in the source text, including the object and final newline
    pub(crate) span: Range<usize>,
    /// End of the keyword line (after its newline)
    pub(crate) header_end: usize,
}

impl<'a> Item<'a> {
    /// Get the arguments split at whitespace, failing if there are none.
    pub fn split_arguments(&self) -> Result<Vec<&'a str>, DocumentParseError> {
        let args = self.get_argument()?;
        Ok(args.split_ascii_whitespace().collect())
    }

    /// Get the argument string, failing if there is none.
    pub fn get_argument(&self) -> Result<&'a str, DocumentParseError> {
        self.arguments
            .ok_or_else(|| DocumentParseError::args_missing(self.keyword))
    }

    /// Iterate the whitespace-separated arguments, if any.
    pub fn args(&self) -> impl Iterator<Item = &'a str> {
        self.arguments.unwrap_or("").split_ascii_whitespace()
    }

    pub fn is_annotation(&self) -> bool {
        self.keyword.starts_with('@')
    }
}

fn is_keyword_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '@'
}

/// Split a keyword line into keyword and (non-empty) arguments.
fn keyword_line(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    let (input, keyword) = take_while1(is_keyword_char)(input)?;
    let (input, arguments) = alt((
        map(eof, |_| None),
        map(preceded(space1, rest), |args: &str| {
            Some(args.trim_end()).filter(|a| !a.is_empty())
        }),
    ))(input)?;
    Ok((input, (keyword, arguments)))
}

fn begin_tag(line: &str) -> Option<&str> {
    BEGIN_MARKER
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn end_tag(line: &str) -> Option<&str> {
    END_MARKER
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// A physical line of the input
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    number: usize,
    start: usize,
    /// Offset after the line break (or end of input)
    end: usize,
    text: &'a str,
}

/// Lazy iterator over the items of a document.
///
/// The scanner is cheap to clone. A clone continues from wherever the
/// original was at that moment, while [`Scanner::restart`] goes back to the
/// beginning of the text. After the first error, it yields nothing more.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Scanner<'a> {
        Scanner {
            text,
            pos: 0,
            line: 1,
        }
    }

    /// Start again at the beginning of the text.
    pub fn restart(&mut self) {
        self.pos = 0;
        self.line = 1;
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    fn peek_line(&self) -> Option<Line<'a>> {
        if self.pos >= self.text.len() {
            return None;
        }
        let remaining = &self.text[self.pos..];
        let (raw, end) = match memchr(b'\n', remaining.as_bytes()) {
            Some(i) => (&remaining[..i], self.pos + i + 1),
            None => (remaining, self.text.len()),
        };
        Some(Line {
            number: self.line,
            start: self.pos,
            end,
            text: raw.strip_suffix('\r').unwrap_or(raw),
        })
    }

    fn next_line(&mut self) -> Option<Line<'a>> {
        let line = self.peek_line()?;
        self.pos = line.end;
        self.line += 1;
        Some(line)
    }

    fn fail(&mut self, err: DocumentParseError) -> Option<Result<Item<'a>, DocumentParseError>> {
        self.pos = self.text.len();
        Some(Err(err))
    }

    /// Consume an object whose begin marker is the next line.
    fn read_object(&mut self, tag: &'a str) -> Result<(Object<'a>, usize), DocumentParseError> {
        let begin = self
            .next_line()
            .ok_or_else(|| DocumentParseError::malformed_block(self.line, "missing begin marker"))?;
        let body_start = begin.end;
        loop {
            let line = self.next_line().ok_or_else(|| {
                DocumentParseError::malformed_block(
                    begin.number,
                    format!("'{}' block is never closed", tag),
                )
            })?;
            if let Some(end) = end_tag(line.text) {
                if end != tag {
                    return Err(DocumentParseError::malformed_block(
                        line.number,
                        format!("'{}' block closed as '{}'", tag, end),
                    ));
                }
                let object = Object {
                    tag,
                    body: &self.text[body_start..line.start],
                };
                return Ok((object, line.end));
            }
            if begin_tag(line.text).is_some() {
                return Err(DocumentParseError::malformed_block(
                    line.number,
                    format!("nested block inside '{}'", tag),
                ));
            }
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Item<'a>, DocumentParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = loop {
            let line = self.next_line()?;
            if !line.text.trim().is_empty() {
                break line;
            }
        };

        if begin_tag(line.text).is_some() || end_tag(line.text).is_some() {
            return self.fail(DocumentParseError::malformed_block(
                line.number,
                "object marker without a keyword line",
            ));
        }

        let (keyword, mut arguments) = match keyword_line(line.text) {
            Ok((_, parsed)) => parsed,
            Err(_) => {
                return self.fail(DocumentParseError::MalformedItem {
                    line: line.number,
                    raw: line.text.to_string(),
                })
            }
        };
        let mut keyword = keyword;
        // "opt" is a legacy prefix that carries no meaning
        if keyword == "opt" {
            if let Some(Ok((_, (kw, args)))) = arguments.map(keyword_line) {
                keyword = kw;
                arguments = args;
            }
        }

        let mut end = line.end;
        let mut object = None;
        if let Some(tag) = self.peek_line().and_then(|next| begin_tag(next.text)) {
            match self.read_object(tag) {
                Ok((obj, obj_end)) => {
                    object = Some(obj);
                    end = obj_end;
                }
                Err(e) => return self.fail(e),
            }
        }

        Some(Ok(Item {
            keyword,
            arguments,
            object,
            line: line.number,
            span: line.start..end,
            header_end: line.end,
        }))
    }
}

impl<'a> std::iter::FusedIterator for Scanner<'a> {}
