//-
// Copyright (c) 2026, Mailstore Upgrade Developers
//
// This file is part of mailstore-upgrade.
//
// mailstore-upgrade is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// mailstore-upgrade is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// mailstore-upgrade. If not, see <http://www.gnu.org/licenses/>.

//! Header blocks for the MIME parts synthesised during migration, and the
//! small amount of `Content-Type` parsing needed to carry boundaries over from
//! legacy headers.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{is_not, take, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, recognize},
    multi::{fold_many0, many0},
    sequence::{delimited, preceded, separated_pair, tuple},
    IResult,
};
use rand::Rng;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
pub const CONTENT_ID: &str = "Content-ID";

/// An ordered list of header fields, serialised one `Name: value` per line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    fields: Vec<(String, String)>,
}

impl HeaderBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Replace every occurrence of `name` with a single field at the end.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.add(name, value);
    }

    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|&(ref n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// The first value of `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, ref v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for HeaderBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &(ref name, ref value) in &self.fields {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        Ok(())
    }
}

/// A parsed `Content-Type` value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    /// The lower-cased `type/subtype`.
    pub mime_type: String,
    /// Parameters in order of appearance, names lower-cased.
    pub params: Vec<(String, String)>,
}

impl ContentType {
    pub fn parse(value: &str) -> Option<Self> {
        content_type(value).ok().map(|(_, ct)| ct)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, ref v)| v.as_str())
    }
}

/// Whether the declared type `declared` names the same type as `expected`,
/// ignoring case and any parameters.
pub fn is_mime_type(declared: Option<&str>, expected: &str) -> bool {
    declared
        .and_then(|d| d.split(';').next())
        .map_or(false, |d| d.trim().eq_ignore_ascii_case(expected))
}

/// The `boundary` parameter of the `Content-Type` in `headers`, if present.
pub fn boundary_of(headers: &HeaderBlock) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(ContentType::parse)
        .and_then(|ct| ct.param("boundary").map(str::to_owned))
        .filter(|b| !b.is_empty())
}

/// Generate a fresh multipart boundary.
pub fn generate_boundary() -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    let mut rng = rand::thread_rng();
    let mut boundary = String::with_capacity(34);
    boundary.push_str("----");
    for _ in 0..30 {
        boundary.push(ALPHABET[rng.gen_range(0, ALPHABET.len())] as char);
    }
    boundary
}

// RFC 2045 5.1 "token"
fn is_token_char(ch: char) -> bool {
    ch.is_ascii()
        && !ch.is_ascii_control()
        && !" ()<>@,;:\\\"/[]?=".contains(ch)
}

fn token(i: &str) -> IResult<&str, &str> {
    take_while1(is_token_char)(i)
}

// RFC 2822 3.2.5 "quoted-string", without the surrounding CFWS.
fn quoted_string(i: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((is_not("\\\""), preceded(char('\\'), take(1usize)))),
            String::new(),
            |mut acc: String, item: &str| {
                acc.push_str(item);
                acc
            },
        ),
        char('"'),
    )(i)
}

// RFC 2045 5.1 "parameter", including the leading semicolon.
fn parameter(i: &str) -> IResult<&str, (String, String)> {
    map(
        preceded(
            tuple((multispace0, char(';'), multispace0)),
            separated_pair(
                token,
                tuple((multispace0, char('='), multispace0)),
                alt((quoted_string, map(token, str::to_owned))),
            ),
        ),
        |(name, value)| (name.to_ascii_lowercase(), value),
    )(i)
}

// RFC 2045 5.1 "content". Trailing garbage, including a dangling semicolon,
// is left unconsumed.
fn content_type(i: &str) -> IResult<&str, ContentType> {
    map(
        tuple((
            multispace0,
            recognize(separated_pair(token, char('/'), token)),
            many0(parameter),
        )),
        |(_, mime_type, params)| ContentType {
            mime_type: mime_type.to_ascii_lowercase(),
            params,
        },
    )(i)
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn header_block_set_replaces_all() {
        let mut headers = HeaderBlock::new();
        headers.add("Subject", "hi");
        headers.add("content-type", "text/plain");
        headers.add("Content-Type", "text/html");
        headers.set(CONTENT_TYPE, "multipart/mixed; boundary=\"b\"");

        assert_eq!(
            "Subject: hi\r\nContent-Type: multipart/mixed; boundary=\"b\"\r\n",
            headers.to_string()
        );
        assert_eq!(Some("hi"), headers.get("SUBJECT"));
        assert_eq!(None, headers.get("X-Nope"));
    }

    #[test]
    fn parse_content_types() {
        let ct = ContentType::parse(
            "Multipart/Encrypted; boundary=\"abc\\\"d\";\r\n \
             protocol=application/pgp-encrypted",
        )
        .unwrap();
        assert_eq!("multipart/encrypted", ct.mime_type);
        assert_eq!(Some("abc\"d"), ct.param("BOUNDARY"));
        assert_eq!(Some("application/pgp-encrypted"), ct.param("protocol"));

        let ct = ContentType::parse("multipart/mixed; boundary=\"x\";").unwrap();
        assert_eq!(Some("x"), ct.param("boundary"));

        let ct = ContentType::parse("text/plain\n charset=utf-8").unwrap();
        assert_eq!("text/plain", ct.mime_type);
        assert!(ct.params.is_empty());

        assert_eq!(None, ContentType::parse("garbage"));
        assert_eq!(
            Some(String::new()),
            ContentType::parse("a/b; x=\"\"")
                .and_then(|ct| ct.param("x").map(str::to_owned))
        );
    }

    #[test]
    fn boundary_extraction() {
        let mut headers = HeaderBlock::new();
        assert_eq!(None, boundary_of(&headers));
        headers.add(CONTENT_TYPE, "multipart/encrypted; boundary=UniqueBoundary");
        assert_eq!(Some("UniqueBoundary".to_owned()), boundary_of(&headers));
        headers.set(CONTENT_TYPE, "multipart/encrypted; boundary=\"\"");
        assert_eq!(None, boundary_of(&headers));
    }

    #[test]
    fn mime_type_comparison() {
        assert!(is_mime_type(Some("TEXT/plain"), "text/plain"));
        assert!(is_mime_type(
            Some("multipart/encrypted; protocol=x"),
            "multipart/encrypted"
        ));
        assert!(!is_mime_type(Some("text/plainx"), "text/plain"));
        assert!(!is_mime_type(None, "text/plain"));
    }

    #[test]
    fn generated_boundaries() {
        let a = generate_boundary();
        let b = generate_boundary();
        assert_eq!(34, a.len());
        assert!(a.starts_with("----"));
        assert!(a[4..].chars().all(|c| c.is_ascii_uppercase()
            || c.is_ascii_digit()));
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn content_type_parse_never_panics(s in ".*") {
            ContentType::parse(&s);
        }

        #[test]
        fn quoted_boundaries_survive(b in "[ -!#-\\[\\]-~]{1,40}") {
            let value = format!("multipart/mixed; boundary=\"{}\"", b);
            let ct = ContentType::parse(&value).unwrap();
            prop_assert_eq!(Some(b.as_str()), ct.param("boundary"));
        }
    }
}
