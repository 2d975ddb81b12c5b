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

use std::borrow::Cow;
use std::fmt::Write as _;
use std::str;

/// The longest encoded line permitted by RFC 2045, excluding the line ending.
const MAX_LINE: usize = 76;

/// Encodes `data` as quoted-printable text, as described by RFC 2045.
///
/// Line feeds (with or without a preceding carriage return) are hard line
/// breaks and are always emitted as CRLF. Whitespace at the end of a line is
/// encoded so that it survives transport, and long lines are broken with soft
/// line breaks.
pub fn qp_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + data.len() / 8);
    let mut lines = data.split(|&b| b'\n' == b).peekable();

    while let Some(line) = lines.next() {
        let hard_break = lines.peek().is_some();
        let line = match line.split_last() {
            Some((&b'\r', init)) if hard_break => init,
            _ => line,
        };

        let mut column = 0;
        for (ix, &b) in line.iter().enumerate() {
            let last = ix + 1 == line.len();
            let literal = match b {
                b' ' | b'\t' => !last,
                b'!'..=b'<' | b'>'..=b'~' => true,
                _ => false,
            };
            let width = if literal { 1 } else { 3 };
            // A soft break needs one column for its `=` unless nothing else
            // follows on this line.
            let limit = if last { MAX_LINE } else { MAX_LINE - 1 };
            if column + width > limit {
                out.push_str("=\r\n");
                column = 0;
            }

            if literal {
                out.push(b as char);
            } else {
                let _ = write!(out, "={:02X}", b);
            }
            column += width;
        }

        if hard_break {
            out.push_str("\r\n");
        }
    }

    out
}

/// Decodes quoted-printable encoding, as described by RFC 2045.
///
/// Encoded bytes and soft line endings are both handled, the latter by
/// discarding. UNIX line endings are handled as well as DOS line endings.
///
/// This never fails. Invalid sequences are passed through untransformed.
/// 8-bit characters are passed through, including invalid UTF-8.
///
/// Returns the decoded text, as well as a possible "dangling" slice, which
/// represents a QP escape sequence that was cut off by the end of the input.
pub fn qp_decode(s: &[u8]) -> (Cow<[u8]>, &[u8]) {
    let mut transformed = Vec::new();
    let mut dangling: Option<&[u8]> = None;

    let mut split = s.split(|&b| b'=' == b);
    let mut prefix = split.next();

    for element in split {
        if let Some(prefix) = prefix.take() {
            transformed.extend_from_slice(prefix);
        }

        if let Some(dangling) = dangling.take() {
            transformed.push(b'=');
            transformed.extend_from_slice(dangling);
        }

        if element.is_empty() {
            dangling = Some(element);
            continue;
        }

        if b'\n' == element[0] {
            transformed.extend_from_slice(&element[1..]);
            continue;
        }

        if element.len() < 2 {
            dangling = Some(element);
            continue;
        }

        let (encoded, tail) = element.split_at(2);
        if b"\r\n" == encoded {
            transformed.extend_from_slice(tail);
            continue;
        }

        match str::from_utf8(encoded)
            .ok()
            .and_then(|e| u8::from_str_radix(e, 16).ok())
        {
            Some(ch) => {
                transformed.push(ch);
                transformed.extend_from_slice(tail);
            }
            None => {
                transformed.push(b'=');
                transformed.extend_from_slice(element);
            }
        }
    }

    if transformed.is_empty() {
        (Cow::Borrowed(s), &[])
    } else {
        (
            Cow::Owned(transformed),
            dangling.map(|d| &s[s.len() - d.len() - 1..]).unwrap_or(&[]),
        )
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encode_simple_text() {
        assert_eq!("nothing special here.", qp_encode(b"nothing special here."));
        assert_eq!(
            "nothing special here.\r\n",
            qp_encode(b"nothing special here.\n")
        );
        assert_eq!("a=3Db\r\nc", qp_encode(b"a=b\r\nc"));
        assert_eq!("caf=C3=A9", qp_encode("café".as_bytes()));
        assert_eq!("trailing=20\r\ntab=09", qp_encode(b"trailing \ntab\t"));
        assert_eq!("lone=0D", qp_encode(b"lone\r"));
        assert_eq!("", qp_encode(b""));
    }

    #[test]
    fn encode_breaks_long_lines() {
        let long = "x".repeat(200);
        let encoded = qp_encode(long.as_bytes());
        for line in encoded.split("\r\n") {
            assert!(line.len() <= MAX_LINE, "line too long: {:?}", line);
        }
        assert_eq!(long.as_bytes(), &qp_decode(encoded.as_bytes()).0[..]);

        // Exactly 76 characters fit without a soft break.
        let exact = "y".repeat(76);
        assert_eq!(exact, qp_encode(exact.as_bytes()));
    }

    fn assert_qp(expected: &[u8], expected_dangling: &[u8], input: &[u8]) {
        let (actual, actual_dangling) = qp_decode(input);
        assert_eq!(expected, &actual[..]);
        assert_eq!(expected_dangling, actual_dangling);
    }

    #[test]
    fn test_qp_decode() {
        assert_qp(b"hello world", b"", b"hello world");
        assert_qp(b"fo\xabo", b"", b"fo=ABo");
        assert_qp(b"foo\xab\xcd", b"", b"foo=AB=CD");
        assert_qp(b"foobar", b"", b"foo=\nbar");
        assert_qp(b"foobar", b"", b"foo=\r\nbar");
        assert_qp(b"foo=()bar", b"", b"foo=()bar");
        assert_qp(b"foo", b"=A", b"foo=A");
    }

    proptest! {
        #[test]
        fn encoded_lines_decode_to_input(
            data in prop::collection::vec(
                prop::num::u8::ANY.prop_filter("no line breaks", |&b| {
                    b != b'\r' && b != b'\n'
                }),
                0..300,
            )
        ) {
            let encoded = qp_encode(&data);
            prop_assert!(encoded.is_ascii());
            for line in encoded.split("\r\n") {
                prop_assert!(line.len() <= MAX_LINE);
                prop_assert!(!line.ends_with(' ') && !line.ends_with('\t'));
            }

            let (decoded, dangling) = qp_decode(encoded.as_bytes());
            prop_assert_eq!(&data[..], &decoded[..]);
            prop_assert!(dangling.is_empty());
        }

        #[test]
        fn hard_breaks_become_crlf(s in "[a-z \n]{0,200}") {
            let encoded = qp_encode(s.as_bytes());
            let (decoded, _) = qp_decode(encoded.as_bytes());
            let expected = s.replace('\n', "\r\n");
            prop_assert_eq!(expected.as_bytes(), &decoded[..]);
        }
    }
}
