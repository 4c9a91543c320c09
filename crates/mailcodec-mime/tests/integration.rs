//! Integration tests for the MIME decoder.
//!
//! Messages are fed through a reader that hands out a few bytes per call,
//! so every decoder sees its input split at arbitrary points.

use std::io::{self, Read};

use mailcodec_mime::encoder::{encode_header_field, encode_quoted_printable};
use mailcodec_mime::transform::decode_body;
use mailcodec_mime::{
    ByteSource, DecodeOptions, Error, Headers, Message, ReaderSource, SliceSource,
    TransferEncoding,
};

/// Reader that returns at most `step` bytes per call.
struct TrickleReader {
    data: Vec<u8>,
    pos: usize,
    step: usize,
}

impl TrickleReader {
    fn new(data: &[u8], step: usize) -> Self {
        Self {
            data: data.to_vec(),
            pos: 0,
            step,
        }
    }
}

impl Read for TrickleReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Reader that fails after the first few bytes.
struct FailingReader(usize);

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.0 == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        }
        self.0 -= 1;
        buf[0] = b'X';
        Ok(1)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const MIXED: &str = concat!(
    "From: sender@example.com\r\n",
    "To: recipient@example.com\r\n",
    "Subject: =?iso-8859-1?q?Gr=FC=DFe?= =?utf-8?b?YXVz?= Berlin\r\n",
    "MIME-Version: 1.0\r\n",
    "Content-Type: multipart/mixed;\r\n",
    "\tboundary=\"==outer==\"\r\n",
    "\r\n",
    "This is a multi-part message in MIME format.\r\n",
    "--==outer==\r\n",
    "Content-Type: multipart/alternative; boundary=alt\r\n",
    "\r\n",
    "--alt\r\n",
    "Content-Type: text/plain; charset=utf-8\r\n",
    "Content-Transfer-Encoding: quoted-printable\r\n",
    "\r\n",
    "Caf=C3=A9 au lait =\r\n",
    "for everyone.  \r\n",
    "Bye\r\n",
    "--alt\r\n",
    "Content-Type: text/html; charset=utf-8\r\n",
    "\r\n",
    "<p>Cafe</p>\r\n",
    "--alt--\r\n",
    "\r\n",
    "--==outer==\r\n",
    "Content-Type: application/octet-stream;\r\n",
    " name*0*=utf-8''r%C3%A9sum%C3%A9;\r\n",
    " name*1=\".pdf\"\r\n",
    "Content-Transfer-Encoding: base64\r\n",
    "\r\n",
    "JVBERi0xLjQK\r\n",
    "AAEC/w==\r\n",
    "--==outer==--\r\n",
    "trailing epilogue\r\n",
);

fn check_mixed(message: &Message) {
    assert_eq!(message.subject().as_deref(), Some("Grüßeaus Berlin"));
    assert_eq!(message.parts().len(), 2);

    let alternative = &message.parts()[0];
    assert_eq!(alternative.content_type().mime_type(), "multipart/alternative");
    assert_eq!(alternative.parts().len(), 2);
    assert_eq!(
        alternative.parts()[0].body_text().unwrap(),
        "Café au lait for everyone.\r\nBye"
    );
    assert_eq!(alternative.parts()[1].body(), Some(&b"<p>Cafe</p>"[..]));

    let attachment = &message.parts()[1];
    assert_eq!(
        attachment.content_type().parameters.get("name").map(String::as_str),
        Some("résumé.pdf")
    );
    let mut expected = b"%PDF-1.4\n".to_vec();
    expected.extend_from_slice(&[0, 1, 2, 0xff]);
    assert_eq!(attachment.body(), Some(expected.as_slice()));

    assert_eq!(message.text_part().unwrap(), "Café au lait for everyone.\r\nBye");
    assert_eq!(message.html_part().unwrap(), "<p>Cafe</p>");
}

#[test]
fn test_mixed_message_from_slice() {
    init_tracing();
    let message = Message::parse(MIXED.as_bytes()).unwrap();
    check_mixed(&message);
    assert_eq!(message.parts()[1].transfer_encoding(), TransferEncoding::Base64);
    assert_eq!(message.header("mime-version"), Some("1.0"));
}

#[test]
fn test_mixed_message_from_trickling_reader() {
    init_tracing();
    for step in [1, 2, 3, 7, 64] {
        let reader = TrickleReader::new(MIXED.as_bytes(), step);
        let message = Message::from_reader(reader, &DecodeOptions::default()).unwrap();
        check_mixed(&message);
    }
}

#[test]
fn test_myboundary_example() {
    let raw = concat!(
        "Content-Type: multipart/mixed; boundary=myboundary\r\n",
        "\r\n",
        "--myboundary\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "A\r\n",
        "--myboundary--\r\n",
    );
    let message = Message::parse(raw.as_bytes()).unwrap();
    assert_eq!(message.parts().len(), 1);
    assert_eq!(message.parts()[0].body(), Some(&b"A"[..]));
}

#[test]
fn test_n_parts_never_contain_delimiters() {
    for n in 1..12 {
        let mut raw = String::from("Content-Type: multipart/mixed; boundary=B\r\n\r\n");
        for i in 0..n {
            raw.push_str(&format!("--B\r\n\r\npart {i}\r\n-- not a delimiter\r\n"));
        }
        raw.push_str("--B--\r\n");
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(message.parts().len(), n);
        for (i, part) in message.parts().iter().enumerate() {
            let body = part.body().unwrap();
            assert_eq!(body, format!("part {i}\r\n-- not a delimiter").as_bytes());
            assert!(!body.windows(3).any(|w| w == b"--B"));
        }
    }
}

#[test]
fn test_quoted_printable_examples() {
    let strict = DecodeOptions::default();
    let lenient = DecodeOptions::lenient();
    let qp = TransferEncoding::QuotedPrintable;
    assert_eq!(decode_body(qp, b"te=3Dst", &strict).unwrap(), b"te=st");
    assert_eq!(decode_body(qp, b"te\r\nst", &lenient).unwrap(), b"te\r\nst");
    assert_eq!(decode_body(qp, b"te ", &strict).unwrap(), b"te");
    assert_eq!(decode_body(qp, b"te \r\n", &strict).unwrap(), b"te\r\n");
    assert_eq!(decode_body(qp, b"te=20", &strict).unwrap(), b"te ");

    let run = vec![b'a'; 77];
    assert!(matches!(
        decode_body(qp, &run, &strict),
        Err(Error::LineTooLong { limit: 76 })
    ));
    assert_eq!(decode_body(qp, &run, &lenient).unwrap(), run);
}

#[test]
fn test_base64_tails() {
    let b64 = TransferEncoding::Base64;
    let strict = DecodeOptions::default();
    assert_eq!(decode_body(b64, b"QUJD", &strict).unwrap(), b"ABC");
    assert_eq!(decode_body(b64, b"QUJDRA", &strict).unwrap(), b"ABCD");
    assert_eq!(decode_body(b64, b"QUJDREU", &strict).unwrap(), b"ABCDE");
    assert!(matches!(
        decode_body(b64, b"QUJDR", &strict),
        Err(Error::IncompleteGroup)
    ));
}

#[test]
fn test_seven_bit_body_rejects_eight_bit() {
    let raw = b"Content-Type: text/plain\r\n\r\ncaf\xe9";
    assert!(matches!(
        Message::parse(raw),
        Err(Error::InvalidCharacter { byte: 0xe9, .. })
    ));
    let message = Message::parse_with(raw, &DecodeOptions::lenient()).unwrap();
    assert_eq!(message.body(), Some(&b"caf?"[..]));
}

#[test]
fn test_header_errors() {
    assert!(matches!(
        Message::parse(b"Bad Name: x\r\n\r\n"),
        Err(Error::Structural(_))
    ));
    assert!(matches!(
        Message::parse(b": empty\r\n\r\n"),
        Err(Error::Structural(_))
    ));
    let long = format!("X-Long: {}\r\n\r\n", "v".repeat(1000));
    assert!(matches!(
        Message::parse(long.as_bytes()),
        Err(Error::LineTooLong { limit: 998 })
    ));
}

#[test]
fn test_io_error_propagates() {
    let result = Message::from_reader(FailingReader(3), &DecodeOptions::default());
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_lenient_bare_lf_message() {
    init_tracing();
    let raw = concat!(
        "Content-Type: multipart/mixed; boundary=b\n",
        "\n",
        "--b\n",
        "Content-Type: text/plain\n",
        "\n",
        "line one\n",
        "--b\n",
        "\n",
        "two\n",
        "--b--\n",
    );
    assert!(Message::parse(raw.as_bytes()).is_err());
    let message = Message::parse_with(raw.as_bytes(), &DecodeOptions::lenient()).unwrap();
    assert_eq!(message.parts().len(), 2);
    assert_eq!(message.parts()[0].body(), Some(&b"line one"[..]));
    assert_eq!(message.parts()[1].body(), Some(&b"two"[..]));
}

#[test]
fn test_encapsulated_message() {
    let raw = concat!(
        "Content-Type: multipart/mixed; boundary=m\r\n\r\n",
        "--m\r\n",
        "Content-Type: message/rfc822\r\n\r\n",
        "Subject: forwarded\r\n",
        "Content-Transfer-Encoding: base64\r\n\r\n",
        "aGk=\r\n",
        "--m--\r\n",
    );
    let message = Message::parse(raw.as_bytes()).unwrap();
    let forwarded = message.parts()[0]
        .encapsulated(&DecodeOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(forwarded.subject().as_deref(), Some("forwarded"));
    assert_eq!(forwarded.body(), Some(&b"hi"[..]));
    assert!(message.encapsulated(&DecodeOptions::default()).is_none());
}

#[test]
fn test_serialise_and_reparse() {
    let original = Message::parse(MIXED.as_bytes()).unwrap();
    let wire = original.to_bytes();
    let reparsed = Message::parse(&wire).unwrap();
    check_mixed(&reparsed);
}

#[test]
fn test_headers_round_trip_through_encoder() {
    let mut headers = Headers::new();
    headers.add("subject", "Ünïcödé ".repeat(12).trim_end());
    headers.add("to", "someone@example.com (Jürgen)");
    let wire = headers.to_wire();
    for line in wire.split("\r\n") {
        assert!(line.len() <= 76, "{line:?}");
    }
    let parsed = Headers::parse(format!("{wire}\r\n").as_bytes()).unwrap();
    assert_eq!(
        parsed.get_decoded("subject").as_deref(),
        Some("Ünïcödé ".repeat(12).trim_end())
    );
    assert_eq!(
        parsed.get("to"),
        Some("someone@example.com (=?utf-8?q?J=C3=BCrgen?=)")
    );
    assert_eq!(
        encode_header_field("To", "to", "plain@example.com"),
        "To: plain@example.com"
    );
}

#[test]
fn test_sources_compose() {
    let encoded = encode_quoted_printable("naïve\r\n".as_bytes());
    let mut source = ReaderSource::new(TrickleReader::new(encoded.as_bytes(), 1));
    let mut bytes = Vec::new();
    while let Some(b) = source.next_byte().unwrap() {
        bytes.push(b);
    }
    assert_eq!(bytes, encoded.as_bytes());

    let decoded = decode_body(
        TransferEncoding::QuotedPrintable,
        SliceSource::new(encoded.as_bytes()).remaining(),
        &DecodeOptions::default(),
    )
    .unwrap();
    assert_eq!(decoded, "naïve\r\n".as_bytes());
}

proptest::proptest! {
    #[test]
    fn parse_never_panics(data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..512)) {
        let _ = Message::parse(&data);
        let _ = Message::parse_with(&data, &DecodeOptions::lenient());
    }

    #[test]
    fn multipart_bodies_never_panic(body in "[a-z0-9 \r\n=:-]{0,300}") {
        let raw = format!("Content-Type: multipart/mixed; boundary=b\r\n\r\n{body}");
        let _ = Message::parse(raw.as_bytes());
        let _ = Message::parse_with(raw.as_bytes(), &DecodeOptions::lenient());
    }
}
