//! Rewriting of comments in structured header values.

use super::encoded_word::EncodedWordEncoder;

/// Converts comments that contain non-ASCII or backslash-escaped text into
/// encoded words.
///
/// Text outside comments, quoted strings and comment delimiters are copied
/// unchanged. Nested comments are handled; each run of comment text between
/// delimiters is considered separately, with its leading and trailing
/// whitespace kept literal. An unterminated comment is left as written.
#[must_use]
pub fn encode_comments(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(c) = rest.chars().next() {
        match c {
            '"' => {
                let end = quoted_string_end(rest);
                out.push_str(&rest[..end]);
                rest = &rest[end..];
            }
            '(' => match convert_comment(rest) {
                Some((converted, end)) => {
                    out.push_str(&converted);
                    rest = &rest[end..];
                }
                None => {
                    out.push_str(rest);
                    break;
                }
            },
            c => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

/// Byte offset just past the quoted string starting at `s[0]`.
fn quoted_string_end(s: &str) -> usize {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return i + 1,
            _ => {}
        }
    }
    s.len()
}

/// Converts the comment starting at `s[0]`, returning the rewritten text and
/// the byte offset after its closing parenthesis.
fn convert_comment(s: &str) -> Option<(String, usize)> {
    let mut out = String::from("(");
    let mut run = String::new();
    let mut escaped = false;
    let mut depth = 1usize;
    let mut chars = s.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, next) = chars.next()?;
                run.push(next);
                escaped = true;
            }
            '(' => {
                flush_run(&mut out, &mut run, &mut escaped);
                out.push('(');
                depth += 1;
            }
            ')' => {
                flush_run(&mut out, &mut run, &mut escaped);
                out.push(')');
                depth -= 1;
                if depth == 0 {
                    return Some((out, i + 1));
                }
            }
            c => run.push(c),
        }
    }
    None
}

fn flush_run(out: &mut String, run: &mut String, escaped: &mut bool) {
    if run.is_empty() {
        return;
    }
    if !*escaped && run.is_ascii() {
        out.push_str(run);
    } else {
        let core = run.trim_matches([' ', '\t']);
        let lead = &run[..run.len() - run.trim_start_matches([' ', '\t']).len()];
        let trail = &run[run.trim_end_matches([' ', '\t']).len()..];
        out.push_str(lead);
        if !core.is_empty() {
            let mut encoder = EncodedWordEncoder::new();
            encoder.push_str(core);
            out.push_str(&encoder.finish());
        }
        out.push_str(trail);
    }
    run.clear();
    *escaped = false;
}
