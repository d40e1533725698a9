//! String literal rendering and credential masking.

/// Wrap text in single quotes, doubling embedded quotes and backslashes.
pub fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render a column DEFAULT: numbers bare, everything else quoted.
pub fn default_literal(s: &str) -> String {
    if s.parse::<i64>().is_ok() || s.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
        s.to_string()
    } else {
        quote_literal(s)
    }
}

const MASK: &str = "********";

/// Clause keywords whose literal argument is a secret or an identity.
const SECRET_KEYWORDS: [&str; 6] = [
    "ACCESS_KEY_ID",
    "SECRET_ACCESS_KEY",
    "SESSION_TOKEN",
    "IAM_ROLE",
    "CREDENTIALS",
    "MASTER_SYMMETRIC_KEY",
];

/// Replace the literal following each credential keyword with a mask.
///
/// Only a literal directly after the keyword (separated by whitespace) is
/// masked, so a query that merely mentions `iam_role` inside an UNLOAD
/// subquery keeps its text.
pub fn redact(text: &str) -> String {
    let upper = text.to_ascii_uppercase();
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while pos < text.len() {
        let next = SECRET_KEYWORDS
            .iter()
            .filter_map(|kw| upper[pos..].find(kw).map(|i| (pos + i, kw.len())))
            .min_by_key(|(i, _)| *i);
        let Some((start, len)) = next else { break };

        let mut cursor = start + len;
        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if cursor == start + len || cursor >= bytes.len() || bytes[cursor] != b'\'' {
            out.push_str(&text[pos..start + len]);
            pos = start + len;
            continue;
        }

        let Some(end) = literal_end(bytes, cursor) else {
            out.push_str(&text[pos..start + len]);
            pos = start + len;
            continue;
        };
        out.push_str(&text[pos..=cursor]);
        out.push_str(MASK);
        out.push('\'');
        pos = end + 1;
    }

    out.push_str(&text[pos..]);
    out
}

/// Index of the closing quote of the literal opening at `open`.
fn literal_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
            b'\'' => return Some(i),
            _ => i += 1,
        }
    }
    None
}
