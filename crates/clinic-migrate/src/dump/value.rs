//! Scalar values parsed from one legacy INSERT row.
//!
//! The grammar is a narrow subset of SQL literals: bare numbers, bare
//! `NULL`, and strings quoted with `'` or `"` where the only escape is a
//! doubled quote. Nested calls and binary blobs are not supported.

use std::fmt;

/// One typed scalar from a legacy row.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyValue {
    /// `NULL` / `null`.
    Null,

    /// All-digit token of at most [`MAX_INT_DIGITS`] digits.
    Int(i64),

    /// Simple decimal token (`12.50`, `-3.5`).
    Float(f64),

    /// Anything else, including the empty string.
    Text(String),
}

/// Longer digit runs stay text so phone numbers and ids keep every digit.
pub const MAX_INT_DIGITS: usize = 9;

impl LegacyValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, LegacyValue::Null)
    }

    /// Borrow the text of a `Text` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LegacyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; text is parsed leniently after trimming.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LegacyValue::Int(v) => Some(*v),
            LegacyValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            LegacyValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view; integers widen, text is parsed after trimming.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LegacyValue::Int(v) => Some(*v as f64),
            LegacyValue::Float(v) => Some(*v),
            LegacyValue::Text(s) => s.trim().parse().ok(),
            LegacyValue::Null => None,
        }
    }

    /// Render any non-null value as text.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            LegacyValue::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for LegacyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegacyValue::Null => write!(f, "NULL"),
            LegacyValue::Int(v) => write!(f, "{}", v),
            LegacyValue::Float(v) => write!(f, "{}", v),
            LegacyValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for LegacyValue {
    fn from(v: &str) -> Self {
        LegacyValue::Text(v.to_string())
    }
}

impl From<i64> for LegacyValue {
    fn from(v: i64) -> Self {
        LegacyValue::Int(v)
    }
}

impl From<f64> for LegacyValue {
    fn from(v: f64) -> Self {
        LegacyValue::Float(v)
    }
}

/// Parse the body of one row (without the surrounding parentheses) into
/// typed scalars.
///
/// Single left-to-right scan: commas inside quotes do not split, a doubled
/// active quote is a literal quote, and the final field is always committed
/// even when empty. Quoted fields are always text.
pub fn parse_row_values(body: &str) -> Vec<LegacyValue> {
    let mut values = Vec::new();
    let mut buf = String::new();
    let mut in_string = false;
    let mut quoted = false;
    let mut quote = '\'';

    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_string {
            if ch == quote {
                if chars.peek() == Some(&quote) {
                    buf.push(quote);
                    chars.next();
                } else {
                    in_string = false;
                }
            } else {
                buf.push(ch);
            }
            continue;
        }

        match ch {
            '\'' | '"' => {
                in_string = true;
                quoted = true;
                quote = ch;
            }
            ',' => {
                values.push(commit(std::mem::take(&mut buf), quoted));
                quoted = false;
            }
            c if c.is_whitespace() => {}
            c => buf.push(c),
        }
    }
    values.push(commit(buf, quoted));

    values
}

fn commit(token: String, quoted: bool) -> LegacyValue {
    if quoted {
        LegacyValue::Text(token)
    } else {
        coerce(token)
    }
}

/// Coerce one bare token.
fn coerce(token: String) -> LegacyValue {
    if token == "NULL" || token == "null" {
        return LegacyValue::Null;
    }
    if token.is_empty() {
        return LegacyValue::Text(token);
    }
    if token.len() <= MAX_INT_DIGITS && token.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(v) = token.parse() {
            return LegacyValue::Int(v);
        }
    }
    if is_simple_decimal(&token) {
        if let Ok(v) = token.parse() {
            return LegacyValue::Float(v);
        }
    }
    LegacyValue::Text(token)
}

/// `-?digits.digits`
fn is_simple_decimal(token: &str) -> bool {
    let unsigned = token.strip_prefix('-').unwrap_or(token);
    let Some((int_part, frac_part)) = unsigned.split_once('.') else {
        return false;
    };
    !int_part.is_empty()
        && !frac_part.is_empty()
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_row() {
        let values = parse_row_values("1,'O''Brien',NULL,'',12.50");
        assert_eq!(
            values,
            vec![
                LegacyValue::Int(1),
                LegacyValue::Text("O'Brien".to_string()),
                LegacyValue::Null,
                LegacyValue::Text(String::new()),
                LegacyValue::Float(12.5),
            ]
        );
    }

    #[test]
    fn test_precision_guard() {
        assert_eq!(
            parse_row_values("9876543210"),
            vec![LegacyValue::Text("9876543210".to_string())]
        );
        assert_eq!(parse_row_values("123456"), vec![LegacyValue::Int(123456)]);
    }

    #[test]
    fn test_comma_inside_quotes_does_not_split() {
        let values = parse_row_values("'Sector 4, Rohini',\"a,b\"");
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].as_str(), Some("Sector 4, Rohini"));
        assert_eq!(values[1].as_str(), Some("a,b"));
    }

    #[test]
    fn test_other_quote_is_literal_inside_string() {
        let values = parse_row_values(r#""it's",'say "hi"'"#);
        assert_eq!(values[0].as_str(), Some("it's"));
        assert_eq!(values[1].as_str(), Some("say \"hi\""));
    }

    #[test]
    fn test_doubled_double_quote() {
        let values = parse_row_values(r#""a ""quoted"" word""#);
        assert_eq!(values[0].as_str(), Some("a \"quoted\" word"));
    }

    #[test]
    fn test_trailing_empty_field_committed() {
        let values = parse_row_values("1,");
        assert_eq!(values, vec![LegacyValue::Int(1), LegacyValue::Text(String::new())]);
    }

    #[test]
    fn test_whitespace_outside_quotes_ignored() {
        let values = parse_row_values("  7 , NULL ,  ' padded '");
        assert_eq!(values[0], LegacyValue::Int(7));
        assert!(values[1].is_null());
        assert_eq!(values[2].as_str(), Some(" padded "));
    }

    #[test]
    fn test_lowercase_null_and_negative_decimal() {
        let values = parse_row_values("null,-3.25,1.,abc");
        assert!(values[0].is_null());
        assert_eq!(values[1], LegacyValue::Float(-3.25));
        assert_eq!(values[2], LegacyValue::Text("1.".to_string()));
        assert_eq!(values[3], LegacyValue::Text("abc".to_string()));
    }

    #[test]
    fn test_quoted_tokens_stay_text() {
        let values = parse_row_values("1,'NULL','007',\"12.50\"");
        assert_eq!(
            values,
            vec![
                LegacyValue::Int(1),
                LegacyValue::Text("NULL".to_string()),
                LegacyValue::Text("007".to_string()),
                LegacyValue::Text("12.50".to_string()),
            ]
        );
        assert_eq!(values[2].as_i64(), Some(7));
        assert_eq!(values[3].as_f64(), Some(12.5));
    }

    #[test]
    fn test_lenient_accessors() {
        assert_eq!(LegacyValue::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(LegacyValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(LegacyValue::Int(5).as_f64(), Some(5.0));
        assert_eq!(LegacyValue::Null.to_text(), None);
        assert_eq!(LegacyValue::Int(9).to_text().as_deref(), Some("9"));
    }
}
