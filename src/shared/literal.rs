//! Narrow deserializer for the textual result form produced by SQL toolkits.
//!
//! Executors that stringify their rows emit either JSON or a Python-literal rendering such as
//! `[(1, 'north', Decimal('12.50'), datetime.date(2024, 3, 1))]`. This module accepts exactly
//! that grammar and maps it onto `serde_json::Value`. Nothing is ever evaluated: unknown
//! identifiers, calls or trailing input are parse errors.
//!
//! Mapping:
//! - lists and tuples become arrays (`(x)` without a comma is just `x`)
//! - dicts become objects, non-string keys are stringified
//! - `None`/`null` → null, `True`/`False`/`true`/`false` → bool
//! - `Decimal('..')` → number when representable, string otherwise
//! - `datetime.date(y, m, d)` → `"YYYY-MM-DD"`, `datetime.datetime(..)` → ISO-8601 without zone
//! - `UUID('..')` → string

use crate::domain::error::{AppError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Number, Value};

const MAX_DEPTH: usize = 64;

pub fn parse_literal(text: &str) -> Result<Value> {
    let mut parser = LiteralParser::new(text);
    parser.skip_whitespace();
    if parser.eof() {
        return Err(parser.error("empty input"));
    }
    let value = parser.parse_value(0)?;
    parser.skip_whitespace();
    if !parser.eof() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

struct LiteralParser {
    chars: Vec<char>,
    position: usize,
}

impl LiteralParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            position: 0,
        }
    }

    fn eof(&self) -> bool {
        self.position >= self.chars.len()
    }

    fn current(&self) -> char {
        self.chars.get(self.position).copied().unwrap_or('\0')
    }

    fn next(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() && self.current().is_whitespace() {
            self.next();
        }
    }

    fn error(&self, message: &str) -> AppError {
        AppError::ParseError(format!("{} at position {}", message, self.position))
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        if self.current() == expected {
            self.next();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(self.error("literal nested too deeply"));
        }
        self.skip_whitespace();
        match self.current() {
            '[' => self.parse_sequence(']', depth).map(|(items, _)| Value::Array(items)),
            '(' => {
                let (mut items, had_comma) = self.parse_sequence(')', depth)?;
                if items.len() == 1 && !had_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Value::Array(items))
                }
            }
            '{' => self.parse_dict(depth),
            '\'' | '"' => self.parse_string().map(Value::String),
            c if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.parse_number(),
            c if c.is_alphabetic() || c == '_' => self.parse_identifier_value(depth),
            '\0' => Err(self.error("unexpected end of input")),
            other => Err(self.error(&format!("unexpected character '{}'", other))),
        }
    }

    /// Parses `open item, item, ... close`. Returns the items and whether any comma was seen.
    fn parse_sequence(&mut self, close: char, depth: usize) -> Result<(Vec<Value>, bool)> {
        self.next();
        let mut items = Vec::new();
        let mut had_comma = false;
        loop {
            self.skip_whitespace();
            if self.current() == close {
                self.next();
                return Ok((items, had_comma));
            }
            items.push(self.parse_value(depth + 1)?);
            self.skip_whitespace();
            match self.current() {
                ',' => {
                    had_comma = true;
                    self.next();
                }
                c if c == close => {
                    self.next();
                    return Ok((items, had_comma));
                }
                _ => return Err(self.error(&format!("expected ',' or '{}'", close))),
            }
        }
    }

    fn parse_dict(&mut self, depth: usize) -> Result<Value> {
        self.next();
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            if self.current() == '}' {
                self.next();
                return Ok(Value::Object(map));
            }
            let key = match self.parse_value(depth + 1)? {
                Value::String(s) => s,
                Value::Null => "None".to_string(),
                other => other.to_string(),
            };
            self.expect(':')?;
            let value = self.parse_value(depth + 1)?;
            map.insert(key, value);
            self.skip_whitespace();
            match self.current() {
                ',' => self.next(),
                '}' => {
                    self.next();
                    return Ok(Value::Object(map));
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        let quote = self.current();
        self.next();
        let mut out = String::new();
        loop {
            if self.eof() {
                return Err(self.error("unterminated string"));
            }
            let c = self.current();
            self.next();
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let escaped = self.current();
            self.next();
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' | '\'' | '"' | '/' => out.push(escaped),
                'u' => out.push(self.parse_unicode_escape()?),
                '\0' => return Err(self.error("unterminated escape")),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn parse_unicode_escape(&mut self) -> Result<char> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .current()
                .to_digit(16)
                .ok_or_else(|| self.error("invalid unicode escape"))?;
            code = code * 16 + digit;
            self.next();
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid unicode code point"))
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.position;
        if matches!(self.current(), '-' | '+') {
            self.next();
        }
        while !self.eof()
            && (self.current().is_ascii_digit()
                || matches!(self.current(), '.' | 'e' | 'E' | '_')
                || (matches!(self.current(), '-' | '+')
                    && matches!(self.chars[self.position - 1], 'e' | 'E')))
        {
            self.next();
        }
        let raw: String = self.chars[start..self.position]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        number_from_str(&raw).ok_or_else(|| self.error(&format!("invalid number '{}'", raw)))
    }

    fn parse_identifier(&mut self) -> String {
        let start = self.position;
        while !self.eof()
            && (self.current().is_alphanumeric() || self.current() == '_' || self.current() == '.')
        {
            self.next();
        }
        self.chars[start..self.position].iter().collect()
    }

    fn parse_identifier_value(&mut self, depth: usize) -> Result<Value> {
        let ident = self.parse_identifier();
        match ident.as_str() {
            "None" | "null" => return Ok(Value::Null),
            "True" | "true" => return Ok(Value::Bool(true)),
            "False" | "false" => return Ok(Value::Bool(false)),
            _ => {}
        }

        self.skip_whitespace();
        if self.current() != '(' {
            return Err(self.error(&format!("unknown identifier '{}'", ident)));
        }
        let (args, _) = self.parse_sequence(')', depth)?;
        match ident.as_str() {
            "Decimal" | "decimal.Decimal" => decimal_value(&args)
                .ok_or_else(|| self.error("Decimal expects a single string or number")),
            "UUID" | "uuid.UUID" => match args.as_slice() {
                [Value::String(s)] => Ok(Value::String(s.clone())),
                _ => Err(self.error("UUID expects a single string")),
            },
            "datetime.date" | "date" => {
                date_value(&args).ok_or_else(|| self.error("invalid date literal"))
            }
            "datetime.datetime" | "datetime" => {
                datetime_value(&args).ok_or_else(|| self.error("invalid datetime literal"))
            }
            other => Err(self.error(&format!("unsupported constructor '{}'", other))),
        }
    }
}

fn number_from_str(raw: &str) -> Option<Value> {
    let trimmed = raw.strip_prefix('+').unwrap_or(raw);
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    if let Ok(u) = trimmed.parse::<u64>() {
        return Some(Value::Number(u.into()));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn decimal_value(args: &[Value]) -> Option<Value> {
    match args {
        [Value::String(s)] => Some(number_from_str(s.trim()).unwrap_or_else(|| Value::String(s.clone()))),
        [Value::Number(n)] => Some(Value::Number(n.clone())),
        _ => None,
    }
}

fn int_args(args: &[Value]) -> Option<Vec<i64>> {
    args.iter().map(Value::as_i64).collect()
}

fn date_value(args: &[Value]) -> Option<Value> {
    let parts = int_args(args)?;
    let [year, month, day] = parts.as_slice() else {
        return None;
    };
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(*year).ok()?,
        u32::try_from(*month).ok()?,
        u32::try_from(*day).ok()?,
    )?;
    Some(Value::String(date.format("%Y-%m-%d").to_string()))
}

fn datetime_value(args: &[Value]) -> Option<Value> {
    let parts = int_args(args)?;
    if parts.len() < 3 || parts.len() > 7 {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(parts[0]).ok()?,
        u32::try_from(parts[1]).ok()?,
        u32::try_from(parts[2]).ok()?,
    )?;
    let field = |idx: usize| u32::try_from(parts.get(idx).copied().unwrap_or(0)).ok();
    let micros = field(6)?;
    let time = NaiveTime::from_hms_micro_opt(field(3)?, field(4)?, field(5)?, micros)?;
    let datetime = NaiveDateTime::new(date, time);
    let rendered = if micros == 0 {
        datetime.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        datetime.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    };
    Some(Value::String(rendered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_json_rows() {
        let value = parse_literal(r#"[{"region": "north", "total": 12.5, "open": true}]"#).unwrap();
        assert_eq!(value, json!([{"region": "north", "total": 12.5, "open": true}]));
    }

    #[test]
    fn test_parses_python_tuple_rows() {
        let value = parse_literal("[(1, 'north', None), (2, 'south', True)]").unwrap();
        assert_eq!(value, json!([[1, "north", null], [2, "south", true]]));
    }

    #[test]
    fn test_parses_decimal_and_dates() {
        let value = parse_literal(
            "[(Decimal('12.50'), datetime.date(2024, 3, 1), datetime.datetime(2024, 3, 1, 14, 5))]",
        )
        .unwrap();
        assert_eq!(value, json!([[12.5, "2024-03-01", "2024-03-01T14:05:00"]]));
    }

    #[test]
    fn test_single_element_tuple_needs_trailing_comma() {
        assert_eq!(parse_literal("(42,)").unwrap(), json!([42]));
        assert_eq!(parse_literal("(42)").unwrap(), json!(42));
    }

    #[test]
    fn test_dict_with_single_quoted_and_numeric_keys() {
        let value = parse_literal("{'count': 3, 7: 'seven'}").unwrap();
        assert_eq!(value, json!({"count": 3, "7": "seven"}));
    }

    #[test]
    fn test_escapes_inside_strings() {
        let value = parse_literal(r#"['it\'s', "line\nbreak"]"#).unwrap();
        assert_eq!(value, json!(["it's", "line\nbreak"]));
    }

    #[test]
    fn test_rejects_code_and_prose() {
        assert!(parse_literal("__import__('os').system('ls')").is_err());
        assert!(parse_literal("The query returned three rows").is_err());
        assert!(parse_literal("[1, 2").is_err());
        assert!(parse_literal("[1, 2] extra").is_err());
        assert!(parse_literal("").is_err());
    }

    #[test]
    fn test_rejects_invalid_dates() {
        assert!(parse_literal("datetime.date(2024, 13, 1)").is_err());
    }

    #[test]
    fn test_rejects_out_of_range_date_parts() {
        // 4294969320 wraps to 2024 and 4294967299 to 3 under a plain cast
        assert!(parse_literal("datetime.date(4294969320, 3, 1)").is_err());
        assert!(parse_literal("datetime.date(2024, 4294967299, 1)").is_err());
        assert!(parse_literal("datetime.datetime(4294969320, 3, 1, 14, 5)").is_err());
        assert!(parse_literal("datetime.datetime(2024, 3, 1, -1, 5)").is_err());
    }
}
