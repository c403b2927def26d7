//! Inlines bound `Value`s into SQL text before sending a `COM_QUERY`. MySQL's
//! text protocol has no wire-level placeholder; like the Python reference's
//! driver, parameter substitution happens client-side before the statement
//! is sent.

use common::value::Value;

pub fn render(sql: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut values = values.iter();
    for ch in sql.chars() {
        if ch == '?' {
            if let Some(v) = values.next() {
                out.push_str(&literal(v));
                continue;
            }
        }
        out.push(ch);
    }
    out
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => format!("'{}'", escape(s)),
        Value::Bytes(b) => format!("0x{}", hex::encode(b)),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_placeholders_in_order() {
        let sql = "INSERT INTO t (a, b) VALUES (?, ?)";
        let rendered = render(sql, &[Value::Int(1), Value::Text("Ada".into())]);
        assert_eq!(rendered, "INSERT INTO t (a, b) VALUES (1, 'Ada')");
    }

    #[test]
    fn escapes_quotes_and_backslashes() {
        let rendered = render("SELECT ?", &[Value::Text("O'Brien\\".into())]);
        assert_eq!(rendered, r"SELECT 'O\'Brien\\'");
    }

    #[test]
    fn null_renders_as_sql_null() {
        assert_eq!(render("SELECT ?", &[Value::Null]), "SELECT NULL");
    }
}
