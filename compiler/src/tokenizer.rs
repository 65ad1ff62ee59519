use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    error::SchemaError,
    utils::{error, quote},
};

lazy_static! {
    pub static ref TOKEN_REGEX: Regex = Regex::new(concat!(
        r"(",
        r"//[^\n]*",
        r"|/\*(?s:.*?)\*/",
        r#"|"(?:[^"\\\n]|\\.)*""#,
        r"|'(?:[^'\\\n]|\\.)*'",
        r"|-?(?:0[xX][0-9A-Fa-f]+|\d+\.\d*(?:[eE][-+]?\d+)?|\.\d+(?:[eE][-+]?\d+)?|\d+(?:[eE][-+]?\d+)?)",
        r"|\.?[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*",
        r"|[-+=;:{}\[\]<>,()]",
        r"|\s+",
        r")"
    ))
    .unwrap();
    pub static ref WHITESPACE_RX: Regex = Regex::new(r"^(?s:\s+|//.*|/\*.*)$").unwrap();
}

#[derive(Debug, PartialEq)]
pub struct Token {
    pub text:   String,
    pub line:   usize,
    pub column: usize,
}

/// Splits `.proto` text into tokens, dropping whitespace and comments. The
/// last token is always an empty end-of-file marker.
pub fn tokenize_schema(text: &str) -> Result<Vec<Token>, SchemaError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut column = 1;
    let mut last_end = 0;

    for mat in TOKEN_REGEX.find_iter(text) {
        let start = mat.start();
        let end = mat.end();
        let part = mat.as_str();

        if start > last_end {
            let unexpected = &text[last_end..start];
            return Err(error(
                &format!("Syntax error: {}", quote(unexpected)),
                line,
                column,
            ));
        }

        if !WHITESPACE_RX.is_match(part) {
            tokens.push(Token {
                text: part.to_string(),
                line,
                column,
            });
        }

        let newline_count = part.matches('\n').count();
        if newline_count > 0 {
            line += newline_count;
            if let Some(last_line_part) = part.split('\n').last() {
                column = last_line_part.chars().count() + 1;
            }
        } else {
            column += part.chars().count();
        }

        last_end = end;
    }

    if last_end != text.len() {
        let unexpected = &text[last_end..];
        return Err(error(
            &format!("Syntax error: {}", quote(unexpected)),
            line,
            column,
        ));
    }

    tokens.push(Token {
        text: "".to_string(),
        line,
        column,
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<String> {
        tokenize_schema(input)
            .unwrap()
            .into_iter()
            .map(|token| token.text)
            .collect()
    }

    #[test]
    fn test_tokenize_field() {
        let input = "int32 x = 10;";
        let expected = vec![
            Token { text: "int32".into(), line: 1, column: 1 },
            Token { text: "x".into(),     line: 1, column: 7 },
            Token { text: "=".into(),     line: 1, column: 9 },
            Token { text: "10".into(),    line: 1, column: 11 },
            Token { text: ";".into(),     line: 1, column: 13 },
            Token { text: "".into(),      line: 1, column: 14 },
        ];
        assert_eq!(tokenize_schema(input).unwrap(), expected);
    }

    #[test]
    fn test_tokenize_comments_and_lines() {
        let input = "// header\nmessage /* inline\n block */ A {}";
        let tokens = tokenize_schema(input).unwrap();
        assert_eq!(tokens[0], Token { text: "message".into(), line: 2, column: 1 });
        assert_eq!(tokens[1], Token { text: "A".into(), line: 3, column: 11 });
    }

    #[test]
    fn test_tokenize_proto_punctuation() {
        assert_eq!(
            texts("map<string, .pkg.Item> m = 0x1F [packed=true];"),
            vec!["map", "<", "string", ",", ".pkg.Item", ">", "m", "=", "0x1F", "[", "packed", "=", "true", "]", ";", ""]
        );
    }

    #[test]
    fn test_tokenize_strings_and_numbers() {
        assert_eq!(
            texts(r#"syntax = "proto3"; option x = 'a\'b'; default = -1.5e3"#),
            vec!["syntax", "=", "\"proto3\"", ";", "option", "x", "=", "'a\\'b'", ";", "default", "=", "-1.5e3", ""]
        );
    }

    #[test]
    fn test_tokenize_unexpected_text() {
        let err = tokenize_schema("int32 x = 10 @").unwrap_err();
        assert!(
            matches!(err, SchemaError::ParseError { line: 1, column: 14, .. }),
            "expected a ParseError but got {:?}",
            err
        );
    }

    #[test]
    fn test_tokenize_unterminated_comment() {
        assert!(matches!(
            tokenize_schema("message A {} /* open"),
            Err(SchemaError::ParseError { .. })
        ));
    }
}
