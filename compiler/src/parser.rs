use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    error::SchemaError,
    tokenizer::Token,
    types::{Definition, DefinitionKind, EnumValue, Field, Label, ProtoFile, Syntax},
    utils::{error, qualify, quote},
};

lazy_static! {
    static ref IDENTIFIER:       Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref TYPE_NAME:        Regex = Regex::new(r"^\.?[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap();
    static ref INTEGER:          Regex = Regex::new(r"^-?(0[xX][0-9A-Fa-f]+|\d+)$").unwrap();
    static ref STRING:           Regex = Regex::new(r#"^("|').*("|')$"#).unwrap();
    static ref EQUALS:           Regex = Regex::new(r"^=$").unwrap();
    static ref SEMICOLON:        Regex = Regex::new(r"^;$").unwrap();
    static ref COMMA:            Regex = Regex::new(r"^,$").unwrap();
    static ref LEFT_BRACE:       Regex = Regex::new(r"^\{$").unwrap();
    static ref RIGHT_BRACE:      Regex = Regex::new(r"^\}$").unwrap();
    static ref LEFT_BRACKET:     Regex = Regex::new(r"^\[$").unwrap();
    static ref RIGHT_BRACKET:    Regex = Regex::new(r"^\]$").unwrap();
    static ref LEFT_ANGLE:       Regex = Regex::new(r"^<$").unwrap();
    static ref RIGHT_ANGLE:      Regex = Regex::new(r"^>$").unwrap();
    static ref SYNTAX_KEYWORD:   Regex = Regex::new(r"^syntax$").unwrap();
    static ref PACKAGE_KEYWORD:  Regex = Regex::new(r"^package$").unwrap();
    static ref IMPORT_KEYWORD:   Regex = Regex::new(r"^import$").unwrap();
    static ref IMPORT_MODIFIER:  Regex = Regex::new(r"^(public|weak)$").unwrap();
    static ref OPTION_KEYWORD:   Regex = Regex::new(r"^option$").unwrap();
    static ref MESSAGE_KEYWORD:  Regex = Regex::new(r"^message$").unwrap();
    static ref ENUM_KEYWORD:     Regex = Regex::new(r"^enum$").unwrap();
    static ref ONEOF_KEYWORD:    Regex = Regex::new(r"^oneof$").unwrap();
    static ref MAP_KEYWORD:      Regex = Regex::new(r"^map$").unwrap();
    static ref GROUP_KEYWORD:    Regex = Regex::new(r"^group$").unwrap();
    static ref SKIPPED_BLOCK:    Regex = Regex::new(r"^(service|extend)$").unwrap();
    static ref SKIPPED_STMT:     Regex = Regex::new(r"^(reserved|extensions)$").unwrap();
    static ref LABEL:            Regex = Regex::new(r"^(optional|required|repeated)$").unwrap();
    static ref EOF:              Regex = Regex::new(r"^$").unwrap();
}

/// Parses the tokens of one `.proto` file.
pub fn parse_schema(tokens: &[Token]) -> Result<ProtoFile, SchemaError> {
    Parser::new(tokens).parse()
}

struct Parser<'a> {
    tokens:      &'a [Token],
    index:       usize,
    definitions: Vec<Definition>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Parser<'a> {
        Parser {
            tokens,
            index: 0,
            definitions: Vec::new(),
        }
    }

    fn current_token(&self) -> Result<&'a Token, SchemaError> {
        match self.tokens.get(self.index) {
            Some(token) => Ok(token),
            None => {
                let (line, column) = self
                    .tokens
                    .last()
                    .map(|token| (token.line, token.column))
                    .unwrap_or((1, 1));
                Err(error("Unexpected end of file", line, column))
            }
        }
    }

    fn peek_token(&self, ahead: usize) -> Option<&'a Token> {
        self.tokens.get(self.index + ahead)
    }

    fn eat(&mut self, test: &Regex) -> Result<bool, SchemaError> {
        if test.is_match(&self.current_token()?.text) {
            self.index += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, test: &Regex, expected: &str) -> Result<&'a Token, SchemaError> {
        let token = self.current_token()?;
        if !self.eat(test)? {
            return Err(error(
                &format!("Expected {} but found {}", expected, quote(&token.text)),
                token.line,
                token.column,
            ));
        }
        Ok(token)
    }

    fn unexpected_token(&self) -> SchemaError {
        match self.current_token() {
            Ok(token) if token.text.is_empty() => {
                error("Unexpected end of file", token.line, token.column)
            }
            Ok(token) => error(
                &format!("Unexpected token {}", quote(&token.text)),
                token.line,
                token.column,
            ),
            Err(err) => err,
        }
    }

    fn parse(mut self) -> Result<ProtoFile, SchemaError> {
        let mut syntax = Syntax::Proto2;
        let mut package = None;
        let mut imports = Vec::new();

        if self.eat(&SYNTAX_KEYWORD)? {
            self.expect(&EQUALS, "\"=\"")?;
            let token = self.expect(&STRING, "string")?;
            syntax = match unquote(&token.text) {
                "proto2" => Syntax::Proto2,
                "proto3" => Syntax::Proto3,
                other => {
                    return Err(error(
                        &format!("Unsupported syntax {}", quote(other)),
                        token.line,
                        token.column,
                    ))
                }
            };
            self.expect(&SEMICOLON, "\";\"")?;
        }

        while !self.eat(&EOF)? {
            if self.eat(&PACKAGE_KEYWORD)? {
                let token = self.expect(&TYPE_NAME, "package name")?;
                if package.is_some() {
                    return Err(error("Multiple package declarations", token.line, token.column));
                }
                package = Some(token.text.clone());
                self.expect(&SEMICOLON, "\";\"")?;
            } else if self.eat(&IMPORT_KEYWORD)? {
                self.eat(&IMPORT_MODIFIER)?;
                let token = self.expect(&STRING, "string")?;
                imports.push(unquote(&token.text).to_owned());
                self.expect(&SEMICOLON, "\";\"")?;
            } else if self.eat(&OPTION_KEYWORD)? {
                self.skip_statement()?;
            } else if self.eat(&SKIPPED_BLOCK)? {
                self.skip_block()?;
            } else if self.eat(&MESSAGE_KEYWORD)? {
                let scope = package.clone().unwrap_or_default();
                self.parse_message(&scope)?;
            } else if self.eat(&ENUM_KEYWORD)? {
                let scope = package.clone().unwrap_or_default();
                self.parse_enum(&scope)?;
            } else if !self.eat(&SEMICOLON)? {
                return Err(self.unexpected_token());
            }
        }

        Ok(ProtoFile {
            syntax,
            package,
            imports,
            definitions: self.definitions,
        })
    }

    /// Parses `Name { ... }` after the `message` keyword. The message is
    /// pushed before anything nested in it.
    fn parse_message(&mut self, scope: &str) -> Result<(), SchemaError> {
        let name_tok = self.expect(&IDENTIFIER, "identifier")?;
        let name = qualify(scope, &name_tok.text);
        self.expect(&LEFT_BRACE, "\"{\"")?;

        let slot = self.definitions.len();
        self.definitions.push(Definition {
            name:   name.clone(),
            line:   name_tok.line,
            column: name_tok.column,
            kind:   DefinitionKind::Message,
            fields: Vec::new(),
            values: Vec::new(),
        });

        let mut fields = Vec::new();
        while !self.eat(&RIGHT_BRACE)? {
            if self.eat(&MESSAGE_KEYWORD)? {
                self.parse_message(&name)?;
            } else if self.eat(&ENUM_KEYWORD)? {
                self.parse_enum(&name)?;
            } else if self.eat(&ONEOF_KEYWORD)? {
                self.parse_oneof(&mut fields)?;
            } else if self.eat(&OPTION_KEYWORD)? || self.eat(&SKIPPED_STMT)? {
                self.skip_statement()?;
            } else if self.eat(&SKIPPED_BLOCK)? {
                self.skip_block()?;
            } else if self.eat(&SEMICOLON)? {
                continue;
            } else if self.at_map_field()? {
                fields.push(self.parse_map_field(&name)?);
            } else {
                let label = self.parse_label()?;
                fields.push(self.parse_field(label, None)?);
            }
        }

        self.definitions[slot].fields = fields;
        Ok(())
    }

    fn parse_enum(&mut self, scope: &str) -> Result<(), SchemaError> {
        let name_tok = self.expect(&IDENTIFIER, "identifier")?;
        self.expect(&LEFT_BRACE, "\"{\"")?;

        let mut values = Vec::new();
        while !self.eat(&RIGHT_BRACE)? {
            if self.eat(&OPTION_KEYWORD)? || self.eat(&SKIPPED_STMT)? {
                self.skip_statement()?;
                continue;
            }
            if self.eat(&SEMICOLON)? {
                continue;
            }

            let value_tok = self.expect(&IDENTIFIER, "identifier")?;
            self.expect(&EQUALS, "\"=\"")?;
            let number_tok = self.expect(&INTEGER, "integer")?;
            let number = parse_integer(number_tok)?;
            let number = i32::try_from(number).map_err(|_| {
                error(
                    &format!("Enum value {} is out of range", quote(&number_tok.text)),
                    number_tok.line,
                    number_tok.column,
                )
            })?;
            self.parse_options()?;
            self.expect(&SEMICOLON, "\";\"")?;

            values.push(EnumValue {
                name:   value_tok.text.clone(),
                line:   value_tok.line,
                column: value_tok.column,
                number,
            });
        }

        self.definitions.push(Definition {
            name:   qualify(scope, &name_tok.text),
            line:   name_tok.line,
            column: name_tok.column,
            kind:   DefinitionKind::Enum,
            fields: Vec::new(),
            values,
        });
        Ok(())
    }

    /// Members of a oneof are ordinary fields of the enclosing message.
    fn parse_oneof(&mut self, fields: &mut Vec<Field>) -> Result<(), SchemaError> {
        let name_tok = self.expect(&IDENTIFIER, "identifier")?;
        self.expect(&LEFT_BRACE, "\"{\"")?;

        while !self.eat(&RIGHT_BRACE)? {
            if self.eat(&OPTION_KEYWORD)? {
                self.skip_statement()?;
            } else if !self.eat(&SEMICOLON)? {
                fields.push(self.parse_field(Label::Implicit, Some(&name_tok.text))?);
            }
        }
        Ok(())
    }

    fn parse_label(&mut self) -> Result<Label, SchemaError> {
        let token = self.current_token()?;
        if !self.eat(&LABEL)? {
            return Ok(Label::Implicit);
        }
        Ok(match token.text.as_str() {
            "optional" => Label::Optional,
            "required" => Label::Required,
            _ => Label::Repeated,
        })
    }

    fn parse_field(&mut self, label: Label, oneof: Option<&str>) -> Result<Field, SchemaError> {
        let type_tok = self.current_token()?;
        if self.eat(&GROUP_KEYWORD)? {
            return Err(error("Groups are not supported", type_tok.line, type_tok.column));
        }
        self.expect(&TYPE_NAME, "type name")?;

        let name_tok = self.expect(&IDENTIFIER, "identifier")?;
        self.expect(&EQUALS, "\"=\"")?;
        let number_tok = self.expect(&INTEGER, "integer")?;
        let number = parse_integer(number_tok)?;
        let packed = self.parse_options()?;
        self.expect(&SEMICOLON, "\";\"")?;

        Ok(Field {
            name: name_tok.text.clone(),
            line: name_tok.line,
            column: name_tok.column,
            label,
            type_: type_tok.text.clone(),
            number,
            packed,
            oneof: oneof.map(str::to_owned),
        })
    }

    fn at_map_field(&self) -> Result<bool, SchemaError> {
        Ok(MAP_KEYWORD.is_match(&self.current_token()?.text)
            && self
                .peek_token(1)
                .map_or(false, |token| LEFT_ANGLE.is_match(&token.text)))
    }

    /// `map<K, V> name = N;` becomes `repeated NameEntry name = N;` plus a
    /// nested `NameEntry { K key = 1; V value = 2; }`.
    fn parse_map_field(&mut self, scope: &str) -> Result<Field, SchemaError> {
        self.expect(&MAP_KEYWORD, "\"map\"")?;
        self.expect(&LEFT_ANGLE, "\"<\"")?;
        let key_tok = self.expect(&TYPE_NAME, "type name")?;
        self.expect(&COMMA, "\",\"")?;
        let value_tok = self.expect(&TYPE_NAME, "type name")?;
        self.expect(&RIGHT_ANGLE, "\">\"")?;

        let name_tok = self.expect(&IDENTIFIER, "identifier")?;
        self.expect(&EQUALS, "\"=\"")?;
        let number_tok = self.expect(&INTEGER, "integer")?;
        let number = parse_integer(number_tok)?;
        self.parse_options()?;
        self.expect(&SEMICOLON, "\";\"")?;

        let entry_name = format!("{}Entry", camel_case(&name_tok.text));
        let entry_field = |name: &str, type_tok: &Token, number| Field {
            name: name.to_owned(),
            line: type_tok.line,
            column: type_tok.column,
            label: Label::Implicit,
            type_: type_tok.text.clone(),
            number,
            packed: None,
            oneof: None,
        };
        self.definitions.push(Definition {
            name:   qualify(scope, &entry_name),
            line:   name_tok.line,
            column: name_tok.column,
            kind:   DefinitionKind::Message,
            fields: vec![entry_field("key", key_tok, 1), entry_field("value", value_tok, 2)],
            values: Vec::new(),
        });

        Ok(Field {
            name: name_tok.text.clone(),
            line: name_tok.line,
            column: name_tok.column,
            label: Label::Repeated,
            type_: entry_name,
            number,
            packed: None,
            oneof: None,
        })
    }

    /// Parses an optional `[name = constant, ...]` list and returns the value
    /// of `packed` if present.
    fn parse_options(&mut self) -> Result<Option<bool>, SchemaError> {
        if !self.eat(&LEFT_BRACKET)? {
            return Ok(None);
        }

        let mut packed = None;
        loop {
            let mut name = String::new();
            while !self.eat(&EQUALS)? {
                let token = self.current_token()?;
                if token.text.is_empty() || RIGHT_BRACKET.is_match(&token.text) {
                    return Err(self.unexpected_token());
                }
                name.push_str(&token.text);
                self.index += 1;
            }

            let value_tok = self.current_token()?;
            if self.eat(&LEFT_BRACE)? {
                self.skip_braces()?;
            } else if value_tok.text.is_empty() {
                return Err(self.unexpected_token());
            } else {
                self.index += 1;
                // Signed constants such as `-inf` arrive as two tokens.
                if value_tok.text == "-" || value_tok.text == "+" {
                    self.index += 1;
                }
            }

            if name == "packed" {
                packed = match value_tok.text.as_str() {
                    "true" => Some(true),
                    "false" => Some(false),
                    _ => {
                        return Err(error(
                            &format!("Expected true or false but found {}", quote(&value_tok.text)),
                            value_tok.line,
                            value_tok.column,
                        ))
                    }
                };
            }

            if self.eat(&RIGHT_BRACKET)? {
                return Ok(packed);
            }
            self.expect(&COMMA, "\",\"")?;
        }
    }

    /// Skips tokens up to and including the next top-level `;`.
    fn skip_statement(&mut self) -> Result<(), SchemaError> {
        loop {
            if self.eat(&SEMICOLON)? {
                return Ok(());
            }
            if self.eat(&LEFT_BRACE)? {
                self.skip_braces()?;
                continue;
            }
            if self.current_token()?.text.is_empty() {
                return Err(self.unexpected_token());
            }
            self.index += 1;
        }
    }

    /// Skips `Name { ... }` of a `service` or `extend` block.
    fn skip_block(&mut self) -> Result<(), SchemaError> {
        self.expect(&TYPE_NAME, "identifier")?;
        self.expect(&LEFT_BRACE, "\"{\"")?;
        self.skip_braces()
    }

    /// Skips to the `}` matching an already consumed `{`.
    fn skip_braces(&mut self) -> Result<(), SchemaError> {
        let mut depth = 1;
        while depth > 0 {
            if self.eat(&LEFT_BRACE)? {
                depth += 1;
            } else if self.eat(&RIGHT_BRACE)? {
                depth -= 1;
            } else if self.current_token()?.text.is_empty() {
                return Err(self.unexpected_token());
            } else {
                self.index += 1;
            }
        }
        Ok(())
    }
}

fn unquote(text: &str) -> &str {
    if text.len() >= 2 {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// Decimal, hexadecimal (`0x`) and octal (leading `0`) integer literals.
fn parse_integer(token: &Token) -> Result<i64, SchemaError> {
    let (negative, digits) = match token.text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.text.as_str()),
    };

    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse::<i64>()
    };

    match parsed {
        Ok(value) if negative => Ok(-value),
        Ok(value) => Ok(value),
        Err(_) => Err(error(
            &format!("Invalid integer {}", quote(&token.text)),
            token.line,
            token.column,
        )),
    }
}

/// `phone_numbers` becomes `PhoneNumbers`.
fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
