//! Parser for plain-text `.sdl` descriptor sources.
//!
//! Grammar subset:
//! `STATEDESC <name> { VERSION <n> VAR <TYPE|$Desc> <name>[<size>]
//! DEFAULT=<lit> DEFAULTOPTION=<tag> DISPLAYOPTION=<tag> ... }` with `#`
//! starting a comment. Encrypted sources are refused.

use std::path::Path;

use thiserror::Error;

use crate::sdl::descriptor::{DescriptorDb, StateDescriptor, VarDescriptor, VarType};

/// The three known 12-byte encryption magics. Files starting with one of
/// these have not been decrypted and cannot be parsed.
pub const ENCRYPTION_MAGICS: [&[u8; 12]; 3] = [b"whatdoyousee", b"notthedroids", b"BriceIsSmart"];

#[derive(Debug, Error)]
pub enum SdlError {
    #[error("I/O error reading {0}: {1}")]
    Io(String, std::io::Error),

    #[error("{0} is encrypted; decrypt SDL sources before starting the server")]
    Encrypted(String),

    #[error("parse error at line {0}: {1}")]
    Parse(usize, String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    TypeName(String),
    Number(String),
    Quoted(String),
    Punct(char),
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, SdlError> {
    let mut tokens = Vec::new();
    for (lineno, line) in source.lines().enumerate() {
        let lineno = lineno + 1;
        let line = line.split('#').next().unwrap_or("");
        let mut chars = line.char_indices().peekable();
        while let Some((start, ch)) = chars.next() {
            match ch {
                ' ' | '\t' | '\r' => {}
                '0'..='9' | '-' => {
                    let mut end = start + ch.len_utf8();
                    while let Some(&(idx, next)) = chars.peek() {
                        if next.is_ascii_digit() || next == '.' {
                            end = idx + next.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    tokens.push((lineno, Token::Number(line[start..end].to_string())));
                }
                'A'..='Z' | 'a'..='z' | '_' => {
                    let mut end = start + ch.len_utf8();
                    while let Some(&(idx, next)) = chars.peek() {
                        if next.is_ascii_alphanumeric() || next == '_' {
                            end = idx + next.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    tokens.push((lineno, Token::Ident(line[start..end].to_string())));
                }
                '$' => {
                    let mut end = start + 1;
                    while let Some(&(idx, next)) = chars.peek() {
                        if next.is_ascii_alphanumeric() || next == '_' {
                            end = idx + next.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    tokens.push((lineno, Token::TypeName(line[start + 1..end].to_string())));
                }
                '"' => {
                    let rest = &line[start + 1..];
                    let close = rest.find('"').ok_or_else(|| {
                        SdlError::Parse(lineno, "unterminated string constant".to_string())
                    })?;
                    tokens.push((lineno, Token::Quoted(rest[..close].to_string())));
                    for _ in 0..=close {
                        chars.next();
                    }
                }
                '(' | ')' | '[' | ']' | '{' | '}' | '=' | ',' | ';' => {
                    tokens.push((lineno, Token::Punct(ch)));
                }
                other => {
                    return Err(SdlError::Parse(
                        lineno,
                        format!("unexpected character '{other}'"),
                    ));
                }
            }
        }
    }
    Ok(tokens)
}

struct TokenStream {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl TokenStream {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn lineno(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map_or(0, |(line, _)| *line)
    }

    fn expect_punct(&mut self, punct: char) -> Result<(), SdlError> {
        match self.next() {
            Some((_, Token::Punct(found))) if found == punct => Ok(()),
            Some((line, other)) => Err(SdlError::Parse(
                line,
                format!("expected '{punct}', found {other:?}"),
            )),
            None => Err(SdlError::Parse(0, format!("expected '{punct}' at EOF"))),
        }
    }

    fn expect_ident(&mut self) -> Result<(usize, String), SdlError> {
        match self.next() {
            Some((line, Token::Ident(value))) => Ok((line, value)),
            Some((line, other)) => Err(SdlError::Parse(
                line,
                format!("expected identifier, found {other:?}"),
            )),
            None => Err(SdlError::Parse(0, "expected identifier at EOF".to_string())),
        }
    }
}

/// Parse the full text of one `.sdl` source into descriptors.
pub fn parse_source(source: &str) -> Result<Vec<StateDescriptor>, SdlError> {
    let mut stream = TokenStream {
        tokens: tokenize(source)?,
        pos: 0,
    };
    let mut descriptors = Vec::new();

    while let Some((line, token)) = stream.next() {
        match token {
            Token::Ident(word) if word == "STATEDESC" => {
                descriptors.push(parse_statedesc(&mut stream)?);
            }
            other => {
                return Err(SdlError::Parse(
                    line,
                    format!("expected STATEDESC, found {other:?}"),
                ));
            }
        }
    }
    Ok(descriptors)
}

fn parse_statedesc(stream: &mut TokenStream) -> Result<StateDescriptor, SdlError> {
    let (_, name) = stream.expect_ident()?;
    stream.expect_punct('{')?;

    let mut version = None;
    let mut vars = Vec::new();

    loop {
        match stream.next() {
            Some((_, Token::Punct('}'))) => break,
            Some((line, Token::Ident(word))) if word == "VERSION" => match stream.next() {
                Some((_, Token::Number(value))) => {
                    version = Some(value.parse::<u16>().map_err(|_| {
                        SdlError::Parse(line, format!("bad version number {value}"))
                    })?);
                }
                _ => return Err(SdlError::Parse(line, "expected version number".to_string())),
            },
            Some((line, Token::Ident(word))) if word == "VAR" => {
                vars.push(parse_var(stream, line)?);
            }
            Some((line, other)) => {
                return Err(SdlError::Parse(
                    line,
                    format!("unexpected token in STATEDESC: {other:?}"),
                ));
            }
            None => {
                return Err(SdlError::Parse(0, "unterminated STATEDESC block".to_string()));
            }
        }
    }

    let version =
        version.ok_or_else(|| SdlError::Parse(stream.lineno(), "missing VERSION".to_string()))?;
    Ok(StateDescriptor {
        name,
        version,
        vars,
    })
}

fn parse_var(stream: &mut TokenStream, line: usize) -> Result<VarDescriptor, SdlError> {
    let (var_type, type_name) = match stream.next() {
        Some((_, Token::TypeName(name))) => (VarType::StateDesc, name),
        Some((line, Token::Ident(token))) => match VarType::from_token(&token) {
            Some(var_type) => (var_type, String::new()),
            None => {
                return Err(SdlError::Parse(line, format!("unknown VAR type {token}")));
            }
        },
        other => {
            return Err(SdlError::Parse(
                line,
                format!("expected VAR type, found {other:?}"),
            ));
        }
    };

    let (_, name) = stream.expect_ident()?;
    stream.expect_punct('[')?;
    // Empty brackets declare a variable-length array.
    let size = if let Some((_, Token::Number(_))) = stream.peek() {
        match stream.next() {
            Some((line, Token::Number(value))) => value
                .parse::<usize>()
                .map_err(|_| SdlError::Parse(line, format!("bad array size {value}")))?,
            _ => 0,
        }
    } else {
        0
    };
    stream.expect_punct(']')?;

    let mut var = VarDescriptor {
        var_type,
        type_name,
        name,
        size,
        default: None,
        default_option: String::new(),
        display_option: String::new(),
    };

    // Optional KEY=value attributes follow until the next VAR/VERSION/brace.
    while let Some((_, Token::Ident(word))) = stream.peek() {
        let keyword = word.clone();
        if keyword != "DEFAULT" && keyword != "DEFAULTOPTION" && keyword != "DISPLAYOPTION" {
            break;
        }
        stream.next();
        stream.expect_punct('=')?;
        let value = parse_attribute_value(stream)?;
        match keyword.as_str() {
            "DEFAULT" => var.default = Some(value),
            "DEFAULTOPTION" => var.default_option = value,
            _ => var.display_option = value,
        }
    }

    Ok(var)
}

fn parse_attribute_value(stream: &mut TokenStream) -> Result<String, SdlError> {
    match stream.next() {
        Some((_, Token::Number(value))) | Some((_, Token::Quoted(value)))
        | Some((_, Token::Ident(value))) => Ok(value),
        // Tuple default, e.g. DEFAULT=(0,0,0)
        Some((line, Token::Punct('('))) => {
            let mut parts = Vec::new();
            loop {
                match stream.next() {
                    Some((_, Token::Number(value))) => parts.push(value),
                    Some((_, Token::Punct(','))) => {}
                    Some((_, Token::Punct(')'))) => break,
                    other => {
                        return Err(SdlError::Parse(
                            line,
                            format!("bad tuple default: {other:?}"),
                        ));
                    }
                }
            }
            Ok(parts.join(","))
        }
        other => Err(SdlError::Parse(
            0,
            format!("expected attribute value, found {other:?}"),
        )),
    }
}

/// Load every `.sdl` file in a directory into the database. Encrypted files
/// abort the load.
pub fn load_descriptors(db: &mut DescriptorDb, sdl_path: &Path) -> Result<(), SdlError> {
    let entries = std::fs::read_dir(sdl_path)
        .map_err(|e| SdlError::Io(sdl_path.display().to_string(), e))?;

    let mut count = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "sdl") {
            continue;
        }
        let contents =
            std::fs::read(&path).map_err(|e| SdlError::Io(path.display().to_string(), e))?;
        if ENCRYPTION_MAGICS
            .iter()
            .any(|magic| contents.starts_with(*magic))
        {
            return Err(SdlError::Encrypted(path.display().to_string()));
        }
        let source = String::from_utf8_lossy(&contents);
        for descriptor in parse_source(&source)? {
            db.insert(descriptor);
            count += 1;
        }
    }

    if count == 0 {
        tracing::warn!(path = %sdl_path.display(), "No SDL descriptors found");
    } else {
        tracing::info!(count, "Loaded SDL descriptors");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
# A clock with nested state
STATEDESC clock {
    VERSION 2
    VAR INT     hours[1]   DEFAULT=12
    VAR FLOAT   drift[3]   DEFAULT=0.5
    VAR $gears  works[1]
    VAR BOOL    running[]  DEFAULT=true DEFAULTOPTION=VAULT
}

STATEDESC gears {
    VERSION 1
    VAR SHORT   teeth[2]   DEFAULT=24
}
"#;

    #[test]
    fn parses_descriptors_and_vars() {
        let descriptors = parse_source(SOURCE).unwrap();
        assert_eq!(descriptors.len(), 2);

        let clock = &descriptors[0];
        assert_eq!(clock.name, "clock");
        assert_eq!(clock.version, 2);
        assert_eq!(clock.vars.len(), 4);
        assert_eq!(clock.vars[0].var_type, VarType::Int);
        assert_eq!(clock.vars[0].default.as_deref(), Some("12"));
        assert_eq!(clock.vars[1].size, 3);
        assert_eq!(clock.vars[2].var_type, VarType::StateDesc);
        assert_eq!(clock.vars[2].type_name, "gears");
        assert_eq!(clock.vars[3].size, 0);
        assert_eq!(clock.vars[3].default_option, "VAULT");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_source("VERSION 1").is_err());
        assert!(parse_source("STATEDESC x { VAR WHATEVER y[1] }").is_err());
        assert!(parse_source("STATEDESC x { VERSION 1").is_err());
    }

    #[test]
    fn tuple_defaults_flatten() {
        let source = "STATEDESC p { VERSION 1 VAR POINT3 origin[1] DEFAULT=(0,0,1.5) }";
        let descriptors = parse_source(source).unwrap();
        assert_eq!(descriptors[0].vars[0].default.as_deref(), Some("0,0,1.5"));
    }

    #[test]
    fn load_rejects_encrypted_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.sdl");
        std::fs::write(&path, b"whatdoyousee\x01\x02").unwrap();
        let mut db = DescriptorDb::new();
        let err = load_descriptors(&mut db, dir.path()).unwrap_err();
        assert!(matches!(err, SdlError::Encrypted(_)));
    }

    #[test]
    fn load_reads_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clock.sdl"), SOURCE).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let mut db = DescriptorDb::new();
        load_descriptors(&mut db, dir.path()).unwrap();
        assert_eq!(db.descriptor_count(), 2);
        assert_eq!(db.find_latest("clock").unwrap().version, 2);
    }
}
