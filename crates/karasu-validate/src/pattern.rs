//! Syntactic checker for the STIX pattern grammar
//!
//! Checks the subset the platform exchanges: one or more bracketed
//! observation expressions joined by AND / OR / FOLLOWEDBY, each holding
//! comparison expressions `object-type:path <op> literal` joined by AND / OR.
//! This is a structural check only; object paths are not resolved against
//! a schema.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// `type:property` with dotted / indexed / quoted path steps.
    static ref OBJECT_PATH: Regex = Regex::new(
        r"^[a-z0-9-]+:[a-zA-Z0-9_]+(\.([a-zA-Z0-9_]+|'[^']+')|\[(\*|\d+)\])*$"
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Operator(String),
    Word(String),
    StringLit(String),
    Number(String),
}

fn tokenize(pattern: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Operator("=".to_string()));
                i += 1;
            }
            '!' | '<' | '>' => {
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    tokens.push(Token::Operator(format!("{c}=")));
                    i += 2;
                } else if c == '!' {
                    return Err("'!' must be followed by '='".to_string());
                } else {
                    tokens.push(Token::Operator(c.to_string()));
                    i += 1;
                }
            }
            '\'' => {
                // Single-quoted literal; backslash escapes the next char.
                let mut lit = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    match chars[j] {
                        '\\' if j + 1 < chars.len() => {
                            lit.push(chars[j + 1]);
                            j += 2;
                        }
                        '\'' => {
                            closed = true;
                            j += 1;
                            break;
                        }
                        other => {
                            lit.push(other);
                            j += 1;
                        }
                    }
                }
                if !closed {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::StringLit(lit));
                i = j;
            }
            c if c.is_ascii_digit() => {
                let mut num = String::new();
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    num.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => {
                let mut word = String::new();
                while i < chars.len() {
                    let w = chars[i];
                    // Quoted path steps (file:hashes.'SHA-256') keep their
                    // quotes inside the word so OBJECT_PATH can see them.
                    if w.is_ascii_alphanumeric()
                        || matches!(w, '_' | '-' | ':' | '.' | '\'')
                        || (w == '[' && path_index_ahead(&chars, i))
                        || (w == ']' && word.contains('['))
                        || w == '*'
                    {
                        word.push(w);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

/// True if `chars[i..]` starts a path index like `[0]` or `[*]`.
fn path_index_ahead(chars: &[char], i: usize) -> bool {
    let mut j = i + 1;
    if j < chars.len() && chars[j] == '*' {
        j += 1;
    } else {
        let start = j;
        while j < chars.len() && chars[j].is_ascii_digit() {
            j += 1;
        }
        if j == start {
            return false;
        }
    }
    j < chars.len() && chars[j] == ']'
}

const OBSERVATION_JOINERS: &[&str] = &["AND", "OR", "FOLLOWEDBY"];
const COMPARISON_JOINERS: &[&str] = &["AND", "OR"];
const WORD_OPERATORS: &[&str] = &["LIKE", "MATCHES", "IN"];

/// Check the pattern and return the grammar errors found. Empty means valid.
pub fn check_pattern(pattern: &str) -> Vec<String> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return vec!["pattern is empty".to_string()];
    }

    let tokens = match tokenize(trimmed) {
        Ok(tokens) => tokens,
        Err(e) => return vec![e],
    };

    let mut errors = Vec::new();
    let mut pos = 0;

    loop {
        match check_observation(&tokens, pos, &mut errors) {
            Some(next) => pos = next,
            None => return errors,
        }
        if pos >= tokens.len() {
            break;
        }
        match &tokens[pos] {
            Token::Word(w) if OBSERVATION_JOINERS.contains(&w.to_uppercase().as_str()) => {
                pos += 1;
                if pos >= tokens.len() {
                    errors.push(format!("dangling '{w}' at end of pattern"));
                    break;
                }
            }
            other => {
                errors.push(format!("expected AND/OR/FOLLOWEDBY between observations, found {other:?}"));
                break;
            }
        }
    }

    errors
}

/// Check one `[ comparison (AND|OR comparison)* ]`; returns the position
/// after the closing bracket, or None when recovery is impossible.
fn check_observation(tokens: &[Token], mut pos: usize, errors: &mut Vec<String>) -> Option<usize> {
    if tokens.get(pos) != Some(&Token::LBracket) {
        errors.push("expected '[' to open an observation expression".to_string());
        return None;
    }
    pos += 1;

    loop {
        pos = check_comparison(tokens, pos, errors)?;
        match tokens.get(pos) {
            Some(Token::RBracket) => return Some(pos + 1),
            Some(Token::Word(w)) if COMPARISON_JOINERS.contains(&w.to_uppercase().as_str()) => {
                pos += 1;
            }
            Some(other) => {
                errors.push(format!("expected AND/OR or ']' inside observation, found {other:?}"));
                return None;
            }
            None => {
                errors.push("unclosed observation expression, missing ']'".to_string());
                return None;
            }
        }
    }
}

/// Check one `path op literal` comparison; returns the position after it.
fn check_comparison(tokens: &[Token], mut pos: usize, errors: &mut Vec<String>) -> Option<usize> {
    match tokens.get(pos) {
        Some(Token::Word(path)) => {
            if !OBJECT_PATH.is_match(path) {
                errors.push(format!("malformed object path '{path}'"));
            }
            pos += 1;
        }
        Some(other) => {
            errors.push(format!("expected object path, found {other:?}"));
            return None;
        }
        None => {
            errors.push("expected object path, found end of pattern".to_string());
            return None;
        }
    }

    // NOT may precede a word operator.
    if let Some(Token::Word(w)) = tokens.get(pos) {
        if w.to_uppercase() == "NOT" {
            pos += 1;
        }
    }

    let is_set_op = match tokens.get(pos) {
        Some(Token::Operator(_)) => {
            pos += 1;
            false
        }
        Some(Token::Word(w)) if WORD_OPERATORS.contains(&w.to_uppercase().as_str()) => {
            let set = w.to_uppercase() == "IN";
            pos += 1;
            set
        }
        Some(other) => {
            errors.push(format!("expected comparison operator, found {other:?}"));
            return None;
        }
        None => {
            errors.push("expected comparison operator, found end of pattern".to_string());
            return None;
        }
    };

    if is_set_op {
        // IN ( literal, literal, ... )
        if tokens.get(pos) != Some(&Token::LParen) {
            errors.push("expected '(' after IN".to_string());
            return None;
        }
        pos += 1;
        loop {
            match tokens.get(pos) {
                Some(Token::StringLit(_)) | Some(Token::Number(_)) => pos += 1,
                Some(other) => {
                    errors.push(format!("expected literal in IN list, found {other:?}"));
                    return None;
                }
                None => {
                    errors.push("unterminated IN list".to_string());
                    return None;
                }
            }
            match tokens.get(pos) {
                Some(Token::Comma) => pos += 1,
                Some(Token::RParen) => return Some(pos + 1),
                Some(other) => {
                    errors.push(format!("expected ',' or ')' in IN list, found {other:?}"));
                    return None;
                }
                None => {
                    errors.push("unterminated IN list".to_string());
                    return None;
                }
            }
        }
    }

    match tokens.get(pos) {
        Some(Token::StringLit(_)) | Some(Token::Number(_)) => Some(pos + 1),
        Some(other) => {
            errors.push(format!("expected literal value, found {other:?}"));
            None
        }
        None => {
            errors.push("expected literal value, found end of pattern".to_string());
            None
        }
    }
}
