//! Tokenizer for the query language.
//!
//! Lowercases the whole input up front, then walks it once emitting one
//! token per run of identifier/digit characters, or one token per
//! punctuation character. An unrecognized character — including a `.`
//! following a run of digits, which is how a float literal like `17.3`
//! gets rejected — is an [Error::IllegalToken].

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Identifier(String),
    Integer(i64),
    Select,
    From,
    Where,
    Limit,
    Use,
    Index,
    Bucket,
    Get,
    Del,
    Set,
    Exists,
    Gt,
    Gte,
    Lt,
    Lte,
    Asc,
    Desc,
    Comma,
    Semicolon,
    Colon,
    Star,
    LParen,
    RParen,
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "select" => Token::Select,
        "from" => Token::From,
        "where" => Token::Where,
        "limit" => Token::Limit,
        "use" => Token::Use,
        "index" => Token::Index,
        "bucket" => Token::Bucket,
        "get" => Token::Get,
        "del" => Token::Del,
        "set" => Token::Set,
        "exists" => Token::Exists,
        "gt" => Token::Gt,
        "gte" => Token::Gte,
        "lt" => Token::Lt,
        "lte" => Token::Lte,
        "asc" => Token::Asc,
        "desc" => Token::Desc,
        _ => return None,
    })
}

pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let lowered = input.to_lowercase();
    let chars: Vec<char> = lowered.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(keyword(&word).unwrap_or(Token::Identifier(word)));
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            let value: i64 = digits.parse().map_err(|_| Error::IllegalToken)?;
            tokens.push(Token::Integer(value));
            continue;
        }
        let token = match c {
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            ':' => Token::Colon,
            '*' => Token::Star,
            '(' => Token::LParen,
            ')' => Token::RParen,
            _ => return Err(Error::IllegalToken),
        };
        tokens.push(token);
        i += 1;
    }
    Ok(tokens)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        let tokens = tokenize("SELECT From Bucket").unwrap();
        assert_eq!(tokens, vec![Token::Select, Token::From, Token::Bucket]);
    }

    #[test]
    fn identifiers_and_integers() {
        let tokens = tokenize("get user_1 42").unwrap();
        assert_eq!(tokens, vec![Token::Get, Token::Identifier("user_1".to_string()), Token::Integer(42)]);
    }

    #[test]
    fn float_literal_is_an_illegal_token_at_the_dot() {
        let err = tokenize("limit 17.3").unwrap_err();
        assert!(matches!(err, Error::IllegalToken));
    }

    #[test]
    fn unrecognized_character_is_illegal() {
        assert!(matches!(tokenize("get k1 @").unwrap_err(), Error::IllegalToken));
    }

    #[test]
    fn punctuation_tokens() {
        let tokens = tokenize(", ; : * ( )").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Comma, Token::Semicolon, Token::Colon, Token::Star, Token::LParen, Token::RParen]
        );
    }
}
