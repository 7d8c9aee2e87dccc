//! Recursive-descent parser: token slice in, [Statement]s out.
//!
//! `WHERE` is tokenized (see [crate::ql::token]) but never consumed here —
//! no production in this grammar accepts it yet, so a bare `WHERE` token
//! inside a `SELECT` falls through to [Error::UnknownToken] like any other
//! clause keyword the loop doesn't recognize. That is deliberate: it is
//! reserved for a predicate grammar this crate doesn't implement, the same
//! way the lexer carries `GT`/`LT`/`ASC`/`DESC` tokens nothing here uses yet.

use super::ast::Statement;
use super::token::{tokenize, Token};
use crate::error::{Error, Result};

/// Parses `input` into one or more statements, in order. Statements are
/// separated by `;`; a trailing `;` is allowed, an empty one (two
/// semicolons back to back, or a leading one) is not.
pub fn parse(input: &str) -> Result<Vec<Statement>> {
    if input.trim().is_empty() {
        return Err(Error::EmptyQuery);
    }
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(Error::EmptyQuery);
    }
    split_statements(&tokens)?.into_iter().map(parse_statement).collect()
}

fn split_statements(tokens: &[Token]) -> Result<Vec<&[Token]>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        if *tok == Token::Semicolon {
            if i == start {
                return Err(Error::IncompleteStatement);
            }
            chunks.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    if start < tokens.len() {
        chunks.push(&tokens[start..]);
    }
    if chunks.is_empty() {
        return Err(Error::IncompleteStatement);
    }
    Ok(chunks)
}

fn parse_statement(tokens: &[Token]) -> Result<Statement> {
    match tokens.first() {
        Some(Token::Get) => parse_get(&tokens[1..]),
        Some(Token::Set) => parse_set(&tokens[1..]),
        Some(Token::Del) => parse_del(&tokens[1..]),
        Some(Token::Select) => parse_select(&tokens[1..]),
        _ => Err(Error::CannotParseStatement),
    }
}

/// Consumes a maximal run of leading identifier tokens, returning the
/// collected strings and whatever tokens remain.
fn identifier_run(tokens: &[Token]) -> (Vec<String>, &[Token]) {
    let mut ids = Vec::new();
    let mut rest = tokens;
    while let Some(Token::Identifier(s)) = rest.first() {
        ids.push(s.clone());
        rest = &rest[1..];
    }
    (ids, rest)
}

fn parse_get(tokens: &[Token]) -> Result<Statement> {
    let (keys, rest) = identifier_run(tokens);
    if keys.is_empty() {
        return Err(Error::CannotFindIdentifiers);
    }
    if !rest.is_empty() {
        return Err(Error::UnknownToken);
    }
    Ok(Statement::Get { keys })
}

fn parse_del(tokens: &[Token]) -> Result<Statement> {
    let (keys, rest) = identifier_run(tokens);
    if keys.is_empty() {
        return Err(Error::CannotFindIdentifiers);
    }
    if !rest.is_empty() {
        return Err(Error::UnknownToken);
    }
    Ok(Statement::Del { keys })
}

fn parse_set(tokens: &[Token]) -> Result<Statement> {
    let (ids, rest) = identifier_run(tokens);
    if ids.is_empty() {
        return Err(Error::CannotFindIdentifiers);
    }
    if !rest.is_empty() {
        return Err(Error::UnknownToken);
    }
    if ids.len() % 2 != 0 {
        return Err(Error::BothKeyValueRequired);
    }
    let pairs = ids.chunks(2).map(|pair| (pair[0].clone(), pair[1].clone())).collect();
    Ok(Statement::Set { pairs })
}

fn parse_select(tokens: &[Token]) -> Result<Statement> {
    let mut buckets = Vec::new();
    let mut indexes = Vec::new();
    let mut limit = None;
    let mut rest = tokens;
    loop {
        match rest.first() {
            None => break,
            Some(Token::From) => {
                rest = &rest[1..];
                match rest.first() {
                    Some(Token::Bucket) => rest = &rest[1..],
                    _ => return Err(Error::IllegalFromClause),
                }
                let (ids, remaining) = identifier_run(rest);
                if ids.is_empty() {
                    return Err(Error::NoBucketIdentifier);
                }
                buckets.extend(ids);
                rest = remaining;
            }
            Some(Token::Use) => {
                rest = &rest[1..];
                match rest.first() {
                    Some(Token::Index) => rest = &rest[1..],
                    _ => return Err(Error::IllegalUseClause),
                }
                let (ids, remaining) = identifier_run(rest);
                if ids.is_empty() {
                    return Err(Error::NoIndexIdentifiers);
                }
                indexes.extend(ids);
                rest = remaining;
            }
            Some(Token::Limit) => {
                rest = &rest[1..];
                match rest.first() {
                    None => return Err(Error::NoLimitProvided),
                    Some(Token::Integer(n)) => {
                        limit = Some(*n);
                        rest = &rest[1..];
                    }
                    Some(_) => return Err(Error::LimitMustBeInteger),
                }
            }
            Some(Token::Identifier(_)) => return Err(Error::UnparsedIdentifier),
            Some(_) => return Err(Error::UnknownToken),
        }
    }
    if buckets.len() > 1 {
        return Err(Error::CanOnlySelectSingleBucket);
    }
    Ok(Statement::Select { buckets, indexes, limit })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(parse("   "), Err(Error::EmptyQuery)));
    }

    #[test]
    fn get_requires_at_least_one_identifier() {
        assert!(matches!(parse("get"), Err(Error::CannotFindIdentifiers)));
    }

    #[test]
    fn get_multiple_keys() {
        let stmts = parse("get k1 k2;").unwrap();
        assert_eq!(stmts, vec![Statement::Get { keys: vec!["k1".to_string(), "k2".to_string()] }]);
    }

    #[test]
    fn set_requires_paired_identifiers() {
        assert!(matches!(parse("set k1 v1 k2;"), Err(Error::BothKeyValueRequired)));
    }

    #[test]
    fn set_parses_pairs() {
        let stmts = parse("set k1 v1 k2 v2;").unwrap();
        assert_eq!(
            stmts,
            vec![Statement::Set { pairs: vec![("k1".to_string(), "v1".to_string()), ("k2".to_string(), "v2".to_string())] }]
        );
    }

    #[test]
    fn select_from_bucket_with_limit() {
        let stmts = parse("select from bucket b1 limit 10;").unwrap();
        assert_eq!(stmts, vec![Statement::Select { buckets: vec!["b1".to_string()], indexes: vec![], limit: Some(10) }]);
    }

    #[test]
    fn select_from_without_bucket_keyword_is_illegal() {
        assert!(matches!(parse("select from b1;"), Err(Error::IllegalFromClause)));
    }

    #[test]
    fn select_from_bucket_with_no_identifiers() {
        assert!(matches!(parse("select from bucket limit 5;"), Err(Error::NoBucketIdentifier)));
    }

    #[test]
    fn select_use_without_index_keyword_is_illegal() {
        assert!(matches!(parse("select use idx1;"), Err(Error::IllegalUseClause)));
    }

    #[test]
    fn select_use_index_with_no_identifiers() {
        assert!(matches!(parse("select use index;"), Err(Error::NoIndexIdentifiers)));
    }

    #[test]
    fn select_limit_missing_value() {
        assert!(matches!(parse("select limit;"), Err(Error::NoLimitProvided)));
    }

    #[test]
    fn select_limit_non_integer() {
        assert!(matches!(parse("select limit foo;"), Err(Error::LimitMustBeInteger)));
    }

    #[test]
    fn select_more_than_one_bucket_is_rejected() {
        assert!(matches!(parse("select from bucket b1 b2;"), Err(Error::CanOnlySelectSingleBucket)));
    }

    #[test]
    fn select_with_use_index_and_limit() {
        let stmts = parse("select from bucket b1 use index by_value limit 3;").unwrap();
        assert_eq!(
            stmts,
            vec![Statement::Select {
                buckets: vec!["b1".to_string()],
                indexes: vec!["by_value".to_string()],
                limit: Some(3),
            }]
        );
    }

    #[test]
    fn multiple_statements_in_one_call() {
        let stmts = parse("get k1; del k2;").unwrap();
        assert_eq!(
            stmts,
            vec![Statement::Get { keys: vec!["k1".to_string()] }, Statement::Del { keys: vec!["k2".to_string()] }]
        );
    }

    #[test]
    fn doubled_semicolon_is_incomplete() {
        assert!(matches!(parse("get k1;;del k2;"), Err(Error::IncompleteStatement)));
    }

    #[test]
    fn leading_keyword_that_is_not_a_statement_start_fails_to_parse() {
        assert!(matches!(parse("from bucket b1;"), Err(Error::CannotParseStatement)));
    }
}
