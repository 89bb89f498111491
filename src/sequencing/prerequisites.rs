//! SCORM 1.2 prerequisite scripts (`adlcp:prerequisites`, type `aicc_script`).
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expression := and ('|' and)*
//! and        := unary ('&' unary)*
//! unary      := '~' unary | primary
//! primary    := '(' expression ')' | set | comparison
//! set        := count '*' '{' identifier (',' identifier)* '}'
//! comparison := identifier (('=' | '<>') status)?
//! ```
//!
//! A bare identifier holds when that item is passed or completed; a set
//! holds when at least `count` of its items do.

use crate::activity::LessonStatus;
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, peek, value},
    multi::{fold_many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrerequisiteError {
    #[error("syntax error at offset {offset}")]
    Syntax { offset: usize },

    #[error("unknown item identifier '{0}'")]
    UnknownIdentifier(String),
}

/// Parsed prerequisite expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prerequisite {
    Satisfied(String),
    Status {
        identifier: String,
        equals: bool,
        status: LessonStatus,
    },
    AtLeast {
        count: usize,
        identifiers: Vec<String>,
    },
    Not(Box<Prerequisite>),
    And(Box<Prerequisite>, Box<Prerequisite>),
    Or(Box<Prerequisite>, Box<Prerequisite>),
}

impl Prerequisite {
    /// Evaluate against the lesson status of each referenced item.
    pub fn evaluate<F>(&self, lookup: &F) -> Result<bool, PrerequisiteError>
    where
        F: Fn(&str) -> Option<LessonStatus>,
    {
        let status_of = |identifier: &str| {
            lookup(identifier).ok_or_else(|| PrerequisiteError::UnknownIdentifier(identifier.to_string()))
        };
        Ok(match self {
            Prerequisite::Satisfied(identifier) => is_satisfied(status_of(identifier)?),
            Prerequisite::Status {
                identifier,
                equals,
                status,
            } => (status_of(identifier)? == *status) == *equals,
            Prerequisite::AtLeast { count, identifiers } => {
                let mut hits = 0;
                for identifier in identifiers {
                    if is_satisfied(status_of(identifier)?) {
                        hits += 1;
                    }
                }
                hits >= *count
            }
            Prerequisite::Not(inner) => !inner.evaluate(lookup)?,
            Prerequisite::And(a, b) => a.evaluate(lookup)? && b.evaluate(lookup)?,
            Prerequisite::Or(a, b) => a.evaluate(lookup)? || b.evaluate(lookup)?,
        })
    }
}

fn is_satisfied(status: LessonStatus) -> bool {
    matches!(status, LessonStatus::Passed | LessonStatus::Completed)
}

/// Parse a script. Blank scripts have no prerequisite.
pub fn parse(script: &str) -> Result<Option<Prerequisite>, PrerequisiteError> {
    if script.trim().is_empty() {
        return Ok(None);
    }
    match all_consuming(expression)(script) {
        Ok((_, prerequisite)) => Ok(Some(prerequisite)),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(PrerequisiteError::Syntax {
            offset: script.len() - e.input.len(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(PrerequisiteError::Syntax {
            offset: script.len(),
        }),
    }
}

/// Parse and evaluate in one step. A blank script is always met.
pub fn evaluate<F>(script: &str, lookup: F) -> Result<bool, PrerequisiteError>
where
    F: Fn(&str) -> Option<LessonStatus>,
{
    match parse(script)? {
        Some(prerequisite) => prerequisite.evaluate(&lookup),
        None => Ok(true),
    }
}

// =============================================================================
// PARSERS
// =============================================================================

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '$')
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(is_identifier_char)(input)
}

/// Lesson status, by full name or by its one-letter abbreviation.
fn status(input: &str) -> IResult<&str, LessonStatus> {
    let abbreviation = terminated(
        alt((
            value(LessonStatus::Passed, tag_no_case("p")),
            value(LessonStatus::Completed, tag_no_case("c")),
            value(LessonStatus::Failed, tag_no_case("f")),
            value(LessonStatus::Incomplete, tag_no_case("i")),
            value(LessonStatus::Browsed, tag_no_case("b")),
            value(LessonStatus::NotAttempted, tag_no_case("n")),
        )),
        not(peek(satisfy(is_identifier_char))),
    );
    alt((
        value(LessonStatus::NotAttempted, tag_no_case("not attempted")),
        value(LessonStatus::Incomplete, tag_no_case("incomplete")),
        value(LessonStatus::Completed, tag_no_case("completed")),
        value(LessonStatus::Browsed, tag_no_case("browsed")),
        value(LessonStatus::Passed, tag_no_case("passed")),
        value(LessonStatus::Failed, tag_no_case("failed")),
        abbreviation,
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Prerequisite> {
    let operator = alt((value(false, tag("<>")), value(true, tag("="))));
    map(
        pair(ws(identifier), opt(pair(ws(operator), ws(status)))),
        |(identifier, comparison)| match comparison {
            Some((equals, status)) => Prerequisite::Status {
                identifier: identifier.to_string(),
                equals,
                status,
            },
            None => Prerequisite::Satisfied(identifier.to_string()),
        },
    )(input)
}

fn set(input: &str) -> IResult<&str, Prerequisite> {
    map(
        tuple((
            ws(map_res(digit1, str::parse::<usize>)),
            ws(char('*')),
            delimited(
                ws(char('{')),
                separated_list1(ws(char(',')), ws(identifier)),
                ws(char('}')),
            ),
        )),
        |(count, _, identifiers)| Prerequisite::AtLeast {
            count,
            identifiers: identifiers.into_iter().map(str::to_string).collect(),
        },
    )(input)
}

fn primary(input: &str) -> IResult<&str, Prerequisite> {
    alt((
        delimited(ws(char('(')), expression, ws(char(')'))),
        set,
        comparison,
    ))(input)
}

fn unary(input: &str) -> IResult<&str, Prerequisite> {
    alt((
        map(preceded(ws(char('~')), unary), |p| Prerequisite::Not(Box::new(p))),
        primary,
    ))(input)
}

fn conjunction(input: &str) -> IResult<&str, Prerequisite> {
    let (input, first) = unary(input)?;
    fold_many0(
        preceded(ws(char('&')), unary),
        move || first.clone(),
        |acc, next| Prerequisite::And(Box::new(acc), Box::new(next)),
    )(input)
}

fn expression(input: &str) -> IResult<&str, Prerequisite> {
    let (input, first) = conjunction(input)?;
    fold_many0(
        preceded(ws(char('|')), conjunction),
        move || first.clone(),
        |acc, next| Prerequisite::Or(Box::new(acc), Box::new(next)),
    )(input)
}
