//! Template marker scanning.
//!
//! A procedural-language file can declare the routine it defines by embedding
//! a marker anywhere in its text, usually inside a comment:
//!
//! ```text
//! # SQL[[CREATE FUNCTION greet(name text) RETURNS text]]
//! return f"Hello, {name}"
//! ```
//!
//! The payload between the delimiters becomes the head of a
//! `CREATE FUNCTION ... LANGUAGE ... AS '...'` statement.

use nom::{
    bytes::complete::{tag, take_until},
    sequence::terminated,
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::error::{LoadResult, LoaderError};
use crate::parser::position;

/// Opening and closing delimiters of a template marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMarkers {
    pub open: String,
    pub close: String,
}

impl Default for TemplateMarkers {
    fn default() -> Self {
        Self {
            open: "SQL[[".to_string(),
            close: "]]".to_string(),
        }
    }
}

impl TemplateMarkers {
    /// Extract the payload of the first marker in `text`.
    ///
    /// Returns `Ok(None)` when the text has no opening delimiter and
    /// [`LoaderError::Template`] when the opening delimiter is never closed.
    /// The payload ends at the first closing delimiter and is trimmed.
    pub fn extract<'a>(&self, text: &'a str) -> LoadResult<Option<&'a str>> {
        let Ok((after_open, before)) = skip_to_open(text, &self.open) else {
            return Ok(None);
        };

        match payload(after_open, &self.close) {
            Ok((_, payload)) => Ok(Some(payload.trim())),
            Err(_) => {
                let (line, column) = position(text, before.len());
                Err(LoaderError::Template {
                    open: self.open.clone(),
                    line,
                    column,
                })
            }
        }
    }
}

/// Consume everything up to and including the opening delimiter, returning
/// the text that preceded it.
fn skip_to_open<'a>(input: &'a str, open: &str) -> IResult<&'a str, &'a str> {
    terminated(take_until(open), tag(open))(input)
}

fn payload<'a>(input: &'a str, close: &str) -> IResult<&'a str, &'a str> {
    terminated(take_until(close), tag(close))(input)
}
