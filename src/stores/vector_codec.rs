//! Text codec for embedding columns.
//!
//! SQL backends store vectors as delimited text: the bracketed form
//! `[0.1,0.2]` (what pgvector and the ingestion fixtures emit) or bare CSV
//! `0.1,0.2`. Decoding is strict: a malformed component fails the whole
//! decode instead of silently dropping dimensions, because a shortened
//! vector would poison every distance the projection computes.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum VectorCodecError {
    #[error("empty embedding text")]
    #[diagnostic(code(vecloom::codec::empty))]
    Empty,

    #[error("embedding component {index} is not a number: {token:?}")]
    #[diagnostic(
        code(vecloom::codec::component),
        help("Embedding columns must hold comma-separated floats, optionally bracketed.")
    )]
    Component { index: usize, token: String },

    #[error("unbalanced brackets in embedding text")]
    #[diagnostic(code(vecloom::codec::brackets))]
    Brackets,

    #[error("non-finite embedding component {index}")]
    #[diagnostic(code(vecloom::codec::non_finite))]
    NonFinite { index: usize },
}

/// Decode `"[0.1, 0.2]"` or bare `"0.1,0.2"` into a vector.
pub fn decode_vector(text: &str) -> Result<Vec<f32>, VectorCodecError> {
    let trimmed = text.trim();
    let inner = if trimmed.starts_with('[') || trimmed.ends_with(']') {
        trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or(VectorCodecError::Brackets)?
    } else {
        trimmed
    };
    let inner = inner.trim();
    if inner.is_empty() {
        return Err(VectorCodecError::Empty);
    }

    let mut out = Vec::new();
    for (index, token) in inner.split(',').enumerate() {
        let token = token.trim();
        let value: f32 = token.parse().map_err(|_| VectorCodecError::Component {
            index,
            token: token.to_string(),
        })?;
        if !value.is_finite() {
            return Err(VectorCodecError::NonFinite { index });
        }
        out.push(value);
    }
    Ok(out)
}

/// Encode a vector in the bracketed form, `[0.1,0.2]`.
pub fn encode_vector(vector: &[f32]) -> String {
    let mut out = String::with_capacity(2 + vector.len() * 10);
    out.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&value.to_string());
    }
    out.push(']');
    out
}
