// Embedding vector text encoding
// Vectors are written as comma-separated decimals using the shortest
// representation that parses back to the same `f32`, e.g. `0.1,-2,0.003`.


use itertools::Itertools;

use crate::{Result, SearchError};

/// Reject vectors that cannot be encoded as a store literal
#[inline]
pub fn validate_vector(vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(SearchError::InvalidEmbedding(
            "embedding vector is empty".to_string(),
        ));
    }

    if let Some(index) = vector.iter().position(|value| !value.is_finite()) {
        return Err(SearchError::InvalidEmbedding(format!(
            "component {} is not a finite number",
            index
        )));
    }

    Ok(())
}

/// Comma-separated components with no trailing separator
#[inline]
pub fn encode_vector(vector: &[f32]) -> Result<String> {
    validate_vector(vector)?;
    Ok(vector.iter().join(","))
}

/// Dynamic array literal, as bound to a `dynamic` query parameter
#[inline]
pub fn dynamic_literal(vector: &[f32]) -> Result<String> {
    Ok(format!("dynamic([{}])", encode_vector(vector)?))
}

/// Parse an encoded vector back into floats
///
/// Accepts the bare form produced by [`encode_vector`] as well as the
/// `dynamic([..])`, `pack_array(..)` and `[..]` wrappers.
#[inline]
pub fn parse_vector_literal(literal: &str) -> Result<Vec<f32>> {
    let body = unwrap_literal(literal.trim());
    if body.trim().is_empty() {
        return Err(SearchError::InvalidEmbedding(
            "embedding literal is empty".to_string(),
        ));
    }

    let vector = body
        .split(',')
        .map(str::trim)
        .map(|token| {
            token.parse::<f32>().map_err(|e| {
                SearchError::InvalidEmbedding(format!("'{}' is not a number: {}", token, e))
            })
        })
        .collect::<Result<Vec<f32>>>()?;

    validate_vector(&vector)?;
    Ok(vector)
}

fn unwrap_literal(literal: &str) -> &str {
    let inner = literal
        .strip_prefix("dynamic(")
        .or_else(|| literal.strip_prefix("pack_array("))
        .and_then(|rest| rest.strip_suffix(')'))
        .map_or(literal, str::trim);

    inner
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(inner)
}
