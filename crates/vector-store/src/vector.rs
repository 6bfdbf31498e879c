//! Vector wire format and cosine math.
//!
//! Vectors travel to Postgres as a bracketed literal (`[0.1,-2,3.5]`) bound as text and cast
//! with `::text::vector`. `f32` values are written with the shortest representation that
//! parses back to the same bits, so encoding is lossless.

use crate::error::{Result, StoreError};

pub fn vector_to_pg(vector: &[f32]) -> String {
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

pub fn parse_pg_vector(text: &str) -> Result<Vec<f32>> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| StoreError::InvalidVector(format!("missing brackets in '{text}'")))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|raw| {
            let value: f32 = raw
                .trim()
                .parse()
                .map_err(|_| StoreError::InvalidVector(format!("bad component '{raw}'")))?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(StoreError::InvalidVector(format!("non-finite component '{raw}'")))
            }
        })
        .collect()
}

/// Cosine similarity accumulated in `f64`. Zero vectors and length mismatches score 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// `1 − cosine similarity`, the metric behind pgvector's `<=>` operator.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b)
}
