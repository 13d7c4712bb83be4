use async_trait::async_trait;

use crate::error::{VectorError, VectorResult};

/// Turns text into fixed-dimension vectors.
///
/// Implementations own their retry policy; callers see either vectors or a
/// classified error (validation, cardinality, transient after exhaustion,
/// permanent).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, stored in vector payloads so later migrations can
    /// detect model or dimension changes.
    fn model(&self) -> &str;

    /// Length of every vector this provider returns
    fn dimension(&self) -> u32;

    /// Embed a single text. Blank text fails with `Validation` before any I/O.
    async fn embed_one(&self, text: &str) -> VectorResult<Vec<f32>> {
        validate_text(text, 0)?;

        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        match vectors.len() {
            1 => vectors
                .pop()
                .ok_or(VectorError::Cardinality { expected: 1, actual: 0 }),
            actual => Err(VectorError::Cardinality {
                expected: 1,
                actual,
            }),
        }
    }

    /// Embed several texts. Element `i` of the result belongs to `texts[i]`.
    async fn embed_many(&self, texts: &[String]) -> VectorResult<Vec<Vec<f32>>>;
}

/// Reject empty batches and blank members.
pub fn validate_texts(texts: &[String]) -> VectorResult<()> {
    if texts.is_empty() {
        return Err(VectorError::Validation(
            "cannot embed an empty list of texts".to_string(),
        ));
    }
    texts
        .iter()
        .enumerate()
        .try_for_each(|(position, text)| validate_text(text, position))
}

fn validate_text(text: &str, position: usize) -> VectorResult<()> {
    if text.trim().is_empty() {
        return Err(VectorError::Validation(format!(
            "text at position {} is empty or blank",
            position
        )));
    }
    Ok(())
}

/// Put index-tagged vectors back into request order.
///
/// The indices must be exactly `0..expected`; a missing, duplicate or
/// out-of-range index means the response does not answer the request.
pub fn realign_by_index(
    expected: usize,
    tagged: Vec<(usize, Vec<f32>)>,
) -> VectorResult<Vec<Vec<f32>>> {
    if tagged.len() != expected {
        return Err(VectorError::Cardinality {
            expected,
            actual: tagged.len(),
        });
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for (index, vector) in tagged {
        match slots.get_mut(index) {
            Some(slot) if slot.is_none() => *slot = Some(vector),
            _ => {
                return Err(VectorError::PermanentProvider {
                    status: 200,
                    message: format!(
                        "response index {} is duplicated or outside 0..{}",
                        index, expected
                    ),
                });
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

/// All vectors must have the provider's dimension.
pub fn check_dimensions(dimension: u32, vectors: &[Vec<f32>]) -> VectorResult<()> {
    match vectors.iter().find(|v| v.len() != dimension as usize) {
        Some(v) => Err(VectorError::DimensionMismatch {
            expected: dimension,
            actual: v.len(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_texts() {
        assert!(validate_texts(&[]).unwrap_err().is_validation());
        assert!(
            validate_texts(&["ok".into(), "  ".into()])
                .unwrap_err()
                .to_string()
                .contains("position 1")
        );
        assert!(validate_texts(&["a".into(), "b".into()]).is_ok());
    }

    #[test]
    fn test_realign_restores_request_order() {
        let tagged = vec![(2, vec![2.0]), (0, vec![0.0]), (1, vec![1.0])];
        let ordered = realign_by_index(3, tagged).unwrap();
        assert_eq!(ordered, vec![vec![0.0], vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_realign_rejects_count_mismatch() {
        let err = realign_by_index(3, vec![(0, vec![0.0]), (1, vec![1.0])]).unwrap_err();
        assert!(matches!(
            err,
            VectorError::Cardinality {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_realign_rejects_duplicate_and_out_of_range() {
        assert!(realign_by_index(2, vec![(0, vec![0.0]), (0, vec![1.0])]).is_err());
        assert!(realign_by_index(2, vec![(0, vec![0.0]), (5, vec![1.0])]).is_err());
    }

    #[test]
    fn test_check_dimensions() {
        assert!(check_dimensions(2, &[vec![1.0, 2.0]]).is_ok());
        assert!(matches!(
            check_dimensions(2, &[vec![1.0, 2.0], vec![1.0]]),
            Err(VectorError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }
}
