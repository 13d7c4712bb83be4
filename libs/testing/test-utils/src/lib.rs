//! Shared test utilities for the vector workspace
//!
//! - `TestDatabase`: pgvector-enabled PostgreSQL container with migrations applied (feature: "postgres")
//! - `TestDataBuilder`: deterministic ids and vectors derived from the test name
//! - `assertions`: ranking assertions for query results
//!
//! ```rust,no_run
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! async fn my_postgres_test() {
//!     let db = TestDatabase::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_test");
//!
//!     let kb = builder.knowledge_base_id();
//!     let chunk = builder.chunk_id(0);
//! }
//! ```

use uuid::Uuid;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

/// Builder for test data with deterministic randomization
///
/// Every id and vector is a pure function of the seed, so a failing test
/// reproduces with identical data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (seed is the hash of the name)
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    fn id(&self, kind: u64, n: u64) -> Uuid {
        let high = self.seed ^ kind.rotate_left(32);
        let low = n.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ kind;
        Uuid::from_u64_pair(high, low)
    }

    pub fn client_id(&self) -> Uuid {
        self.id(1, 0)
    }

    pub fn knowledge_base_id(&self) -> Uuid {
        self.id(2, 0)
    }

    pub fn document_id(&self) -> Uuid {
        self.id(3, 0)
    }

    /// Id of the `n`-th chunk of this test
    pub fn chunk_id(&self, n: u64) -> Uuid {
        self.id(4, n)
    }

    /// A non-zero vector of `dimension` components in `[-1, 1)`
    pub fn vector(&self, n: u64, dimension: usize) -> Vec<f32> {
        let mut state = self.seed ^ n.wrapping_add(1).wrapping_mul(0xD1B5_4A32_D192_ED03);
        (0..dimension)
            .map(|_| {
                // xorshift64*
                state ^= state >> 12;
                state ^= state << 25;
                state ^= state >> 27;
                let bits = state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 40;
                (bits as f32 / (1u64 << 23) as f32) - 1.0
            })
            .collect()
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that scores are sorted from best to worst
    pub fn assert_descending(scores: &[f32], context: &str) {
        for pair in scores.windows(2) {
            assert!(
                pair[0] >= pair[1],
                "{}: scores not descending: {:?}",
                context,
                scores
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_builder_deterministic() {
        let builder1 = TestDataBuilder::new(42);
        let builder2 = TestDataBuilder::new(42);

        assert_eq!(builder1.chunk_id(3), builder2.chunk_id(3));
        assert_eq!(builder1.vector(1, 8), builder2.vector(1, 8));
    }

    #[test]
    fn test_data_builder_ids_are_distinct() {
        let builder = TestDataBuilder::from_test_name("distinct");

        assert_ne!(builder.client_id(), builder.knowledge_base_id());
        assert_ne!(builder.knowledge_base_id(), builder.document_id());
        assert_ne!(builder.chunk_id(0), builder.chunk_id(1));
    }

    #[test]
    fn test_data_builder_different_names() {
        let builder1 = TestDataBuilder::from_test_name("test1");
        let builder2 = TestDataBuilder::from_test_name("test2");

        assert_ne!(builder1.chunk_id(0), builder2.chunk_id(0));
    }

    #[test]
    fn test_vector_shape() {
        let v = TestDataBuilder::new(7).vector(0, 16);
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|x| (-1.0..1.0).contains(x)));
        assert!(v.iter().any(|x| *x != 0.0));
    }
}
