//! Internal knowledge store interface.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::errors::PipelineError;
use crate::tools::search::Hit;

/// Ranked hits keyed by the sub-query that produced them.
pub type HitsByQuery = HashMap<String, Vec<Hit>>;

/// Abstract internal search backend.
///
/// Implementations run one hybrid (lexical + semantic) query per sub-query and
/// return hits already rank-fused, best first. An unreachable backend should
/// surface as `PipelineError::Unavailable`; the caller treats it as an empty
/// store.
#[async_trait]
pub trait InternalSearch: Send + Sync {
    async fn search(
        &self,
        sub_queries: &[String],
        top_k: usize,
    ) -> Result<HitsByQuery, PipelineError>;
}
