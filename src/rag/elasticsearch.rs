//! Elasticsearch-backed internal search.
//!
//! Each sub-query runs a BM25 `multi_match` over title and content and, when
//! an embedder is wired in, a kNN query over the `vector` field. The two
//! ranked lists are merged with reciprocal rank fusion.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::store::{HitsByQuery, InternalSearch};
use crate::core::config::settings::ElasticsearchConfig;
use crate::core::errors::PipelineError;
use crate::llm::provider::Embedder;
use crate::tools::search::{Hit, Provider};

pub struct ElasticsearchStore {
    config: ElasticsearchConfig,
    client: Client,
    embedder: Option<Arc<dyn Embedder>>,
}

impl ElasticsearchStore {
    pub fn new(
        config: ElasticsearchConfig,
        client: Client,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            config,
            client,
            embedder,
        }
    }

    fn search_url(&self) -> String {
        format!(
            "{}/{}/_search",
            self.config.url.trim_end_matches('/'),
            self.config.index
        )
    }

    async fn run_query(&self, body: Value) -> Result<Vec<Hit>, PipelineError> {
        let res = self
            .client
            .post(self.search_url())
            .json(&body)
            .send()
            .await
            .map_err(PipelineError::unavailable)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(PipelineError::Unavailable(format!(
                "elasticsearch query failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;
        Ok(parse_hits(&payload))
    }

    async fn search_one(&self, query: &str, top_k: usize) -> Result<Vec<Hit>, PipelineError> {
        let lexical = self.run_query(bm25_body(query, top_k)).await?;

        let Some(embedder) = &self.embedder else {
            return Ok(lexical);
        };

        let vector = match embedder.embed(&[query.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.swap_remove(0),
            Ok(_) => return Ok(lexical),
            Err(err) => {
                tracing::warn!("Embedding failed, using lexical results only: {}", err);
                return Ok(lexical);
            }
        };

        let semantic = match self
            .run_query(knn_body(&vector, top_k, self.config.num_candidates))
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!("kNN query failed, using lexical results only: {}", err);
                return Ok(lexical);
            }
        };

        Ok(reciprocal_rank_fusion(
            &[lexical, semantic],
            self.config.rrf_k,
            top_k,
        ))
    }
}

#[async_trait]
impl InternalSearch for ElasticsearchStore {
    async fn search(
        &self,
        sub_queries: &[String],
        top_k: usize,
    ) -> Result<HitsByQuery, PipelineError> {
        let mut results = HashMap::new();
        for query in sub_queries {
            let hits = self.search_one(query, top_k).await?;
            tracing::debug!(query = %query, hits = hits.len(), "internal search");
            results.insert(query.clone(), hits);
        }
        Ok(results)
    }
}

fn bm25_body(query: &str, size: usize) -> Value {
    json!({
        "size": size,
        "query": {
            "multi_match": {
                "query": query,
                "fields": ["title^2", "content", "text"]
            }
        },
        "_source": { "excludes": ["vector"] }
    })
}

fn knn_body(vector: &[f32], size: usize, num_candidates: usize) -> Value {
    json!({
        "size": size,
        "knn": {
            "field": "vector",
            "query_vector": vector,
            "k": size,
            "num_candidates": num_candidates.max(size)
        },
        "_source": { "excludes": ["vector"] }
    })
}

fn parse_hits(payload: &Value) -> Vec<Hit> {
    let Some(items) = payload["hits"]["hits"].as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| {
            let source = &item["_source"];
            let text = |key: &str| source[key].as_str().unwrap_or("").to_string();
            let body = source["content"]
                .as_str()
                .or_else(|| source["text"].as_str())
                .unwrap_or("")
                .to_string();
            Hit {
                title: text("title"),
                body,
                url: text("url"),
                date: source["date"].as_str().map(|s| s.to_string()),
                score: item["_score"].as_f64().unwrap_or(0.0) as f32,
                provider: Provider::Internal,
            }
        })
        .collect()
}

/// Merge ranked lists: each document scores `sum(1 / (k + rank))` over the
/// lists it appears in (rank is 1-based). Documents are identified by URL,
/// falling back to title. The fused score replaces the backend score.
pub fn reciprocal_rank_fusion(lists: &[Vec<Hit>], k: f32, limit: usize) -> Vec<Hit> {
    let mut fused: Vec<(Hit, f32)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            let contribution = 1.0 / (k + rank as f32 + 1.0);
            let key = if hit.url.is_empty() {
                hit.title.trim().to_lowercase()
            } else {
                hit.url.clone()
            };
            match index.get(&key) {
                Some(&pos) => fused[pos].1 += contribution,
                None => {
                    index.insert(key, fused.len());
                    fused.push((hit.clone(), contribution));
                }
            }
        }
    }

    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
        .into_iter()
        .take(limit)
        .map(|(mut hit, score)| {
            hit.score = score;
            hit
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str, title: &str) -> Hit {
        Hit {
            title: title.to_string(),
            body: String::new(),
            url: url.to_string(),
            date: None,
            score: 0.0,
            provider: Provider::Internal,
        }
    }

    #[test]
    fn rrf_rewards_documents_in_both_lists() {
        let lexical = vec![hit("a", "A"), hit("b", "B"), hit("c", "C")];
        let semantic = vec![hit("c", "C"), hit("a", "A"), hit("d", "D")];

        let fused = reciprocal_rank_fusion(&[lexical, semantic], 60.0, 10);
        let order: Vec<&str> = fused.iter().map(|h| h.url.as_str()).collect();

        assert_eq!(order, vec!["a", "c", "b", "d"]);
        let expected = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((fused[0].score - expected).abs() < 1e-6);
    }

    #[test]
    fn rrf_falls_back_to_title_identity_and_respects_limit() {
        let first = vec![hit("", "Same Title"), hit("x", "X")];
        let second = vec![hit("", " same title ")];
        let fused = reciprocal_rank_fusion(&[first, second], 60.0, 1);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].title, "Same Title");
    }

    #[test]
    fn parse_hits_reads_source_fields() {
        let payload = json!({
            "hits": { "hits": [
                { "_score": 7.5, "_source": { "title": "T", "text": "body", "url": "u", "date": "2024-01-01" } },
                { "_source": { "title": "N", "content": "c" } }
            ]}
        });
        let hits = parse_hits(&payload);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].body, "body");
        assert!((hits[0].score - 7.5).abs() < f32::EPSILON);
        assert_eq!(hits[0].date.as_deref(), Some("2024-01-01"));
        assert_eq!(hits[1].body, "c");
        assert_eq!(hits[1].score, 0.0);
        assert!(parse_hits(&json!({})).is_empty());
    }

    #[test]
    fn query_bodies_target_expected_fields() {
        let body = bm25_body("반도체", 10);
        assert_eq!(body["query"]["multi_match"]["query"], "반도체");
        let body = knn_body(&[0.1, 0.2], 10, 5);
        assert_eq!(body["knn"]["num_candidates"], 10);
        assert_eq!(body["knn"]["field"], "vector");
    }
}
