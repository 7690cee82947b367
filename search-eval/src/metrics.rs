//! Ranking metrics over retrieved and relevant id lists.
//!
//! Relevance is binary. nDCG uses the `log2(rank + 1)` discount.

use std::collections::{BTreeMap, HashSet};

/// Metric name → value, e.g. `precision@5`, `mrr`.
pub type MetricMap = BTreeMap<String, f64>;

fn hits_in_top_k(retrieved: &[String], relevant: &HashSet<&str>, k: usize) -> usize {
    retrieved
        .iter()
        .take(k)
        .filter(|id| relevant.contains(id.as_str()))
        .count()
}

fn set(relevant: &[String]) -> HashSet<&str> {
    relevant.iter().map(String::as_str).collect()
}

/// Relevant hits in the top `k`, divided by `k`.
pub fn precision_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    if k == 0 || retrieved.is_empty() {
        return 0.0;
    }
    hits_in_top_k(retrieved, &set(relevant), k) as f64 / k as f64
}

/// Relevant hits in the top `k`, divided by the number of relevant ids.
pub fn recall_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    let relevant = set(relevant);
    if relevant.is_empty() {
        return 0.0;
    }
    hits_in_top_k(retrieved, &relevant, k) as f64 / relevant.len() as f64
}

pub fn f1_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    let p = precision_at_k(retrieved, relevant, k);
    let r = recall_at_k(retrieved, relevant, k);
    if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
}

/// Reciprocal rank of the first relevant hit; 0 when none.
pub fn mrr(retrieved: &[String], relevant: &[String]) -> f64 {
    let relevant = set(relevant);
    retrieved
        .iter()
        .position(|id| relevant.contains(id.as_str()))
        .map_or(0.0, |i| 1.0 / (i + 1) as f64)
}

pub fn ndcg_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    let relevant = set(relevant);
    let discount = |rank: usize| 1.0 / ((rank + 1) as f64).log2();

    let mut seen = HashSet::new();
    let dcg: f64 = retrieved
        .iter()
        .take(k)
        .enumerate()
        .filter(|&(_, id)| relevant.contains(id.as_str()) && seen.insert(id.as_str()))
        .map(|(i, _)| discount(i + 1))
        .sum();
    let ideal: f64 = (1..=relevant.len().min(k)).map(discount).sum();

    if ideal == 0.0 { 0.0 } else { dcg / ideal }
}

/// All metrics for one query: P/R/F1/nDCG at every `k`, plus MRR.
pub fn score(retrieved: &[String], relevant: &[String], k_values: &[usize]) -> MetricMap {
    let mut m = MetricMap::new();
    for &k in k_values {
        m.insert(format!("precision@{k}"), precision_at_k(retrieved, relevant, k));
        m.insert(format!("recall@{k}"), recall_at_k(retrieved, relevant, k));
        m.insert(format!("f1@{k}"), f1_at_k(retrieved, relevant, k));
        m.insert(format!("ndcg@{k}"), ndcg_at_k(retrieved, relevant, k));
    }
    m.insert("mrr".into(), mrr(retrieved, relevant));
    m
}

/// Same keys as [`score`], every value 0. Used for failed queries.
pub fn zero(k_values: &[usize]) -> MetricMap {
    score(&[], &[], k_values)
}

/// Key-wise mean; keys missing from an entry count as 0.
pub fn mean<'a>(maps: impl IntoIterator<Item = &'a MetricMap>, k_values: &[usize]) -> MetricMap {
    let mut sum = zero(k_values);
    let mut n = 0usize;
    for m in maps {
        n += 1;
        for (key, total) in sum.iter_mut() {
            *total += m.get(key).copied().unwrap_or(0.0);
        }
    }
    if n > 0 {
        for v in sum.values_mut() {
            *v /= n as f64;
        }
    }
    sum
}
