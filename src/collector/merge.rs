//! Quota selection over a multi-day collection.

use crate::models::DatedArticle;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// How a global quota is spread over the collected days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// The first `limit` articles in collection order.
    #[default]
    Sequential,
    /// Newest day first.
    RecentFirst,
    /// An equal share per day (plus one for the earliest `limit % days`).
    EvenDistribution,
}

impl MergeMode {
    /// Parse a mode name. Unknown names select [`MergeMode::Sequential`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sequential" => MergeMode::Sequential,
            "recent_first" | "recent" => MergeMode::RecentFirst,
            "even_distribution" | "balanced" => MergeMode::EvenDistribution,
            other => {
                warn!(mode = other, "Unknown merge mode; using sequential");
                MergeMode::Sequential
            }
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MergeMode::Sequential => "sequential",
            MergeMode::RecentFirst => "recent_first",
            MergeMode::EvenDistribution => "even_distribution",
        })
    }
}

/// Pick at most `limit` articles from `articles` according to `mode`.
///
/// When everything fits (or `limit` is zero) the input is returned as is.
pub fn select(articles: &[DatedArticle], limit: usize, mode: MergeMode) -> Vec<DatedArticle> {
    if limit == 0 || articles.len() <= limit {
        return articles.to_vec();
    }

    let selected = match mode {
        MergeMode::Sequential => articles[..limit].to_vec(),
        MergeMode::RecentFirst => {
            let mut sorted = articles.to_vec();
            sorted.sort_by(|a, b| b.day.cmp(&a.day));
            sorted.truncate(limit);
            sorted
        }
        MergeMode::EvenDistribution => even_distribution(articles, limit),
    };
    info!(
        available = articles.len(),
        limit,
        selected = selected.len(),
        %mode,
        "Merged daily collections"
    );
    selected
}

fn even_distribution(articles: &[DatedArticle], limit: usize) -> Vec<DatedArticle> {
    let mut by_day: BTreeMap<NaiveDate, Vec<&DatedArticle>> = BTreeMap::new();
    for article in articles {
        by_day.entry(article.day).or_default().push(article);
    }
    let groups: Vec<(NaiveDate, Vec<&DatedArticle>)> = by_day.into_iter().collect();
    let quotas = day_quotas(&groups.iter().map(|(_, g)| g.len()).collect::<Vec<_>>(), limit);

    let mut selected = Vec::with_capacity(limit);
    for ((day, group), quota) in groups.iter().zip(quotas) {
        debug!(%day, available = group.len(), quota, "Day allocation");
        selected.extend(group.iter().take(quota).map(|a| (*a).clone()));
    }
    selected
}

/// Per-day counts for `limit` spread over days holding `available[i]`
/// articles each.
///
/// Each day gets `limit / days`, the earliest `limit % days` get one more.
/// A day short of its share gives the remainder to the other days round
/// robin, in day order.
fn day_quotas(available: &[usize], limit: usize) -> Vec<usize> {
    let days = available.len();
    if days == 0 {
        return Vec::new();
    }
    let base = limit / days;
    let extra = limit % days;

    let mut quotas: Vec<usize> = available
        .iter()
        .enumerate()
        .map(|(i, &n)| (base + usize::from(i < extra)).min(n))
        .collect();

    let mut remaining = limit.saturating_sub(quotas.iter().sum());
    while remaining > 0 {
        let mut progressed = false;
        for (quota, &n) in quotas.iter_mut().zip(available) {
            if remaining == 0 {
                break;
            }
            if *quota < n {
                *quota += 1;
                remaining -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    quotas
}

/// `limit` indices spread evenly over `0..n` (`floor(i * n / limit)`), or
/// every index when `n <= limit`.
pub fn balanced_indices(n: usize, limit: usize) -> Vec<usize> {
    if limit == 0 || n <= limit {
        return (0..n).collect();
    }
    (0..limit).map(|i| i * n / limit).collect()
}
