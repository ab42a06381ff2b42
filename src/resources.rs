use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::capabilities::{LookupConstraints, ResourceLookup};
use crate::error::CoachResult;
use crate::metrics::round2;
use crate::models::{LearningLevel, Resource, ResourceKind, ResourceSet};

/// Kinds in the order they are presented to students.
pub const PRIORITY: [ResourceKind; 4] = [
    ResourceKind::Video,
    ResourceKind::Interactive,
    ResourceKind::Article,
    ResourceKind::Practice,
];

/// Keeps the first `per_kind_limit` results of each requested kind and ranks
/// them by position within their kind.
pub fn curate(
    topic: &str,
    found: Vec<Resource>,
    constraints: &LookupConstraints,
    per_kind_limit: usize,
) -> ResourceSet {
    let mut by_kind: BTreeMap<ResourceKind, Vec<Resource>> = BTreeMap::new();
    for resource in found {
        if constraints.kinds.contains(&resource.kind) {
            by_kind.entry(resource.kind).or_default().push(resource);
        }
    }

    let mut curated = Vec::new();
    for kind in PRIORITY {
        let Some(results) = by_kind.remove(&kind) else {
            continue;
        };
        for (rank, mut resource) in results.into_iter().take(per_kind_limit).enumerate() {
            resource.relevance = round2(1.0 - rank as f64 * 0.1);
            curated.push(resource);
        }
    }
    curated.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));

    ResourceSet {
        topic: topic.to_string(),
        level: constraints.level,
        total_found: curated.len(),
        resources: curated,
    }
}

fn slug(topic: &str) -> String {
    topic
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn level_phrase(level: LearningLevel) -> &'static str {
    match level {
        LearningLevel::Beginner => "for Beginners",
        LearningLevel::Intermediate => "Concepts and Examples",
        LearningLevel::Advanced => "In Depth",
    }
}

/// Offline lookup that returns a fixed set of well-known learning sites.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog;

impl StaticCatalog {
    fn entry(
        kind: ResourceKind,
        title: String,
        url: String,
        description: String,
        source: &str,
        detail: (&str, &str),
    ) -> Resource {
        Resource {
            kind,
            title,
            url,
            description,
            source: source.to_string(),
            details: BTreeMap::from([(detail.0.to_string(), detail.1.to_string())]),
            relevance: 0.0,
        }
    }

    fn resources_for(topic: &str, kind: ResourceKind, level: LearningLevel) -> Vec<Resource> {
        let slug = slug(topic);
        match kind {
            ResourceKind::Video => vec![
                Self::entry(
                    kind,
                    format!("{topic} - Complete Tutorial {}", level_phrase(level)),
                    format!("https://www.youtube.com/results?search_query={slug}"),
                    format!("Video tutorial covering {topic} fundamentals"),
                    "YouTube",
                    ("duration", "15:32"),
                ),
                Self::entry(
                    kind,
                    format!("Khan Academy: {topic} Explained"),
                    format!("https://www.khanacademy.org/search?page_search_query={slug}"),
                    format!("Interactive lessons on {topic} with practice exercises"),
                    "Khan Academy",
                    ("duration", "10:45"),
                ),
            ],
            ResourceKind::Article => vec![
                Self::entry(
                    kind,
                    format!("Understanding {topic}: A Complete Guide"),
                    format!("https://en.wikipedia.org/wiki/Special:Search?search={slug}"),
                    format!("Detailed article explaining {topic} concepts with examples"),
                    "Wikipedia",
                    ("read_time", "8 min"),
                ),
                Self::entry(
                    kind,
                    format!("{topic} - Step by Step Explanation"),
                    format!("https://www.britannica.com/search?query={slug}"),
                    format!("Learn {topic} through clear, visual explanations"),
                    "Britannica",
                    ("read_time", "6 min"),
                ),
            ],
            ResourceKind::Practice => vec![
                Self::entry(
                    kind,
                    format!("{topic} Practice Problems with Solutions"),
                    format!("https://www.khanacademy.org/search?page_search_query={slug}+practice"),
                    format!("Practice problems on {topic} with worked solutions"),
                    "Khan Academy",
                    ("problems", "50+"),
                ),
                Self::entry(
                    kind,
                    format!("Interactive {topic} Exercises"),
                    format!("https://brilliant.org/search/?q={slug}"),
                    format!("Exercises to master {topic}"),
                    "Brilliant.org",
                    ("problems", "30+"),
                ),
            ],
            ResourceKind::Interactive => Vec::new(),
        }
    }
}

#[async_trait]
impl ResourceLookup for StaticCatalog {
    async fn find(
        &self,
        topic: &str,
        constraints: &LookupConstraints,
    ) -> CoachResult<Vec<Resource>> {
        let resources: Vec<Resource> = constraints
            .kinds
            .iter()
            .flat_map(|kind| Self::resources_for(topic, *kind, constraints.level))
            .collect();
        debug!(topic, count = resources.len(), "catalog lookup");
        Ok(resources)
    }
}
