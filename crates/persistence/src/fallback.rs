//! Ordered-attempt query resolution over historical link fields.
//!
//! Alert emitters linked documents to groups through `circleIds`, then
//! `circleId`, then `groupId`, without migrating older data. A [`FallbackPlan`]
//! lists those link fields in preference order and drives a small state
//! machine: each link field is tried ordered first; a failing ordered query is
//! retried unordered; an empty or failing attempt advances to the next link
//! field.
//!
//! In [`FallbackMode::FirstSuccess`] the first attempt that returns documents
//! wins and no later attempt is issued. In [`FallbackMode::Union`] a link
//! field that returns documents ends its own ordered/unordered demotion and
//! the walk continues with the next link field; results are unioned and
//! de-duplicated by id. Live subscriptions walk the same [`Step`] transitions.

use serde_json::Value;
use shared::Document;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::metrics::{record_fallback_attempt, record_fallback_exhausted};
use crate::store::{DocumentStore, Query};

/// Field linking a document to its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkField {
    /// Array of group ids, matched with array-contains.
    CircleIds,
    CircleId,
    GroupId,
}

impl LinkField {
    /// Newest to oldest.
    pub const CHAIN: [LinkField; 3] = [LinkField::CircleIds, LinkField::CircleId, LinkField::GroupId];

    pub fn field(&self) -> &'static str {
        match self {
            LinkField::CircleIds => "circleIds",
            LinkField::CircleId => "circleId",
            LinkField::GroupId => "groupId",
        }
    }

    pub fn query(&self, collection: &str, group_id: &str) -> Query {
        let query = Query::collection(collection);
        match self {
            LinkField::CircleIds => query.where_array_contains(self.field(), group_id),
            LinkField::CircleId | LinkField::GroupId => query.where_eq(self.field(), group_id),
        }
    }
}

/// Position in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ordered(usize),
    Unordered(usize),
    Exhausted,
}

impl Step {
    pub fn is_ordered(&self) -> bool {
        matches!(self, Step::Ordered(_))
    }

    fn index(&self) -> Option<usize> {
        match self {
            Step::Ordered(i) | Step::Unordered(i) => Some(*i),
            Step::Exhausted => None,
        }
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Found,
    Empty,
    Failed,
}

impl Outcome {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Outcome::Found => "found",
            Outcome::Empty => "empty",
            Outcome::Failed => "failed",
        }
    }
}

/// Whether a successful link field ends the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    FirstSuccess,
    Union,
}

/// The attempts to make for one group lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPlan {
    /// Metric and log label.
    pub name: &'static str,
    pub mode: FallbackMode,
    pub collection: String,
    pub group_id: String,
    pub links: Vec<LinkField>,
    /// Field to order by descending; `None` issues unordered queries only.
    pub order_field: Option<String>,
    pub limit: Option<usize>,
}

impl FallbackPlan {
    /// Full link chain, ordered by `timestamp`, first success wins.
    pub fn group_links(name: &'static str, collection: &str, group_id: &str) -> Self {
        Self {
            name,
            mode: FallbackMode::FirstSuccess,
            collection: collection.to_string(),
            group_id: group_id.to_string(),
            links: LinkField::CHAIN.to_vec(),
            order_field: Some("timestamp".to_string()),
            limit: None,
        }
    }

    /// Visit every link field and union what they return.
    pub fn union(mut self) -> Self {
        self.mode = FallbackMode::Union;
        self
    }

    pub fn with_links(mut self, links: &[LinkField]) -> Self {
        self.links = links.to_vec();
        self
    }

    pub fn unordered(mut self) -> Self {
        self.order_field = None;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn first(&self) -> Step {
        self.step_at(0)
    }

    fn step_at(&self, index: usize) -> Step {
        if index >= self.links.len() {
            Step::Exhausted
        } else if self.order_field.is_some() {
            Step::Ordered(index)
        } else {
            Step::Unordered(index)
        }
    }

    /// Transition after an attempt. In first-success mode `Found` is
    /// terminal and leaves the step unchanged; in union mode it moves on to
    /// the next link field.
    pub fn advance(&self, step: Step, outcome: Outcome) -> Step {
        match (step, outcome) {
            (Step::Exhausted, _) => step,
            (_, Outcome::Found) => match (self.mode, step.index()) {
                (FallbackMode::Union, Some(i)) => self.step_at(i + 1),
                _ => step,
            },
            (Step::Ordered(i), Outcome::Failed) => Step::Unordered(i),
            (Step::Ordered(i), Outcome::Empty) | (Step::Unordered(i), _) => self.step_at(i + 1),
        }
    }

    pub fn link(&self, step: Step) -> Option<LinkField> {
        step.index().and_then(|i| self.links.get(i).copied())
    }

    /// Query issued at `step`, `None` once exhausted.
    ///
    /// The limit only reaches the store on ordered steps. An unordered step
    /// fetches everything so the caller can sort before truncating.
    pub fn query_for(&self, step: Step) -> Option<Query> {
        let link = self.link(step)?;
        let mut query = link.query(&self.collection, &self.group_id);
        if let (Step::Ordered(_), Some(field)) = (step, &self.order_field) {
            query = query.order_by_desc(field.clone());
            if let Some(limit) = self.limit {
                query = query.limit(limit);
            }
        }
        Some(query)
    }
}

/// Result of walking a plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// De-duplicated by id, first occurrence kept.
    pub documents: Vec<Document>,
    /// Link fields whose attempt returned documents, in walk order.
    pub matched: Vec<LinkField>,
    /// Queries issued.
    pub attempts: usize,
    /// True when a successful attempt was unordered, so the caller must sort
    /// the normalized results itself.
    pub client_sorted: bool,
}

/// Drops documents whose id was already seen.
pub fn dedupe_documents(documents: Vec<Document>) -> Vec<Document> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|doc| seen.insert(doc.id.clone()))
        .collect()
}

/// Walks `plan` against `store`.
///
/// Never fails: when every attempt is empty or fails the resolution is
/// empty.
pub async fn resolve(store: &dyn DocumentStore, plan: &FallbackPlan) -> Resolution {
    let mut step = plan.first();
    let mut resolution = Resolution::default();

    while let Some(query) = plan.query_for(step) {
        resolution.attempts += 1;
        let outcome = match store.query(&query).await {
            Ok(documents) if !documents.is_empty() => {
                debug!(
                    chain = plan.name,
                    group_id = %plan.group_id,
                    query = %query.describe(),
                    attempts = resolution.attempts,
                    count = documents.len(),
                    "Fallback attempt matched"
                );
                resolution.documents.extend(documents);
                resolution.matched.extend(plan.link(step));
                resolution.client_sorted |= !step.is_ordered();
                Outcome::Found
            }
            Ok(_) => Outcome::Empty,
            Err(e) => {
                debug!(
                    chain = plan.name,
                    query = %query.describe(),
                    error = %e,
                    "Fallback attempt failed"
                );
                Outcome::Failed
            }
        };
        record_fallback_attempt(plan.name, outcome.label());
        if outcome == Outcome::Found && plan.mode == FallbackMode::FirstSuccess {
            break;
        }
        step = plan.advance(step, outcome);
    }

    if resolution.matched.is_empty() {
        record_fallback_exhausted(plan.name);
        if resolution.attempts > 0 {
            warn!(
                chain = plan.name,
                group_id = %plan.group_id,
                attempts = resolution.attempts,
                "No fallback attempt returned documents"
            );
        }
    }
    resolution.documents = dedupe_documents(resolution.documents);
    resolution
}

/// Value the link field holds for a group, used when writing new documents.
pub fn link_value(link: LinkField, group_id: &str) -> Value {
    match link {
        LinkField::CircleIds => Value::Array(vec![Value::String(group_id.to_string())]),
        LinkField::CircleId | LinkField::GroupId => Value::String(group_id.to_string()),
    }
}
