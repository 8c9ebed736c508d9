//! Policy data model: `{id, version, effect, subjects, resources,
//! actions, conditions, priority, status}`, evaluated deterministically by
//! [`super::Authorizer`].

use std::sync::Arc;

use super::matcher::Matcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStatus {
    Enabled,
    Disabled,
}

/// The `{time, ip, attributes}` a condition predicate evaluates against. Conditions
/// are pure and side-effect free.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub time_millis: u64,
    pub ip: Option<String>,
    pub attributes: Vec<(String, String)>,
}

impl RequestContext {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// A pure predicate over a [`RequestContext`].
pub trait Condition: Send + Sync {
    fn evaluate(&self, ctx: &RequestContext) -> bool;
}

impl<F> Condition for F
where
    F: Fn(&RequestContext) -> bool + Send + Sync,
{
    fn evaluate(&self, ctx: &RequestContext) -> bool {
        self(ctx)
    }
}

#[derive(Clone)]
pub struct Policy {
    pub id: String,
    pub version: u64,
    pub effect: Effect,
    pub subjects: Vec<Matcher>,
    pub resources: Vec<Matcher>,
    pub actions: Vec<Matcher>,
    pub conditions: Vec<Arc<dyn Condition>>,
    pub priority: i64,
    pub status: PolicyStatus,
}

impl Policy {
    pub fn new(id: impl Into<String>, effect: Effect) -> Self {
        Self {
            id: id.into(),
            version: 1,
            effect,
            subjects: vec![Matcher::Wildcard],
            resources: vec![Matcher::Wildcard],
            actions: vec![Matcher::Wildcard],
            conditions: Vec::new(),
            priority: 0,
            status: PolicyStatus::Enabled,
        }
    }

    pub fn with_subjects(mut self, patterns: &[&str]) -> Self {
        self.subjects = patterns.iter().map(|p| Matcher::parse(p)).collect();
        self
    }

    pub fn with_resources(mut self, patterns: &[&str]) -> Self {
        self.resources = patterns.iter().map(|p| Matcher::parse(p)).collect();
        self
    }

    pub fn with_actions(mut self, patterns: &[&str]) -> Self {
        self.actions = patterns.iter().map(|p| Matcher::parse(p)).collect();
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: Arc<dyn Condition>) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.status = PolicyStatus::Disabled;
        self
    }

    pub(super) fn applies_to(&self, subject: &str, action: &str, resource: &str) -> bool {
        self.status == PolicyStatus::Enabled
            && super::matcher::best_match(&self.subjects, subject).is_some()
            && super::matcher::best_match(&self.actions, action).is_some()
            && super::matcher::best_match(&self.resources, resource).is_some()
    }

    pub(super) fn conditions_hold(&self, ctx: &RequestContext) -> bool {
        self.conditions.iter().all(|c| c.evaluate(ctx))
    }
}
