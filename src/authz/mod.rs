//! Authorizer: policy evaluation over `(subject, action, resource)`, following
//! `control/auth.rs`'s "try in order, fail closed by default" shape, built fresh as
//! policy-set evaluation rather than provider-chaining, since this evaluates
//! policies against a request rather than authenticating commands against
//! providers. The fail-closed default and explicit `Result`-free, match-based
//! control flow carry over.

pub mod matcher;
pub mod policy;

pub use matcher::Matcher;
pub use policy::{Condition, Effect, Policy, PolicyStatus, RequestContext};

use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
    pub matched_policy_id: Option<String>,
}

#[derive(Default)]
pub struct Authorizer {
    policies: DashMap<String, Policy>,
}

impl Authorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_policy(&self, policy: Policy) {
        self.policies.insert(policy.id.clone(), policy);
    }

    pub fn remove_policy(&self, id: &str) -> bool {
        self.policies.remove(id).is_some()
    }

    /// Evaluates all enabled policies against `(subject, action, resource)`:
    /// 1. filter to policies whose matchers all match,
    /// 2. deny-overrides: any applicable `Deny` wins,
    /// 3. else any applicable `Allow` whose conditions all hold wins,
    /// 4. else default-deny,
    /// 5. ties broken by highest `priority`, then lexicographically smallest `id`.
    pub fn authorize(&self, subject: &str, action: &str, resource: &str, ctx: &RequestContext) -> Decision {
        let applicable: Vec<Policy> = self
            .policies
            .iter()
            .map(|e| e.value().clone())
            .filter(|p| p.applies_to(subject, action, resource))
            .collect();

        let denies: Vec<&Policy> = applicable.iter().filter(|p| p.effect == Effect::Deny).collect();
        if let Some(winner) = pick_winner(&denies) {
            return Decision {
                allowed: false,
                reason: format!("denied by policy {}", winner.id),
                matched_policy_id: Some(winner.id.clone()),
            };
        }

        let allows: Vec<&Policy> =
            applicable.iter().filter(|p| p.effect == Effect::Allow && p.conditions_hold(ctx)).collect();
        if let Some(winner) = pick_winner(&allows) {
            return Decision {
                allowed: true,
                reason: format!("allowed by policy {}", winner.id),
                matched_policy_id: Some(winner.id.clone()),
            };
        }

        Decision { allowed: false, reason: "no applicable policy; default deny".to_string(), matched_policy_id: None }
    }
}

fn pick_winner<'a>(candidates: &[&'a Policy]) -> Option<&'a Policy> {
    candidates
        .iter()
        .copied()
        .max_by(|a, b| a.priority.cmp(&b.priority).then_with(|| b.id.cmp(&a.id)))
}
