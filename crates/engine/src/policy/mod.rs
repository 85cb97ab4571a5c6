// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy engine: scoped, prioritized authorization of tool calls.

mod defaults;
mod matcher;

pub use defaults::default_rules;

use crate::error::PolicyError;
use crate::event_bus::EventBus;
use matcher::{pattern_matches, scope_matches, target_matches};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use wd_core::{
    names, IdGen, PolicyDecision, PolicyRequest, PolicyRule, PolicyRulePatch, ScopeKind,
};
use wd_storage::Storage;

/// Storage table for rules.
pub const RULES_TABLE: &str = "policy_rules";

/// Partial-scope filter for [`PolicyEngine::list_rules`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFilter {
    #[serde(default)]
    pub kind: Option<ScopeKind>,
    /// Matches rules listing this member (exactly, or via one of their patterns).
    #[serde(default)]
    pub member: Option<String>,
}

impl RuleFilter {
    fn accepts(&self, rule: &PolicyRule) -> bool {
        if self.kind.is_some_and(|k| k != rule.scope.kind) {
            return false;
        }
        match &self.member {
            Some(member) => rule
                .scope
                .members
                .iter()
                .any(|m| m == member || pattern_matches(m, member)),
            None => true,
        }
    }
}

/// Stored form: the rule plus its insertion sequence, so ties keep their order across restarts.
#[derive(Serialize, Deserialize)]
struct StoredRule {
    seq: u64,
    rule: PolicyRule,
}

struct RuleCache {
    rules: Vec<StoredRule>,
    next_seq: u64,
}

pub struct PolicyEngine {
    bus: EventBus,
    storage: Arc<dyn Storage>,
    ids: Arc<dyn IdGen>,
    cache: Mutex<RuleCache>,
}

impl PolicyEngine {
    /// Load rules from storage, seeding the defaults into an empty store.
    pub async fn init(
        bus: EventBus,
        storage: Arc<dyn Storage>,
        ids: Arc<dyn IdGen>,
    ) -> Result<Self, PolicyError> {
        storage
            .ensure_table(RULES_TABLE, &json!({"key": "id", "fields": ["seq", "rule"]}))
            .await?;

        let mut rules = Vec::new();
        for record in storage.query(RULES_TABLE, None).await? {
            let stored: StoredRule =
                serde_json::from_value(record.value).map_err(|e| PolicyError::CorruptRule {
                    id: record.key.clone(),
                    message: e.to_string(),
                })?;
            rules.push(stored);
        }
        rules.sort_by_key(|r| r.seq);
        let next_seq = rules.last().map_or(1, |r| r.seq + 1);

        let engine = Self {
            bus,
            storage,
            ids,
            cache: Mutex::new(RuleCache { rules, next_seq }),
        };

        if engine.cache.lock().rules.is_empty() {
            for rule in default_rules() {
                engine.insert(rule).await?;
            }
            tracing::info!("seeded default policy rules");
        }
        Ok(engine)
    }

    /// Authorize a request. Always emits `policy:decision`.
    pub fn evaluate(&self, request: &PolicyRequest) -> PolicyDecision {
        let mut candidates: Vec<PolicyRule> = {
            let cache = self.cache.lock();
            cache
                .rules
                .iter()
                .map(|s| &s.rule)
                .filter(|r| r.enabled && scope_matches(&r.scope, request))
                .cloned()
                .collect()
        };
        // Stable: equal priorities keep insertion order.
        candidates.sort_by_key(|r| std::cmp::Reverse(r.priority));

        let decision = candidates
            .iter()
            .find(|r| target_matches(&r.target, request))
            .map(PolicyDecision::from_rule)
            .unwrap_or_else(PolicyDecision::default_allow);

        tracing::debug!(
            tool = %request.tool,
            agent = request.agent_id.as_deref().unwrap_or(""),
            action = %decision.action,
            rule = decision.rule.as_ref().map_or("", |r| r.id.as_str()),
            "policy decision"
        );
        self.bus.emit(
            names::POLICY_DECISION,
            json!({
                "tool": request.tool,
                "action": request.action,
                "userId": request.user_id,
                "channelId": request.channel_id,
                "workflowId": request.workflow_id,
                "agentId": request.agent_id,
                "allowed": decision.allowed,
                "decision": decision.action,
                "ruleId": decision.rule.as_ref().map(|r| r.id.clone()),
                "reason": decision.reason,
            }),
        );
        decision
    }

    /// Add a rule. A blank id is replaced with a generated one.
    pub async fn add_rule(&self, mut rule: PolicyRule) -> Result<PolicyRule, PolicyError> {
        if rule.id.trim().is_empty() {
            rule.id = self.ids.next_prefixed("rule");
        }
        if rule.name.trim().is_empty() {
            return Err(PolicyError::InvalidRule("rule name is required".to_string()));
        }
        let rule = self.insert(rule).await?;
        self.bus.emit(names::POLICY_RULE_ADDED, json!(rule));
        Ok(rule)
    }

    pub async fn remove_rule(&self, id: &str) -> Result<PolicyRule, PolicyError> {
        let removed = {
            let mut cache = self.cache.lock();
            let index = cache
                .rules
                .iter()
                .position(|s| s.rule.id == id)
                .ok_or_else(|| PolicyError::RuleNotFound(id.to_string()))?;
            cache.rules.remove(index).rule
        };
        self.storage.delete(RULES_TABLE, id).await?;
        self.bus.emit(names::POLICY_RULE_REMOVED, json!(removed));
        Ok(removed)
    }

    pub async fn update_rule(
        &self,
        id: &str,
        patch: PolicyRulePatch,
    ) -> Result<PolicyRule, PolicyError> {
        let (seq, updated) = {
            let mut cache = self.cache.lock();
            let stored = cache
                .rules
                .iter_mut()
                .find(|s| s.rule.id == id)
                .ok_or_else(|| PolicyError::RuleNotFound(id.to_string()))?;
            stored.rule.apply(patch);
            (stored.seq, stored.rule.clone())
        };
        self.persist(seq, &updated).await?;
        self.bus.emit(names::POLICY_RULE_UPDATED, json!(updated));
        Ok(updated)
    }

    pub fn get_rule(&self, id: &str) -> Option<PolicyRule> {
        self.cache
            .lock()
            .rules
            .iter()
            .find(|s| s.rule.id == id)
            .map(|s| s.rule.clone())
    }

    /// Rules in insertion order, narrowed by partial scope.
    pub fn list_rules(&self, filter: &RuleFilter) -> Vec<PolicyRule> {
        self.cache
            .lock()
            .rules
            .iter()
            .map(|s| &s.rule)
            .filter(|r| filter.accepts(r))
            .cloned()
            .collect()
    }

    async fn insert(&self, rule: PolicyRule) -> Result<PolicyRule, PolicyError> {
        let seq = {
            let mut cache = self.cache.lock();
            if cache.rules.iter().any(|s| s.rule.id == rule.id) {
                return Err(PolicyError::DuplicateRule(rule.id));
            }
            let seq = cache.next_seq;
            cache.next_seq += 1;
            cache.rules.push(StoredRule {
                seq,
                rule: rule.clone(),
            });
            seq
        };
        self.persist(seq, &rule).await?;
        Ok(rule)
    }

    async fn persist(&self, seq: u64, rule: &PolicyRule) -> Result<(), PolicyError> {
        let value = serde_json::to_value(StoredRule {
            seq,
            rule: rule.clone(),
        })
        .map_err(|e| PolicyError::InvalidRule(e.to_string()))?;
        self.storage.set(RULES_TABLE, &rule.id, value).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
