//! ContextManager: three-tier token-budgeted context with eviction, relevance scoring,
//! and constraint contradiction detection.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::event::EventStore;
use crate::event::types::{ErrorKind, EventType};

use super::types::{ContextItem, ContextTier, ItemKind, TierName};

pub const DEFAULT_PINNED_CAP: u32 = 2000;
pub const DEFAULT_WORKING_CAP: u32 = 4000;
pub const DEFAULT_LONGTERM_CAP: u32 = 20000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextManager {
    pub pinned: ContextTier,
    pub working: ContextTier,
    pub longterm: ContextTier,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self {
            pinned: ContextTier::new(TierName::Pinned, DEFAULT_PINNED_CAP),
            working: ContextTier::new(TierName::Working, DEFAULT_WORKING_CAP),
            longterm: ContextTier::new(TierName::Longterm, DEFAULT_LONGTERM_CAP),
        }
    }
}

impl ContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tier(&self, name: TierName) -> &ContextTier {
        match name {
            TierName::Pinned => &self.pinned,
            TierName::Working => &self.working,
            TierName::Longterm => &self.longterm,
        }
    }

    fn tier_mut(&mut self, name: TierName) -> &mut ContextTier {
        match name {
            TierName::Pinned => &mut self.pinned,
            TierName::Working => &mut self.working,
            TierName::Longterm => &mut self.longterm,
        }
    }

    /// Add `item` to `tier_name`, evicting lower-priority items if necessary.
    /// Returns `false` (and emits `ERROR_RAISED{context_overflow}`) if no amount of eviction
    /// would make room.
    pub fn add_item(&mut self, tier_name: TierName, mut item: ContextItem, store: &mut EventStore) -> bool {
        let required = item.tokens;
        let tier = self.tier(tier_name);
        if tier.current_tokens + required > tier.max_tokens && !self.make_room(tier_name, required, store) {
            store.append(
                EventType::ErrorRaised,
                serde_json::json!({"kind": ErrorKind::ContextOverflow, "tier": tier_name, "required": required}),
            );
            return false;
        }

        let now = Utc::now();
        item.created_at = now;
        item.accessed_at = now;
        item.access_count = 0;
        let item_id = item.id.clone();
        let item_tokens = item.tokens;

        let tier = self.tier_mut(tier_name);
        tier.items.push(item);
        tier.current_tokens += item_tokens;

        store.append(EventType::ContextUpdated, serde_json::json!({"op": "add", "id": item_id, "tier": tier_name}));
        true
    }

    /// Free at least `required` tokens of headroom in `tier_name` by evicting items
    /// ascending by priority then access_count, excluding `constraint` items (never evictable).
    /// Evicted items move to `longterm` (if evicting elsewhere) or are discarded (from longterm).
    fn make_room(&mut self, tier_name: TierName, required: u32, store: &mut EventStore) -> bool {
        let tier = self.tier(tier_name);
        let overage = (tier.current_tokens + required).saturating_sub(tier.max_tokens);

        let mut candidates: Vec<usize> = tier
            .items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.kind != ItemKind::Constraint)
            .map(|(idx, _)| idx)
            .collect();
        candidates.sort_by(|&a, &b| {
            let ia = &tier.items[a];
            let ib = &tier.items[b];
            ia.priority.cmp(&ib.priority).then(ia.access_count.cmp(&ib.access_count))
        });

        let mut freed = 0u32;
        let mut chosen = Vec::new();
        for idx in candidates {
            if freed >= overage {
                break;
            }
            freed += tier.items[idx].tokens;
            chosen.push(idx);
        }
        if freed < overage {
            return false;
        }

        chosen.sort_unstable_by(|a, b| b.cmp(a)); // remove back-to-front to keep indices valid
        let tier_mut = self.tier_mut(tier_name);
        let mut evicted = Vec::new();
        for idx in chosen {
            let item = tier_mut.items.remove(idx);
            tier_mut.current_tokens -= item.tokens;
            evicted.push(item);
        }

        for item in evicted {
            let item_id = item.id.clone();
            if tier_name == TierName::Longterm {
                store.append(EventType::ContextUpdated, serde_json::json!({"op": "discard", "id": item_id}));
            } else {
                store.append(EventType::ContextUpdated, serde_json::json!({"op": "evict_to_longterm", "id": item_id}));
                self.add_item(TierName::Longterm, item, store);
            }
        }
        true
    }

    /// Move an item between tiers. On target-capacity failure the source is restored.
    pub fn move_item(&mut self, id: &str, to_tier: TierName, store: &mut EventStore) -> bool {
        let Some((from_tier, idx)) = self.locate(id) else { return false };
        if from_tier == to_tier {
            return true;
        }
        let from = self.tier_mut(from_tier);
        let item = from.items.remove(idx);
        from.current_tokens -= item.tokens;

        let item_for_retry = item.clone();
        if self.add_item(to_tier, item, store) {
            true
        } else {
            let restore = self.tier_mut(from_tier);
            restore.items.push(item_for_retry.clone());
            restore.current_tokens += item_for_retry.tokens;
            false
        }
    }

    fn locate(&self, id: &str) -> Option<(TierName, usize)> {
        for name in [TierName::Pinned, TierName::Working, TierName::Longterm] {
            if let Some(idx) = self.tier(name).items.iter().position(|i| i.id == id) {
                return Some((name, idx));
            }
        }
        None
    }

    /// Select context for a task prompt: all pinned (up to `max_tokens`), then working by
    /// relevance, then (if under 80% full) longterm by relevance.
    pub fn select_context(&mut self, task_prompt: &str, max_tokens: u32) -> Vec<ContextItem> {
        let query_words: Vec<String> = task_prompt.split_whitespace().map(|w| w.to_lowercase()).collect();
        let now = Utc::now();
        let mut selected = Vec::new();
        let mut used = 0u32;

        let pinned_ids: Vec<String> = self.pinned.items.iter().map(|i| i.id.clone()).collect();
        for id in pinned_ids {
            if used >= max_tokens {
                break;
            }
            if let Some(item) = self.touch(TierName::Pinned, &id, now) {
                used += item.tokens;
                selected.push(item);
            }
        }

        let mut working_scored: Vec<(String, f64)> = self
            .working
            .items
            .iter()
            .map(|i| (i.id.clone(), relevance_score(i, &query_words, now)))
            .collect();
        working_scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (id, _) in working_scored {
            if used >= max_tokens {
                break;
            }
            if let Some(item) = self.touch(TierName::Working, &id, now) {
                if used + item.tokens > max_tokens {
                    continue;
                }
                used += item.tokens;
                selected.push(item);
            }
        }

        if used < (max_tokens * 4) / 5 {
            let mut longterm_scored: Vec<(String, f64)> = self
                .longterm
                .items
                .iter()
                .map(|i| (i.id.clone(), relevance_score(i, &query_words, now)))
                .collect();
            longterm_scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            for (id, _) in longterm_scored {
                if used >= max_tokens {
                    break;
                }
                if let Some(item) = self.touch(TierName::Longterm, &id, now) {
                    if used + item.tokens > max_tokens {
                        continue;
                    }
                    used += item.tokens;
                    selected.push(item);
                }
            }
        }

        selected
    }

    fn touch(&mut self, tier_name: TierName, id: &str, now: chrono::DateTime<Utc>) -> Option<ContextItem> {
        let tier = self.tier_mut(tier_name);
        let item = tier.items.iter_mut().find(|i| i.id == id)?;
        item.access_count += 1;
        item.accessed_at = now;
        Some(item.clone())
    }

    /// Deterministic textual snapshot of all tiers.
    pub fn summarize_context(&self, action_count: u32, store: &mut EventStore) -> String {
        let mut out = String::new();
        out.push_str(&format!("Context summary after {action_count} actions\n"));
        out.push_str(&format!(
            "pinned: {} items, {}/{} tokens\n",
            self.pinned.items.len(),
            self.pinned.current_tokens,
            self.pinned.max_tokens
        ));
        for item in &self.pinned.items {
            let preview: String = item.content.chars().take(100).collect();
            out.push_str(&format!("  - {preview}\n"));
        }
        out.push_str(&format!(
            "working: {} items, {}/{} tokens\n",
            self.working.items.len(),
            self.working.current_tokens,
            self.working.max_tokens
        ));
        for item in self.working.items.iter().take(5) {
            let preview: String = item.content.chars().take(100).collect();
            out.push_str(&format!("  - {preview}\n"));
        }
        out.push_str(&format!(
            "longterm: {} items, {}/{} tokens\n",
            self.longterm.items.len(),
            self.longterm.current_tokens,
            self.longterm.max_tokens
        ));

        store.append(EventType::CheckpointCreated, serde_json::json!({"trigger": "periodic", "action_count": action_count}));
        out
    }

    /// Check `content` against every pinned `constraint` item; emit `CONTRADICTION_DETECTED`
    /// if any conflicts are found, returning the list of conflict descriptions.
    pub fn detect_contradictions(&self, content: &str, store: &mut EventStore) -> Vec<String> {
        let conflicts: Vec<String> = self
            .pinned
            .items
            .iter()
            .filter(|i| i.kind == ItemKind::Constraint)
            .filter_map(|constraint| detect_conflict(&constraint.content, content))
            .collect();

        if !conflicts.is_empty() {
            store.append(EventType::ContradictionDetected, serde_json::json!({"conflicts": conflicts}));
        }
        conflicts
    }
}

fn lower_contains(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn word_overlap_ratio(query: &str, content: &str) -> f64 {
    let words: Vec<&str> = query.split_whitespace().collect();
    if words.is_empty() {
        return 1.0;
    }
    let content_lower = content.to_lowercase();
    let matched = words.iter().filter(|w| content_lower.contains(&w.to_lowercase())).count();
    matched as f64 / words.len() as f64
}

fn detect_conflict(constraint: &str, content: &str) -> Option<String> {
    let lower = constraint.to_lowercase();

    if let Some(idx) = lower.find("must not ") {
        let x = constraint[idx + "must not ".len()..].trim();
        if !x.is_empty() && lower_contains(content, x) {
            return Some(format!("constraint '{constraint}' forbids '{x}' but new content contains it"));
        }
    }

    if let Some(idx) = lower.find("must ") {
        if !lower[idx..].starts_with("must not") {
            let y = constraint[idx + "must ".len()..].trim();
            if !y.is_empty() {
                let ratio = word_overlap_ratio(y, content);
                if ratio < 0.5 {
                    return Some(format!(
                        "constraint '{constraint}' requires '{y}' but new content only partially matches ({ratio:.2})"
                    ));
                }
            }
        }
    }

    if let Some(idx) = lower.find("never ") {
        let z = constraint[idx + "never ".len()..].trim();
        if !z.is_empty() && lower_contains(content, z) {
            return Some(format!("constraint '{constraint}' says never '{z}' but new content contains it"));
        }
    }

    None
}

/// `0.5 * keyword_overlap + 0.3 * (priority/100) + 0.2 * max(0, recency)`, `recency = 1 - age_days/7`.
fn relevance_score(item: &ContextItem, query_words: &[String], now: chrono::DateTime<Utc>) -> f64 {
    let keyword_overlap = if query_words.is_empty() {
        0.0
    } else {
        let content_lower = item.content.to_lowercase();
        let matched = query_words.iter().filter(|w| content_lower.contains(w.as_str())).count();
        matched as f64 / query_words.len() as f64
    };
    let priority_component = item.priority as f64 / 100.0;
    let age_days = (now - item.created_at).num_seconds() as f64 / 86400.0;
    let recency = (1.0 - age_days / 7.0).max(0.0);
    0.5 * keyword_overlap + 0.3 * priority_component + 0.2 * recency
}
