use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tapflow_common::{FlowRule, MAX_MATCH_FIELDS, RULE_SLOTS};

use crate::{Error, Result};

/// Userspace mirror of the fixed kernel rule table.
///
/// Readers take a snapshot per packet and never see a half-written slot;
/// writers copy the current slots, edit the copy and swap it in whole.
/// The generation counter bumps once per accepted update, so a consumer
/// can tell whether two snapshots came from the same table state.
pub struct RuleTable {
    slots: ArcSwap<[FlowRule; RULE_SLOTS]>,
    generation: AtomicU64,
    // Serializes the copy-edit-swap sequence. Readers never take it.
    write_lock: Mutex<()>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self {
            slots: ArcSwap::from_pointee([FlowRule::empty(); RULE_SLOTS]),
            generation: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Immutable view of every slot. Stays valid across later updates.
    pub fn snapshot(&self) -> Arc<[FlowRule; RULE_SLOTS]> {
        self.slots.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Install `rule` at `index`, replacing whatever the slot held.
    pub fn set(&self, index: u32, rule: FlowRule) -> Result<()> {
        if rule.action > MAX_MATCH_FIELDS {
            tracing::warn!(
                index,
                threshold = rule.action,
                "rule can never fire: threshold exceeds the attainable match count"
            );
        }
        self.update(index, rule)
    }

    /// Disable the slot at `index`.
    pub fn clear(&self, index: u32) -> Result<()> {
        self.update(index, FlowRule::empty())
    }

    /// Replace the whole table at once. Slots past `rules.len()` are disabled.
    pub fn replace_all(&self, rules: &[FlowRule]) -> Result<()> {
        if rules.len() > RULE_SLOTS {
            return Err(Error::InvalidIndex(rules.len() as u32 - 1));
        }
        let mut next = [FlowRule::empty(); RULE_SLOTS];
        next[..rules.len()].copy_from_slice(rules);

        let guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.slots.store(Arc::new(next));
        self.generation.fetch_add(1, Ordering::Relaxed);
        drop(guard);
        Ok(())
    }

    fn update(&self, index: u32, rule: FlowRule) -> Result<()> {
        if index as usize >= RULE_SLOTS {
            return Err(Error::InvalidIndex(index));
        }
        let guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = **self.slots.load();
        next[index as usize] = rule;
        self.slots.store(Arc::new(next));
        self.generation.fetch_add(1, Ordering::Relaxed);
        drop(guard);
        Ok(())
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new()
    }
}
