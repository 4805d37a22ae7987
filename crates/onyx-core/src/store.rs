// ── Cue-list registry ──
//
// The authoritative in-memory table of known cue lists. Two views share
// entity identity: the console-ordered list and the number-indexed map.
// A wholesale reload keeps the existing `Arc` for numbers it has seen
// before, so references held by application code survive.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

use onyx_wire::commands::CueListLine;

use crate::client::ClientInner;
use crate::model::CueList;
use crate::sync::{read, write};

#[derive(Default)]
struct RegistryInner {
    /// Console-reported order.
    order: Vec<Arc<CueList>>,
    /// Same entities, indexed by numeric identifier.
    by_num: HashMap<u32, Arc<CueList>>,
}

pub(crate) struct CueListRegistry {
    inner: RwLock<RegistryInner>,
}

impl CueListRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Replace the inventory wholesale from a `QLList` payload.
    ///
    /// Entities whose number was already known are reused in place
    /// (name refreshed, identity preserved); new numbers allocate fresh
    /// entities; numbers the console no longer reports are dropped.
    pub(crate) fn rebuild(&self, records: &[CueListLine], owner: &Weak<ClientInner>) {
        let mut inner = write(&self.inner);

        let mut order = Vec::with_capacity(records.len());
        let mut by_num = HashMap::with_capacity(records.len());

        for record in records {
            let Some(key) = record.key() else {
                debug!(num = %record.num, "cue list number is not numeric, skipping");
                continue;
            };
            let entity = match inner.by_num.get(&key) {
                Some(existing) => {
                    existing.set_name(&record.name);
                    if let Some(value) = record.value {
                        existing.set_value(value);
                    }
                    Arc::clone(existing)
                }
                None => Arc::new(CueList::new(
                    record.num.clone(),
                    key,
                    record.name.clone(),
                    record.value,
                    owner.clone(),
                )),
            };
            by_num.insert(key, Arc::clone(&entity));
            order.push(entity);
        }

        inner.order = order;
        inner.by_num = by_num;
    }

    /// Apply a `QLActive` payload: membership decides the active flag.
    ///
    /// Numbers absent from the registry (created on the console since the
    /// last inventory reload) are logged and ignored. Returns `true` if
    /// any entity's observable state changed.
    pub(crate) fn apply_active(&self, records: &[CueListLine]) -> bool {
        let inner = read(&self.inner);

        let mut observations: HashMap<u32, Option<u8>> = HashMap::new();
        for record in records {
            match record.key() {
                Some(key) if inner.by_num.contains_key(&key) => {
                    observations.insert(key, record.value);
                }
                _ => {
                    debug!(num = %record.num, "active report names an unknown cue list, ignoring");
                }
            }
        }

        let mut dirty = false;
        for entity in &inner.order {
            match observations.get(&entity.number()) {
                Some(value) => dirty |= entity.apply_observation(true, *value),
                None => dirty |= entity.apply_observation(false, None),
            }
        }
        dirty
    }

    /// Flag every active entity as transitioning to inactive (used by the
    /// release-all commands). Returns `true` if any entity was flagged.
    pub(crate) fn flag_active_releasing(&self) -> bool {
        let inner = read(&self.inner);
        let mut flagged = false;
        for entity in &inner.order {
            if entity.active() {
                entity.begin_transition(false);
                flagged = true;
            }
        }
        flagged
    }

    pub(crate) fn any_transitioning(&self) -> bool {
        read(&self.inner).order.iter().any(|e| e.transitioning())
    }

    /// Snapshot of the console-ordered entity list.
    pub(crate) fn cue_lists(&self) -> Vec<Arc<CueList>> {
        read(&self.inner).order.clone()
    }

    pub(crate) fn get(&self, num: u32) -> Option<Arc<CueList>> {
        read(&self.inner).by_num.get(&num).map(Arc::clone)
    }

    pub(crate) fn len(&self) -> usize {
        read(&self.inner).order.len()
    }
}
