//! Cue-list entities.
//!
//! A [`CueList`] is shared between the registry's ordered view and its
//! number-indexed view via `Arc`, so references held by application code
//! stay valid across reloads. Observable state lives behind an interior
//! lock; identity (`num`) is fixed at creation.
//!
//! Entity methods delegate to the owning client through a non-owning
//! [`Weak`] back-reference — the entity never keeps the client alive.

use std::sync::{RwLock, Weak};

use onyx_wire::OnyxMessage;

use crate::client::{ClientInner, OnyxClient};
use crate::error::CoreError;
use crate::sync::{read, write};

#[derive(Debug)]
struct CueListState {
    name: String,
    value: u8,
    active: bool,
    /// The active value a recent action is expected to settle on.
    /// `Some` means the entity is transitioning; a later poll that
    /// confirms the expected steady state clears it.
    transitioning_to: Option<bool>,
}

/// A named, numbered controllable entity on the console.
pub struct CueList {
    /// Zero-padded identifier as the console reports it, e.g. `"00018"`.
    num: String,
    /// Numeric key for map lookups (`"00018"` → 18).
    key: u32,
    state: RwLock<CueListState>,
    client: Weak<ClientInner>,
}

impl CueList {
    pub(crate) fn new(
        num: String,
        key: u32,
        name: String,
        value: Option<u8>,
        client: Weak<ClientInner>,
    ) -> Self {
        Self {
            num,
            key,
            state: RwLock::new(CueListState {
                name,
                value: value.unwrap_or(0),
                active: false,
                transitioning_to: None,
            }),
            client,
        }
    }

    // ── Observable state ─────────────────────────────────────────────

    /// Zero-padded identifier as reported by the console.
    pub fn num(&self) -> &str {
        &self.num
    }

    /// Numeric identifier used for registry lookups.
    pub fn number(&self) -> u32 {
        self.key
    }

    pub fn name(&self) -> String {
        read(&self.state).name.clone()
    }

    /// Level in `[0, 255]`, for cue lists that carry one.
    pub fn value(&self) -> u8 {
        read(&self.state).value
    }

    pub fn active(&self) -> bool {
        read(&self.state).active
    }

    /// `true` while the active state is expected to change imminently,
    /// pending confirmation from the console.
    pub fn transitioning(&self) -> bool {
        read(&self.state).transitioning_to.is_some()
    }

    // ── Console operations (one boosted command each) ────────────────

    /// Trigger this cue list (`GQL`). Optimistically flags the entity as
    /// transitioning before the round trip completes.
    pub async fn trigger(&self) -> Result<OnyxMessage, CoreError> {
        self.client()?.trigger_cue_list(self).await
    }

    /// Jump to a specific cue within this cue list (`GTQ`).
    pub async fn trigger_cue(&self, cue: u32) -> Result<OnyxMessage, CoreError> {
        self.client()?.trigger_cue(self, cue).await
    }

    /// Pause this cue list (`PQL`).
    pub async fn pause(&self) -> Result<OnyxMessage, CoreError> {
        self.client()?.pause_cue_list(self).await
    }

    /// Release this cue list (`RQL`). Optimistically flags the entity as
    /// transitioning.
    pub async fn release(&self) -> Result<OnyxMessage, CoreError> {
        self.client()?.release_cue_list(self).await
    }

    /// Set this cue list's level (`SetQLLevel`). Fails with
    /// [`CoreError::LevelOutOfRange`] for `level > 255` without issuing
    /// any command.
    pub async fn set_level(&self, level: u16) -> Result<OnyxMessage, CoreError> {
        self.client()?.set_cue_list_level(self, level).await
    }

    /// Re-query the console for this entity's active flag (`IsQLActive`).
    pub async fn reload_active(&self) -> Result<(), CoreError> {
        let active = self.client()?.is_cue_list_active(&self.num).await?;
        write(&self.state).active = active;
        Ok(())
    }

    /// Re-query the console for this entity's name (`QLName`).
    ///
    /// Known to time out on some Onyx versions.
    pub async fn reload_name(&self) -> Result<(), CoreError> {
        let name = self.client()?.cue_list_name(&self.num).await?;
        write(&self.state).name = name;
        Ok(())
    }

    fn client(&self) -> Result<OnyxClient, CoreError> {
        self.client
            .upgrade()
            .map(OnyxClient::from_inner)
            .ok_or(CoreError::Disconnected)
    }

    // ── Registry-side mutation ───────────────────────────────────────

    /// Flag the entity as expected to settle on `to`.
    pub(crate) fn begin_transition(&self, to: bool) {
        write(&self.state).transitioning_to = Some(to);
    }

    pub(crate) fn set_name(&self, name: &str) {
        let mut state = write(&self.state);
        if state.name != name {
            state.name = name.to_owned();
        }
    }

    pub(crate) fn set_value(&self, value: u8) {
        write(&self.state).value = value;
    }

    /// Apply one poll observation. Returns `true` if any observable
    /// field changed (including a transition confirmation).
    pub(crate) fn apply_observation(&self, active: bool, value: Option<u8>) -> bool {
        let mut state = write(&self.state);
        let mut dirty = false;

        if state.active != active {
            state.active = active;
            dirty = true;
        }
        if let Some(value) = value {
            if state.value != value {
                state.value = value;
                dirty = true;
            }
        }
        // The expected steady state arrived; the transition is over.
        if state.transitioning_to == Some(active) {
            state.transitioning_to = None;
            dirty = true;
        }

        dirty
    }
}

impl std::fmt::Debug for CueList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = read(&self.state);
        f.debug_struct("CueList")
            .field("num", &self.num)
            .field("name", &state.name)
            .field("value", &state.value)
            .field("active", &state.active)
            .field("transitioning", &state.transitioning_to.is_some())
            .finish()
    }
}
