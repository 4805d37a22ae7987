// ── Client orchestration ──
//
// Full lifecycle for one console session: connect, initial inventory
// load, background polling, command surface, and callback dispatch.
// Cheaply cloneable via `Arc<ClientInner>`; the only component exposed
// to the embedding application.

use std::sync::{Arc, Mutex, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use onyx_wire::{MessageCallback, OnyxMessage, Session, commands};

use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::model::CueList;
use crate::poller::poll_task;
use crate::store::CueListRegistry;
use crate::sync::{lock, read, write};

/// Handler invoked after any change to observable cue-list state.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct ClientInner {
    config: ClientConfig,
    session: Mutex<Option<Session>>,
    registry: CueListRegistry,
    on_update: RwLock<Option<UpdateCallback>>,
    on_message: RwLock<Option<MessageCallback>>,
    /// Wakes the poller the instant a user action flags a transition.
    transition_wakeup: tokio::sync::Notify,
    poller_cancel: Mutex<Option<CancellationToken>>,
}

impl ClientInner {
    fn notify_update(&self) {
        if let Some(callback) = read(&self.on_update).as_ref() {
            callback();
        }
    }
}

/// Client for one Obsidian Onyx console.
///
/// Construct with [`new`](Self::new), register callbacks, then
/// [`connect`](Self::connect). The connection loads the cue-list
/// inventory and starts the adaptive poller; from then on the registry
/// tracks the console and `on_update` fires on every observable change.
#[derive(Clone)]
pub struct OnyxClient {
    inner: Arc<ClientInner>,
}

impl OnyxClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                session: Mutex::new(None),
                registry: CueListRegistry::new(),
                on_update: RwLock::new(None),
                on_message: RwLock::new(None),
                transition_wakeup: tokio::sync::Notify::new(),
                poller_cancel: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // ── Callback registration ────────────────────────────────────────

    /// Register the handler fired after any cue-list state change.
    /// Absence is a no-op, not an error.
    pub fn set_on_update(&self, callback: impl Fn() + Send + Sync + 'static) {
        *write(&self.inner.on_update) = Some(Arc::new(callback));
    }

    /// Register the handler fired for every decoded frame, in arrival
    /// order — including the greeting and frames resolving no caller.
    pub fn set_on_message(&self, callback: impl Fn(&OnyxMessage) + Send + Sync + 'static) {
        *write(&self.inner.on_message) = Some(Arc::new(callback));
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect to the console, load the full cue-list state, and start
    /// the background poller.
    ///
    /// A reconnect after a lost session goes through here again: the
    /// inventory is reloaded wholesale rather than patched.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.disconnect();

        let weak = Arc::downgrade(&self.inner);
        let forward: MessageCallback = Arc::new(move |msg: &OnyxMessage| {
            if let Some(inner) = weak.upgrade() {
                if let Some(callback) = read(&inner.on_message).as_ref() {
                    callback(msg);
                }
            }
        });

        let config = &self.inner.config;
        let session = Session::connect(
            &config.host,
            config.port,
            config.connect_timeout,
            Some(forward),
        )
        .await?;
        *lock(&self.inner.session) = Some(session);

        self.load_all().await?;

        let cancel = CancellationToken::new();
        *lock(&self.inner.poller_cancel) = Some(cancel.clone());
        tokio::spawn(poll_task(self.clone(), cancel));

        info!(host = %config.host, port = config.port, "connected to console");
        Ok(())
    }

    /// Stop the poller and tear down the session. Queued and in-flight
    /// callers fail with [`CoreError::ConnectionLost`].
    pub fn disconnect(&self) {
        if let Some(cancel) = lock(&self.inner.poller_cancel).take() {
            cancel.cancel();
        }
        if let Some(session) = lock(&self.inner.session).take() {
            session.close();
            debug!("disconnected from console");
        }
    }

    /// Whether the session transport is currently up.
    pub fn connected(&self) -> bool {
        lock(&self.inner.session)
            .as_ref()
            .is_some_and(Session::connected)
    }

    /// The console's greeting frame, once connected.
    pub fn first_message(&self) -> Option<OnyxMessage> {
        lock(&self.inner.session)
            .as_ref()
            .map(|s| s.first_message().clone())
    }

    fn session(&self) -> Result<Session, CoreError> {
        lock(&self.inner.session)
            .as_ref()
            .cloned()
            .ok_or(CoreError::Disconnected)
    }

    // ── Raw command access ───────────────────────────────────────────

    /// Send a raw command line and wait for its response frame.
    ///
    /// `boosted` requests jump queued routine (non-boosted) commands but
    /// never an exchange already in flight. No timeout is enforced; wrap
    /// in [`tokio::time::timeout`] to bound an individual wait.
    pub async fn send_cmd(
        &self,
        cmd: impl Into<String>,
        boosted: bool,
    ) -> Result<OnyxMessage, CoreError> {
        Ok(self.session()?.send(cmd, boosted).await?)
    }

    /// Send a command and insist on a successful response.
    async fn request(&self, cmd: String, boosted: bool) -> Result<OnyxMessage, CoreError> {
        let response = self.send_cmd(cmd, boosted).await?;
        if response.is_ok() {
            Ok(response)
        } else {
            Err(CoreError::Rejected {
                code: response.code,
                message: response.message,
            })
        }
    }

    /// Request a single payload line (name lookups and the like).
    async fn request_line(&self, cmd: String, boosted: bool) -> Result<String, CoreError> {
        let response = self.request(cmd, boosted).await?;
        response
            .first_data()
            .map(str::to_owned)
            .ok_or(CoreError::UnexpectedResponse {
                reason: "expected a payload line, got none".to_owned(),
            })
    }

    /// Request a yes/no answer.
    async fn request_yes_no(&self, cmd: String, boosted: bool) -> Result<bool, CoreError> {
        let line = self.request_line(cmd, boosted).await?;
        commands::parse_yes_no(&line).ok_or(CoreError::UnexpectedResponse {
            reason: format!("expected yes/no, got {line:?}"),
        })
    }

    // ── Registry loading ─────────────────────────────────────────────

    /// Reload the inventory (`QLList`) then the active set (`QLActive`).
    pub async fn load_all(&self) -> Result<(), CoreError> {
        self.load_available().await?;
        self.load_active().await?;
        Ok(())
    }

    /// Reload the cue-list inventory wholesale (`QLList`).
    ///
    /// Entities already known keep their identity, so references held by
    /// the application stay valid across the reload.
    pub async fn load_available(&self) -> Result<(), CoreError> {
        let response = self.request(commands::available_cue_lists(), false).await?;
        let records: Vec<_> = response
            .data
            .iter()
            .filter_map(|line| commands::parse_cue_list_line(line))
            .collect();

        self.inner
            .registry
            .rebuild(&records, &Arc::downgrade(&self.inner));
        debug!(count = self.inner.registry.len(), "cue list inventory reloaded");
        self.inner.notify_update();
        Ok(())
    }

    /// Refresh active flags from the console (`QLActive`).
    pub async fn load_active(&self) -> Result<(), CoreError> {
        self.refresh_active(false).await?;
        Ok(())
    }

    /// One active-status refresh. Fires `on_update` at most once, after
    /// the whole response is applied. Returns whether anything changed.
    pub(crate) async fn refresh_active(&self, boosted: bool) -> Result<bool, CoreError> {
        let response = self.request(commands::active_cue_lists(), boosted).await?;
        let records: Vec<_> = response
            .data
            .iter()
            .filter_map(|line| commands::parse_cue_list_line(line))
            .collect();

        let changed = self.inner.registry.apply_active(&records);
        if changed {
            self.inner.notify_update();
        }
        Ok(changed)
    }

    // ── Registry access ──────────────────────────────────────────────

    /// Snapshot of the cue lists in console-reported order.
    pub fn cue_lists(&self) -> Vec<Arc<CueList>> {
        self.inner.registry.cue_lists()
    }

    /// Look up a cue list by numeric identifier (`"00018"` → 18).
    pub fn cue_list(&self, num: u32) -> Option<Arc<CueList>> {
        self.inner.registry.get(num)
    }

    /// Look up a cue list by its current name.
    pub fn cue_list_by_name(&self, name: &str) -> Option<Arc<CueList>> {
        self.inner
            .registry
            .cue_lists()
            .into_iter()
            .find(|c| c.name() == name)
    }

    pub(crate) fn any_transitioning(&self) -> bool {
        self.inner.registry.any_transitioning()
    }

    /// Resolves when a user action flags a transition (poller wake-up).
    pub(crate) async fn transition_started(&self) {
        self.inner.transition_wakeup.notified().await;
    }

    /// Optimistically flag a transition: state flips locally before the
    /// command even reaches the wire, and the poller speeds up at once.
    fn flag_transition(&self, cue: &CueList, to: bool) {
        cue.begin_transition(to);
        self.inner.notify_update();
        self.inner.transition_wakeup.notify_one();
    }

    // ── Cue-list operations ──────────────────────────────────────────

    /// Trigger a cue list (`GQL`, boosted).
    pub async fn trigger_cue_list(&self, cue: &CueList) -> Result<OnyxMessage, CoreError> {
        self.flag_transition(cue, true);
        self.request(commands::go_cue_list(cue.num()), true).await
    }

    /// Go to a specific cue within a cue list (`GTQ`, boosted).
    pub async fn trigger_cue(&self, cue: &CueList, number: u32) -> Result<OnyxMessage, CoreError> {
        self.request(commands::go_cue(cue.num(), number), true).await
    }

    /// Pause a cue list (`PQL`, boosted).
    pub async fn pause_cue_list(&self, cue: &CueList) -> Result<OnyxMessage, CoreError> {
        self.request(commands::pause_cue_list(cue.num()), true).await
    }

    /// Release a cue list (`RQL`, boosted).
    pub async fn release_cue_list(&self, cue: &CueList) -> Result<OnyxMessage, CoreError> {
        self.flag_transition(cue, false);
        self.request(commands::release_cue_list(cue.num()), true)
            .await
    }

    /// Set a cue list's level (`SetQLLevel`, boosted). Levels outside
    /// `[0, 255]` fail with [`CoreError::LevelOutOfRange`] before any
    /// I/O and without flagging a transition.
    pub async fn set_cue_list_level(
        &self,
        cue: &CueList,
        level: u16,
    ) -> Result<OnyxMessage, CoreError> {
        let level = u8::try_from(level).map_err(|_| CoreError::LevelOutOfRange { level })?;
        self.flag_transition(cue, true);
        self.request(commands::set_cue_list_level(cue.num(), level), true)
            .await
    }

    /// Is a cue list active on the console right now (`IsQLActive`,
    /// boosted — entity reloads jump queued routine traffic)?
    pub async fn is_cue_list_active(&self, num: &str) -> Result<bool, CoreError> {
        self.request_yes_no(commands::is_cue_list_active(num), true)
            .await
    }

    /// A cue list's name straight from the console (`QLName`, boosted).
    ///
    /// Known to time out on some Onyx versions; consider wrapping in
    /// [`tokio::time::timeout`].
    pub async fn cue_list_name(&self, num: &str) -> Result<String, CoreError> {
        self.request_line(commands::cue_list_name(num), true).await
    }

    // ── Release-all operations ───────────────────────────────────────

    /// Release every cue list (`RAQL`, boosted). All currently active
    /// entities are flagged as transitioning to inactive.
    pub async fn release_all_cue_lists(&self) -> Result<OnyxMessage, CoreError> {
        self.flag_all_releasing();
        self.request(commands::release_all_cue_lists(), true).await
    }

    /// `RAQLDF` — release every cue list, dimmers first.
    pub async fn release_all_cue_lists_dim_first(&self) -> Result<OnyxMessage, CoreError> {
        self.flag_all_releasing();
        self.request(commands::release_all_cue_lists_dim_first(), true)
            .await
    }

    /// `RAQLO` — release every cue list and override.
    pub async fn release_all_cue_lists_and_overrides(&self) -> Result<OnyxMessage, CoreError> {
        self.flag_all_releasing();
        self.request(commands::release_all_cue_lists_and_overrides(), true)
            .await
    }

    /// `RAQLODF` — release every cue list and override, dimmers first.
    pub async fn release_all_cue_lists_and_overrides_dim_first(
        &self,
    ) -> Result<OnyxMessage, CoreError> {
        self.flag_all_releasing();
        self.request(
            commands::release_all_cue_lists_and_overrides_dim_first(),
            true,
        )
        .await
    }

    /// Release all overrides (`RAO`, boosted).
    pub async fn release_all_overrides(&self) -> Result<OnyxMessage, CoreError> {
        self.request(commands::release_all_overrides(), true).await
    }

    fn flag_all_releasing(&self) {
        if self.inner.registry.flag_active_releasing() {
            self.inner.notify_update();
            self.inner.transition_wakeup.notify_one();
        }
    }

    // ── Manager operations ───────────────────────────────────────────

    /// Run an action group (`ACT`).
    pub async fn start_action_group(&self, group: u32) -> Result<OnyxMessage, CoreError> {
        self.request(commands::start_action_group(group), false)
            .await
    }

    /// The manager's action list (`ActList`).
    pub async fn action_list(&self) -> Result<OnyxMessage, CoreError> {
        self.request(commands::action_list(), false).await
    }

    /// Name of a manager action (`ActName`).
    pub async fn action_name(&self, action: u32) -> Result<String, CoreError> {
        self.request_line(commands::action_name(action), false).await
    }

    /// Clear the programmer (`CLRCLR`).
    pub async fn clear_programmer(&self) -> Result<OnyxMessage, CoreError> {
        self.request(commands::clear_programmer(), false).await
    }

    /// Run an internal manager command (`CMD`, boosted).
    pub async fn trigger_command(&self, command: u32) -> Result<OnyxMessage, CoreError> {
        self.request(commands::trigger_command(command), true).await
    }

    /// The manager's internal command list (`CmdList`).
    pub async fn command_list(&self) -> Result<OnyxMessage, CoreError> {
        self.request(commands::command_list(), false).await
    }

    /// Name of an internal manager command (`CmdName`).
    pub async fn command_name(&self, command: u32) -> Result<String, CoreError> {
        self.request_line(commands::command_name(command), false)
            .await
    }

    /// Make a schedule the default schedule (`GSC`, boosted).
    pub async fn trigger_schedule(&self, schedule: u32) -> Result<OnyxMessage, CoreError> {
        self.request(commands::trigger_schedule(schedule), true)
            .await
    }

    /// The server's command help (`Help`).
    pub async fn help(&self) -> Result<OnyxMessage, CoreError> {
        self.request(commands::help(), false).await
    }

    /// Is the Onyx engine running (`IsMxRun`)?
    pub async fn is_mx_running(&self) -> Result<bool, CoreError> {
        self.request_yes_no(commands::is_mx_running(), false).await
    }

    /// Is the scheduler running (`IsSchRun`)?
    pub async fn is_scheduler_running(&self) -> Result<bool, CoreError> {
        self.request_yes_no(commands::is_scheduler_running(), false)
            .await
    }

    /// Last `lines` log entries (`Lastlog`, 300 max server-side).
    pub async fn recent_log(&self, lines: u32) -> Result<OnyxMessage, CoreError> {
        self.request(commands::recent_log(lines), false).await
    }

    /// The manager's schedule list (`SchList`).
    pub async fn schedule_list(&self) -> Result<OnyxMessage, CoreError> {
        self.request(commands::schedule_list(), false).await
    }

    /// Name of a manager schedule (`SchName`).
    pub async fn schedule_name(&self, schedule: u32) -> Result<String, CoreError> {
        self.request_line(commands::schedule_name(schedule), false)
            .await
    }

    /// Return the scheduler to calendar rules (`SchUseCalendar`).
    pub async fn use_calendar_rules(&self) -> Result<OnyxMessage, CoreError> {
        self.request(commands::use_calendar_rules(), false).await
    }

    /// Set the console date (`SetDate`).
    pub async fn set_date(&self, year: u16, month: u8, day: u8) -> Result<OnyxMessage, CoreError> {
        self.request(commands::set_date(year, month, day), false)
            .await
    }

    /// Set the console time, 24h format (`SetTime`).
    pub async fn set_time(
        &self,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<OnyxMessage, CoreError> {
        self.request(commands::set_time(hour, minute, second), false)
            .await
    }

    /// Set a time preset (`SetTimepreset`).
    pub async fn set_time_preset(
        &self,
        preset: u32,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<OnyxMessage, CoreError> {
        self.request(commands::set_time_preset(preset, hour, minute, second), false)
            .await
    }

    /// Set the console's geographical position (`SetPosDec`).
    pub async fn set_position_decimal(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<OnyxMessage, CoreError> {
        self.request(commands::set_position_decimal(lat, lon), false)
            .await
    }

    /// Status report (`Status`).
    pub async fn status(&self) -> Result<OnyxMessage, CoreError> {
        self.request(commands::status(), false).await
    }

    /// The console's time presets (`TimePresetList`).
    pub async fn time_preset_list(&self) -> Result<OnyxMessage, CoreError> {
        self.request(commands::time_preset_list(), false).await
    }

    /// Sign off from the server (`BYE`). The console usually closes the
    /// connection afterwards.
    pub async fn bye(&self) -> Result<OnyxMessage, CoreError> {
        self.request(commands::bye(), false).await
    }
}
