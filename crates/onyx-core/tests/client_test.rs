// End-to-end client tests against an in-process mock console speaking
// the real line protocol over TCP.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use onyx_core::{ClientConfig, CoreError, OnyxClient};

const GREETING: &str = "200-*****Welcome to Onyx Manager v4.0.1010 build 0!*****\r\n\
                        200-Type HELP for a list of available commands\r\n\
                        200\r\n";

// ── Mock console ────────────────────────────────────────────────────

#[derive(Default)]
struct ConsoleState {
    /// `(num, name)` in console order.
    cue_lists: Vec<(String, String)>,
    /// Numbers of currently active cue lists.
    active: HashSet<String>,
    /// Every command line received, in order.
    received: Vec<String>,
    /// Hold responses to commands with this prefix open for this long.
    hold: Option<(String, Duration)>,
    /// Drop the connection on the next command.
    drop_on_next: bool,
}

fn data_frame(lines: &[String]) -> String {
    let mut out = String::from("200 Ok\r\n");
    for line in lines {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(".\r\n");
    out
}

fn info_ok(cmd: &str) -> String {
    format!("200-Ok\r\n200 {cmd}\r\n")
}

fn info_rejected(cmd: &str) -> String {
    format!(
        "400-I never heard that command before... are you sure?\r\n\
         400-Type HELP for a list of commands\r\n\
         400 {cmd}\r\n"
    )
}

/// Spawn a one-connection mock console. Commands mutate `ConsoleState`
/// the way the real console would: GQL activates, RQL/RAQL deactivate.
async fn spawn_console(state: Arc<Mutex<ConsoleState>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        reader
            .get_mut()
            .write_all(GREETING.as_bytes())
            .await
            .unwrap();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            let cmd = line.trim_end().to_owned();

            let (response, delay) = {
                let mut st = state.lock().unwrap();
                st.received.push(cmd.clone());
                if st.drop_on_next {
                    break;
                }
                let delay = st
                    .hold
                    .as_ref()
                    .filter(|(prefix, _)| cmd.starts_with(prefix.as_str()))
                    .map(|(_, delay)| *delay);
                (respond(&mut st, &cmd), delay)
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if reader
                .get_mut()
                .write_all(response.as_bytes())
                .await
                .is_err()
            {
                break;
            }
        }
    });

    addr
}

fn respond(st: &mut ConsoleState, cmd: &str) -> String {
    if cmd == "QLList" {
        let lines: Vec<String> = st
            .cue_lists
            .iter()
            .map(|(num, name)| format!("{num} - {name}"))
            .collect();
        return data_frame(&lines);
    }
    if cmd == "QLActive" {
        let lines: Vec<String> = st
            .cue_lists
            .iter()
            .filter(|(num, _)| st.active.contains(num))
            .map(|(num, name)| format!("{num} - {name}"))
            .collect();
        if lines.is_empty() {
            return data_frame(&["No Active Qlist in List".to_owned()]);
        }
        return data_frame(&lines);
    }
    if let Some(num) = cmd.strip_prefix("GQL ") {
        st.active.insert(num.to_owned());
        return info_ok(cmd);
    }
    if let Some(num) = cmd.strip_prefix("RQL ") {
        st.active.remove(num);
        return info_ok(cmd);
    }
    if cmd.starts_with("RAQL") {
        st.active.clear();
        return info_ok(cmd);
    }
    if let Some(num) = cmd.strip_prefix("IsQLActive ") {
        let answer = if st.active.contains(num) { "Yes" } else { "No" };
        return data_frame(&[answer.to_owned()]);
    }
    if let Some(num) = cmd.strip_prefix("QLName ") {
        let name = st
            .cue_lists
            .iter()
            .find(|(n, _)| n == num)
            .map_or_else(|| "Unknown".to_owned(), |(_, name)| name.clone());
        return data_frame(&[name]);
    }
    if cmd == "CMD 999" {
        return info_rejected(cmd);
    }
    // Everything else: echo the command as a single payload line.
    data_frame(&[cmd.to_owned()])
}

// ── Helpers ─────────────────────────────────────────────────────────

fn default_state() -> Arc<Mutex<ConsoleState>> {
    Arc::new(Mutex::new(ConsoleState {
        cue_lists: vec![
            ("00001".to_owned(), "House Lights".to_owned()),
            ("00002".to_owned(), "SlimPar".to_owned()),
            ("00004".to_owned(), "LED Tape".to_owned()),
        ],
        ..ConsoleState::default()
    }))
}

fn test_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        connect_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(150),
        fast_poll_interval: Duration::from_millis(50),
    }
}

async fn connected_client(state: &Arc<Mutex<ConsoleState>>) -> OnyxClient {
    let addr = spawn_console(Arc::clone(state)).await;
    let client = OnyxClient::new(test_config(addr));
    client.connect().await.unwrap();
    client
}

/// Poll `cond` until it holds or two seconds elapse.
async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for: {what}");
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_loads_inventory_and_active_state() {
    let state = default_state();
    state.lock().unwrap().active.insert("00002".to_owned());

    let client = connected_client(&state).await;

    assert!(client.connected());
    let greeting = client.first_message().unwrap();
    assert!(greeting.message.contains("Welcome to Onyx Manager"));

    let cue_lists = client.cue_lists();
    assert_eq!(cue_lists.len(), 3);
    assert_eq!(cue_lists[0].name(), "House Lights");

    // Ordered view and indexed view share entity identity.
    assert!(Arc::ptr_eq(&cue_lists[1], &client.cue_list(2).unwrap()));
    assert!(Arc::ptr_eq(
        &cue_lists[2],
        &client.cue_list_by_name("LED Tape").unwrap()
    ));

    assert!(client.cue_list(2).unwrap().active());
    assert!(!client.cue_list(1).unwrap().active());

    client.disconnect();
}

#[tokio::test]
async fn reload_preserves_entity_identity() {
    let state = default_state();
    let client = connected_client(&state).await;

    let held = client.cue_list(1).unwrap();
    client.load_available().await.unwrap();
    client.load_available().await.unwrap();

    assert!(Arc::ptr_eq(&held, &client.cue_list(1).unwrap()));
    client.disconnect();
}

#[tokio::test]
async fn trigger_flags_transition_before_the_round_trip_completes() {
    let state = default_state();
    state.lock().unwrap().hold = Some(("GQL".to_owned(), Duration::from_millis(200)));

    let client = connected_client(&state).await;
    let cue = client.cue_list(1).unwrap();

    let trigger = {
        let cue = Arc::clone(&cue);
        tokio::spawn(async move { cue.trigger().await })
    };

    // The flag flips synchronously with issuance, while the response is
    // still being held open by the console.
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(cue.transitioning());
    assert!(!cue.active());

    trigger.await.unwrap().unwrap();
    client.disconnect();
}

#[tokio::test]
async fn poll_confirms_trigger_and_fires_update_once() {
    let state = default_state();
    let client = connected_client(&state).await;

    let updates = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&updates);
    client.set_on_update(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // Steady state: polls observe no change, no updates fire.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(updates.load(Ordering::SeqCst), 0);

    let cue = client.cue_list(1).unwrap();
    cue.trigger().await.unwrap();
    assert!(cue.transitioning());

    wait_for("trigger confirmation", || {
        cue.active() && !cue.transitioning()
    })
    .await;

    // One update for the optimistic flag, one for the confirming tick.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(updates.load(Ordering::SeqCst), 2);

    client.disconnect();
}

#[tokio::test]
async fn release_confirms_via_poll() {
    let state = default_state();
    state.lock().unwrap().active.insert("00001".to_owned());

    let client = connected_client(&state).await;
    let cue = client.cue_list(1).unwrap();
    assert!(cue.active());

    cue.release().await.unwrap();
    assert!(cue.transitioning());

    wait_for("release confirmation", || {
        !cue.active() && !cue.transitioning()
    })
    .await;

    client.disconnect();
}

#[tokio::test]
async fn release_all_flags_every_active_entity() {
    let state = default_state();
    {
        let mut st = state.lock().unwrap();
        st.active.insert("00001".to_owned());
        st.active.insert("00002".to_owned());
    }

    let client = connected_client(&state).await;
    assert!(client.cue_list(1).unwrap().active());

    client.release_all_cue_lists().await.unwrap();
    assert!(client.cue_list(1).unwrap().transitioning());
    assert!(client.cue_list(2).unwrap().transitioning());
    // Never active, never flagged.
    assert!(!client.cue_list(4).unwrap().transitioning());

    wait_for("release-all settles", || {
        let cues = client.cue_lists();
        cues.iter().all(|c| !c.active() && !c.transitioning())
    })
    .await;

    client.disconnect();
}

#[tokio::test]
async fn set_level_out_of_range_never_reaches_the_wire() {
    let state = default_state();
    let client = connected_client(&state).await;
    let cue = client.cue_list(1).unwrap();

    let err = cue.set_level(300).await.unwrap_err();
    assert!(matches!(err, CoreError::LevelOutOfRange { level: 300 }));
    assert!(!cue.transitioning());

    // No SetQLLevel command was sent.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        !state
            .lock()
            .unwrap()
            .received
            .iter()
            .any(|cmd| cmd.starts_with("SetQLLevel"))
    );

    // An in-range level goes out boosted and flags the transition.
    cue.set_level(128).await.unwrap();
    assert!(
        state
            .lock()
            .unwrap()
            .received
            .contains(&"SetQLLevel 00001,128".to_owned())
    );

    client.disconnect();
}

#[tokio::test]
async fn entity_reloads_jump_queued_routine_commands() {
    let state = default_state();
    state.lock().unwrap().hold = Some(("Status".to_owned(), Duration::from_millis(200)));

    let client = connected_client(&state).await;
    let cue = client.cue_list(1).unwrap();

    // Hold an exchange open and queue a routine command behind it.
    let held = {
        let client = client.clone();
        tokio::spawn(async move { client.status().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    let routine = {
        let client = client.clone();
        tokio::spawn(async move { client.help().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    cue.reload_active().await.unwrap();
    held.await.unwrap().unwrap();
    routine.await.unwrap().unwrap();

    // The reload overtook the queued routine command, but not the
    // exchange that was already in flight.
    let received = state.lock().unwrap().received.clone();
    let pos = |cmd: &str| received.iter().position(|c| c == cmd).unwrap();
    assert!(pos("Status") < pos("IsQLActive 00001"));
    assert!(pos("IsQLActive 00001") < pos("Help"));

    client.disconnect();
}

#[tokio::test]
async fn entity_queries_hit_the_console() {
    let state = default_state();
    state.lock().unwrap().active.insert("00002".to_owned());

    let client = connected_client(&state).await;

    assert!(client.is_cue_list_active("00002").await.unwrap());
    assert!(!client.is_cue_list_active("00001").await.unwrap());
    assert_eq!(client.cue_list_name("00004").await.unwrap(), "LED Tape");

    let cue = client.cue_list(4).unwrap();
    cue.reload_name().await.unwrap();
    assert_eq!(cue.name(), "LED Tape");

    client.disconnect();
}

#[tokio::test]
async fn rejected_commands_surface_code_and_message() {
    let state = default_state();
    let client = connected_client(&state).await;

    let err = client.trigger_command(999).await.unwrap_err();
    match err {
        CoreError::Rejected { code, message } => {
            assert_eq!(code, 400);
            assert!(message.contains("never heard that command"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }

    // Raw access still hands back the frame untranslated.
    let raw = client.send_cmd("CMD 999", false).await.unwrap();
    assert_eq!(raw.code, 400);

    client.disconnect();
}

#[tokio::test]
async fn connection_loss_fails_senders_and_suspends_polling() {
    let state = default_state();
    let client = connected_client(&state).await;

    state.lock().unwrap().drop_on_next = true;
    let err = client.status().await.unwrap_err();
    assert!(err.is_disconnect());

    wait_for("session marked down", || !client.connected()).await;

    // The poller observed the loss and stopped issuing requests.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let count = state.lock().unwrap().received.len();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(state.lock().unwrap().received.len(), count);

    let err = client.send_cmd("Status", false).await.unwrap_err();
    assert!(err.is_disconnect());
}

#[tokio::test]
async fn disconnected_client_refuses_operations() {
    let client = OnyxClient::new(ClientConfig::default());
    let err = client.send_cmd("Status", false).await.unwrap_err();
    assert!(matches!(err, CoreError::Disconnected));
    assert!(!client.connected());
    assert!(client.first_message().is_none());
    assert!(client.cue_lists().is_empty());
}
