//! Command builders and response parsing helpers.
//!
//! Every command the Onyx Manager telnet interface documents gets a
//! builder here, so formatting quirks (comma-separated arguments,
//! hemisphere letters for positions) live in one place. Builders return
//! plain `String`s; the session's encoder appends the terminator.

/// `ACT #` — run an action group.
pub fn start_action_group(group: u32) -> String {
    format!("ACT {group}")
}

/// `ActList` — list manager actions.
pub fn action_list() -> String {
    "ActList".to_owned()
}

/// `ActName #` — name of a manager action.
pub fn action_name(action: u32) -> String {
    format!("ActName {action}")
}

/// `BYE` — disconnect from the server.
pub fn bye() -> String {
    "BYE".to_owned()
}

/// `CLRCLR` — clear the programmer.
pub fn clear_programmer() -> String {
    "CLRCLR".to_owned()
}

/// `CMD #` — run an internal manager command.
pub fn trigger_command(command: u32) -> String {
    format!("CMD {command}")
}

/// `CmdList` — list internal manager commands.
pub fn command_list() -> String {
    "CmdList".to_owned()
}

/// `CmdName #` — name of an internal manager command.
pub fn command_name(command: u32) -> String {
    format!("CmdName {command}")
}

/// `GSC #` — make a schedule the default schedule.
pub fn trigger_schedule(schedule: u32) -> String {
    format!("GSC {schedule}")
}

/// `GQL #` — go (trigger) a cue list.
pub fn go_cue_list(num: &str) -> String {
    format!("GQL {num}")
}

/// `GTQ #,#` — go to a specific cue within a cue list.
pub fn go_cue(num: &str, cue: u32) -> String {
    format!("GTQ {num},{cue}")
}

/// `Help` — list supported commands.
pub fn help() -> String {
    "Help".to_owned()
}

/// `IsMxRun` — is the Onyx engine running (yes/no).
pub fn is_mx_running() -> String {
    "IsMxRun".to_owned()
}

/// `IsQLActive #` — is a cue list active (yes/no).
pub fn is_cue_list_active(num: &str) -> String {
    format!("IsQLActive {num}")
}

/// `IsSchRun` — is the scheduler running (yes/no).
pub fn is_scheduler_running() -> String {
    "IsSchRun".to_owned()
}

/// `Lastlog #` — last N log lines (300 max server-side).
pub fn recent_log(lines: u32) -> String {
    format!("Lastlog {lines}")
}

/// `PQL #` — pause a cue list.
pub fn pause_cue_list(num: &str) -> String {
    format!("PQL {num}")
}

/// `QLActive` — list currently active cue lists.
pub fn active_cue_lists() -> String {
    "QLActive".to_owned()
}

/// `QLList` — list available cue lists.
pub fn available_cue_lists() -> String {
    "QLList".to_owned()
}

/// `QLName #` — name of a cue list.
///
/// Known to time out on some Onyx versions.
pub fn cue_list_name(num: &str) -> String {
    format!("QLName {num}")
}

/// `RAO` — release all overrides.
pub fn release_all_overrides() -> String {
    "RAO".to_owned()
}

/// `RAQL` — release all cue lists.
pub fn release_all_cue_lists() -> String {
    "RAQL".to_owned()
}

/// `RAQLDF` — release all cue lists, dimmers first.
pub fn release_all_cue_lists_dim_first() -> String {
    "RAQLDF".to_owned()
}

/// `RAQLO` — release all cue lists and overrides.
pub fn release_all_cue_lists_and_overrides() -> String {
    "RAQLO".to_owned()
}

/// `RAQLODF` — release all cue lists and overrides, dimmers first.
pub fn release_all_cue_lists_and_overrides_dim_first() -> String {
    "RAQLODF".to_owned()
}

/// `RQL #` — release a cue list.
pub fn release_cue_list(num: &str) -> String {
    format!("RQL {num}")
}

/// `SchList` — list manager schedules.
pub fn schedule_list() -> String {
    "SchList".to_owned()
}

/// `SchName #` — name of a manager schedule.
pub fn schedule_name(schedule: u32) -> String {
    format!("SchName {schedule}")
}

/// `SchUseCalendar` — return the scheduler to calendar rules.
pub fn use_calendar_rules() -> String {
    "SchUseCalendar".to_owned()
}

/// `SetDate YYYY,MM,DD` — set the console date.
pub fn set_date(year: u16, month: u8, day: u8) -> String {
    format!("SetDate {year},{month},{day}")
}

/// `SetTime HH,MM,SS` — set the console time (24h).
pub fn set_time(hour: u8, minute: u8, second: u8) -> String {
    format!("SetTime {hour},{minute},{second}")
}

/// `SetTimepreset #,HH,MM,SS` — set a time preset (24h).
pub fn set_time_preset(preset: u32, hour: u8, minute: u8, second: u8) -> String {
    format!("SetTimepreset {preset},{hour},{minute},{second}")
}

/// `SetPosDec lat,N|S,lon,E|W` — set the console's geographical position.
///
/// Negative latitude/longitude map to the southern/western hemispheres.
pub fn set_position_decimal(lat: f64, lon: f64) -> String {
    let (lat_abs, ns) = if lat < 0.0 { (-lat, 'S') } else { (lat, 'N') };
    let (lon_abs, ew) = if lon < 0.0 { (-lon, 'W') } else { (lon, 'E') };
    format!("SetPosDec {lat_abs},{ns},{lon_abs},{ew}")
}

/// `SetQLLevel #,#` — set a cue list level (0-255).
pub fn set_cue_list_level(num: &str, level: u8) -> String {
    format!("SetQLLevel {num},{level}")
}

/// `Status` — status report.
pub fn status() -> String {
    "Status".to_owned()
}

/// `TimePresetList` — list time presets.
pub fn time_preset_list() -> String {
    "TimePresetList".to_owned()
}

// ── Response helpers ─────────────────────────────────────────────────

/// A cue-list record from a `QLList`/`QLActive` payload line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueListLine {
    /// Zero-padded identifier as reported, e.g. `"00018"`.
    pub num: String,
    pub name: String,
    /// Present when the console appends a level segment to the line.
    pub value: Option<u8>,
}

impl CueListLine {
    /// Numeric key for map lookups (`"00018"` → 18).
    pub fn key(&self) -> Option<u32> {
        self.num.parse().ok()
    }
}

/// Parse one payload line of the form `"00018 - House Lights"`, with an
/// optional trailing `" - <level>"` segment.
///
/// Lines that don't match (e.g. `"No Active Qlist in List"`) return
/// `None` — they are fillers, not records.
pub fn parse_cue_list_line(line: &str) -> Option<CueListLine> {
    let (num, rest) = line.split_once(" - ")?;
    if num.is_empty() || !num.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (name, value) = match rest.rsplit_once(" - ") {
        Some((head, tail)) => match tail.parse::<u8>() {
            Ok(level) => (head, Some(level)),
            Err(_) => (rest, None),
        },
        None => (rest, None),
    };
    Some(CueListLine {
        num: num.to_owned(),
        name: name.to_owned(),
        value,
    })
}

/// Parse a `Yes`/`No` payload line (case-insensitive).
pub fn parse_yes_no(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}
