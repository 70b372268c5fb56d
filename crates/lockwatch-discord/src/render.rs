//! Message payloads and report text.
//!
//! Pure functions; nothing here talks to the network.

use lockwatch_core::{ActuationReport, AlertEntry};
use serde_json::{json, Value};

use crate::LOCK_ALL_CUSTOM_ID;

/// Embed accent color (red).
pub const ALERT_COLOR: u32 = 0xE7_4C_3C;

/// Maximum `content` length Discord accepts.
pub const MAX_CONTENT_LEN: usize = 2000;

/// Maximum number of fields in one embed.
pub const MAX_EMBED_FIELDS: usize = 25;

/// Interaction callback type: deferred channel message.
pub const DEFERRED_CHANNEL_MESSAGE: u8 = 5;

/// Message flag: only the clicking user sees the message.
pub const EPHEMERAL: u64 = 1 << 6;

const ALERT_TITLE: &str = "🔓 Unlocked smart locks detected";
const ALERT_DESCRIPTION: &str = "Press the button below to lock them remotely.";
const BUTTON_LABEL: &str = "Lock all";

/// Action row holding the "lock all" button.
pub fn lock_all_components(disabled: bool) -> Value {
    json!([{
        "type": 1,
        "components": [{
            "type": 2,
            "style": 4,
            "label": BUTTON_LABEL,
            "custom_id": LOCK_ALL_CUSTOM_ID,
            "disabled": disabled,
        }]
    }])
}

/// Message body for an unlock alert.
pub fn alert_message(entries: &[AlertEntry], mention: Option<&str>) -> Value {
    let mut fields: Vec<Value> = Vec::with_capacity(entries.len().min(MAX_EMBED_FIELDS));

    let (shown, hidden) = if entries.len() > MAX_EMBED_FIELDS {
        entries.split_at(MAX_EMBED_FIELDS - 1)
    } else {
        (entries, &[][..])
    };

    for entry in shown {
        fields.push(json!({
            "name": entry.name,
            "value": format!("Battery: {}", entry.battery),
            "inline": false,
        }));
    }
    if !hidden.is_empty() {
        fields.push(json!({
            "name": format!("…and {} more", hidden.len()),
            "value": join_names(hidden.iter().map(|e| e.name.as_str())),
            "inline": false,
        }));
    }

    let mut message = json!({
        "embeds": [{
            "title": ALERT_TITLE,
            "description": ALERT_DESCRIPTION,
            "color": ALERT_COLOR,
            "fields": fields,
        }],
        "components": lock_all_components(false),
    });

    if let Some(mention) = mention.map(str::trim).filter(|m| !m.is_empty()) {
        message["content"] = Value::String(truncate(mention, MAX_CONTENT_LEN));
    }
    message
}

/// Interaction callback acknowledging a click with a private "thinking" state.
pub fn deferred_ack() -> Value {
    json!({
        "type": DEFERRED_CHANNEL_MESSAGE,
        "data": { "flags": EPHEMERAL },
    })
}

/// Private follow-up carrying the report.
pub fn followup_message(report: &ActuationReport) -> Value {
    json!({
        "content": report_text(report),
        "flags": EPHEMERAL,
    })
}

/// Summarises a batch for the user who clicked.
pub fn report_text(report: &ActuationReport) -> String {
    let mut lines = Vec::new();

    if report.is_nothing_to_lock() {
        if report.unreachable.is_empty() {
            lines.push("✅ All devices were already locked.".to_string());
        } else {
            lines.push("✅ No unlocked devices found.".to_string());
        }
    }

    let locked = report.locked();
    if !locked.is_empty() {
        lines.push(format!("✅ Locked **{}**.", join_names(locked.into_iter())));
    }

    for (name, reason) in report.failed() {
        lines.push(format!("❌ Failed to lock **{name}** ({reason})."));
    }

    let in_flight = report.in_flight();
    if !in_flight.is_empty() {
        lines.push(format!(
            "⏳ Already being locked: **{}**.",
            join_names(in_flight.into_iter())
        ));
    }

    if !report.unreachable.is_empty() {
        lines.push(format!(
            "⚠️ Could not check **{}**; not locked.",
            join_names(report.unreachable.iter().map(String::as_str))
        ));
    }

    truncate(&lines.join("\n"), MAX_CONTENT_LEN)
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

/// Cuts `text` to at most `max` characters, marking the cut.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
