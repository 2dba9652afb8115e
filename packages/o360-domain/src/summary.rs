//! Circuit summary text for the UID lookup page.
//!
//! [`build_local_summary`] is the deterministic fallback used whenever the chat model is not
//! configured or fails. [`chat_user_payload`] trims a lookup result down to the sections the
//! model is allowed to see.

use std::collections::HashSet;

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::{first_text, value_text};

pub const SYSTEM_PROMPT: &str = "You are a helpful network operations assistant. Summarize the fiber UID results.
Rules:
- Show path as \"From → To\" using site names if present (Associated UIDs Site A/Z); else DC location.
- Show capacity as \"{count} x {perLink}G ({total}G total)\" if per-link known; else just link count.
- Show WF Status using friendly names (WF In Progress, WF Finished, WF Cancelled, DECOM) when applicable.
- Mention GDCO tickets only if there are tickets still in progress (ignore cancelled/resolved).
- Include a couple of extra insights: device counts A/Z, common line type (from MGFX) if clear.
- Keep it concise, 4-7 short lines.";

const ARRAY_SECTIONS: &[&str] = &["OLSLinks", "AssociatedUIDs", "GDCOTickets", "MGFXA", "MGFXZ"];
const OBJECT_SECTIONS: &[&str] = &["KQLData", "AExpansions", "ZExpansions"];

/// The lookup sections forwarded to the chat model, with absent sections defaulted.
pub fn chat_user_payload(input: &Value) -> Value {
	let mut out = Map::new();

	for key in ARRAY_SECTIONS {
		let section = input.get(*key).filter(|v| v.is_array()).cloned().unwrap_or(json!([]));

		out.insert((*key).to_string(), section);
	}
	for key in OBJECT_SECTIONS {
		let section = input.get(*key).filter(|v| v.is_object()).cloned().unwrap_or(json!({}));

		out.insert((*key).to_string(), section);
	}

	Value::Object(out)
}

pub fn build_local_summary(input: &Value) -> String {
	let links = array(input, "OLSLinks");
	let count = links.len();
	let kql = input.get("KQLData");
	let per_link = kql
		.and_then(|kql| kql.get("Increment"))
		.and_then(numeric)
		.or_else(|| links.first().and_then(|link| link.get("APort")).and_then(capacity_from_port))
		.or_else(|| kql.and_then(|kql| kql.get("DeviceA")).and_then(capacity_from_device));
	let capacity = match per_link {
		Some(per_link) => format!(
			"{count} x {}G ({}G total)",
			format_number(per_link),
			format_number(per_link * count as f64)
		),
		None => format!("{count} link{}", plural(count)),
	};
	let associated = array(input, "AssociatedUIDs");
	let sites_a =
		distinct(associated.iter().filter_map(|r| first_text(r, &["Site A", "SiteA", "siteA"])));
	let sites_z =
		distinct(associated.iter().filter_map(|r| first_text(r, &["Site Z", "SiteZ", "siteZ"])));
	let side = |sites: Vec<String>, expansion: &str| {
		if !sites.is_empty() {
			return sites.join(", ");
		}

		input
			.get(expansion)
			.and_then(|exp| first_text(exp, &["DCLocation"]))
			.unwrap_or_else(|| "Unknown".to_string())
	};
	let path = format!("{} → {}", side(sites_a, "AExpansions"), side(sites_z, "ZExpansions"));
	let workflow = workflow_display(
		kql.and_then(|kql| kql.get("WorkflowStatus")).map(value_text).unwrap_or_default().trim(),
	);
	let open_tickets =
		array(input, "GDCOTickets").iter().filter(|ticket| is_open_ticket(ticket)).count();
	let devices_a = distinct(links.iter().filter_map(|l| first_text(l, &["A Device", "ADevice"])));
	let devices_z = distinct(links.iter().filter_map(|l| first_text(l, &["Z Device", "ZDevice"])));
	let common_line = most_common(
		array(input, "MGFXA")
			.iter()
			.chain(array(input, "MGFXZ"))
			.filter_map(|row| first_text(row, &["Line", "line"])),
	);
	let mut lines = vec![
		format!("Path: {path}"),
		format!("Capacity: {capacity}"),
		format!("WF Status: {workflow}"),
	];

	if open_tickets > 0 {
		lines.push(format!("GDCO: {open_tickets} ticket{} in progress", plural(open_tickets)));
	}
	if !devices_a.is_empty() || !devices_z.is_empty() {
		lines.push(format!("Devices: A({}) / Z({})", devices_a.len(), devices_z.len()));
	}
	if let Some(line) = common_line {
		lines.push(format!("Common Line: {line}"));
	}

	lines.join("\n")
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
	value.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn matches(pattern: &str, text: &str) -> bool {
	Regex::new(pattern).map(|re| re.is_match(text)).unwrap_or(false)
}

fn numeric(value: &Value) -> Option<f64> {
	match value {
		Value::Number(number) => number.as_f64(),
		Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
		_ => None,
	}
}

fn capacity_from_port(port: &Value) -> Option<f64> {
	let port = value_text(port).to_lowercase();

	if port.is_empty() {
		return None;
	}
	if matches(r"four\s*hundred|400", &port) {
		return Some(400.0);
	}
	if matches(r"hundred|100", &port) {
		return Some(100.0);
	}
	if matches(r"ten\s*g|10\s*g|10g|tengig", &port) {
		return Some(10.0);
	}

	Regex::new(r"(\d+)\s*g")
		.ok()
		.and_then(|re| re.captures(&port))
		.and_then(|caps| caps.get(1))
		.and_then(|digits| digits.as_str().parse::<f64>().ok())
}

fn capacity_from_device(device: &Value) -> Option<f64> {
	let device = value_text(device).to_lowercase();

	if device.contains("400") {
		Some(400.0)
	} else if device.contains("100") {
		Some(100.0)
	} else if device.contains("10") {
		Some(10.0)
	} else {
		None
	}
}

fn workflow_display(raw: &str) -> String {
	let status = raw.to_lowercase();

	if matches(r"cancel", &status) {
		"WF Cancelled".to_string()
	} else if matches(r"decom", &status) {
		"DECOM".to_string()
	} else if matches(r"finished", &status) {
		"WF Finished".to_string()
	} else if matches(r"inprogress|in progress|in-progress|running", &status) {
		"WF In Progress".to_string()
	} else if raw.is_empty() {
		"—".to_string()
	} else {
		raw.to_string()
	}
}

fn is_open_ticket(ticket: &Value) -> bool {
	let state = ticket.get("State").map(value_text).unwrap_or_default().to_lowercase();

	!state.is_empty() && !matches(r"cancel|resolved|closed|complete|done", &state)
}

fn distinct(values: impl Iterator<Item = String>) -> Vec<String> {
	let mut seen = HashSet::new();

	values.filter(|value| seen.insert(value.clone())).collect()
}

/// Most frequent value.
///
/// Ties go to the smallest array-index-like value (`"7"` before `"73"`), then to the non-numeric
/// value seen first.
fn most_common(values: impl Iterator<Item = String>) -> Option<String> {
	let mut counts: Vec<(String, usize)> = Vec::new();

	for value in values {
		match counts.iter_mut().find(|(seen, _)| *seen == value) {
			Some((_, count)) => *count += 1,
			None => counts.push((value, 1)),
		}
	}

	// Stable: non-numeric values keep their first-seen order.
	counts.sort_by_key(|(value, _)| match array_index(value) {
		Some(index) => (0, index),
		None => (1, 0),
	});

	let mut best: Option<(String, usize)> = None;

	for (value, count) in counts {
		if best.as_ref().is_none_or(|(_, top)| count > *top) {
			best = Some((value, count));
		}
	}

	best.map(|(value, _)| value)
}

/// Canonical unsigned integer text below `u32::MAX`, the keys objects enumerate numerically.
fn array_index(value: &str) -> Option<u32> {
	let index = value.parse::<u32>().ok().filter(|index| *index < u32::MAX)?;

	(index.to_string() == value).then_some(index)
}

fn format_number(value: f64) -> String {
	if value.fract() == 0.0 && value.abs() < 1e15 {
		format!("{}", value as i64)
	} else {
		value.to_string()
	}
}

fn plural(count: usize) -> &'static str {
	if count == 1 { "" } else { "s" }
}
