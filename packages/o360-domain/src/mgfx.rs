//! MGFX export grouping.
//!
//! An MGFX export lists one row per cable from an XOMT device to its console (`c0`) and
//! management (`m0`) switches. [`group_mgfx`] folds those rows into one line per XOMT and splits
//! the result into the A and Z side of the circuit.

use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::{first_text, lines};

const START_KEYS: &[&str] = &["StartDevice", "StartDeviceName"];
const END_KEYS: &[&str] = &["EndDevice", "EndDeviceName", "end"];
const END_PORT_KEYS: &[&str] = &["EndPort", "endPort"];
const END_SKU_KEYS: &[&str] = &["EndSku", "endSku"];
const A_OPTICAL_KEYS: &[&str] = &["A Optical Device", "AOpticalDevice", "ADevice", "A Device"];
const Z_OPTICAL_KEYS: &[&str] = &["Z Optical Device", "ZOpticalDevice", "ZDevice", "Z Device"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupRow {
	#[serde(rename = "XOMT")]
	pub xomt: String,
	#[serde(rename = "C0 Device")]
	pub c0_device: String,
	#[serde(rename = "C0 Port")]
	pub c0_port: String,
	#[serde(rename = "Line")]
	pub line: Option<u32>,
	#[serde(rename = "M0 Device")]
	pub m0_device: String,
	#[serde(rename = "M0 Port")]
	pub m0_port: String,
	#[serde(rename = "C0 DIFF")]
	pub c0_diff: String,
	#[serde(rename = "M0 DIFF")]
	pub m0_diff: String,
	#[serde(rename = "StartHardwareSku")]
	pub start_hardware_sku: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MgfxGroups {
	pub a_rows: Vec<GroupRow>,
	pub z_rows: Vec<GroupRow>,
}

pub fn group_mgfx(rows: &[Value], links: &[Value]) -> MgfxGroups {
	let groups = collect_groups(rows);
	let bases = groups.iter().map(|(xomt, _)| base_key(xomt)).collect::<HashSet<_>>();
	let first_link = links.iter().find(|link| link.is_object());
	let optical_base = |keys: &[&str]| {
		first_link.and_then(|link| first_text(link, keys)).map(|device| base_key(&device))
	};
	let optical_a = optical_base(A_OPTICAL_KEYS);
	let optical_z = optical_base(Z_OPTICAL_KEYS);
	let use_optical = bases.len() > 2 && (optical_a.is_some() || optical_z.is_some());
	let matchers = EndMatchers::new();
	let mut first_prefix: Option<String> = None;
	let mut out = MgfxGroups::default();

	for (xomt, items) in &groups {
		let row = summarize_group(xomt, items, &matchers);
		let prefix = prefix_key(xomt);
		let base = base_key(xomt);
		let first = first_prefix.get_or_insert_with(|| prefix.clone());

		if use_optical && optical_a.as_deref() == Some(base.as_str()) {
			out.a_rows.push(row);
		} else if use_optical && optical_z.as_deref() == Some(base.as_str()) {
			out.z_rows.push(row);
		} else if *first == prefix {
			out.a_rows.push(row);
		} else {
			out.z_rows.push(row);
		}
	}

	out
}

/// Groups rows by start device, keeping first-seen order and skipping OLT cabling.
fn collect_groups(rows: &[Value]) -> Vec<(String, Vec<&Value>)> {
	let mut groups: Vec<(String, Vec<&Value>)> = Vec::new();

	for row in rows.iter().filter(|row| row.is_object()) {
		let (Some(start), Some(end)) = (first_text(row, START_KEYS), first_text(row, END_KEYS))
		else {
			continue;
		};

		if ends_with_olt(&start) || ends_with_olt(&end) {
			continue;
		}

		match groups.iter_mut().find(|(xomt, _)| *xomt == start) {
			Some((_, items)) => items.push(row),
			None => groups.push((start, vec![row])),
		}
	}

	groups
}

struct EndMatchers {
	c0: Option<Regex>,
	m0: Option<Regex>,
}
impl EndMatchers {
	fn new() -> Self {
		Self { c0: Regex::new(r"\bc0\b|c0$|-c0").ok(), m0: Regex::new(r"\bm0\b|m0$|-m0").ok() }
	}

	fn is_c0(&self, device: &str) -> bool {
		self.c0.as_ref().map(|re| re.is_match(device)).unwrap_or(false)
	}

	fn is_m0(&self, device: &str) -> bool {
		self.m0.as_ref().map(|re| re.is_match(device)).unwrap_or(false)
	}
}

fn summarize_group(xomt: &str, items: &[&Value], matchers: &EndMatchers) -> GroupRow {
	let mut row = GroupRow { xomt: xomt.to_string(), ..Default::default() };

	for item in items {
		let device = first_text(item, END_KEYS).unwrap_or_default();
		let lower = device.to_ascii_lowercase();
		let port = first_text(item, END_PORT_KEYS);
		let sku = first_text(item, END_SKU_KEYS);

		if matchers.is_c0(&lower) {
			row.c0_device = device;
			if let Some(port) = port {
				row.c0_port = port;
			}
			if let Some(sku) = sku {
				row.start_hardware_sku = sku;
			}
		} else if matchers.is_m0(&lower) {
			row.m0_device = device;
			if let Some(port) = port {
				row.m0_port = port;
			}
		} else {
			if lower.contains("c0") && row.c0_device.is_empty() {
				row.c0_device = device.clone();
				if let Some(port) = port.clone() {
					row.c0_port = port;
				}
				if let Some(sku) = sku {
					row.start_hardware_sku = sku;
				}
			}
			if lower.contains("m0") && row.m0_device.is_empty() {
				row.m0_device = device;
				if let Some(port) = port {
					row.m0_port = port;
				}
			}
		}
	}

	if !row.c0_device.is_empty() {
		row.c0_diff = format!("diff:{}", row.c0_device);
	}
	if !row.m0_device.is_empty() {
		row.m0_diff = format!("diff:{}", row.m0_device);
	}

	row.line = lines::derive_line_for_c0(&row.start_hardware_sku, &row.c0_port);

	row
}

fn ends_with_olt(device: &str) -> bool {
	device.to_ascii_lowercase().ends_with("olt")
}

/// `site-building`, the first two dash separated parts.
fn prefix_key(device: &str) -> String {
	let parts = device.split('-').filter(|part| !part.is_empty()).collect::<Vec<_>>();

	match parts.as_slice() {
		[site, building, ..] => format!("{site}-{building}").to_ascii_lowercase(),
		[site] => site.to_ascii_lowercase(),
		[] => device.to_ascii_lowercase(),
	}
}

fn base_key(device: &str) -> String {
	device
		.split('-')
		.find(|part| !part.is_empty())
		.unwrap_or(device)
		.to_ascii_lowercase()
}
