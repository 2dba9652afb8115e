//! VSO scope stage selection.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeInputs {
	#[serde(default, alias = "FacilityCodeA")]
	pub facility_a: Option<String>,
	#[serde(default, alias = "FacilityCodeZ")]
	pub facility_z: Option<String>,
	#[serde(default, alias = "Diversity")]
	pub diversity: Option<String>,
	#[serde(default, alias = "SpliceRackA")]
	pub splice_a: Option<String>,
	#[serde(default, alias = "SpliceRackZ")]
	pub splice_z: Option<String>,
}
impl ScopeInputs {
	/// Reads the scope fields of an outgoing VSO request.
	///
	/// The request form uses `"N"` for "not applicable", which counts as absent here.
	pub fn from_vso_payload(body: &Map<String, Value>) -> Self {
		let field = |key: &str| {
			body.get(key)
				.map(crate::value_text)
				.map(|text| text.trim().to_string())
				.filter(|text| !text.is_empty() && !text.eq_ignore_ascii_case("n"))
		};

		Self {
			facility_a: field("FacilityCodeA"),
			facility_z: field("FacilityCodeZ"),
			diversity: field("Diversity"),
			splice_a: field("SpliceRackA"),
			splice_z: field("SpliceRackZ"),
		}
	}
}

pub fn compute_scope_stage(inputs: &ScopeInputs) -> &'static str {
	let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
	let has_a = present(&inputs.facility_a);
	let has_z = present(&inputs.facility_z);
	let has_div = present(&inputs.diversity);
	let has_sp_a = present(&inputs.splice_a);
	let has_sp_z = present(&inputs.splice_z);

	match (has_a, has_z) {
		(true, true) =>
			if has_div && has_sp_a && has_sp_z {
				"14"
			} else if has_sp_a && has_sp_z {
				"15"
			} else if has_div {
				"13"
			} else {
				"12"
			},
		(true, false) =>
			if has_div && has_sp_a {
				"2"
			} else if has_div {
				"3"
			} else if has_sp_a {
				"4"
			} else {
				"1"
			},
		(false, true) =>
			if has_div && has_sp_z {
				"5"
			} else if has_div {
				"6"
			} else if has_sp_z {
				"7"
			} else {
				"8"
			},
		(false, false) => "1",
	}
}
