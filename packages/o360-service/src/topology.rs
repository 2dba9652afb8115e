//! Deterministic topology helpers for the UID and VSO pages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use o360_domain::{
	mgfx::{self, MgfxGroups},
	scope::{self, ScopeInputs},
};

use crate::O360Service;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MgfxGroupsRequest {
	#[serde(default, alias = "MGFX")]
	pub mgfx: Vec<Value>,
	#[serde(default, rename = "olsLinks", alias = "OLSLinks")]
	pub ols_links: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeStageResponse {
	pub stage: String,
}

impl O360Service {
	pub fn mgfx_groups(&self, req: &MgfxGroupsRequest) -> MgfxGroups {
		mgfx::group_mgfx(&req.mgfx, &req.ols_links)
	}

	pub fn scope_stage(&self, inputs: &ScopeInputs) -> ScopeStageResponse {
		ScopeStageResponse { stage: scope::compute_scope_stage(inputs).to_string() }
	}
}
