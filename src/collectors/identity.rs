//! Agent/workspace identifier discovery.
//!
//! Multi-workspace agents keep one directory per workspace, named by its
//! GUID, under `etc/opt/microsoft/omsagent`. Older single-workspace agents
//! keep a flat `conf/omsadmin.conf` directly under the base directory.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

static WORKSPACE_DIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^/]{8}-[^/]{4}-[^/]{4}-[^/]{4}-[^/]{12}$").expect("valid regex")
});

const AGENT_GUID_PREFIX: &str = "AGENT_GUID=";

/// One identifier, or several for a multi-homed agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MmaIds {
    Single(String),
    Multiple(Vec<String>),
}

impl MmaIds {
    pub fn from_vec(mut ids: Vec<String>) -> Option<Self> {
        match ids.len() {
            0 => None,
            1 => ids.pop().map(MmaIds::Single),
            _ => Some(MmaIds::Multiple(ids)),
        }
    }

    pub fn as_slice(&self) -> &[String] {
        match self {
            MmaIds::Single(id) => std::slice::from_ref(id),
            MmaIds::Multiple(ids) => ids,
        }
    }
}

pub fn agent_base_dir(root: &Path) -> PathBuf {
    root.join("etc").join("opt").join("microsoft").join("omsagent")
}

/// Scans the agent configuration tree under `root`.
pub fn load_mma_ids(root: &Path) -> Option<MmaIds> {
    let base = agent_base_dir(root);
    let mut ids = Vec::new();
    let mut multihome_capable = false;

    let mut workspaces: Vec<PathBuf> = match fs::read_dir(&base) {
        Ok(entries) => entries
            .flatten()
            .filter(|e| WORKSPACE_DIR.is_match(&e.file_name().to_string_lossy()))
            .map(|e| e.path().join("conf").join("omsadmin.conf"))
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            debug!("Failed to read {}: {}", base.display(), e);
            Vec::new()
        }
    };
    workspaces.sort();

    for conf in &workspaces {
        multihome_capable = true;
        if let Some(id) = read_agent_guid(conf) {
            ids.push(id);
        }
    }

    if !multihome_capable {
        let legacy = base.join("conf").join("omsadmin.conf");
        if let Some(id) = read_agent_guid(&legacy) {
            ids.push(id);
        }
    }

    MmaIds::from_vec(ids)
}

fn read_agent_guid(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    parse_agent_guid(&content)
}

/// Value of the first `AGENT_GUID=` line. A blank value means no id.
pub fn parse_agent_guid(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix(AGENT_GUID_PREFIX))
        .map(|value| value.split('=').next().unwrap_or("").trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
