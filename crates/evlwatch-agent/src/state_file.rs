//! Persistence of per-log read positions
//!
//! Positions live in small text files of `name|position` lines. Which file
//! is used depends on the connecting client: a cluster file if the client
//! belongs to a configured cluster, then a per-address file, then the
//! default file. Only the first candidate with usable content is loaded and
//! the first candidate is always the save target.

use std::fs::{self, File};
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use evlwatch_common::{EventLevel, WILDCARD};

use crate::config::ClusterConfig;
use crate::watch::SourceState;

/// File name stem of every state file
pub const STATE_FILE_BASE: &str = "eventstate";

/// Extension of every state file
pub const STATE_FILE_EXT: &str = ".txt";

/// Errors that can occur while saving state
#[derive(Debug, Error)]
pub enum StateFileError {
    #[error("Failed to write state file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("No state file candidate to write to")]
    NoTarget,
}

/// Parse one `name|position` line
pub fn parse_state_line(line: &str) -> Option<SourceState> {
    let mut parts = line.split('|');
    let name = parts.next().filter(|n| !n.is_empty())?;
    let pos = parts.next()?.trim_end_matches(&['\r', '\n'][..]);
    if pos.is_empty() {
        return None;
    }
    let pos = pos.parse::<u64>().ok()?;
    Some(SourceState::restored(name, pos))
}

/// `<base>[_<qualifier>]<ext>`, with `:` and `.` in the qualifier replaced
pub fn make_state_file_name(base: &str, ext: &str, qualifier: &str) -> Option<String> {
    if base.is_empty() {
        return None;
    }
    if qualifier.is_empty() {
        return Some(format!("{}{}", base, ext));
    }
    let qualifier: String = qualifier
        .chars()
        .map(|c| if c == ':' || c == '.' { '_' } else { c })
        .collect();
    Some(format!("{}_{}{}", base, qualifier, ext))
}

/// One cluster address rule
#[derive(Debug, Clone, PartialEq, Eq)]
enum ClusterMember {
    Exact(IpAddr),
    Subnet(IpAddr, u8),
}

impl ClusterMember {
    fn parse(text: &str) -> Option<Self> {
        match text.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.trim().parse().ok()?;
                let prefix: u8 = prefix.trim().parse().ok()?;
                let max = if addr.is_ipv4() { 32 } else { 128 };
                (prefix <= max).then_some(Self::Subnet(addr, prefix))
            }
            None => text.trim().parse().ok().map(Self::Exact),
        }
    }

    fn matches(&self, addr: &IpAddr) -> bool {
        match self {
            Self::Exact(member) => member == addr,
            Self::Subnet(net, prefix) => match (net, addr) {
                (IpAddr::V4(net), IpAddr::V4(addr)) => {
                    let mask = u32::MAX.checked_shl(32 - u32::from(*prefix)).unwrap_or(0);
                    u32::from(*net) & mask == u32::from(*addr) & mask
                }
                (IpAddr::V6(net), IpAddr::V6(addr)) => {
                    let mask = u128::MAX.checked_shl(128 - u32::from(*prefix)).unwrap_or(0);
                    u128::from(*net) & mask == u128::from(*addr) & mask
                }
                _ => false,
            },
        }
    }
}

/// Named group of client addresses sharing one state file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    name: String,
    members: Vec<ClusterMember>,
}

impl Cluster {
    /// Build from configuration, skipping addresses that do not parse
    pub fn from_config(config: &ClusterConfig) -> Self {
        let members = config
            .ips
            .iter()
            .filter_map(|ip| {
                let member = ClusterMember::parse(ip);
                if member.is_none() {
                    warn!("Ignoring invalid address '{}' in cluster {}", ip, config.name);
                }
                member
            })
            .collect();
        Self {
            name: config.name.clone(),
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `remote` belongs to this cluster
    pub fn contains(&self, remote: &str) -> bool {
        let remote = remote.strip_prefix("::ffff:").unwrap_or(remote);
        match remote.parse::<IpAddr>() {
            Ok(addr) => self.members.iter().any(|m| m.matches(&addr)),
            Err(_) => false,
        }
    }
}

/// First cluster `remote` belongs to
pub fn find_cluster<'a>(clusters: &'a [Cluster], remote: &str) -> Option<&'a Cluster> {
    clusters.iter().find(|c| c.contains(remote))
}

/// Candidate state files in priority order
pub fn state_file_candidates(dir: &Path, remote: Option<&str>, clusters: &[Cluster]) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(remote) = remote.filter(|r| !r.is_empty()) {
        if let Some(cluster) = find_cluster(clusters, remote) {
            candidates.extend(make_state_file_name(STATE_FILE_BASE, STATE_FILE_EXT, cluster.name()));
        }
        candidates.extend(make_state_file_name(STATE_FILE_BASE, STATE_FILE_EXT, remote));
    }
    candidates.extend(make_state_file_name(STATE_FILE_BASE, STATE_FILE_EXT, ""));

    candidates.into_iter().map(|name| dir.join(name)).collect()
}

/// Load positions from the first candidate holding at least one valid line.
///
/// States come back sorted by name and not yet discovered. With `send_all`
/// every position is reset to 0.
pub fn load_positions(candidates: &[PathBuf], send_all: bool) -> Vec<SourceState> {
    for path in candidates {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("State file {} not usable: {}", path.display(), e);
                continue;
            }
        };

        let mut states: Vec<SourceState> = contents
            .lines()
            .filter_map(|line| {
                let state = parse_state_line(line);
                if state.is_none() && !line.trim().is_empty() {
                    warn!("Skipping malformed line '{}' in {}", line, path.display());
                }
                state
            })
            .collect();

        if states.is_empty() {
            continue;
        }

        debug!("Loaded {} positions from {}", states.len(), path.display());
        states.sort_by(|a, b| a.name.cmp(&b.name));
        if send_all {
            for state in &mut states {
                state.pos = 0;
            }
        }
        return states;
    }

    Vec::new()
}

/// Rewrite `path` with one line per state, skipping wildcards and ignored logs
pub fn save_positions(path: &Path, states: &[SourceState]) -> Result<(), StateFileError> {
    let contents: String = states
        .iter()
        .filter(|s| s.name != WILDCARD && s.level != EventLevel::Ignore)
        .map(|s| format!("{}|{}\n", s.name, s.pos))
        .collect();

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let write = || -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        {
            let mut file = File::create(&tmp)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path).inspect_err(|_| {
            if let Err(e) = fs::remove_file(&tmp) {
                debug!("Failed to remove {}: {}", tmp.display(), e);
            }
        })
    };

    write().map_err(|source| StateFileError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Save to the highest-priority candidate
pub fn save_to_first(candidates: &[PathBuf], states: &[SourceState]) -> Result<(), StateFileError> {
    let target = candidates.first().ok_or(StateFileError::NoTarget)?;
    save_positions(target, states)
}
