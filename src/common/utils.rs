//! Utility functions for replistore

use serde::{Deserialize, Serialize};

/// Longest accepted display name, in bytes
pub const MAX_NAME_LEN: usize = 1024;

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Worker liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Alive,
    Dead,
}

impl NodeState {
    pub fn is_alive(&self) -> bool {
        matches!(self, NodeState::Alive)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Alive => write!(f, "alive"),
            NodeState::Dead => write!(f, "dead"),
        }
    }
}

/// Validate a display name (non-empty, bounded, no control characters)
pub fn validate_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidInput("name cannot be empty".into()));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(crate::Error::InvalidInput(format!(
            "name too long (max {} bytes)",
            MAX_NAME_LEN
        )));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(crate::Error::InvalidInput(
            "name contains invalid characters".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_node_state() {
        assert!(NodeState::Alive.is_alive());
        assert!(!NodeState::Dead.is_alive());
        assert_eq!(NodeState::Dead.to_string(), "dead");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("a.txt").is_ok());
        assert!(validate_name("reports/2024 q1.pdf").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("bad\nname").is_err());
        assert!(validate_name(&"x".repeat(2000)).is_err());
    }
}
