//! Static catalog of the external tools scanrelay knows how to describe.
//!
//! Any program on PATH can be requested in a scan; the catalog only supplies
//! the default tool list and human-readable descriptions for the CLI.

use std::fmt;
use std::path::{Path, PathBuf};

/// Broad grouping of a tool, used when listing the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ToolCategory {
    /// Port and service discovery.
    Network,
    /// Web server and application probing.
    Web,
    /// TLS configuration checks.
    Tls,
    /// DNS and registration records.
    Dns,
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCategory::Network => write!(f, "Network"),
            ToolCategory::Web => write!(f, "Web"),
            ToolCategory::Tls => write!(f, "TLS"),
            ToolCategory::Dns => write!(f, "DNS"),
        }
    }
}

/// Describes one known tool.
pub struct ToolDetail {
    /// The executable name looked up on PATH.
    pub name: &'static str,
    pub category: ToolCategory,
    /// One sentence on what the tool reports about a target.
    pub summary: &'static str,
}

static TOOLS: &[ToolDetail] = &[
    ToolDetail {
        name: "nmap",
        category: ToolCategory::Network,
        summary: "Port scanner; lists open ports and the services answering on them.",
    },
    ToolDetail {
        name: "tcpdump",
        category: ToolCategory::Network,
        summary: "Packet capture; the target is passed as the capture expression.",
    },
    ToolDetail {
        name: "whatweb",
        category: ToolCategory::Web,
        summary: "Identifies web technologies, frameworks and server software.",
    },
    ToolDetail {
        name: "wafw00f",
        category: ToolCategory::Web,
        summary: "Detects web application firewalls in front of the target.",
    },
    ToolDetail {
        name: "nikto",
        category: ToolCategory::Web,
        summary: "Web server scanner for dangerous files and outdated software.",
    },
    ToolDetail {
        name: "sslscan",
        category: ToolCategory::Tls,
        summary: "Enumerates supported TLS protocol versions and cipher suites.",
    },
    ToolDetail {
        name: "dnsrecon",
        category: ToolCategory::Dns,
        summary: "DNS enumeration of standard records, zone transfers and subdomains.",
    },
    ToolDetail {
        name: "whois",
        category: ToolCategory::Dns,
        summary: "Registration record of the domain or address block.",
    },
    ToolDetail {
        name: "netcat",
        category: ToolCategory::Network,
        summary: "Raw TCP/UDP connectivity probe.",
    },
];

/// Looks up a tool by its executable name.
///
/// # Returns
///
/// The catalog entry, or `None` for tools that are runnable but undescribed.
pub fn get_tool_detail(name: &str) -> Option<&'static ToolDetail> {
    TOOLS.iter().find(|t| t.name == name)
}

/// Names of all catalog tools; the default tool list of a fresh configuration.
pub fn default_tool_names() -> Vec<String> {
    TOOLS.iter().map(|t| t.name.to_string()).collect()
}

/// Resolves `name` the way process spawning will, returning the executable found.
pub fn locate_on_path(name: &str) -> Option<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        let path = Path::new(name);
        return path.is_file().then(|| path.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_whole_catalog() {
        let names = default_tool_names();
        assert_eq!(names.len(), TOOLS.len());
        assert_eq!(names[0], "nmap");
        assert!(names.iter().all(|n| get_tool_detail(n).is_some()));
    }

    #[test]
    fn unknown_tools_have_no_detail() {
        assert!(get_tool_detail("definitely-not-cataloged").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn finds_standard_programs_on_path() {
        assert!(locate_on_path("sh").is_some());
        assert!(locate_on_path("scanrelay-no-such-tool-7f3a").is_none());
    }
}
