use serde::{Deserialize, Serialize};

/// Configuration version a physical table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigVersion {
    Candidate,
    Running,
    Startup,
    Import,
    Audit,
    State,
    CandidateDel,
    System,
    Invalid,
}

impl ConfigVersion {
    pub const ALL: [ConfigVersion; 8] = [
        ConfigVersion::Candidate,
        ConfigVersion::Running,
        ConfigVersion::Startup,
        ConfigVersion::Import,
        ConfigVersion::Audit,
        ConfigVersion::State,
        ConfigVersion::CandidateDel,
        ConfigVersion::System,
    ];

    /// Physical table-name prefix, `None` for `Invalid`.
    pub fn table_prefix(self) -> Option<&'static str> {
        match self {
            ConfigVersion::Candidate => Some("ca_"),
            ConfigVersion::Running => Some("ru_"),
            ConfigVersion::Startup => Some("su_"),
            ConfigVersion::Import => Some("im_"),
            ConfigVersion::Audit => Some("au_"),
            ConfigVersion::State => Some("st_"),
            ConfigVersion::CandidateDel => Some("ca_del_"),
            ConfigVersion::System => Some("sy_"),
            ConfigVersion::Invalid => None,
        }
    }

    pub fn is_valid(self) -> bool {
        !matches!(self, ConfigVersion::Invalid)
    }

    /// Builds `<prefix><name>`.
    pub fn physical_name(self, table_name: &str) -> Option<String> {
        self.table_prefix()
            .map(|prefix| format!("{prefix}{table_name}"))
    }
}

impl std::fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConfigVersion::Candidate => "candidate",
            ConfigVersion::Running => "running",
            ConfigVersion::Startup => "startup",
            ConfigVersion::Import => "import",
            ConfigVersion::Audit => "audit",
            ConfigVersion::State => "state",
            ConfigVersion::CandidateDel => "candidate_del",
            ConfigVersion::System => "system",
            ConfigVersion::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ConfigVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigVersion::ALL
            .into_iter()
            .find(|v| v.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown config version '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigVersion;

    #[test]
    fn parses_display_names() {
        assert_eq!("Running".parse::<ConfigVersion>(), Ok(ConfigVersion::Running));
        assert_eq!("candidate_del".parse::<ConfigVersion>(), Ok(ConfigVersion::CandidateDel));
        assert!("invalid".parse::<ConfigVersion>().is_err());
    }

    #[test]
    fn invalid_version_has_no_prefix() {
        assert_eq!(ConfigVersion::Invalid.table_prefix(), None);
        assert_eq!(ConfigVersion::Invalid.physical_name("vtn"), None);
    }

    #[test]
    fn distinct_versions_never_share_a_physical_name() {
        // Catalog names never start with "del_", which keeps ca_ and ca_del_ apart.
        for name in ["vtn", "vbr_if", "boundary"] {
            let mut seen = std::collections::HashSet::new();
            for version in ConfigVersion::ALL {
                let physical = version.physical_name(name).expect("valid version");
                assert!(seen.insert(physical), "collision for {version} {name}");
            }
        }
    }
}
