//! Build metadata embedded by build.rs

use std::fmt;

/// Build information embedded at compile time
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Short commit hash, "unknown" outside a git checkout
    pub git_hash: &'static str,
    pub git_branch: &'static str,
    git_dirty: &'static str,
    pub build_timestamp: &'static str,
    pub target: &'static str,
    pub profile: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("PRESENCE_ROLES_GIT_HASH"),
            git_branch: env!("PRESENCE_ROLES_GIT_BRANCH"),
            git_dirty: env!("PRESENCE_ROLES_GIT_DIRTY"),
            build_timestamp: env!("PRESENCE_ROLES_BUILD_TIMESTAMP"),
            target: env!("PRESENCE_ROLES_TARGET"),
            profile: env!("PRESENCE_ROLES_PROFILE"),
            rustc_version: env!("PRESENCE_ROLES_RUSTC_VERSION"),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.git_dirty == "true"
    }

    /// Version with commit, e.g. "0.1.0-abc1234"
    pub fn full_version(&self) -> String {
        let dirty = if self.is_dirty() { "-dirty" } else { "" };
        format!("{}-{}{}", self.version, self.git_hash, dirty)
    }

    /// User-Agent sent with feed requests
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.name, self.full_version())
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f)?;
        writeln!(f, "  Git Branch: {}", self.git_branch)?;
        writeln!(f, "  Built:      {}", self.build_timestamp)?;
        writeln!(f, "  Profile:    {}", self.profile)?;
        writeln!(f, "  Target:     {}", self.target)?;
        writeln!(f, "  Compiler:   {}", self.rustc_version)?;
        Ok(())
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo::current()
}

pub fn print_version() {
    print!("{}", build_info());
}
