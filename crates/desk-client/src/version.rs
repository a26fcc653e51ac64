//! System version parsing and the single-point-of-control threshold

use std::fmt;
use std::str::FromStr;

use crate::error::DeskError;

/// First firmware release that enforces single point of control
pub const CONTROL_TOKEN_MIN_VERSION: FirmwareVersion = FirmwareVersion::new(4, 2, 0);

/// Dotted firmware version, compared numerically component by component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FirmwareVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether this firmware requires a control token for brakes and FCI
    pub fn requires_control_token(&self) -> bool {
        *self >= CONTROL_TOKEN_MIN_VERSION
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Accepts `4`, `4.2`, `4.2.1`, an optional leading `v`, and ignores any
/// pre-release/build suffix (`4.2.1-rc1`, `4.2.1+abc`) or components past
/// the third.
impl FromStr for FirmwareVersion {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let core = trimmed
            .split(['-', '+', ' '])
            .next()
            .unwrap_or_default();

        if core.is_empty() {
            return Err(DeskError::InvalidVersion(s.to_string()));
        }

        let mut parts = [0u32; 3];
        for (i, component) in core.split('.').enumerate() {
            let value = component
                .parse::<u32>()
                .map_err(|_| DeskError::InvalidVersion(s.to_string()))?;
            if i < parts.len() {
                parts[i] = value;
            }
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

/// Extract the version from the body of `GET /admin/api/system-version`.
///
/// The body is a quoted string whose first line is the version; the line
/// break may arrive either as an escaped `\n` or as a real newline.
pub fn parse_system_version(body: &str) -> Result<(String, FirmwareVersion), DeskError> {
    let unquoted = body.trim().trim_matches('"');
    let first_line = unquoted
        .split("\\n")
        .next()
        .and_then(|line| line.lines().next())
        .unwrap_or_default()
        .trim();

    let version = first_line.parse::<FirmwareVersion>()?;
    Ok((first_line.to_string(), version))
}
