//! Semantic version canonicalization and precedence.
//!
//! Version strings in the wild are loose (`1.0`, `v2.3.4.5`, `1.0-alpha`).
//! [`canonicalize`] pulls a strict `MAJOR.MINOR.PATCH[-PRE][+BUILD]` out of
//! them; [`is_newer`] orders the result by semver precedence.

use std::cmp::Ordering;
use std::fmt;

use crate::error::GateError;

/// A canonical semantic version. Only constructed through [`canonicalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(semver::Version);

impl Version {
    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    /// Semver precedence. Build metadata is ignored, so two versions that
    /// differ only in build compare `Equal` here while `==` still tells them
    /// apart.
    pub fn precedence_cmp(&self, other: &Self) -> Ordering {
        (self.0.major, self.0.minor, self.0.patch)
            .cmp(&(other.0.major, other.0.minor, other.0.patch))
            .then_with(|| self.0.pre.cmp(&other.0.pre))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Build a canonical [`Version`] out of `raw`, however dirty it is.
///
/// The first `MAJOR[.MINOR[.PATCH]]` run of digits anywhere in `raw` supplies
/// the numeric core (missing parts default to 0, extra parts are dropped).
/// The prerelease is the text between the first `-` and the next `+`; the
/// build is the text after the first `+`.
pub fn canonicalize(raw: &str) -> Result<Version, GateError> {
    use std::sync::LazyLock;
    static CORE_RE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"[0-9]+(?:\.[0-9]+)?(?:\.[0-9]+)?").unwrap());

    let raw = raw.trim();
    let core = CORE_RE
        .find(raw)
        .ok_or_else(|| GateError::MalformedVersion(raw.to_string()))?
        .as_str();

    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(core.split('.')) {
        *slot = part.parse().map_err(|_| GateError::InvalidVersion {
            raw: raw.to_string(),
            converted: core.to_string(),
        })?;
    }
    let [major, minor, patch] = numbers;

    let (prerelease, build) = split_labels(raw);
    let mut converted = format!("{major}.{minor}.{patch}");
    if !prerelease.is_empty() {
        converted.push('-');
        converted.push_str(prerelease);
    }
    if !build.is_empty() {
        converted.push('+');
        converted.push_str(build);
    }

    semver::Version::parse(&converted)
        .map(Version)
        .map_err(|_| GateError::InvalidVersion {
            raw: raw.to_string(),
            converted,
        })
}

/// True when `a` has strictly higher precedence than `b`.
pub fn is_newer(a: &Version, b: &Version) -> bool {
    a.precedence_cmp(b) == Ordering::Greater
}

/// Returns `(prerelease, build)`. A `-` that only appears inside the build
/// metadata does not start a prerelease.
fn split_labels(raw: &str) -> (&str, &str) {
    let (head, build) = raw.split_once('+').unwrap_or((raw, ""));
    let prerelease = head.split_once('-').map_or("", |(_, pre)| pre);
    (prerelease, build)
}
