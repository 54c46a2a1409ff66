//! Protocol versions and version-dependent selection.
//!
//! Versions are ordered by their position in [`SUPPORTED_VERSIONS`], which is
//! chronological. Protocol numbers cannot be compared directly: they are not
//! monotonic across release branches, and some releases share a number.

use crate::error::VersionResolutionError;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Bit set in the protocol number of snapshots and pre-releases.
pub const PRERELEASE: i32 = 1 << 30;

/// A protocol version: a symbolic name and its protocol number.
#[derive(Clone, Copy)]
pub struct Version {
    name: Option<&'static str>,
    protocol: i32,
}

impl Version {
    pub const V1_12_2: Version = Version::known("1.12.2", 340);
    pub const V1_13: Version = Version::known("1.13", 393);
    pub const V1_13_1: Version = Version::known("1.13.1", 401);
    pub const V1_13_2: Version = Version::known("1.13.2", 404);
    pub const V1_14: Version = Version::known("1.14", 477);
    pub const V1_14_1: Version = Version::known("1.14.1", 480);
    pub const V1_14_2: Version = Version::known("1.14.2", 485);
    pub const V1_14_3: Version = Version::known("1.14.3", 490);
    pub const V1_14_4: Version = Version::known("1.14.4", 498);
    pub const V1_15: Version = Version::known("1.15", 573);
    pub const V1_15_1: Version = Version::known("1.15.1", 575);
    pub const V1_15_2: Version = Version::known("1.15.2", 578);
    pub const V1_16: Version = Version::known("1.16", 735);
    pub const V1_16_1: Version = Version::known("1.16.1", 736);
    pub const V1_16_2: Version = Version::known("1.16.2", 751);
    pub const V1_16_3: Version = Version::known("1.16.3", 753);
    pub const V1_16_4: Version = Version::known("1.16.4", 754);
    pub const V1_16_5: Version = Version::known("1.16.5", 754);

    const fn known(name: &'static str, protocol: i32) -> Self {
        Self {
            name: Some(name),
            protocol,
        }
    }

    /// The sentinel used before a version has been negotiated.
    pub const fn unknown() -> Self {
        Self {
            name: None,
            protocol: -1,
        }
    }

    /// Returns the newest supported version.
    pub fn latest() -> Self {
        SUPPORTED_VERSIONS[SUPPORTED_VERSIONS.len() - 1]
    }

    /// Looks up a supported version by name.
    pub fn from_name(name: &str) -> Option<Self> {
        SUPPORTED_VERSIONS.iter().copied().find(|v| v.name == Some(name))
    }

    /// Creates a version from a protocol number.
    ///
    /// Any number is accepted. The name is taken from the newest registry entry
    /// with that number, so unsupported numbers produce a nameless version.
    pub fn from_protocol(protocol: i32) -> Self {
        Self {
            name: Self::name_from_protocol(protocol),
            protocol,
        }
    }

    /// Returns the newest registered name for a protocol number.
    pub fn name_from_protocol(protocol: i32) -> Option<&'static str> {
        SUPPORTED_VERSIONS
            .iter()
            .rev()
            .find(|v| v.protocol == protocol)
            .and_then(|v| v.name)
    }

    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    pub fn protocol(&self) -> i32 {
        self.protocol
    }

    /// Returns whether this version appears in the registry.
    pub fn is_supported(&self) -> bool {
        self.rank().is_some()
    }

    /// Returns whether this is a snapshot or pre-release protocol number.
    pub fn is_prerelease(&self) -> bool {
        self.protocol >= 0 && self.protocol & PRERELEASE != 0
    }

    // Unregistered versions have no rank and sort before every registered one.
    fn rank(&self) -> Option<usize> {
        SUPPORTED_VERSIONS
            .iter()
            .rposition(|v| v.protocol == self.protocol)
    }
}

/// Every supported version, oldest first.
pub const SUPPORTED_VERSIONS: &[Version] = &[
    Version::V1_12_2,
    Version::V1_13,
    Version::V1_13_1,
    Version::V1_13_2,
    Version::V1_14,
    Version::V1_14_1,
    Version::V1_14_2,
    Version::V1_14_3,
    Version::V1_14_4,
    Version::V1_15,
    Version::V1_15_1,
    Version::V1_15_2,
    Version::V1_16,
    Version::V1_16_1,
    Version::V1_16_2,
    Version::V1_16_3,
    Version::V1_16_4,
    Version::V1_16_5,
];

impl Default for Version {
    fn default() -> Self {
        Self::unknown()
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.protocol == other.protocol
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.protocol.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.protocol.cmp(&other.protocol))
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({:?}, {})", self.name, self.protocol)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => f.write_str(name),
            None if self.protocol < 0 => f.write_str("unknown"),
            None => write!(f, "protocol {}", self.protocol),
        }
    }
}

/// Error returned when parsing a version name that is not registered.
#[derive(Debug, Clone, Error)]
#[error("unsupported version: {0}")]
pub struct UnknownVersion(pub String);

impl FromStr for Version {
    type Err = UnknownVersion;

    /// Parses either a registered name (`"1.12.2"`) or a protocol number (`"340"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(version) = Self::from_name(s) {
            return Ok(version);
        }
        s.parse::<i32>()
            .map(Self::from_protocol)
            .map_err(|_| UnknownVersion(s.to_string()))
    }
}

/// A half-open range of versions, `[start, stop)`, with optional bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    start: Option<Version>,
    stop: Option<Version>,
}

impl VersionRange {
    pub const fn new(start: Option<Version>, stop: Option<Version>) -> Self {
        Self { start, stop }
    }

    /// Every version, including unknown ones.
    pub const fn all() -> Self {
        Self::new(None, None)
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.start.map_or(true, |start| *version >= start)
            && self.stop.map_or(true, |stop| *version < stop)
    }
}

impl From<Range<Version>> for VersionRange {
    fn from(range: Range<Version>) -> Self {
        Self::new(Some(range.start), Some(range.end))
    }
}

impl From<RangeFrom<Version>> for VersionRange {
    fn from(range: RangeFrom<Version>) -> Self {
        Self::new(Some(range.start), None)
    }
}

impl From<RangeTo<Version>> for VersionRange {
    fn from(range: RangeTo<Version>) -> Self {
        Self::new(None, Some(range.end))
    }
}

impl From<RangeFull> for VersionRange {
    fn from(_: RangeFull) -> Self {
        Self::all()
    }
}

/// Decides whether a [`VersionSwitcher`] arm applies to a version.
#[derive(Clone)]
pub enum Selector {
    /// A registered version name; matches every version sharing its protocol number.
    Name(Cow<'static, str>),
    /// An explicit set of versions.
    Versions(Vec<Version>),
    Range(VersionRange),
    Predicate(Arc<dyn Fn(&Version) -> bool + Send + Sync>),
}

impl Selector {
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Selector::Name(name) => Version::from_name(name).map_or(false, |v| v == *version),
            Selector::Versions(versions) => versions.contains(version),
            Selector::Range(range) => range.contains(version),
            Selector::Predicate(predicate) => predicate(version),
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Selector::Versions(versions) => f.debug_tuple("Versions").field(versions).finish(),
            Selector::Range(range) => f.debug_tuple("Range").field(range).finish(),
            Selector::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Picks a value according to the active version.
///
/// Arms are scanned in declaration order and the first matching selector wins.
/// When nothing matches the default is used, if there is one.
///
/// ```
/// use craftwire_protocol::version::{Version, VersionSwitcher};
///
/// let id = VersionSwitcher::new()
///     .exact("1.12.2", 0x1f)
///     .range(Version::V1_13..Version::V1_14, 0x21)
///     .or_else(0x20);
///
/// assert_eq!(*id.get(&Version::V1_13_1).unwrap(), 0x21);
/// assert_eq!(*id.get(&Version::V1_16_5).unwrap(), 0x20);
/// ```
#[derive(Clone)]
pub struct VersionSwitcher<T> {
    arms: Vec<(Selector, T)>,
    default: Option<T>,
}

impl<T> VersionSwitcher<T> {
    pub fn new() -> Self {
        Self {
            arms: Vec::new(),
            default: None,
        }
    }

    /// Adds an arm with an arbitrary selector.
    pub fn arm(mut self, selector: Selector, value: T) -> Self {
        self.arms.push((selector, value));
        self
    }

    /// Adds an arm matching a registered version name.
    pub fn exact(self, name: impl Into<Cow<'static, str>>, value: T) -> Self {
        self.arm(Selector::Name(name.into()), value)
    }

    /// Adds an arm matching any of the given versions.
    pub fn versions(self, versions: impl IntoIterator<Item = Version>, value: T) -> Self {
        self.arm(Selector::Versions(versions.into_iter().collect()), value)
    }

    /// Adds an arm matching a version range.
    pub fn range(self, range: impl Into<VersionRange>, value: T) -> Self {
        self.arm(Selector::Range(range.into()), value)
    }

    /// Adds an arm matching versions accepted by `predicate`.
    pub fn matching<F>(self, predicate: F, value: T) -> Self
    where
        F: Fn(&Version) -> bool + Send + Sync + 'static,
    {
        self.arm(Selector::Predicate(Arc::new(predicate)), value)
    }

    /// Sets the value used when no arm matches.
    pub fn or_else(mut self, value: T) -> Self {
        self.default = Some(value);
        self
    }

    /// Resolves the value for `version`.
    pub fn get(&self, version: &Version) -> Result<&T, VersionResolutionError> {
        self.arms
            .iter()
            .find(|(selector, _)| selector.matches(version))
            .map(|(_, value)| value)
            .or(self.default.as_ref())
            .ok_or(VersionResolutionError { version: *version })
    }

    /// Iterates over every value this switcher can produce.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.arms
            .iter()
            .map(|(_, value)| value)
            .chain(self.default.iter())
    }

    /// Converts every value, keeping the selectors.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> VersionSwitcher<U> {
        VersionSwitcher {
            arms: self
                .arms
                .into_iter()
                .map(|(selector, value)| (selector, f(value)))
                .collect(),
            default: self.default.map(f),
        }
    }
}

impl<T> Default for VersionSwitcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for VersionSwitcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionSwitcher")
            .field("arms", &self.arms)
            .field("default", &self.default)
            .finish()
    }
}
