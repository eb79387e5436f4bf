use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// The protocol variants the transition knows about.
///
/// All variants share one pipeline; a variant only changes quotients and switches optional
/// stages on (sync committees from Altair, execution payloads from Bellatrix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub enum ForkName {
    Base,
    Altair,
    Bellatrix,
}

impl ForkName {
    pub fn list_all() -> Vec<Self> {
        vec![Self::Base, Self::Altair, Self::Bellatrix]
    }

    pub const fn latest() -> Self {
        Self::Bellatrix
    }

    pub fn altair_enabled(self) -> bool {
        self >= Self::Altair
    }

    pub fn bellatrix_enabled(self) -> bool {
        self >= Self::Bellatrix
    }

    /// The fork preceding this one, `None` for `Base`.
    pub const fn previous_fork(self) -> Option<Self> {
        match self {
            Self::Base => None,
            Self::Altair => Some(Self::Base),
            Self::Bellatrix => Some(Self::Altair),
        }
    }
}

impl Display for ForkName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Base => "phase0".fmt(f),
            Self::Altair => "altair".fmt(f),
            Self::Bellatrix => "bellatrix".fmt(f),
        }
    }
}

impl FromStr for ForkName {
    type Err = String;

    fn from_str(fork_name: &str) -> Result<Self, String> {
        Ok(match fork_name.to_lowercase().as_ref() {
            "phase0" | "base" => Self::Base,
            "altair" => Self::Altair,
            "bellatrix" | "merge" => Self::Bellatrix,
            _ => return Err(format!("unknown fork name: {fork_name}")),
        })
    }
}

impl From<ForkName> for String {
    fn from(fork: ForkName) -> Self {
        fork.to_string()
    }
}

impl TryFrom<String> for ForkName {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}
