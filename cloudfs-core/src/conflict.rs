use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// What the service does when the target name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exists {
    Fail,
    Overwrite,
    Rename,
    Reuse,
}

/// Mutating operations that carry a conflict directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateFolder,
    Upload,
    Move,
    Copy,
    ReceiveShare,
}

impl Operation {
    pub fn allowed(self) -> &'static [Exists] {
        match self {
            Operation::CreateFolder | Operation::Upload => {
                &[Exists::Fail, Exists::Overwrite, Exists::Rename, Exists::Reuse]
            }
            Operation::Move | Operation::Copy | Operation::ReceiveShare => {
                &[Exists::Fail, Exists::Overwrite, Exists::Rename]
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            Operation::CreateFolder => "create folder",
            Operation::Upload => "upload",
            Operation::Move => "move",
            Operation::Copy => "copy",
            Operation::ReceiveShare => "receive share",
        }
    }
}

impl Exists {
    pub fn as_str(self) -> &'static str {
        match self {
            Exists::Fail => "fail",
            Exists::Overwrite => "overwrite",
            Exists::Rename => "rename",
            Exists::Reuse => "reuse",
        }
    }

    /// Fails fast when `self` is not accepted by `operation`.
    pub fn check(self, operation: Operation) -> Result<Self, Error> {
        if operation.allowed().contains(&self) {
            Ok(self)
        } else {
            Err(Error::argument(format!(
                "exists={} is not accepted by {}",
                self.as_str(),
                operation.label()
            )))
        }
    }
}

/// Parses and checks a textual directive such as `"RENAME"`.
pub fn validate(operation: Operation, requested: &str) -> Result<Exists, Error> {
    requested.parse::<Exists>()?.check(operation)
}

impl FromStr for Exists {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FAIL" => Ok(Exists::Fail),
            "OVERWRITE" => Ok(Exists::Overwrite),
            "RENAME" => Ok(Exists::Rename),
            "REUSE" => Ok(Exists::Reuse),
            _ => Err(Error::argument(format!("invalid value for exists: {value}"))),
        }
    }
}

impl fmt::Display for Exists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour of a metadata save when the server version moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionConflict {
    #[default]
    Fail,
    Ignore,
}

impl VersionConflict {
    pub fn as_str(self) -> &'static str {
        match self {
            VersionConflict::Fail => "fail",
            VersionConflict::Ignore => "ignore",
        }
    }
}

impl FromStr for VersionConflict {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FAIL" => Ok(VersionConflict::Fail),
            "IGNORE" => Ok(VersionConflict::Ignore),
            _ => Err(Error::argument(format!(
                "invalid value for version-conflict: {value}"
            ))),
        }
    }
}

/// Recovery strategy for restoring a trashed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestorePolicy {
    #[default]
    Fail,
    Rescue,
    Recreate,
}

impl RestorePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            RestorePolicy::Fail => "fail",
            RestorePolicy::Rescue => "rescue",
            RestorePolicy::Recreate => "recreate",
        }
    }
}

impl FromStr for RestorePolicy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FAIL" => Ok(RestorePolicy::Fail),
            "RESCUE" => Ok(RestorePolicy::Rescue),
            "RECREATE" => Ok(RestorePolicy::Recreate),
            _ => Err(Error::argument(format!("invalid value for restore: {value}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_member_for_create_and_upload() {
        for value in ["FAIL", "OVERWRITE", "RENAME", "REUSE"] {
            assert!(validate(Operation::CreateFolder, value).is_ok(), "{value}");
            assert!(validate(Operation::Upload, value).is_ok(), "{value}");
        }
    }

    #[test]
    fn rejects_reuse_for_move_and_copy() {
        assert!(matches!(
            validate(Operation::Move, "REUSE"),
            Err(Error::Argument(_))
        ));
        assert!(matches!(
            Exists::Reuse.check(Operation::Copy),
            Err(Error::Argument(_))
        ));
        assert_eq!(validate(Operation::Move, "rename").unwrap(), Exists::Rename);
    }

    #[test]
    fn rejects_values_outside_the_set() {
        assert!(matches!(
            validate(Operation::Upload, "MERGE"),
            Err(Error::Argument(_))
        ));
        assert!("".parse::<Exists>().is_err());
    }

    #[test]
    fn parses_version_conflict_and_restore_policy() {
        assert_eq!(
            "ignore".parse::<VersionConflict>().unwrap(),
            VersionConflict::Ignore
        );
        assert!("OVERWRITE".parse::<VersionConflict>().is_err());
        assert_eq!(
            "RECREATE".parse::<RestorePolicy>().unwrap(),
            RestorePolicy::Recreate
        );
        assert!("REUSE".parse::<RestorePolicy>().is_err());
    }
}
