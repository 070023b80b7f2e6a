use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    Argument(String),
    #[error("invalid item: {0}")]
    InvalidItem(String),
    #[error("invalid share: {0}")]
    InvalidShare(String),
    #[error("operation not allowed: {0}")]
    OperationNotAllowed(String),
    #[error("access token is not set, authenticate first")]
    SessionNotLinked,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("cannot resolve `{path}` at segment `{segment}`: {reason}")]
    UnresolvedPath {
        path: String,
        segment: String,
        reason: ResolveFailure,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveFailure {
    NotFound,
    Ambiguous,
}

impl std::fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveFailure::NotFound => f.write_str("no folder with that name"),
            ResolveFailure::Ambiguous => f.write_str("more than one folder with that name"),
        }
    }
}

impl Error {
    pub(crate) fn argument(message: impl Into<String>) -> Self {
        Error::Argument(message.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Kind of the structured service failure, if this is one.
    pub fn service_kind(&self) -> Option<ServiceErrorKind> {
        match self {
            Error::Service(err) => Some(err.kind),
            _ => None,
        }
    }

    pub fn family(&self) -> Option<ErrorFamily> {
        self.service_kind().map(ServiceErrorKind::family)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err)
        } else if err.is_connect() {
            TransportError::ConnectionFailed(err)
        } else {
            TransportError::Client(err)
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.into())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Transport(err.into())
    }
}

/// A non-success response exactly as the server sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFailure {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub code: Option<i64>,
    pub message: String,
    pub failure: ServerFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorFamily {
    General,
    FileSystem,
    Share,
    Folder,
    File,
    Endpoint,
    Unclassified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceErrorKind {
    // general / api
    InvalidRequest,
    GeneralPanic,
    Api,
    ApiCallLimitReached,
    // filesystem / version
    InvalidVersion,
    VersionMismatchIgnored,
    OriginalPathNoLongerExists,
    // share
    SharePathRequired,
    SharePathDoesNotExist,
    WouldExceedQuota,
    ShareDoesNotExist,
    // folder
    FolderDoesNotExist,
    FolderNotFound,
    UploadToReadOnlyDestinationFailed,
    MoveToReadOnlyDestinationFailed,
    CopyToReadOnlyDestinationFailed,
    RenameOnReadOnlyLocationFailed,
    DeleteOnReadOnlyLocationFailed,
    CreateFolderOnReadOnlyLocationFailed,
    FailedToReadFilesystem,
    NameConflictCreatingFolder,
    NameConflictOnUpload,
    NameConflictOnRename,
    NameConflictOnMove,
    NameConflictOnCopy,
    FailedToSaveChanges,
    FailedToBroadcastUpdate,
    CannotDeleteTheInfiniteDrive,
    FolderMissingToParameter,
    ExistsParameterInvalid,
    MissingPathParameter,
    SpecifiedLocationIsReadOnly,
    SpecifiedSourceIsReadOnly,
    SpecifiedDestinationIsReadOnly,
    FolderPathDoesNotExist,
    PermissionDenied,
    RenamePermissionDenied,
    NameConflictInOperation,
    InvalidOperation,
    VersionMissingOrIncorrect,
    InvalidDepth,
    VersionDoesNotExist,
    FolderNameRequired,
    InvalidName,
    TreeRequired,
    InvalidVerbose,
    DirectoryNotEmpty,
    // file
    NotFound,
    FileInvalidOperation,
    FileInvalidName,
    InvalidExists,
    ExtensionTooLong,
    InvalidDateCreated,
    InvalidDateMetaLastModified,
    InvalidDateContentLastModified,
    MimeTooLong,
    SizeMustBePositive,
    NameRequired,
    SizeRequired,
    ToPathRequired,
    FileVersionMissingOrIncorrect,
    // endpoint
    InvalidPath,
    AlreadyExists,
    NotAllowed,
    /// The server failed without a structured `error` payload.
    Unclassified,
}

impl ServiceErrorKind {
    /// Maps a numeric service error code to its kind. Codes are fixed by the
    /// remote service and must not be renumbered.
    pub fn from_code(code: i64) -> Option<Self> {
        use ServiceErrorKind::*;
        let kind = match code {
            9999 => GeneralPanic,
            9000 => Api,
            9006 => ApiCallLimitReached,

            8001 => InvalidVersion,
            8002 => VersionMismatchIgnored,
            8004 => OriginalPathNoLongerExists,

            6001 => SharePathRequired,
            6002 => SharePathDoesNotExist,
            6003 => WouldExceedQuota,
            6004 => ShareDoesNotExist,

            2002 => FolderDoesNotExist,
            2003 => FolderNotFound,
            2004 => UploadToReadOnlyDestinationFailed,
            2005 => MoveToReadOnlyDestinationFailed,
            2006 => CopyToReadOnlyDestinationFailed,
            2007 => RenameOnReadOnlyLocationFailed,
            2008 => DeleteOnReadOnlyLocationFailed,
            2009 => CreateFolderOnReadOnlyLocationFailed,
            2010..=2013 => FailedToReadFilesystem,
            2014 => NameConflictCreatingFolder,
            2015 => NameConflictOnUpload,
            2016 => NameConflictOnRename,
            2017 => NameConflictOnMove,
            2018 => NameConflictOnCopy,
            2019..=2021 | 2024 | 2025 => FailedToSaveChanges,
            2022 | 2023 => FailedToBroadcastUpdate,
            2026 => CannotDeleteTheInfiniteDrive,
            2028 => FolderMissingToParameter,
            2033 => ExistsParameterInvalid,
            2034 => MissingPathParameter,
            2036 => SpecifiedLocationIsReadOnly,
            2037 => SpecifiedSourceIsReadOnly,
            2038 => SpecifiedDestinationIsReadOnly,
            2039 => FolderPathDoesNotExist,
            2040 => PermissionDenied,
            2041 => RenamePermissionDenied,
            2042 => NameConflictInOperation,
            2043 => InvalidOperation,
            2044 => VersionMissingOrIncorrect,
            2045 => InvalidDepth,
            2046 => VersionDoesNotExist,
            2047 => FolderNameRequired,
            2048 => InvalidName,
            2049 => TreeRequired,
            2050 => InvalidVerbose,
            2052 => DirectoryNotEmpty,

            3001 => NotFound,
            3007 => FileInvalidOperation,
            3008 => FileInvalidName,
            3009 => InvalidExists,
            3010 => ExtensionTooLong,
            3011 => InvalidDateCreated,
            3012 => InvalidDateMetaLastModified,
            3013 => InvalidDateContentLastModified,
            3014 => MimeTooLong,
            3015 => SizeMustBePositive,
            3018 => NameRequired,
            3019 => SizeRequired,
            3020 => ToPathRequired,
            3021 => FileVersionMissingOrIncorrect,

            _ => return None,
        };
        Some(kind)
    }

    pub fn family(self) -> ErrorFamily {
        use ServiceErrorKind::*;
        match self {
            InvalidRequest | GeneralPanic | Api | ApiCallLimitReached => ErrorFamily::General,
            InvalidVersion | VersionMismatchIgnored | OriginalPathNoLongerExists => {
                ErrorFamily::FileSystem
            }
            SharePathRequired | SharePathDoesNotExist | WouldExceedQuota | ShareDoesNotExist => {
                ErrorFamily::Share
            }
            FolderDoesNotExist
            | FolderNotFound
            | UploadToReadOnlyDestinationFailed
            | MoveToReadOnlyDestinationFailed
            | CopyToReadOnlyDestinationFailed
            | RenameOnReadOnlyLocationFailed
            | DeleteOnReadOnlyLocationFailed
            | CreateFolderOnReadOnlyLocationFailed
            | FailedToReadFilesystem
            | NameConflictCreatingFolder
            | NameConflictOnUpload
            | NameConflictOnRename
            | NameConflictOnMove
            | NameConflictOnCopy
            | FailedToSaveChanges
            | FailedToBroadcastUpdate
            | CannotDeleteTheInfiniteDrive
            | FolderMissingToParameter
            | ExistsParameterInvalid
            | MissingPathParameter
            | SpecifiedLocationIsReadOnly
            | SpecifiedSourceIsReadOnly
            | SpecifiedDestinationIsReadOnly
            | FolderPathDoesNotExist
            | PermissionDenied
            | RenamePermissionDenied
            | NameConflictInOperation
            | InvalidOperation
            | VersionMissingOrIncorrect
            | InvalidDepth
            | VersionDoesNotExist
            | FolderNameRequired
            | InvalidName
            | TreeRequired
            | InvalidVerbose
            | DirectoryNotEmpty => ErrorFamily::Folder,
            NotFound
            | FileInvalidOperation
            | FileInvalidName
            | InvalidExists
            | ExtensionTooLong
            | InvalidDateCreated
            | InvalidDateMetaLastModified
            | InvalidDateContentLastModified
            | MimeTooLong
            | SizeMustBePositive
            | NameRequired
            | SizeRequired
            | ToPathRequired
            | FileVersionMissingOrIncorrect => ErrorFamily::File,
            InvalidPath | AlreadyExists | NotAllowed => ErrorFamily::Endpoint,
            Unclassified => ErrorFamily::Unclassified,
        }
    }
}

/// Converts a failed response into the typed taxonomy.
///
/// A body that is not JSON, or JSON without an `error` field, yields an
/// `Unclassified` error that still carries the original failure. A
/// structured error whose code is missing or unknown becomes
/// `InvalidRequest`.
pub fn translate(failure: ServerFailure) -> ServiceError {
    let parsed = match serde_json::from_str::<Value>(&failure.body) {
        Ok(Value::Object(map)) => map,
        _ => return unclassified(failure),
    };
    let Some(error) = parsed.get("error") else {
        return unclassified(failure);
    };

    let (code, message) = match error {
        Value::Object(fields) => (
            fields.get("code").and_then(code_of),
            fields.get("message").map(message_of),
        ),
        scalar => (
            parsed.get("error_code").and_then(code_of),
            Some(
                parsed
                    .get("message")
                    .map(message_of)
                    .unwrap_or_else(|| message_of(scalar)),
            ),
        ),
    };
    let message = message.unwrap_or_else(|| failure.body.clone());
    let kind = code
        .and_then(ServiceErrorKind::from_code)
        .unwrap_or(ServiceErrorKind::InvalidRequest);

    ServiceError {
        kind,
        code,
        message,
        failure,
    }
}

fn unclassified(failure: ServerFailure) -> ServiceError {
    ServiceError {
        kind: ServiceErrorKind::Unclassified,
        code: None,
        message: failure.body.clone(),
        failure,
    }
}

fn code_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn message_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
