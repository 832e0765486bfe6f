//! User-visible operation status lines.
//!
//! Every mutating workflow moves its panel's status line through
//! `InProgress` and then exactly one of `Succeeded` or `Failed`.

use std::fmt;

/// The user actions that submit confirms-or-fails calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RegisterPatient,
    UploadRecord,
    GrantAccess,
    DenyAccess,
    RequestAccess,
    RegisterProvider,
    VerifyProvider,
}

impl Operation {
    /// Status text while the operation is in flight.
    pub fn in_progress_message(self) -> &'static str {
        match self {
            Operation::RegisterPatient => "Registering...",
            Operation::UploadRecord => "Uploading to content store...",
            Operation::GrantAccess => "Granting access...",
            Operation::DenyAccess => "Denying access...",
            Operation::RequestAccess => "Requesting access...",
            Operation::RegisterProvider => "Registering provider...",
            Operation::VerifyProvider => "Verifying provider...",
        }
    }

    /// Status text once the remote call is confirmed.
    pub fn success_message(self) -> &'static str {
        match self {
            Operation::RegisterPatient => "Patient registered successfully!",
            Operation::UploadRecord => "Upload successful!",
            Operation::GrantAccess => "Access granted.",
            Operation::DenyAccess => "Access denied.",
            Operation::RequestAccess => "Request submitted.",
            Operation::RegisterProvider => {
                "Provider registration submitted. Await admin verification."
            }
            Operation::VerifyProvider => "Provider verified successfully.",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::RegisterPatient => "Registration",
            Operation::UploadRecord => "Upload",
            Operation::GrantAccess => "Grant access",
            Operation::DenyAccess => "Deny access",
            Operation::RequestAccess => "Request",
            Operation::RegisterProvider => "Provider registration",
            Operation::VerifyProvider => "Verification",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Idle,
    InProgress(String),
    Succeeded(String),
    Failed(String),
}

impl OperationStatus {
    pub fn started(operation: Operation) -> Self {
        OperationStatus::InProgress(operation.in_progress_message().to_owned())
    }

    pub fn succeeded(operation: Operation) -> Self {
        OperationStatus::Succeeded(operation.success_message().to_owned())
    }

    pub fn failed(error: &impl fmt::Display) -> Self {
        OperationStatus::Failed(error.to_string())
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, OperationStatus::InProgress(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, OperationStatus::Failed(_))
    }

    /// The text shown to the user; empty when idle.
    pub fn message(&self) -> &str {
        match self {
            OperationStatus::Idle => "",
            OperationStatus::InProgress(m)
            | OperationStatus::Succeeded(m)
            | OperationStatus::Failed(m) => m,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
