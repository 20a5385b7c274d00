// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 spindle-core contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// CD-ROM subsystem error types
use std::fmt;

/// Result type for CD-ROM operations
pub type Result<T> = std::result::Result<T, CdRomError>;

/// CD-ROM subsystem error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdRomError {
    /// Disc image could not be loaded (bad .cue, missing .bin, etc.)
    DiscLoadError(String),

    /// I/O error (file operations)
    IoError {
        /// Error message
        message: String,
    },

    /// Save state file has an incompatible version number
    InvalidSaveStateVersion {
        /// Version this build writes and understands
        expected: u32,
        /// Version found in the file
        got: u32,
    },

    /// Save state could not be encoded or decoded
    SaveStateError {
        /// Error message
        message: String,
    },
}

impl fmt::Display for CdRomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdRomError::DiscLoadError(message) => {
                write!(f, "Disc load error: {}", message)
            }
            CdRomError::IoError { message } => {
                write!(f, "I/O error: {}", message)
            }
            CdRomError::InvalidSaveStateVersion { expected, got } => {
                write!(
                    f,
                    "Incompatible save state version: expected {}, got {}",
                    expected, got
                )
            }
            CdRomError::SaveStateError { message } => {
                write!(f, "Save state error: {}", message)
            }
        }
    }
}

impl std::error::Error for CdRomError {}

impl From<std::io::Error> for CdRomError {
    fn from(err: std::io::Error) -> Self {
        CdRomError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<bincode::error::EncodeError> for CdRomError {
    fn from(err: bincode::error::EncodeError) -> Self {
        CdRomError::SaveStateError {
            message: err.to_string(),
        }
    }
}

impl From<bincode::error::DecodeError> for CdRomError {
    fn from(err: bincode::error::DecodeError) -> Self {
        CdRomError::SaveStateError {
            message: err.to_string(),
        }
    }
}
