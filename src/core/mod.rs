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

//! Core emulation components
//!
//! This module contains the CD-ROM drive controller and its supporting
//! pieces:
//! - CD-ROM controller (register file, commands, drive state machine, audio)
//! - Guest bus boundary (interrupt line, DMA request line, audio mixer)
//! - Timing vocabulary (tick counts, master clock)
//! - Save state serialization
//! - Error types

pub mod bus;
pub mod cdrom;
pub mod error;
pub mod save_state;
pub mod timing;

// Re-export commonly used types
pub use bus::{GuestBus, NullBus};
pub use cdrom::{CDPosition, DiscImage, CDROM};
pub use error::{CdRomError, Result};
pub use save_state::{CdRomState, StateSave};
pub use timing::{TickCount, MASTER_CLOCK};
