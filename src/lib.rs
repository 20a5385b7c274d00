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

//! PlayStation 1 CD-ROM drive controller emulation core
//!
//! This library implements the CD-ROM subsystem of a PlayStation 1 emulator:
//! the memory-mapped register file, command dispatcher, drive motion model,
//! CD-XA ADPCM / CDDA audio decoding, and save-state serialization. The rest
//! of the machine (CPU scheduler, DMA engine, interrupt controller, audio
//! mixer) is reached through the [`core::bus::GuestBus`] boundary trait.
//!
//! # Example
//!
//! ```
//! use spindle_core::core::bus::NullBus;
//! use spindle_core::core::cdrom::CDROM;
//!
//! let mut cdrom = CDROM::new();
//! let mut bus = NullBus;
//!
//! // Freshly powered on: parameter FIFO empty and writable.
//! let status = cdrom.read_register(0, &mut bus);
//! assert_eq!(status & 0x18, 0x18);
//! ```

pub mod core;
