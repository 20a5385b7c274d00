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

//! Save state serialization for the CD-ROM controller
//!
//! The controller state is captured into [`CdRomState`] and serialized with
//! bincode. Struct field order is the wire order, so the format is stable as
//! long as the field list is.
//!
//! The inserted disc is recorded as its file name and current LBA; restoring
//! reopens the file and seeks back. If that fails the drive comes back
//! ejected and emulation continues.
//!
//! # Example
//!
//! ```no_run
//! use spindle_core::core::bus::NullBus;
//! use spindle_core::core::cdrom::CDROM;
//! use spindle_core::core::save_state::{CdRomState, StateSave};
//!
//! let mut cdrom = CDROM::new();
//! let mut bus = NullBus;
//!
//! let state = cdrom.to_state();
//! state.save_to_file("cdrom.state").unwrap();
//!
//! let loaded = CdRomState::load_from_file("cdrom.state").unwrap();
//! cdrom.restore_from_state(&loaded, &mut bus);
//! ```

use bincode::{config, Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::core::bus::GuestBus;
use crate::core::cdrom::CDPosition;
use crate::core::error::{CdRomError, Result};

/// Save state version for compatibility checking
///
/// Increment whenever the field list of [`CdRomState`] changes.
pub const SAVE_STATE_VERSION: u32 = 1;

/// Complete CD-ROM controller state
///
/// Captures the instantaneous machine: command pipeline, register file,
/// FIFOs, positional state, audio state and the media position. Field order
/// is the serialization order.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct CdRomState {
    /// Version number for compatibility checking
    pub version: u32,

    /// Opcode of the command in flight
    pub command: u8,

    /// Command pipeline state (0 idle, 1 wait-for-execute, 2 wait-for-irq)
    pub command_state: u8,

    /// Stage of a multi-stage command
    pub command_stage: u32,

    /// Ticks until the command stage executes
    pub command_remaining_ticks: i32,

    /// Ticks until the next sector or seek completion
    pub read_or_seek_remaining_ticks: i32,

    /// Status register byte
    pub status: u8,

    /// Secondary status ("stat") byte
    pub secondary_status: u8,

    /// Mode byte
    pub mode: u8,

    /// Interrupt enable register
    pub interrupt_enable_register: u8,

    /// Interrupt flag register
    pub interrupt_flag_register: u8,

    /// Held-back async interrupt code (0 = none)
    pub pending_async_interrupt: u8,

    /// Pending Setloc target
    pub setloc_position: CDPosition,

    /// In-flight seek target
    pub seek_position: CDPosition,

    /// Setloc target not yet consumed
    pub setloc_pending: bool,

    /// Read transition queued behind the seek
    pub read_after_seek: bool,

    /// Play transition queued behind the seek
    pub play_after_seek: bool,

    /// All CD audio muted
    pub muted: bool,

    /// XA-ADPCM muted
    pub adpcm_muted: bool,

    /// XA filter file number
    pub filter_file_number: u8,

    /// XA filter channel number
    pub filter_channel_number: u8,

    /// Header of the last sector read
    pub last_sector_header: [u8; 4],

    /// Subheader of the last data sector read
    pub last_sector_subheader: [u8; 8],

    /// In-force volume matrix
    pub cd_audio_volume_matrix: [[u8; 2]; 2],

    /// Staged volume matrix
    pub next_cd_audio_volume_matrix: [[u8; 2]; 2],

    /// ADPCM decoder history
    pub xa_last_samples: [i16; 4],

    /// Resampler ring buffers (left, right)
    pub xa_resample_ring_buffer: [[i16; 32]; 2],

    /// Resampler ring write pointer
    pub xa_resample_p: u8,

    /// Resampler six-step phase counter
    pub xa_resample_sixstep: u8,

    /// Parameter FIFO contents
    pub param_fifo: Vec<u8>,

    /// Response FIFO contents
    pub response_fifo: Vec<u8>,

    /// Async response FIFO contents
    pub async_response_fifo: Vec<u8>,

    /// Data FIFO contents
    pub data_fifo: Vec<u8>,

    /// Sector buffer contents
    pub sector_buffer: Vec<u8>,

    /// Path of the inserted disc image (empty when no media)
    pub media_file_name: String,

    /// Read cursor of the inserted disc image
    pub media_lba: u32,
}

impl CdRomState {
    /// Save state to file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to save file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, serialization fails
    /// or the write fails.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config = config::standard();
        let encoded = bincode::encode_to_vec(self, config)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load state from file, verifying version compatibility.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to save file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, deserialization fails or
    /// the version does not match [`SAVE_STATE_VERSION`].
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        let config = config::standard();
        let (state, _): (CdRomState, usize) = bincode::decode_from_slice(&buffer, config)?;

        if state.version != SAVE_STATE_VERSION {
            return Err(CdRomError::InvalidSaveStateVersion {
                expected: SAVE_STATE_VERSION,
                got: state.version,
            });
        }

        Ok(state)
    }
}

/// Trait for components that can be saved and restored
///
/// After restoring, re-arm the host scheduler from the component's own
/// event query (for the CD-ROM controller,
/// [`crate::core::cdrom::CDROM::next_event_ticks`]), since the recorded
/// countdowns resume where they left off.
pub trait StateSave {
    /// The state type for this component
    type State;

    /// Capture this component into a saveable state
    fn to_state(&self) -> Self::State;

    /// Restore this component from a saved state
    ///
    /// # Arguments
    ///
    /// * `state` - The state to restore from
    /// * `bus` - Guest bus; outward line levels are re-driven to match the
    ///   restored machine
    fn restore_from_state(&mut self, state: &Self::State, bus: &mut dyn GuestBus);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> CdRomState {
        CdRomState {
            version: SAVE_STATE_VERSION,
            command: 0x06,
            command_state: 1,
            command_stage: 0,
            command_remaining_ticks: 1234,
            read_or_seek_remaining_ticks: 0,
            status: 0x98,
            secondary_status: 0x22,
            mode: 0x80,
            interrupt_enable_register: 0x1F,
            interrupt_flag_register: 0x03,
            pending_async_interrupt: 0,
            setloc_position: CDPosition::new(0, 2, 16),
            seek_position: CDPosition::new(0, 2, 0),
            setloc_pending: true,
            read_after_seek: false,
            play_after_seek: false,
            muted: false,
            adpcm_muted: false,
            filter_file_number: 1,
            filter_channel_number: 1,
            last_sector_header: [0, 2, 0, 2],
            last_sector_subheader: [0; 8],
            cd_audio_volume_matrix: [[0x80, 0x00], [0x00, 0x80]],
            next_cd_audio_volume_matrix: [[0x80, 0x00], [0x00, 0x80]],
            xa_last_samples: [1, 2, 3, 4],
            xa_resample_ring_buffer: [[0; 32]; 2],
            xa_resample_p: 5,
            xa_resample_sixstep: 3,
            param_fifo: vec![0x00, 0x02, 0x00],
            response_fifo: vec![0x02],
            async_response_fifo: Vec::new(),
            data_fifo: Vec::new(),
            sector_buffer: Vec::new(),
            media_file_name: String::new(),
            media_lba: 0,
        }
    }

    #[test]
    fn test_save_state_version() {
        assert_eq!(SAVE_STATE_VERSION, 1);
    }

    #[test]
    fn test_state_round_trip_in_memory() {
        let state = sample_state();

        let config = config::standard();
        let encoded = bincode::encode_to_vec(&state, config).unwrap();
        assert!(!encoded.is_empty());

        let (decoded, _): (CdRomState, usize) =
            bincode::decode_from_slice(&encoded, config).unwrap();

        assert_eq!(decoded.command, 0x06);
        assert_eq!(decoded.command_remaining_ticks, 1234);
        assert_eq!(decoded.setloc_position, CDPosition::new(0, 2, 16));
        assert_eq!(decoded.xa_last_samples, [1, 2, 3, 4]);
        assert_eq!(decoded.param_fifo, vec![0x00, 0x02, 0x00]);
    }

    #[test]
    fn test_save_load_file() {
        let state = sample_state();

        let file = tempfile::Builder::new()
            .prefix("cdrom_state_")
            .suffix(".state")
            .tempfile()
            .unwrap();
        state.save_to_file(file.path()).unwrap();

        let loaded = CdRomState::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.version, SAVE_STATE_VERSION);
        assert_eq!(loaded.command, state.command);
        assert_eq!(loaded.response_fifo, state.response_fifo);
    }

    #[test]
    fn test_version_check() {
        let mut state = sample_state();
        state.version = 999;

        let file = tempfile::Builder::new()
            .prefix("cdrom_state_ver_")
            .suffix(".state")
            .tempfile()
            .unwrap();
        state.save_to_file(file.path()).unwrap();

        let result = CdRomState::load_from_file(file.path());
        assert_eq!(
            result.unwrap_err(),
            CdRomError::InvalidSaveStateVersion {
                expected: SAVE_STATE_VERSION,
                got: 999
            }
        );
    }
}
