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

//! CD-ROM drive controller emulation for PlayStation 1
//!
//! This module emulates the CD-ROM drive controller: a 4-byte memory-mapped
//! register window with an index-multiplexed port, four byte FIFOs, a
//! command dispatcher with host-acknowledgement gating, a cycle-counting
//! drive motion model and the CD-XA / CDDA audio paths into the mixer.
//!
//! # Register window
//!
//! | Off | Idx | Read                | Write                          |
//! |-----|-----|---------------------|--------------------------------|
//! | 0   | *   | Status              | Index (low 2 bits)             |
//! | 1   | *   | Response FIFO       | 0: command, 3: volume R->L     |
//! | 2   | *   | Data FIFO           | 0: parameter, 1: IRQ enable,   |
//! |     |     |                     | 2: volume L->L, 3: volume R->L |
//! | 3   | 0/2 | IRQ enable          | 0: request, 2: volume L->R     |
//! | 3   | 1/3 | IRQ flag            | 1: IRQ flag ack, 3: apply vol  |
//!
//! # Interrupt codes
//!
//! - INT1 (1): new sector data available
//! - INT2 (2): command / seek completion
//! - INT3 (3): command acknowledge ("ACK")
//! - INT5 (5): error
//!
//! # Timing
//!
//! The host scheduler drives the controller through
//! [`CDROM::execute`] with elapsed guest CPU cycles and re-arms its
//! downcount from [`CDROM::next_event_ticks`]. Elapsed cycles must be
//! flushed through `execute` before the register window is touched, so
//! register accesses always observe a synchronized machine.
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
//! // Issue Getstat: the acknowledge arrives 4000 ticks later.
//! cdrom.write_register(1, 0x01, &mut bus);
//! cdrom.execute(4_000, &mut bus);
//! assert_ne!(cdrom.read_register(0, &mut bus) & 0x20, 0);
//! ```

pub mod disc;
pub mod xa;

mod commands;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::core::bus::GuestBus;
use crate::core::error::Result;
use crate::core::timing::{TickCount, MASTER_CLOCK};

pub use disc::DiscImage;

use xa::XAResampler;

/// Raw sector size (2352 bytes, sync included)
pub const RAW_SECTOR_SIZE: usize = 2352;

/// Sync area at the start of a raw sector
pub const SECTOR_SYNC_SIZE: usize = 12;

/// Payload of a data sector (sync, header and subheader stripped)
pub const DATA_SECTOR_SIZE: usize = 2048;

/// Parameter FIFO depth
const PARAM_FIFO_SIZE: usize = 16;

/// Valid bits of the interrupt enable / flag registers
const INTERRUPT_REGISTER_MASK: u8 = 0x1F;

/// Sub-CPU interrupt codes delivered through the flag register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// New sector data is ready
    Int1 = 0x01,
    /// Command or seek completion
    Int2 = 0x02,
    /// Command acknowledge
    Ack = 0x03,
    /// Error
    Int5 = 0x05,
}

/// Command pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandState {
    /// No command in flight
    Idle,
    /// Waiting for the ack/stage delay to elapse
    WaitForExecute,
    /// Stage finished, next stage gated on the host clearing the IRQ flag
    WaitForIRQClear,
}

impl CommandState {
    fn to_u8(self) -> u8 {
        match self {
            CommandState::Idle => 0,
            CommandState::WaitForExecute => 1,
            CommandState::WaitForIRQClear => 2,
        }
    }

    fn from_u8(value: u8) -> CommandState {
        match value {
            1 => CommandState::WaitForExecute,
            2 => CommandState::WaitForIRQClear,
            _ => CommandState::Idle,
        }
    }
}

/// CD-ROM position in MSF (Minute:Second:Frame) format
///
/// All fields are stored as plain decimal; BCD conversion happens at the
/// register boundary. LBA 0 corresponds to MSF 00:02:00 (the 2-second
/// pregap precedes the data area).
///
/// # Example
///
/// ```
/// use spindle_core::core::cdrom::CDPosition;
///
/// assert_eq!(CDPosition::new(0, 2, 0).to_lba(), 0);
/// assert_eq!(CDPosition::from_lba(75), CDPosition::new(0, 3, 0));
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode,
)]
pub struct CDPosition {
    /// Minute (0-99)
    pub minute: u8,
    /// Second (0-59)
    pub second: u8,
    /// Frame (0-74) - 75 frames per second
    pub frame: u8,
}

impl CDPosition {
    /// Create a new position
    pub fn new(minute: u8, second: u8, frame: u8) -> Self {
        Self {
            minute,
            second,
            frame,
        }
    }

    /// Convert MSF to logical block address
    ///
    /// The 2-second pregap is subtracted; positions inside the pregap clamp
    /// to LBA 0.
    pub fn to_lba(&self) -> u32 {
        let total =
            (self.minute as u32 * 60 + self.second as u32) * 75 + self.frame as u32;
        total.saturating_sub(150)
    }

    /// Convert logical block address to MSF
    pub fn from_lba(lba: u32) -> Self {
        Self::from_sector_count(lba + 150)
    }

    /// Split a raw sector count into an MSF triple without pregap handling
    pub(crate) fn from_sector_count(sectors: u32) -> Self {
        Self {
            minute: (sectors / 75 / 60) as u8,
            second: ((sectors / 75) % 60) as u8,
            frame: (sectors % 75) as u8,
        }
    }
}

/// Emulated drive state, reported to the guest as the "stat" byte
///
/// At most one of `reading`, `seeking` and `playing_cdda` is set at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecondaryStatus {
    /// Error occurred
    pub error: bool,
    /// Spindle motor on
    pub motor_on: bool,
    /// Seek error
    pub seek_error: bool,
    /// ID error (disc not recognized)
    pub id_error: bool,
    /// Shell open (disc tray open)
    pub shell_open: bool,
    /// Currently reading data sectors
    pub reading: bool,
    /// Currently seeking
    pub seeking: bool,
    /// Currently playing CDDA audio
    pub playing_cdda: bool,
}

impl SecondaryStatus {
    /// Pack into the wire byte
    pub fn bits(&self) -> u8 {
        (self.error as u8)
            | (self.motor_on as u8) << 1
            | (self.seek_error as u8) << 2
            | (self.id_error as u8) << 3
            | (self.shell_open as u8) << 4
            | (self.reading as u8) << 5
            | (self.seeking as u8) << 6
            | (self.playing_cdda as u8) << 7
    }

    /// Unpack from the wire byte
    pub fn set_bits(&mut self, bits: u8) {
        self.error = bits & 0x01 != 0;
        self.motor_on = bits & 0x02 != 0;
        self.seek_error = bits & 0x04 != 0;
        self.id_error = bits & 0x08 != 0;
        self.shell_open = bits & 0x10 != 0;
        self.reading = bits & 0x20 != 0;
        self.seeking = bits & 0x40 != 0;
        self.playing_cdda = bits & 0x80 != 0;
    }

    /// The drive is moving or streaming
    pub fn is_active(&self) -> bool {
        self.reading || self.seeking || self.playing_cdda
    }

    /// The drive is delivering sectors (data or audio)
    pub fn is_reading_or_playing(&self) -> bool {
        self.reading || self.playing_cdda
    }
}

/// Sticky drive-mode bits, set by the Setmode command
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveMode {
    /// CDDA mode
    pub cdda: bool,
    /// Pause automatically at the end of the track
    pub auto_pause: bool,
    /// Generate position reports while playing audio
    pub report_audio: bool,
    /// Only pass XA sectors matching the Setfilter file/channel
    pub xa_filter: bool,
    /// Ignore bit (sector size / position quirk, unused here)
    pub ignore_bit: bool,
    /// Deliver 2340-byte raw sectors instead of 2048-byte payloads
    pub read_raw_sector: bool,
    /// Decode XA-ADPCM sectors to the mixer
    pub xa_enable: bool,
    /// Spin at 2x (150 sectors per second)
    pub double_speed: bool,
}

impl DriveMode {
    /// Pack into the wire byte
    pub fn bits(&self) -> u8 {
        (self.cdda as u8)
            | (self.auto_pause as u8) << 1
            | (self.report_audio as u8) << 2
            | (self.xa_filter as u8) << 3
            | (self.ignore_bit as u8) << 4
            | (self.read_raw_sector as u8) << 5
            | (self.xa_enable as u8) << 6
            | (self.double_speed as u8) << 7
    }

    /// Unpack from the wire byte
    pub fn set_bits(&mut self, bits: u8) {
        self.cdda = bits & 0x01 != 0;
        self.auto_pause = bits & 0x02 != 0;
        self.report_audio = bits & 0x04 != 0;
        self.xa_filter = bits & 0x08 != 0;
        self.ignore_bit = bits & 0x10 != 0;
        self.read_raw_sector = bits & 0x20 != 0;
        self.xa_enable = bits & 0x40 != 0;
        self.double_speed = bits & 0x80 != 0;
    }
}

/// Header of the last sector read (raw bytes 12..16)
///
/// Minute/second/frame are the BCD values off the disc.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectorHeader(pub [u8; 4]);

impl SectorHeader {
    /// Minute, BCD
    pub fn minute(&self) -> u8 {
        self.0[0]
    }

    /// Second, BCD
    pub fn second(&self) -> u8 {
        self.0[1]
    }

    /// Frame, BCD
    pub fn frame(&self) -> u8 {
        self.0[2]
    }

    /// Sector mode (2 for CD-XA)
    pub fn sector_mode(&self) -> u8 {
        self.0[3]
    }
}

/// XA subheader of the last data sector (raw bytes 16..24, duplicate
/// included)
#[derive(Debug, Clone, Copy, Default)]
pub struct SectorSubHeader(pub [u8; 8]);

impl SectorSubHeader {
    /// File number this sector belongs to
    pub fn file_number(&self) -> u8 {
        self.0[0]
    }

    /// Channel number this sector belongs to
    pub fn channel_number(&self) -> u8 {
        self.0[1]
    }

    /// Raw submode byte
    pub fn submode(&self) -> u8 {
        self.0[2]
    }

    /// Raw coding information byte
    pub fn codinginfo(&self) -> u8 {
        self.0[3]
    }

    /// Submode: end-of-record
    pub fn end_of_record(&self) -> bool {
        self.0[2] & 0x01 != 0
    }

    /// Submode: video sector
    pub fn video(&self) -> bool {
        self.0[2] & 0x02 != 0
    }

    /// Submode: audio sector
    pub fn audio(&self) -> bool {
        self.0[2] & 0x04 != 0
    }

    /// Submode: data sector
    pub fn data(&self) -> bool {
        self.0[2] & 0x08 != 0
    }

    /// Submode: trigger
    pub fn trigger(&self) -> bool {
        self.0[2] & 0x10 != 0
    }

    /// Submode: form 2
    pub fn form2(&self) -> bool {
        self.0[2] & 0x20 != 0
    }

    /// Submode: real-time sector
    pub fn realtime(&self) -> bool {
        self.0[2] & 0x40 != 0
    }

    /// Submode: end-of-file
    pub fn eof(&self) -> bool {
        self.0[2] & 0x80 != 0
    }

    /// Coding info: stereo layout
    pub fn is_stereo(&self) -> bool {
        self.0[3] & 0x03 != 0
    }

    /// Coding info: 18900 Hz instead of 37800 Hz
    pub fn is_half_sample_rate(&self) -> bool {
        self.0[3] & 0x0C != 0
    }

    /// Coding info: 8 bits per sample instead of 4
    pub fn is_8bit(&self) -> bool {
        self.0[3] & 0x30 != 0
    }

    /// Decoded sample values in one sector for this coding
    pub fn samples_per_sector(&self) -> usize {
        if self.is_8bit() {
            xa::XA_ADPCM_SAMPLES_PER_SECTOR_8BIT
        } else {
            xa::XA_ADPCM_SAMPLES_PER_SECTOR_4BIT
        }
    }
}

/// CD-ROM drive controller
///
/// Owns the register file, FIFOs, the command pipeline and the drive motion
/// model, plus the inserted [`DiscImage`] (if any). All externally visible
/// side effects (interrupt line, DMA request level, mixer samples) go
/// through the [`GuestBus`] passed into each entry point.
pub struct CDROM {
    /// Opcode of the command in flight (0 when idle)
    command: u8,

    /// Command pipeline state
    command_state: CommandState,

    /// Stage of a multi-stage command (0-based)
    command_stage: u32,

    /// Ticks until the current command stage executes
    command_remaining_ticks: TickCount,

    /// Ticks until the next sector read or the seek completion
    read_or_seek_remaining_ticks: TickCount,

    /// Host-visible status register byte (index in the low 2 bits)
    status: u8,

    /// Emulated drive state ("stat" byte)
    secondary_status: SecondaryStatus,

    /// Sticky drive-mode bits
    mode: DriveMode,

    /// Interrupt enable register (5 bits)
    interrupt_enable_register: u8,

    /// Interrupt flag register (5 bits, write-one-to-clear)
    interrupt_flag_register: u8,

    /// Async interrupt code held back while a flag is outstanding (0 = none)
    pending_async_interrupt: u8,

    /// Target latched by Setloc, pending until a Seek/Read/Play consumes it
    setloc_position: CDPosition,

    /// Target of the in-flight seek
    seek_position: CDPosition,

    /// Setloc target not yet consumed
    setloc_pending: bool,

    /// Transition to reading once the in-flight seek completes
    read_after_seek: bool,

    /// Transition to CDDA playback once the in-flight seek completes
    play_after_seek: bool,

    /// All CD audio muted
    muted: bool,

    /// XA-ADPCM output muted (apply-volume register, bit 0)
    adpcm_muted: bool,

    /// XA filter: file number to pass
    filter_file_number: u8,

    /// XA filter: channel number to pass
    filter_channel_number: u8,

    /// Header of the last sector read
    last_sector_header: SectorHeader,

    /// Subheader of the last data sector read
    last_sector_subheader: SectorSubHeader,

    /// In-force CD audio volume matrix
    cd_audio_volume_matrix: [[u8; 2]; 2],

    /// Staged volume matrix, committed by the apply-volume register
    next_cd_audio_volume_matrix: [[u8; 2]; 2],

    /// ADPCM decoder history (left pair, right pair)
    xa_last_samples: [i16; 4],

    /// Zig-zag resampler state
    xa_resampler: XAResampler,

    /// Parameter FIFO (16 bytes, host writes)
    param_fifo: VecDeque<u8>,

    /// Response FIFO (host reads)
    response_fifo: VecDeque<u8>,

    /// Responses staged for the next async interrupt delivery
    async_response_fifo: VecDeque<u8>,

    /// Data FIFO (up to 2340 bytes, drained by DMA or CPU)
    data_fifo: VecDeque<u8>,

    /// Bytes of the most recently read sector
    sector_buffer: Vec<u8>,

    /// Inserted disc image, if any
    disc: Option<DiscImage>,
}

impl CDROM {
    /// Create a controller in the power-on state with no disc inserted.
    ///
    /// # Example
    ///
    /// ```
    /// use spindle_core::core::cdrom::CDROM;
    ///
    /// let cdrom = CDROM::new();
    /// assert!(!cdrom.has_media());
    /// ```
    pub fn new() -> Self {
        Self {
            command: 0,
            command_state: CommandState::Idle,
            command_stage: 0,
            command_remaining_ticks: 0,
            read_or_seek_remaining_ticks: 0,
            // Parameter FIFO empty + writable
            status: 0x18,
            secondary_status: SecondaryStatus::default(),
            mode: DriveMode::default(),
            interrupt_enable_register: INTERRUPT_REGISTER_MASK,
            interrupt_flag_register: 0,
            pending_async_interrupt: 0,
            setloc_position: CDPosition::default(),
            seek_position: CDPosition::default(),
            setloc_pending: false,
            read_after_seek: false,
            play_after_seek: false,
            muted: false,
            adpcm_muted: false,
            filter_file_number: 0,
            filter_channel_number: 0,
            last_sector_header: SectorHeader::default(),
            last_sector_subheader: SectorSubHeader::default(),
            cd_audio_volume_matrix: [[0x80, 0x00], [0x00, 0x80]],
            next_cd_audio_volume_matrix: [[0x80, 0x00], [0x00, 0x80]],
            xa_last_samples: [0; 4],
            xa_resampler: XAResampler::new(),
            param_fifo: VecDeque::new(),
            response_fifo: VecDeque::new(),
            async_response_fifo: VecDeque::new(),
            data_fifo: VecDeque::new(),
            sector_buffer: Vec::new(),
            disc: None,
        }
    }

    /// Insert a disc image, replacing any currently inserted one.
    ///
    /// # Arguments
    ///
    /// * `filename` - Path to the .cue file
    pub fn insert_media(&mut self, filename: &str) -> Result<()> {
        let media = DiscImage::load(filename)?;

        if self.has_media() {
            self.remove_media();
        }

        self.disc = Some(media);
        Ok(())
    }

    /// Eject the disc. Any in-flight seek or read is cancelled; its
    /// completion never fires.
    pub fn remove_media(&mut self) {
        if self.disc.is_none() {
            return;
        }

        log::info!("Removing CD");
        self.stop_reading();
        self.disc = None;
    }

    /// Whether a disc is inserted
    pub fn has_media(&self) -> bool {
        self.disc.is_some()
    }

    /// Inserted disc image, if any
    pub fn media(&self) -> Option<&DiscImage> {
        self.disc.as_ref()
    }

    /// Hard reset: re-seat the media at LBA 0 and restore power-on state.
    pub fn reset(&mut self, bus: &mut dyn GuestBus) {
        if let Some(disc) = self.disc.as_mut() {
            disc.seek_lba(0);
        }

        self.soft_reset(bus);
    }

    /// Ticks until the controller needs `execute` called again, if any.
    ///
    /// The host programs its scheduler downcount from this after every
    /// register access and after restoring a save state.
    pub fn next_event_ticks(&self) -> Option<TickCount> {
        let mut next: Option<TickCount> = None;

        if self.command_state == CommandState::WaitForExecute {
            next = Some(self.command_remaining_ticks);
        }
        if self.secondary_status.is_active() {
            let ticks = self.read_or_seek_remaining_ticks;
            next = Some(next.map_or(ticks, |n| n.min(ticks)));
        }

        next
    }

    /// Read one byte from the register window.
    ///
    /// # Arguments
    ///
    /// * `offset` - Register offset (0..=3)
    /// * `bus` - Guest bus (the DMA request level can change when FIFOs pop)
    pub fn read_register(&mut self, offset: u32, bus: &mut dyn GuestBus) -> u8 {
        match offset {
            // Status register
            0 => {
                log::trace!("CD-ROM read status register <- 0x{:02X}", self.status);
                self.status
            }

            // Response FIFO, regardless of index
            1 => {
                let Some(value) = self.response_fifo.pop_front() else {
                    log::debug!("CD-ROM: Response FIFO empty on read");
                    return 0xFF;
                };

                self.update_status_register(bus);
                log::trace!("CD-ROM read response FIFO <- 0x{:02X}", value);
                value
            }

            // Data FIFO, regardless of index
            2 => {
                let value = self.data_fifo.pop_front().unwrap_or(0);
                self.update_status_register(bus);
                value
            }

            3 => match self.index() {
                0 | 2 => self.interrupt_enable_register | !INTERRUPT_REGISTER_MASK,
                _ => self.interrupt_flag_register | !INTERRUPT_REGISTER_MASK,
            },

            _ => panic!("unknown CD-ROM register read: offset {}", offset),
        }
    }

    /// Write one byte to the register window.
    ///
    /// Elapsed guest cycles must have been flushed through [`CDROM::execute`]
    /// beforehand so the write observes a synchronized machine.
    ///
    /// # Arguments
    ///
    /// * `offset` - Register offset (0..=3)
    /// * `value` - Byte to write
    /// * `bus` - Guest bus
    pub fn write_register(&mut self, offset: u32, value: u8, bus: &mut dyn GuestBus) {
        match offset {
            0 => {
                // Only the index bits are writable.
                self.status = (self.status & !3) | (value & 3);
            }

            1 => match self.index() {
                0 => {
                    log::debug!("CD-ROM command register <- 0x{:02X}", value);
                    if self.command_state == CommandState::Idle {
                        self.begin_command(value, bus);
                    } else {
                        log::warn!(
                            "CD-ROM: Ignoring write (0x{:02X}) to command register in non-idle state",
                            value
                        );
                    }
                }
                1 => log::warn!("CD-ROM: Sound map data out not supported (<- 0x{:02X})", value),
                2 => log::warn!(
                    "CD-ROM: Sound map coding info not supported (<- 0x{:02X})",
                    value
                ),
                _ => self.next_cd_audio_volume_matrix[1][0] = value,
            },

            2 => match self.index() {
                0 => {
                    if self.param_fifo.len() >= PARAM_FIFO_SIZE {
                        log::warn!("CD-ROM: Parameter FIFO overflow");
                        self.param_fifo.pop_front();
                    }

                    self.param_fifo.push_back(value);
                    self.update_status_register(bus);
                }
                1 => {
                    log::debug!("CD-ROM interrupt enable register <- 0x{:02X}", value);
                    self.interrupt_enable_register = value & INTERRUPT_REGISTER_MASK;
                }
                2 => self.next_cd_audio_volume_matrix[0][0] = value,
                _ => self.next_cd_audio_volume_matrix[1][0] = value,
            },

            3 => match self.index() {
                0 => {
                    log::debug!("CD-ROM request register <- 0x{:02X}", value);
                    if value & 0x20 != 0 {
                        // Sound map playback is not wired up.
                        log::warn!("CD-ROM: SMEN set in request register, ignoring");
                    }

                    if value & 0x80 != 0 {
                        self.load_data_fifo();
                    } else {
                        log::debug!("CD-ROM: Clearing data FIFO");
                        self.data_fifo.clear();
                    }

                    self.update_status_register(bus);
                }
                1 => {
                    log::debug!("CD-ROM interrupt flag register <- 0x{:02X}", value);
                    self.interrupt_flag_register &= !(value & INTERRUPT_REGISTER_MASK);
                    if self.interrupt_flag_register == 0 {
                        if self.command_state == CommandState::WaitForIRQClear {
                            self.command_state = CommandState::WaitForExecute;
                            self.update_status_register(bus);
                        } else if self.pending_async_interrupt != 0 {
                            self.deliver_async_interrupt(bus);
                        }
                    }

                    // Bit 6 clears the parameter FIFO.
                    if value & 0x40 != 0 {
                        self.param_fifo.clear();
                        self.update_status_register(bus);
                    }
                }
                2 => self.next_cd_audio_volume_matrix[0][1] = value,
                _ => {
                    log::debug!("CD-ROM apply volume <- 0x{:02X}", value);
                    self.adpcm_muted = value & 0x01 != 0;
                    if value & 0x20 != 0 {
                        self.cd_audio_volume_matrix = self.next_cd_audio_volume_matrix;
                    }
                }
            },

            _ => panic!("unknown CD-ROM register write: offset {}", offset),
        }
    }

    /// Drain up to `words.len()` words from the data FIFO for the DMA
    /// engine, zero-filling any shortfall.
    pub fn dma_read(&mut self, words: &mut [u32], bus: &mut dyn GuestBus) {
        let words_in_fifo = self.data_fifo.len() / 4;
        if words_in_fifo < words.len() {
            log::error!("CD-ROM: DMA read on empty/near-empty data FIFO");
            for word in words[words_in_fifo..].iter_mut() {
                *word = 0;
            }
        }

        let bytes_to_read = (words.len() * 4).min(self.data_fifo.len());
        for i in 0..bytes_to_read {
            if i % 4 == 0 {
                words[i / 4] = 0;
            }
            let byte = self.data_fifo.pop_front().unwrap_or(0);
            words[i / 4] |= u32::from(byte) << ((i % 4) * 8);
        }

        self.update_status_register(bus);
    }

    /// Advance the controller by `ticks` guest CPU cycles.
    ///
    /// Fires pending command stages, seek completions and sector reads whose
    /// countdown elapses within the slice.
    pub fn execute(&mut self, ticks: TickCount, bus: &mut dyn GuestBus) {
        if self.command_state == CommandState::WaitForExecute {
            self.command_remaining_ticks -= ticks;
            if self.command_remaining_ticks <= 0 {
                self.execute_command(bus);
            }
        }

        if self.secondary_status.is_active() {
            self.read_or_seek_remaining_ticks -= ticks;
            if self.read_or_seek_remaining_ticks <= 0 {
                if self.secondary_status.seeking {
                    self.do_seek_complete(bus);
                } else {
                    self.do_sector_read(bus);
                }
            }
        }
    }

    /// Latched register index (low 2 bits of the status register)
    fn index(&self) -> u8 {
        self.status & 3
    }

    /// Restore power-on defaults, leaving the media in place.
    pub(super) fn soft_reset(&mut self, bus: &mut dyn GuestBus) {
        self.command = 0;
        self.command_state = CommandState::Idle;
        self.command_stage = 0;
        self.command_remaining_ticks = 0;
        self.read_or_seek_remaining_ticks = 0;
        self.status = 0;
        self.secondary_status = SecondaryStatus::default();
        self.mode = DriveMode::default();
        self.interrupt_enable_register = INTERRUPT_REGISTER_MASK;
        self.interrupt_flag_register = 0;
        self.pending_async_interrupt = 0;
        self.setloc_position = CDPosition::default();
        self.seek_position = CDPosition::default();
        self.setloc_pending = false;
        self.read_after_seek = false;
        self.play_after_seek = false;
        self.muted = false;
        self.adpcm_muted = false;
        self.filter_file_number = 0;
        self.filter_channel_number = 0;
        self.last_sector_header = SectorHeader::default();
        self.last_sector_subheader = SectorSubHeader::default();
        self.cd_audio_volume_matrix = [[0x80, 0x00], [0x00, 0x80]];
        self.next_cd_audio_volume_matrix = self.cd_audio_volume_matrix;
        self.xa_last_samples = [0; 4];
        self.xa_resampler.reset();
        self.param_fifo.clear();
        self.response_fifo.clear();
        self.async_response_fifo.clear();
        self.data_fifo.clear();
        self.sector_buffer.clear();

        self.update_status_register(bus);
    }

    /// Recompute the status byte and re-drive the DMA request level.
    fn update_status_register(&mut self, bus: &mut dyn GuestBus) {
        let mut status = self.index();

        // Bit 2: ADPBUSY, never set
        // Bit 3: parameter FIFO empty
        if self.param_fifo.is_empty() {
            status |= 1 << 3;
        }
        // Bit 4: parameter FIFO write ready
        if self.param_fifo.len() < PARAM_FIFO_SIZE {
            status |= 1 << 4;
        }
        // Bit 5: response FIFO read ready
        if !self.response_fifo.is_empty() {
            status |= 1 << 5;
        }
        // Bit 6: data request
        if !self.data_fifo.is_empty() {
            status |= 1 << 6;
        }
        // Bit 7: busy until the command stage executes
        if self.command_state == CommandState::WaitForExecute {
            status |= 1 << 7;
        }

        self.status = status;
        bus.set_dma_request(self.status & 0x40 != 0);
    }

    /// Set a synchronous interrupt code and raise the line.
    fn set_interrupt(&mut self, interrupt: Interrupt, bus: &mut dyn GuestBus) {
        self.interrupt_flag_register = interrupt as u8;
        bus.raise_interrupt();
    }

    /// Queue an asynchronous interrupt, delivering it immediately when no
    /// flag is outstanding.
    fn set_async_interrupt(&mut self, interrupt: Interrupt, bus: &mut dyn GuestBus) {
        assert!(
            self.pending_async_interrupt == 0,
            "async interrupt {} overwritten while {} still pending",
            interrupt as u8,
            self.pending_async_interrupt
        );

        self.pending_async_interrupt = interrupt as u8;
        if self.interrupt_flag_register == 0 {
            self.deliver_async_interrupt(bus);
        }
    }

    /// Drop a queued async interrupt and its staged response bytes.
    fn cancel_async_interrupt(&mut self) {
        self.pending_async_interrupt = 0;
        self.async_response_fifo.clear();
    }

    /// Splice the async response into the response FIFO and latch the held
    /// interrupt code.
    fn deliver_async_interrupt(&mut self, bus: &mut dyn GuestBus) {
        assert!(self.pending_async_interrupt != 0 && self.interrupt_flag_register == 0);
        log::debug!(
            "CD-ROM: Delivering async interrupt {}",
            self.pending_async_interrupt
        );

        self.response_fifo.clear();
        while let Some(byte) = self.async_response_fifo.pop_front() {
            self.response_fifo.push_back(byte);
        }
        self.interrupt_flag_register = self.pending_async_interrupt;
        self.pending_async_interrupt = 0;
        bus.raise_interrupt();
        self.update_status_register(bus);
    }

    /// Push the stat byte and acknowledge the command.
    pub(super) fn send_ack_and_stat(&mut self, bus: &mut dyn GuestBus) {
        self.response_fifo.push_back(self.secondary_status.bits());
        self.set_interrupt(Interrupt::Ack, bus);
    }

    /// Synchronous error: stat with the error bit plus a reason byte, INT5.
    pub(super) fn send_error_response(&mut self, reason: u8, bus: &mut dyn GuestBus) {
        self.response_fifo
            .push_back(self.secondary_status.bits() | 0x01);
        self.response_fifo.push_back(reason);
        self.set_interrupt(Interrupt::Int5, bus);
    }

    /// Asynchronous error: like [`CDROM::send_error_response`] through the
    /// async queue.
    fn send_async_error_response(&mut self, reason: u8, bus: &mut dyn GuestBus) {
        self.async_response_fifo
            .push_back(self.secondary_status.bits() | 0x01);
        self.async_response_fifo.push_back(reason);
        self.set_async_interrupt(Interrupt::Int5, bus);
    }

    /// Ticks between the command write and its acknowledge.
    fn ack_delay_for_command(&self) -> TickCount {
        // Init spins the drive up first.
        if self.command == 0x0A {
            60_000
        } else {
            4_000
        }
    }

    /// Ticks between consecutive sector deliveries at the current speed.
    fn ticks_for_read(&self) -> TickCount {
        if self.mode.double_speed {
            MASTER_CLOCK / 150
        } else {
            MASTER_CLOCK / 75
        }
    }

    /// Seek latency: a fixed spin-up plus a distance-proportional sled move.
    fn ticks_for_seek(&self) -> TickCount {
        let current_lba = self.disc.as_ref().map_or(0, |d| d.position_on_disc());
        let new_lba = self.seek_position.to_lba();
        let lba_diff = current_lba.abs_diff(new_lba);

        let ticks = (20_000 + lba_diff * 100) as TickCount;
        log::debug!("CD-ROM: Seek time for {} LBAs: {}", lba_diff, ticks);
        ticks
    }

    /// Accept a command opcode and schedule its acknowledge.
    fn begin_command(&mut self, command: u8, bus: &mut dyn GuestBus) {
        self.response_fifo.clear();

        self.command = command;
        self.command_stage = 0;
        self.command_remaining_ticks = self.ack_delay_for_command();
        self.command_state = CommandState::WaitForExecute;
        self.update_status_register(bus);
    }

    /// Advance a multi-stage command.
    ///
    /// With `wait_for_irq` the next stage is gated on the host clearing the
    /// interrupt flag; otherwise it is scheduled right away.
    pub(super) fn next_command_stage(
        &mut self,
        wait_for_irq: bool,
        ticks: TickCount,
        bus: &mut dyn GuestBus,
    ) {
        self.command_state = CommandState::WaitForIRQClear;
        self.command_remaining_ticks = ticks;
        self.command_stage += 1;
        self.update_status_register(bus);
        if wait_for_irq {
            return;
        }

        self.command_state = CommandState::WaitForExecute;
        self.update_status_register(bus);
    }

    /// Finish the command in flight and drain its parameters.
    pub(super) fn end_command(&mut self, bus: &mut dyn GuestBus) {
        self.param_fifo.clear();

        self.command = 0;
        self.command_state = CommandState::Idle;
        self.command_stage = 0;
        self.command_remaining_ticks = 0;
        self.update_status_register(bus);
    }

    /// Start delivering sectors, seeking first if a Setloc target is
    /// pending and the pickup is elsewhere.
    pub(super) fn begin_reading(&mut self, cdda: bool, _bus: &mut dyn GuestBus) {
        log::debug!(
            "CD-ROM: Starting {}",
            if cdda { "playing CDDA" } else { "reading" }
        );

        if self.setloc_pending {
            let in_position = self
                .disc
                .as_ref()
                .map_or(false, |d| d.msf_position_on_disc() == self.setloc_position);

            if !in_position {
                self.begin_seeking();
                self.read_after_seek = !cdda;
                self.play_after_seek = cdda;
                return;
            }

            // Already in position
            self.setloc_pending = false;
        }

        self.secondary_status.motor_on = true;
        self.secondary_status.seeking = false;
        self.secondary_status.reading = !cdda;
        self.secondary_status.playing_cdda = cdda;

        self.read_or_seek_remaining_ticks = self.ticks_for_read();
    }

    /// Latch the Setloc target and start the sled moving.
    pub(super) fn begin_seeking(&mut self) {
        if !self.setloc_pending {
            log::warn!("CD-ROM: Seeking without setloc");
        }

        self.seek_position = self.setloc_position;
        self.setloc_pending = false;

        log::debug!(
            "CD-ROM: Seeking to [{:02}:{:02}:{:02}]",
            self.seek_position.minute,
            self.seek_position.second,
            self.seek_position.frame
        );
        assert!(!self.secondary_status.is_reading_or_playing());

        self.secondary_status.motor_on = true;
        self.secondary_status.seeking = true;

        self.read_or_seek_remaining_ticks = self.ticks_for_seek();
    }

    /// Drop out of any seek/read/play and zero the countdown.
    pub(super) fn stop_reading(&mut self) {
        if !self.secondary_status.is_active() {
            return;
        }

        log::debug!(
            "CD-ROM: Stopping {}",
            if self.secondary_status.seeking {
                "seeking"
            } else if self.secondary_status.reading {
                "reading"
            } else {
                "playing CDDA"
            }
        );
        self.secondary_status.reading = false;
        self.secondary_status.playing_cdda = false;
        self.secondary_status.seeking = false;
        self.read_or_seek_remaining_ticks = 0;
    }

    /// The seek countdown elapsed: position the pickup and report.
    fn do_seek_complete(&mut self, bus: &mut dyn GuestBus) {
        self.secondary_status.seeking = false;

        let seek_ok = match self.disc.as_mut() {
            Some(disc) => disc.seek(&self.seek_position),
            None => false,
        };

        if seek_ok {
            // Transition to play/read if one was queued behind the seek.
            if self.play_after_seek || self.read_after_seek {
                let cdda = self.play_after_seek;
                self.begin_reading(cdda, bus);
            }

            self.async_response_fifo
                .push_back(self.secondary_status.bits());
            self.set_async_interrupt(Interrupt::Int2, bus);
            self.update_status_register(bus);
        } else {
            log::warn!(
                "CD-ROM: Seek to [{:02}:{:02}:{:02}] failed",
                self.seek_position.minute,
                self.seek_position.second,
                self.seek_position.frame
            );
            self.send_async_error_response(0x80, bus);
        }

        self.setloc_pending = false;
        self.read_after_seek = false;
        self.play_after_seek = false;
    }

    /// The read countdown elapsed: pull one raw sector off the disc and
    /// process it, then schedule the next one.
    fn do_sector_read(&mut self, bus: &mut dyn GuestBus) {
        if self.pending_async_interrupt != 0 {
            log::warn!("CD-ROM: Data interrupt was not delivered");
            self.cancel_async_interrupt();
        }
        if !self.sector_buffer.is_empty() {
            log::warn!("CD-ROM: Sector buffer was not empty");
        }
        if self.mode.ignore_bit {
            log::warn!("CD-ROM: Reading with ignore bit set");
        }

        let Some(disc) = self.disc.as_mut() else {
            log::warn!("CD-ROM: Sector read without media");
            self.stop_reading();
            return;
        };

        self.sector_buffer.resize(RAW_SECTOR_SIZE, 0);
        if !disc.read_sector_raw(&mut self.sector_buffer) {
            log::error!(
                "CD-ROM: Sector read failed at LBA {}",
                disc.position_on_disc()
            );
            self.sector_buffer.clear();
            self.stop_reading();
            self.send_async_error_response(0x80, bus);
            return;
        }

        if self.secondary_status.reading {
            self.process_data_sector(bus);
        } else if self.secondary_status.playing_cdda {
            self.process_cdda_sector(bus);
        } else {
            panic!("sector read while neither reading nor playing");
        }

        self.read_or_seek_remaining_ticks += self.ticks_for_read();
    }

    /// Dispatch a freshly read data sector: XA audio to the decoder, plain
    /// data to the guest via INT1.
    fn process_data_sector(&mut self, bus: &mut dyn GuestBus) {
        let mut header = [0u8; 4];
        header.copy_from_slice(&self.sector_buffer[SECTOR_SYNC_SIZE..SECTOR_SYNC_SIZE + 4]);
        self.last_sector_header = SectorHeader(header);

        let mut subheader = [0u8; 8];
        subheader.copy_from_slice(&self.sector_buffer[SECTOR_SYNC_SIZE + 4..SECTOR_SYNC_SIZE + 12]);
        self.last_sector_subheader = SectorSubHeader(subheader);

        log::trace!(
            "CD-ROM: Read sector: mode {} submode 0x{:02X}",
            self.last_sector_header.sector_mode(),
            self.last_sector_subheader.submode()
        );

        let mut pass_to_cpu = true;
        if self.mode.xa_enable && self.last_sector_header.sector_mode() == 2 {
            if self.last_sector_subheader.realtime() && self.last_sector_subheader.audio() {
                // Check the automatic ADPCM filter.
                if self.mode.xa_filter
                    && (self.last_sector_subheader.file_number() != self.filter_file_number
                        || self.last_sector_subheader.channel_number()
                            != self.filter_channel_number)
                {
                    log::debug!(
                        "CD-ROM: Skipping sector due to filter mismatch (expected {}/{} got {}/{})",
                        self.filter_file_number,
                        self.filter_channel_number,
                        self.last_sector_subheader.file_number(),
                        self.last_sector_subheader.channel_number()
                    );
                } else {
                    self.process_xa_adpcm_sector(bus);
                }

                // Audio+realtime sectors aren't delivered to the CPU.
                self.sector_buffer.clear();
                pass_to_cpu = false;
            }

            if self.last_sector_subheader.eof() {
                log::warn!("CD-ROM: End of CD-XA file");
            }
        }

        if pass_to_cpu {
            self.async_response_fifo
                .push_back(self.secondary_status.bits());
            self.set_async_interrupt(Interrupt::Int1, bus);
            self.update_status_register(bus);
        }
    }

    /// Decode one XA-ADPCM sector and resample it into the mixer.
    fn process_xa_adpcm_sector(&mut self, bus: &mut dyn GuestBus) {
        let mut sample_buffer = [0i16; xa::XA_ADPCM_SAMPLES_PER_SECTOR_4BIT];
        xa::decode_adpcm_sector(
            &self.sector_buffer,
            &mut sample_buffer,
            &mut self.xa_last_samples,
        );

        // The decoder history above must advance even while muted, or the
        // stream desyncs on unmute.
        if self.muted || self.adpcm_muted {
            return;
        }

        let subheader = self.last_sector_subheader;
        let stereo = subheader.is_stereo();
        let half_rate = subheader.is_half_sample_rate();
        let sample_count = subheader.samples_per_sector();
        let num_pairs = if stereo {
            sample_count / 2
        } else {
            sample_count
        };

        bus.ensure_cd_audio_space(num_pairs as u32);
        self.xa_resampler.resample(
            &sample_buffer[..sample_count],
            stereo,
            half_rate,
            &self.cd_audio_volume_matrix,
            bus,
        );
    }

    /// Feed one CDDA sector (588 stereo pairs) through the volume matrix
    /// into the mixer.
    fn process_cdda_sector(&mut self, bus: &mut dyn GuestBus) {
        log::trace!("CD-ROM: Read sector as CDDA");

        if !self.muted {
            let num_samples = (RAW_SECTOR_SIZE / 4) as u32;
            bus.ensure_cd_audio_space(num_samples);

            let matrix = self.cd_audio_volume_matrix;
            for chunk in self.sector_buffer.chunks_exact(4) {
                let samp_left = i16::from_le_bytes([chunk[0], chunk[1]]);
                let samp_right = i16::from_le_bytes([chunk[2], chunk[3]]);

                let left = xa::apply_volume(samp_left, matrix[0][0])
                    .saturating_add(xa::apply_volume(samp_right, matrix[0][1]));
                let right = xa::apply_volume(samp_left, matrix[1][0])
                    .saturating_add(xa::apply_volume(samp_right, matrix[1][1]));
                bus.add_cd_audio_sample(left, right);
            }
        }

        if self.mode.report_audio {
            // TODO: emit the CDDA position auto-report once the format is
            // pinned down against hardware.
            log::error!("CD-ROM: CDDA report not implemented");
        }

        self.sector_buffer.clear();
    }

    /// Request-register BFRD: move the sector buffer into the data FIFO.
    fn load_data_fifo(&mut self) {
        if self.sector_buffer.is_empty() {
            log::debug!("CD-ROM: Attempting to load empty sector buffer");
            return;
        }

        if self.mode.read_raw_sector {
            self.data_fifo
                .extend(&self.sector_buffer[SECTOR_SYNC_SIZE..RAW_SECTOR_SIZE]);
        } else {
            self.data_fifo.extend(
                &self.sector_buffer
                    [SECTOR_SYNC_SIZE + 12..SECTOR_SYNC_SIZE + 12 + DATA_SECTOR_SIZE],
            );
        }

        log::debug!("CD-ROM: Loaded {} bytes to data FIFO", self.data_fifo.len());
        self.sector_buffer.clear();
    }
}

impl Default for CDROM {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::core::save_state::StateSave for CDROM {
    type State = crate::core::save_state::CdRomState;

    fn to_state(&self) -> Self::State {
        crate::core::save_state::CdRomState {
            version: crate::core::save_state::SAVE_STATE_VERSION,
            command: self.command,
            command_state: self.command_state.to_u8(),
            command_stage: self.command_stage,
            command_remaining_ticks: self.command_remaining_ticks,
            read_or_seek_remaining_ticks: self.read_or_seek_remaining_ticks,
            status: self.status,
            secondary_status: self.secondary_status.bits(),
            mode: self.mode.bits(),
            interrupt_enable_register: self.interrupt_enable_register,
            interrupt_flag_register: self.interrupt_flag_register,
            pending_async_interrupt: self.pending_async_interrupt,
            setloc_position: self.setloc_position,
            seek_position: self.seek_position,
            setloc_pending: self.setloc_pending,
            read_after_seek: self.read_after_seek,
            play_after_seek: self.play_after_seek,
            muted: self.muted,
            adpcm_muted: self.adpcm_muted,
            filter_file_number: self.filter_file_number,
            filter_channel_number: self.filter_channel_number,
            last_sector_header: self.last_sector_header.0,
            last_sector_subheader: self.last_sector_subheader.0,
            cd_audio_volume_matrix: self.cd_audio_volume_matrix,
            next_cd_audio_volume_matrix: self.next_cd_audio_volume_matrix,
            xa_last_samples: self.xa_last_samples,
            xa_resample_ring_buffer: self.xa_resampler.ring_buffer,
            xa_resample_p: self.xa_resampler.p,
            xa_resample_sixstep: self.xa_resampler.sixstep,
            param_fifo: self.param_fifo.iter().copied().collect(),
            response_fifo: self.response_fifo.iter().copied().collect(),
            async_response_fifo: self.async_response_fifo.iter().copied().collect(),
            data_fifo: self.data_fifo.iter().copied().collect(),
            sector_buffer: self.sector_buffer.clone(),
            media_file_name: self
                .disc
                .as_ref()
                .map_or_else(String::new, |d| d.file_name().to_string()),
            media_lba: self.disc.as_ref().map_or(0, |d| d.position_on_disc()),
        }
    }

    fn restore_from_state(&mut self, state: &Self::State, bus: &mut dyn GuestBus) {
        self.command = state.command;
        self.command_state = CommandState::from_u8(state.command_state);
        self.command_stage = state.command_stage;
        self.command_remaining_ticks = state.command_remaining_ticks;
        self.read_or_seek_remaining_ticks = state.read_or_seek_remaining_ticks;
        self.status = state.status;
        self.secondary_status.set_bits(state.secondary_status);
        self.mode.set_bits(state.mode);
        self.interrupt_enable_register = state.interrupt_enable_register;
        self.interrupt_flag_register = state.interrupt_flag_register;
        self.pending_async_interrupt = state.pending_async_interrupt;
        self.setloc_position = state.setloc_position;
        self.seek_position = state.seek_position;
        self.setloc_pending = state.setloc_pending;
        self.read_after_seek = state.read_after_seek;
        self.play_after_seek = state.play_after_seek;
        self.muted = state.muted;
        self.adpcm_muted = state.adpcm_muted;
        self.filter_file_number = state.filter_file_number;
        self.filter_channel_number = state.filter_channel_number;
        self.last_sector_header = SectorHeader(state.last_sector_header);
        self.last_sector_subheader = SectorSubHeader(state.last_sector_subheader);
        self.cd_audio_volume_matrix = state.cd_audio_volume_matrix;
        self.next_cd_audio_volume_matrix = state.next_cd_audio_volume_matrix;
        self.xa_last_samples = state.xa_last_samples;
        self.xa_resampler.ring_buffer = state.xa_resample_ring_buffer;
        self.xa_resampler.p = state.xa_resample_p;
        self.xa_resampler.sixstep = state.xa_resample_sixstep;
        self.param_fifo = state.param_fifo.iter().copied().collect();
        self.response_fifo = state.response_fifo.iter().copied().collect();
        self.async_response_fifo = state.async_response_fifo.iter().copied().collect();
        self.data_fifo = state.data_fifo.iter().copied().collect();
        self.sector_buffer = state.sector_buffer.clone();

        // Re-seat the media the state recorded; eject and continue if that
        // fails.
        self.disc = None;
        if !state.media_file_name.is_empty() {
            match DiscImage::load(&state.media_file_name) {
                Ok(mut disc) => {
                    if disc.seek_lba(state.media_lba) {
                        self.disc = Some(disc);
                    } else {
                        log::error!(
                            "Failed to seek re-inserted media '{}' to LBA {}. Ejecting.",
                            state.media_file_name,
                            state.media_lba
                        );
                    }
                }
                Err(err) => {
                    log::error!(
                        "Failed to re-insert CD media from save state: '{}' ({}). Ejecting.",
                        state.media_file_name,
                        err
                    );
                }
            }
        }

        bus.set_dma_request(self.status & 0x40 != 0);
    }
}

/// Convert BCD (Binary-Coded Decimal) to decimal
///
/// # Example
///
/// ```
/// use spindle_core::core::cdrom::bcd_to_dec;
///
/// assert_eq!(bcd_to_dec(0x23), 23);
/// ```
#[inline]
pub fn bcd_to_dec(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0F)
}

/// Convert decimal to BCD (Binary-Coded Decimal)
///
/// # Example
///
/// ```
/// use spindle_core::core::cdrom::dec_to_bcd;
///
/// assert_eq!(dec_to_bcd(23), 0x23);
/// ```
#[inline]
pub fn dec_to_bcd(dec: u8) -> u8 {
    ((dec / 10) << 4) | (dec % 10)
}
