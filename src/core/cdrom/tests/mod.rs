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

//! CD-ROM module tests
//!
//! Tests are organized into logical categories:
//! - `basic`: register file, FIFOs, BCD and MSF plumbing
//! - `commands`: per-command behavior and interrupt codes
//! - `timing`: ack delays, seek/read countdowns, async gating
//! - `audio`: XA filtering, volume matrix staging, CDDA output
//! - `disc`: .cue/.bin parsing and the read cursor
//! - `save_state`: round trips and media re-insertion

mod commands;

use super::*;
use crate::core::bus::GuestBus;

use tempfile::{Builder, NamedTempFile};

/// Ack delay of every command except Init
pub const ACK_DELAY: TickCount = 4_000;

/// Ticks per sector at 1x speed
pub const READ_TICKS_1X: TickCount = MASTER_CLOCK / 75;

/// A recording bus: counts interrupt edges, tracks the DMA request level
/// and collects mixer samples.
pub struct TestBus {
    pub irq_raises: u32,
    pub dma_request: bool,
    pub reserved_samples: u32,
    pub samples: Vec<(i16, i16)>,
}

impl TestBus {
    pub fn new() -> Self {
        Self {
            irq_raises: 0,
            dma_request: false,
            reserved_samples: 0,
            samples: Vec::new(),
        }
    }
}

impl GuestBus for TestBus {
    fn raise_interrupt(&mut self) {
        self.irq_raises += 1;
    }

    fn set_dma_request(&mut self, asserted: bool) {
        self.dma_request = asserted;
    }

    fn ensure_cd_audio_space(&mut self, samples: u32) {
        self.reserved_samples += samples;
    }

    fn add_cd_audio_sample(&mut self, left: i16, right: i16) {
        self.samples.push((left, right));
    }
}

/// Select a register bank.
pub fn set_index(cdrom: &mut CDROM, bus: &mut TestBus, index: u8) {
    cdrom.write_register(0, index, bus);
}

/// Push a command parameter byte.
pub fn push_param(cdrom: &mut CDROM, bus: &mut TestBus, value: u8) {
    set_index(cdrom, bus, 0);
    cdrom.write_register(2, value, bus);
}

/// Write a command opcode.
pub fn issue_command(cdrom: &mut CDROM, bus: &mut TestBus, opcode: u8) {
    set_index(cdrom, bus, 0);
    cdrom.write_register(1, opcode, bus);
}

/// Read the 5 interrupt flag bits.
pub fn read_irq_flag(cdrom: &mut CDROM, bus: &mut TestBus) -> u8 {
    set_index(cdrom, bus, 1);
    cdrom.read_register(3, bus) & 0x1F
}

/// Acknowledge all interrupt flag bits.
pub fn ack_irq(cdrom: &mut CDROM, bus: &mut TestBus) {
    set_index(cdrom, bus, 1);
    cdrom.write_register(3, 0x1F, bus);
}

/// Pop every byte currently in the response FIFO.
pub fn drain_response(cdrom: &mut CDROM, bus: &mut TestBus) -> Vec<u8> {
    let mut out = Vec::new();
    while cdrom.read_register(0, bus) & 0x20 != 0 {
        out.push(cdrom.read_register(1, bus));
    }
    out
}

/// Issue `opcode` and run it through its ack delay.
pub fn run_command(cdrom: &mut CDROM, bus: &mut TestBus, opcode: u8) {
    issue_command(cdrom, bus, opcode);
    cdrom.execute(ACK_DELAY, bus);
}

/// Build a raw data sector: `fill` everywhere, MSF header and mode 2.
pub fn data_sector(lba: u32, fill: u8) -> Vec<u8> {
    let msf = CDPosition::from_lba(lba);
    let mut sector = vec![fill; RAW_SECTOR_SIZE];
    sector[12] = dec_to_bcd(msf.minute);
    sector[13] = dec_to_bcd(msf.second);
    sector[14] = dec_to_bcd(msf.frame);
    sector[15] = 2;
    sector
}

/// Build a raw XA sector with the given subheader, silent audio payload.
pub fn xa_sector(lba: u32, file: u8, channel: u8, submode: u8, codinginfo: u8) -> Vec<u8> {
    let mut sector = data_sector(lba, 0);
    sector[16] = file;
    sector[17] = channel;
    sector[18] = submode;
    sector[19] = codinginfo;
    sector
}

/// Write a .cue/.bin pair holding one MODE2/2352 track starting at
/// 00:02:00. Returns the live tempfile handles and the .cue path.
pub fn make_disc_files(prefix: &str, bin_data: &[u8]) -> (NamedTempFile, NamedTempFile, String) {
    let bin_file = Builder::new()
        .prefix(prefix)
        .suffix(".bin")
        .tempfile()
        .unwrap();
    let bin_name = bin_file
        .path()
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let cue_file = Builder::new()
        .prefix(prefix)
        .suffix(".cue")
        .tempfile()
        .unwrap();

    let cue_content = format!(
        r#"FILE "{}" BINARY
  TRACK 01 MODE2/2352
    INDEX 01 00:02:00
"#,
        bin_name
    );
    std::fs::write(cue_file.path(), cue_content).unwrap();
    std::fs::write(bin_file.path(), bin_data).unwrap();

    let cue_path = cue_file.path().to_str().unwrap().to_string();
    (cue_file, bin_file, cue_path)
}

/// Like [`make_disc_files`] but with a second AUDIO track at 00:03:00.
pub fn make_two_track_disc_files(
    prefix: &str,
    bin_data: &[u8],
) -> (NamedTempFile, NamedTempFile, String) {
    let bin_file = Builder::new()
        .prefix(prefix)
        .suffix(".bin")
        .tempfile()
        .unwrap();
    let bin_name = bin_file
        .path()
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let cue_file = Builder::new()
        .prefix(prefix)
        .suffix(".cue")
        .tempfile()
        .unwrap();

    let cue_content = format!(
        r#"FILE "{}" BINARY
  TRACK 01 MODE2/2352
    INDEX 01 00:02:00
  TRACK 02 AUDIO
    INDEX 01 00:03:00
"#,
        bin_name
    );
    std::fs::write(cue_file.path(), cue_content).unwrap();
    std::fs::write(bin_file.path(), bin_data).unwrap();

    let cue_path = cue_file.path().to_str().unwrap().to_string();
    (cue_file, bin_file, cue_path)
}

/// A 20-sector data disc where sector `i` is filled with byte `i`.
pub fn numbered_sectors_bin(count: u32) -> Vec<u8> {
    let mut bin = Vec::new();
    for i in 0..count {
        bin.extend_from_slice(&data_sector(i, i as u8));
    }
    bin
}
