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

//! CD-ROM command implementations
//!
//! A command opcode written to the command register while idle schedules an
//! acknowledge delay; when it elapses the opcode executes here. Multi-stage
//! commands (GetID, Pause, Init, ReadTOC) advance through
//! `next_command_stage`, gated on the host acknowledging the previous
//! interrupt before the next stage may deliver.

use super::{bcd_to_dec, dec_to_bcd, CDPosition, Interrupt, CDROM};
use crate::core::bus::GuestBus;

/// GetID response for a licensed NTSC-U disc
const GETID_RESPONSE: [u8; 8] = [0x02, 0x00, 0x20, 0x00, b'S', b'C', b'E', b'A'];

/// GetID response with no disc in the drive
const GETID_NO_DISC_RESPONSE: [u8; 2] = [0x11, 0x80];

/// Controller BIOS date reported by Test 0x20 (1994-09-19, version 0xC0)
const TEST_BIOS_DATE: [u8; 4] = [0x94, 0x09, 0x19, 0xC0];

/// Region string reported by Test 0x22
const TEST_REGION_STRING: &[u8] = b"for U/C";

impl CDROM {
    /// Execute the command in flight at its current stage.
    ///
    /// Called from [`CDROM::execute`] when the ack/stage delay elapses.
    pub(super) fn execute_command(&mut self, bus: &mut dyn GuestBus) {
        log::debug!(
            "CD-ROM: Executing command 0x{:02X} stage {}",
            self.command,
            self.command_stage
        );

        match self.command {
            // Getstat
            0x01 => {
                self.send_ack_and_stat(bus);
                self.end_command(bus);
            }

            // Setloc
            0x02 => self.cmd_setloc(bus),

            // Play
            0x03 => self.cmd_play(bus),

            // ReadN / ReadS
            0x06 | 0x1B => self.cmd_read(bus),

            // Pause
            0x09 => self.cmd_pause(bus),

            // Init
            0x0A => self.cmd_init(bus),

            // Mute
            0x0B => {
                self.muted = true;
                self.send_ack_and_stat(bus);
                self.end_command(bus);
            }

            // Demute
            0x0C => {
                self.muted = false;
                self.send_ack_and_stat(bus);
                self.end_command(bus);
            }

            // Setfilter
            0x0D => self.cmd_setfilter(bus),

            // Setmode
            0x0E => self.cmd_setmode(bus),

            // GetlocL
            0x10 => self.cmd_getloc_l(bus),

            // GetlocP
            0x11 => self.cmd_getloc_p(bus),

            // GetTN
            0x13 => self.cmd_get_tn(bus),

            // GetTD
            0x14 => self.cmd_get_td(bus),

            // SeekL / SeekP
            0x15 | 0x16 => self.cmd_seek(bus),

            // Test
            0x19 => {
                let subcommand = self.param_fifo.pop_front();
                self.execute_test_command(subcommand, bus);
            }

            // GetID
            0x1A => self.cmd_get_id(bus),

            // ReadTOC
            0x1E => self.cmd_read_toc(bus),

            _ => panic!("unknown CD-ROM command 0x{:02X}", self.command),
        }
    }

    /// Setloc (0x02): latch the seek target from 3 BCD parameters.
    fn cmd_setloc(&mut self, bus: &mut dyn GuestBus) {
        if self.secondary_status.is_active() {
            log::warn!("CD-ROM: Setloc while reading/playing/seeking");
        }

        if self.param_fifo.len() < 3 {
            log::warn!("CD-ROM: Setloc with insufficient parameters");
            self.send_error_response(0x20, bus);
            self.end_command(bus);
            return;
        }

        self.setloc_position = CDPosition::new(
            bcd_to_dec(self.param_fifo[0]),
            bcd_to_dec(self.param_fifo[1]),
            bcd_to_dec(self.param_fifo[2]),
        );
        self.setloc_pending = true;

        log::debug!(
            "CD-ROM: Setloc to [{:02}:{:02}:{:02}]",
            self.setloc_position.minute,
            self.setloc_position.second,
            self.setloc_position.frame
        );

        self.send_ack_and_stat(bus);
        self.end_command(bus);
    }

    /// Play (0x03): start CDDA playback, optionally from a track start.
    fn cmd_play(&mut self, bus: &mut dyn GuestBus) {
        let mut track = self.param_fifo.front().copied().unwrap_or(0);
        log::debug!("CD-ROM: Play command, track={}", track);

        if let Some(disc) = self.disc.as_ref() {
            // Track zero plays from the current position.
            if track != 0 {
                if track > disc.track_count() {
                    // Off the end of the TOC: restart the current track.
                    track = disc.track_number();
                }

                if let Some(position) = disc.track_start_position(track) {
                    self.setloc_position = position;
                    self.setloc_pending = true;
                }
            }

            self.begin_reading(true, bus);
            self.send_ack_and_stat(bus);
        } else {
            self.send_error_response(0x80, bus);
        }

        self.end_command(bus);
    }

    /// ReadN (0x06) / ReadS (0x1B): start delivering data sectors.
    fn cmd_read(&mut self, bus: &mut dyn GuestBus) {
        log::debug!("CD-ROM: Read command");
        if self.disc.is_none() {
            self.send_error_response(0x80, bus);
        } else {
            self.stop_reading();
            self.begin_reading(false, bus);
            self.send_ack_and_stat(bus);
        }

        self.end_command(bus);
    }

    /// Pause (0x09): stop the drive, report completion once it has wound
    /// down.
    fn cmd_pause(&mut self, bus: &mut dyn GuestBus) {
        if self.command_stage == 0 {
            let was_active = self.secondary_status.is_reading_or_playing();
            log::debug!("CD-ROM: Pause command");
            self.send_ack_and_stat(bus);
            self.stop_reading();

            let ticks = if was_active {
                if self.mode.double_speed {
                    2_000_000
                } else {
                    1_000_000
                }
            } else {
                7_000
            };
            self.next_command_stage(true, ticks, bus);
        } else {
            self.response_fifo.push_back(self.secondary_status.bits());
            self.set_interrupt(Interrupt::Int2, bus);
            self.end_command(bus);
        }
    }

    /// Init (0x0A): stop the drive, then reset mode and spin the motor up.
    fn cmd_init(&mut self, bus: &mut dyn GuestBus) {
        if self.command_stage == 0 {
            log::debug!("CD-ROM: Init command");
            self.send_ack_and_stat(bus);
            self.stop_reading();
            self.next_command_stage(true, 8_000, bus);
        } else {
            self.mode.set_bits(0);
            self.secondary_status.set_bits(0);
            self.secondary_status.motor_on = true;
            self.response_fifo.push_back(self.secondary_status.bits());
            self.set_interrupt(Interrupt::Int2, bus);
            self.end_command(bus);
        }
    }

    /// Setfilter (0x0D): latch the XA file/channel pair to pass.
    fn cmd_setfilter(&mut self, bus: &mut dyn GuestBus) {
        if self.param_fifo.len() < 2 {
            log::warn!("CD-ROM: Setfilter with insufficient parameters");
            self.send_error_response(0x20, bus);
            self.end_command(bus);
            return;
        }

        self.filter_file_number = self.param_fifo[0];
        self.filter_channel_number = self.param_fifo[1];
        log::debug!(
            "CD-ROM: Setfilter file={} channel={}",
            self.filter_file_number,
            self.filter_channel_number
        );

        self.send_ack_and_stat(bus);
        self.end_command(bus);
    }

    /// Setmode (0x0E): replace the sticky mode byte.
    fn cmd_setmode(&mut self, bus: &mut dyn GuestBus) {
        let Some(&mode) = self.param_fifo.front() else {
            log::warn!("CD-ROM: Setmode with no parameters");
            self.send_error_response(0x20, bus);
            self.end_command(bus);
            return;
        };

        log::debug!("CD-ROM: Setmode 0x{:02X}", mode);
        self.mode.set_bits(mode);
        self.send_ack_and_stat(bus);
        self.end_command(bus);
    }

    /// GetlocL (0x10): header and subheader of the last sector read.
    fn cmd_getloc_l(&mut self, bus: &mut dyn GuestBus) {
        log::debug!("CD-ROM: GetlocL command");
        self.response_fifo.extend(self.last_sector_header.0);
        self.response_fifo.extend(self.last_sector_subheader.0);
        self.set_interrupt(Interrupt::Ack, bus);
        self.end_command(bus);
    }

    /// GetlocP (0x11): subchannel-Q position report.
    ///
    /// Subchannel Q is not decoded; the track/index bytes are stubbed and
    /// the track-relative position mirrors the absolute one.
    fn cmd_getloc_p(&mut self, bus: &mut dyn GuestBus) {
        log::debug!("CD-ROM: GetlocP command");
        self.response_fifo.push_back(1); // track number
        self.response_fifo.push_back(1); // index
        self.response_fifo.push_back(self.last_sector_header.minute()); // minute in track
        self.response_fifo.push_back(self.last_sector_header.second()); // second in track
        self.response_fifo.push_back(self.last_sector_header.frame()); // frame in track
        self.response_fifo.push_back(self.last_sector_header.minute()); // minute on disc
        self.response_fifo.push_back(self.last_sector_header.second()); // second on disc
        self.response_fifo.push_back(self.last_sector_header.frame()); // frame on disc
        self.set_interrupt(Interrupt::Ack, bus);
        self.end_command(bus);
    }

    /// GetTN (0x13): current track number and track count, BCD.
    fn cmd_get_tn(&mut self, bus: &mut dyn GuestBus) {
        log::debug!("CD-ROM: GetTN command");
        if let Some(disc) = self.disc.as_ref() {
            let track_number = disc.track_number();
            let track_count = disc.track_count();
            self.response_fifo.push_back(self.secondary_status.bits());
            self.response_fifo.push_back(dec_to_bcd(track_number));
            self.response_fifo.push_back(dec_to_bcd(track_count));
            self.set_interrupt(Interrupt::Ack, bus);
        } else {
            self.send_error_response(0x80, bus);
        }

        self.end_command(bus);
    }

    /// GetTD (0x14): start position of a track (track 0 = disc end), BCD.
    fn cmd_get_td(&mut self, bus: &mut dyn GuestBus) {
        log::debug!("CD-ROM: GetTD command");
        let Some(&param) = self.param_fifo.front() else {
            log::warn!("CD-ROM: GetTD with no parameters");
            self.send_error_response(0x20, bus);
            self.end_command(bus);
            return;
        };
        let track = bcd_to_dec(param);

        let Some(disc) = self.disc.as_ref() else {
            self.send_error_response(0x80, bus);
            self.end_command(bus);
            return;
        };

        if track > disc.track_count() {
            self.send_error_response(0x10, bus);
        } else {
            let position = if track == 0 {
                CDPosition::from_lba(disc.lba_count())
            } else {
                disc.track_start_position(track).unwrap_or_default()
            };

            self.response_fifo.push_back(self.secondary_status.bits());
            self.response_fifo.push_back(dec_to_bcd(position.minute));
            self.response_fifo.push_back(dec_to_bcd(position.second));
            self.set_interrupt(Interrupt::Ack, bus);
        }

        self.end_command(bus);
    }

    /// SeekL (0x15) / SeekP (0x16): move the pickup to the Setloc target.
    fn cmd_seek(&mut self, bus: &mut dyn GuestBus) {
        log::debug!("CD-ROM: Seek command");
        if self.disc.is_none() {
            self.send_error_response(0x80, bus);
        } else {
            self.stop_reading();
            self.begin_seeking();
            self.send_ack_and_stat(bus);
        }

        self.end_command(bus);
    }

    /// Test (0x19): diagnostic subcommands.
    fn execute_test_command(&mut self, subcommand: Option<u8>, bus: &mut dyn GuestBus) {
        match subcommand {
            // Get controller BIOS date/version
            Some(0x20) => {
                log::debug!("CD-ROM: Get BIOS date/version");
                self.response_fifo.extend(TEST_BIOS_DATE);
                self.set_interrupt(Interrupt::Ack, bus);
                self.end_command(bus);
            }

            // Get region ID string
            Some(0x22) => {
                log::debug!("CD-ROM: Get region ID string");
                self.response_fifo.extend(TEST_REGION_STRING);
                self.set_interrupt(Interrupt::Ack, bus);
                self.end_command(bus);
            }

            other => {
                log::warn!("CD-ROM: Unhandled test subcommand {:02X?}", other);
                self.end_command(bus);
            }
        }
    }

    /// GetID (0x1A): disc identification, two stages on a loaded drive.
    fn cmd_get_id(&mut self, bus: &mut dyn GuestBus) {
        log::debug!("CD-ROM: GetID command - stage {}", self.command_stage);
        if self.command_stage == 0 {
            if self.disc.is_none() {
                self.response_fifo.extend(GETID_NO_DISC_RESPONSE);
                self.set_interrupt(Interrupt::Int5, bus);
                self.end_command(bus);
            } else {
                self.send_ack_and_stat(bus);
                self.next_command_stage(true, 18_000, bus);
            }
        } else {
            self.response_fifo.extend(GETID_RESPONSE);
            self.set_interrupt(Interrupt::Int2, bus);
            self.end_command(bus);
        }
    }

    /// ReadTOC (0x1E): re-read the table of contents, two stages.
    fn cmd_read_toc(&mut self, bus: &mut dyn GuestBus) {
        if self.command_stage == 0 {
            log::debug!("CD-ROM: ReadTOC command");
            if self.disc.is_none() {
                self.send_error_response(0x80, bus);
                self.end_command(bus);
            } else {
                self.send_ack_and_stat(bus);
                self.next_command_stage(true, 500_000, bus);
            }
        } else {
            self.response_fifo.push_back(self.secondary_status.bits());
            self.set_interrupt(Interrupt::Int2, bus);
            self.end_command(bus);
        }
    }
}
