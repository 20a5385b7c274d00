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

//! Disc image loading and management
//!
//! This module handles loading CD-ROM disc images from .cue/.bin files and
//! provides the sector reader the drive controller consumes: a raw-sector
//! read cursor plus position and track queries.

use super::{CDPosition, RAW_SECTOR_SIZE};
use crate::core::error::CdRomError;

/// Disc image loaded from .bin/.cue files
///
/// Represents a CD-ROM disc image with tracks and raw sector data. The image
/// keeps a read cursor (an LBA); [`DiscImage::read_sector_raw`] reads the
/// sector under the cursor and advances it, the way a real drive tracks the
/// pickup position.
///
/// # Example
///
/// ```no_run
/// use spindle_core::core::cdrom::{CDPosition, DiscImage};
///
/// let mut disc = DiscImage::load("game.cue").unwrap();
/// disc.seek(&CDPosition::new(0, 2, 0));
/// let mut sector = [0u8; 2352];
/// disc.read_sector_raw(&mut sector);
/// ```
#[derive(Debug)]
pub struct DiscImage {
    /// Path this image was opened from (recorded in save states)
    file_name: String,

    /// Tracks on the disc
    tracks: Vec<Track>,

    /// Raw sector data from .bin file
    data: Vec<u8>,

    /// Read cursor (LBA of the next sector to read)
    position: u32,
}

/// CD-ROM track information
///
/// Represents a single track on a CD-ROM disc, including its type,
/// position, and location in the .bin file.
#[derive(Debug, Clone)]
pub struct Track {
    /// Track number (1-99)
    pub number: u8,

    /// Track type (Mode1/2352, Mode2/2352, Audio)
    pub track_type: TrackType,

    /// Start position (MSF)
    pub start_position: CDPosition,

    /// Length in sectors
    pub length_sectors: u32,

    /// Byte offset in .bin file
    pub file_offset: u64,
}

impl Track {
    /// LBA of the first sector of this track
    pub fn start_lba(&self) -> u32 {
        self.start_position.to_lba()
    }
}

/// CD-ROM track type
///
/// Specifies the format of data stored in a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    /// Data track, 2352 bytes per sector (Mode 1)
    Mode1_2352,
    /// XA track, 2352 bytes per sector (Mode 2)
    Mode2_2352,
    /// CD-DA audio, 2352 bytes per sector
    Audio,
}

impl DiscImage {
    /// Load a disc image from a .cue file
    ///
    /// Parses the .cue file to extract track information and loads
    /// the corresponding .bin file containing raw sector data.
    ///
    /// # Arguments
    ///
    /// * `cue_path` - Path to the .cue file
    ///
    /// # Returns
    ///
    /// - `Ok(DiscImage)` if loading succeeded
    /// - `Err(CdRomError)` if loading failed
    pub fn load(cue_path: &str) -> Result<Self, CdRomError> {
        let cue_data = std::fs::read_to_string(cue_path)?;
        let bin_path = Self::get_bin_path_from_cue(cue_path, &cue_data)?;

        let mut tracks = Self::parse_cue(&cue_data)?;
        let data = std::fs::read(&bin_path).map_err(|e| {
            CdRomError::DiscLoadError(format!("Failed to read bin file '{}': {}", bin_path, e))
        })?;

        // Calculate track lengths based on file size and positions
        Self::calculate_track_lengths(&mut tracks, data.len());

        log::info!(
            "Loaded disc image: {} tracks, {} sectors",
            tracks.len(),
            data.len() / RAW_SECTOR_SIZE
        );

        Ok(Self {
            file_name: cue_path.to_string(),
            tracks,
            data,
            position: 0,
        })
    }

    /// Extract .bin file path from .cue file path and content
    ///
    /// Searches for FILE directive in .cue content to determine .bin filename.
    fn get_bin_path_from_cue(cue_path: &str, cue_data: &str) -> Result<String, CdRomError> {
        // Find FILE directive
        for line in cue_data.lines() {
            let line = line.trim();
            if line.starts_with("FILE") {
                // Extract filename from quotes
                if let Some(start) = line.find('"') {
                    if let Some(end) = line[start + 1..].find('"') {
                        let bin_filename = &line[start + 1..start + 1 + end];

                        // Construct full path relative to the .cue location
                        let cue_path_obj = std::path::Path::new(cue_path);
                        let bin_path = if let Some(parent) = cue_path_obj.parent() {
                            parent.join(bin_filename)
                        } else {
                            std::path::PathBuf::from(bin_filename)
                        };

                        return Ok(bin_path.to_string_lossy().to_string());
                    }
                }
            }
        }

        Err(CdRomError::DiscLoadError(
            "No FILE directive found in .cue file".to_string(),
        ))
    }

    /// Parse .cue file content to extract track information
    ///
    /// INDEX 01 times are disc-absolute MSF (the data area conventionally
    /// starts at 00:02:00, i.e. LBA 0).
    pub(super) fn parse_cue(cue_data: &str) -> Result<Vec<Track>, CdRomError> {
        let mut tracks = Vec::new();
        let mut current_track: Option<Track> = None;

        for line in cue_data.lines() {
            let line = line.trim();

            if line.starts_with("TRACK") {
                // Save previous track
                if let Some(track) = current_track.take() {
                    tracks.push(track);
                }

                let parts: Vec<&str> = line.split_whitespace().collect();
                let track_num = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(1);
                let track_type_str = parts.get(2).unwrap_or(&"MODE2/2352");

                current_track = Some(Track {
                    number: track_num,
                    track_type: Self::parse_track_type(track_type_str),
                    start_position: CDPosition::new(0, 0, 0),
                    length_sectors: 0,
                    file_offset: 0,
                });
            } else if line.starts_with("INDEX 01") {
                if let Some(ref mut track) = current_track {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    if let Some(time_str) = parts.get(2) {
                        track.start_position = Self::parse_msf(time_str)?;
                        // Calculate file offset from MSF position
                        track.file_offset =
                            track.start_position.to_lba() as u64 * RAW_SECTOR_SIZE as u64;
                    }
                }
            }
        }

        // Save last track
        if let Some(track) = current_track {
            tracks.push(track);
        }

        Ok(tracks)
    }

    /// Parse MSF time string (MM:SS:FF)
    pub(super) fn parse_msf(msf: &str) -> Result<CDPosition, CdRomError> {
        let parts: Vec<&str> = msf.split(':').collect();
        if parts.len() != 3 {
            return Err(CdRomError::DiscLoadError(format!(
                "Invalid MSF format: '{}'",
                msf
            )));
        }

        let minute = parts[0]
            .parse()
            .map_err(|_| CdRomError::DiscLoadError(format!("Invalid minute in MSF: '{}'", msf)))?;
        let second = parts[1]
            .parse()
            .map_err(|_| CdRomError::DiscLoadError(format!("Invalid second in MSF: '{}'", msf)))?;
        let frame = parts[2]
            .parse()
            .map_err(|_| CdRomError::DiscLoadError(format!("Invalid frame in MSF: '{}'", msf)))?;

        Ok(CDPosition {
            minute,
            second,
            frame,
        })
    }

    /// Parse track type string from .cue file
    pub(super) fn parse_track_type(s: &str) -> TrackType {
        match s {
            "MODE1/2352" => TrackType::Mode1_2352,
            "MODE2/2352" => TrackType::Mode2_2352,
            "AUDIO" => TrackType::Audio,
            _ => TrackType::Mode2_2352, // Default to Mode2
        }
    }

    /// Calculate track lengths based on file size and start positions
    pub(super) fn calculate_track_lengths(tracks: &mut [Track], file_size: usize) {
        for i in 0..tracks.len() {
            if i + 1 < tracks.len() {
                // Length is the gap between this track and the next
                let next_offset = tracks[i + 1].file_offset;
                let this_offset = tracks[i].file_offset;
                tracks[i].length_sectors =
                    ((next_offset - this_offset) / RAW_SECTOR_SIZE as u64) as u32;
            } else {
                // Last track: calculate from remaining file size
                let this_offset = tracks[i].file_offset;
                tracks[i].length_sectors =
                    ((file_size as u64 - this_offset) / RAW_SECTOR_SIZE as u64) as u32;
            }
        }
    }

    /// Path this image was opened from
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Total number of sectors in the image
    pub fn lba_count(&self) -> u32 {
        (self.data.len() / RAW_SECTOR_SIZE) as u32
    }

    /// Current read cursor (LBA)
    pub fn position_on_disc(&self) -> u32 {
        self.position
    }

    /// Current read cursor as a disc-absolute MSF position
    pub fn msf_position_on_disc(&self) -> CDPosition {
        CDPosition::from_lba(self.position)
    }

    /// Current read cursor relative to the start of the current track
    pub fn msf_position_in_track(&self) -> CDPosition {
        let start = self
            .current_track()
            .map_or(0, |t| t.start_lba().min(self.position));
        CDPosition::from_sector_count(self.position - start)
    }

    /// Track number under the read cursor (1 if the cue had no match)
    pub fn track_number(&self) -> u8 {
        self.current_track().map_or(1, |t| t.number)
    }

    /// Number of tracks on the disc
    pub fn track_count(&self) -> u8 {
        self.tracks.len() as u8
    }

    /// Track information by track number (1-99)
    pub fn get_track(&self, track_num: u8) -> Option<&Track> {
        self.tracks.iter().find(|t| t.number == track_num)
    }

    /// Start position of a track in disc-absolute MSF
    pub fn track_start_position(&self, track_num: u8) -> Option<CDPosition> {
        self.get_track(track_num).map(|t| t.start_position)
    }

    /// Move the read cursor to an MSF position
    ///
    /// # Returns
    ///
    /// `true` if the position is on the disc, `false` otherwise (the cursor
    /// is left untouched on failure).
    pub fn seek(&mut self, position: &CDPosition) -> bool {
        self.seek_lba(position.to_lba())
    }

    /// Move the read cursor to an LBA
    pub fn seek_lba(&mut self, lba: u32) -> bool {
        if lba < self.lba_count() {
            self.position = lba;
            true
        } else {
            log::warn!(
                "Seek to LBA {} out of bounds ({} sectors)",
                lba,
                self.lba_count()
            );
            false
        }
    }

    /// Read the raw sector under the cursor and advance the cursor
    ///
    /// # Arguments
    ///
    /// * `buf` - Destination, at least 2352 bytes
    ///
    /// # Returns
    ///
    /// `true` on success, `false` if the cursor ran off the end of the image.
    pub fn read_sector_raw(&mut self, buf: &mut [u8]) -> bool {
        let offset = self.position as usize * RAW_SECTOR_SIZE;
        if offset + RAW_SECTOR_SIZE > self.data.len() {
            return false;
        }

        buf[..RAW_SECTOR_SIZE].copy_from_slice(&self.data[offset..offset + RAW_SECTOR_SIZE]);
        self.position += 1;
        true
    }

    /// Read a sector at an MSF position without moving the cursor
    ///
    /// # Returns
    ///
    /// - `Some(&[u8])` - Sector data (2352 bytes)
    /// - `None` - Position out of bounds
    pub fn read_sector(&self, position: &CDPosition) -> Option<&[u8]> {
        let offset = position.to_lba() as usize * RAW_SECTOR_SIZE;

        if offset + RAW_SECTOR_SIZE <= self.data.len() {
            Some(&self.data[offset..offset + RAW_SECTOR_SIZE])
        } else {
            None
        }
    }

    fn current_track(&self) -> Option<&Track> {
        self.tracks
            .iter()
            .rev()
            .find(|t| t.start_lba() <= self.position)
    }
}
