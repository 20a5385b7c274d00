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

//! Timing vocabulary
//!
//! The controller counts time in guest CPU cycles ("ticks"). The host
//! scheduler decides how many ticks have elapsed between slices and passes
//! them to [`crate::core::cdrom::CDROM::execute`]; the controller reports
//! how long until its next internal event through
//! [`crate::core::cdrom::CDROM::next_event_ticks`] so the host can program
//! its downcount.

/// Tick count type (relative time in CPU cycles)
pub type TickCount = i32;

/// PSX master clock in Hz (44100 Hz * 0x300 = 33,868,800)
///
/// One CD sector period at 1x speed is `MASTER_CLOCK / 75` ticks, and
/// `MASTER_CLOCK / 150` at 2x speed.
pub const MASTER_CLOCK: TickCount = 44_100 * 0x300;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_clock_value() {
        assert_eq!(MASTER_CLOCK, 33_868_800);
        // 75 sectors per second at 1x
        assert_eq!(MASTER_CLOCK / 75, 451_584);
        // 150 sectors per second at 2x
        assert_eq!(MASTER_CLOCK / 150, 225_792);
    }
}
