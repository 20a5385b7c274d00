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

//! Guest bus boundary
//!
//! The CD-ROM controller drives three outward lines into the rest of the
//! guest machine:
//!
//! - an edge-triggered interrupt line to the interrupt controller, raised
//!   whenever the interrupt flag register transitions from zero to non-zero
//! - the DMA request level for the CD-ROM channel, asserted exactly when the
//!   data FIFO is non-empty
//! - the CD audio input of the SPU mixer, fed with 44.1 kHz stereo samples
//!
//! All three are bundled into one [`GuestBus`] trait so the host can hand a
//! single `&mut` connection into the controller's entry points. The mixer
//! contract is positional: after `ensure_cd_audio_space(n)` the controller
//! makes exactly `n` calls to `add_cd_audio_sample`.

/// Connections from the CD-ROM controller to the rest of the guest machine.
pub trait GuestBus {
    /// Raise the CD-ROM interrupt line.
    ///
    /// Called on each flag-register transition from zero to non-zero. The
    /// interrupt controller latches the edge; repeated raises while the flag
    /// is already set do not occur.
    fn raise_interrupt(&mut self);

    /// Drive the CD-ROM DMA channel request level.
    ///
    /// The level equals the `DRQSTS` status bit: asserted while the data
    /// FIFO holds bytes, deasserted when it drains.
    fn set_dma_request(&mut self, asserted: bool);

    /// Reserve space for `samples` stereo sample pairs in the CD audio
    /// buffer of the mixer.
    fn ensure_cd_audio_space(&mut self, samples: u32);

    /// Append one stereo sample pair to the mixer's CD audio input.
    fn add_cd_audio_sample(&mut self, left: i16, right: i16);
}

/// A bus that ignores everything.
///
/// Useful for tests and benchmarks that exercise the controller without a
/// surrounding machine.
///
/// # Example
///
/// ```
/// use spindle_core::core::bus::{GuestBus, NullBus};
///
/// let mut bus = NullBus;
/// bus.raise_interrupt();
/// bus.add_cd_audio_sample(0, 0);
/// ```
pub struct NullBus;

impl GuestBus for NullBus {
    fn raise_interrupt(&mut self) {}

    fn set_dma_request(&mut self, _asserted: bool) {}

    fn ensure_cd_audio_space(&mut self, _samples: u32) {}

    fn add_cd_audio_sample(&mut self, _left: i16, _right: i16) {}
}
