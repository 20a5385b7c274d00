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

use criterion::{criterion_group, criterion_main, Criterion};
use spindle_core::core::bus::NullBus;
use spindle_core::core::cdrom::xa::{
    decode_adpcm_sector, XAResampler, XA_ADPCM_SAMPLES_PER_SECTOR_4BIT,
};
use std::hint::black_box;

/// A stereo 4-bit XA sector with a deterministic pseudo-random payload.
fn synthetic_xa_sector() -> Vec<u8> {
    let mut sector = vec![0u8; 2352];
    sector[15] = 2; // mode 2
    sector[18] = 0x44; // realtime | audio
    sector[19] = 0x01; // stereo, 4-bit, 37800 Hz
    for (i, byte) in sector.iter_mut().enumerate().skip(24) {
        *byte = (i.wrapping_mul(31) % 251) as u8;
    }
    sector
}

fn xa_decode_benchmark(c: &mut Criterion) {
    let sector = synthetic_xa_sector();

    c.bench_function("xa_decode_sector", |b| {
        let mut samples = [0i16; XA_ADPCM_SAMPLES_PER_SECTOR_4BIT];
        let mut last_samples = [0i16; 4];

        b.iter(|| {
            decode_adpcm_sector(black_box(&sector), &mut samples, &mut last_samples);
            black_box(samples[0]);
        });
    });
}

fn xa_resample_benchmark(c: &mut Criterion) {
    let sector = synthetic_xa_sector();
    let mut samples = [0i16; XA_ADPCM_SAMPLES_PER_SECTOR_4BIT];
    let mut last_samples = [0i16; 4];
    decode_adpcm_sector(&sector, &mut samples, &mut last_samples);

    let matrix = [[0x80, 0x00], [0x00, 0x80]];

    c.bench_function("xa_resample_sector", |b| {
        let mut resampler = XAResampler::new();
        let mut bus = NullBus;

        b.iter(|| {
            resampler.resample(black_box(&samples), true, false, &matrix, &mut bus);
        });
    });
}

criterion_group!(benches, xa_decode_benchmark, xa_resample_benchmark);
criterion_main!(benches);
