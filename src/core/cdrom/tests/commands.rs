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

//! Per-command behavior tests

use super::super::*;
use super::*;

#[test]
fn test_getstat_acks_with_status() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    run_command(&mut cdrom, &mut bus, 0x01);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x00]);
    assert_eq!(bus.irq_raises, 1);
}

#[test]
fn test_getid_without_media() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    run_command(&mut cdrom, &mut bus, 0x1A);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 5);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x11, 0x80]);
    assert_eq!(cdrom.next_event_ticks(), None);
}

#[test]
fn test_getid_with_media_two_stages() {
    let bin = numbered_sectors_bin(20);
    let (_cue, _bin, cue_path) = make_disc_files("getid_", &bin);

    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();
    cdrom.insert_media(&cue_path).unwrap();

    run_command(&mut cdrom, &mut bus, 0x1A);

    // Stage 0: acknowledge with the stat byte.
    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x00]);

    // Stage 1 is gated on the host ack, then fires 18,000 ticks later.
    ack_irq(&mut cdrom, &mut bus);
    assert_eq!(cdrom.next_event_ticks(), Some(18_000));
    cdrom.execute(18_000, &mut bus);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 2);
    assert_eq!(
        drain_response(&mut cdrom, &mut bus),
        vec![0x02, 0x00, 0x20, 0x00, b'S', b'C', b'E', b'A']
    );
}

#[test]
fn test_test_command_bios_date() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    push_param(&mut cdrom, &mut bus, 0x20);
    run_command(&mut cdrom, &mut bus, 0x19);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);
    assert_eq!(
        drain_response(&mut cdrom, &mut bus),
        vec![0x94, 0x09, 0x19, 0xC0]
    );
}

#[test]
fn test_test_command_region_string() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    push_param(&mut cdrom, &mut bus, 0x22);
    run_command(&mut cdrom, &mut bus, 0x19);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);
    assert_eq!(drain_response(&mut cdrom, &mut bus), b"for U/C".to_vec());
}

#[test]
fn test_test_command_unknown_subcommand_ignored() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    push_param(&mut cdrom, &mut bus, 0x55);
    run_command(&mut cdrom, &mut bus, 0x19);

    // No response, no interrupt, back to idle.
    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 0);
    assert!(drain_response(&mut cdrom, &mut bus).is_empty());
    assert_eq!(cdrom.next_event_ticks(), None);
}

#[test]
fn test_setloc_latches_bcd_position() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    push_param(&mut cdrom, &mut bus, 0x25);
    push_param(&mut cdrom, &mut bus, 0x30);
    push_param(&mut cdrom, &mut bus, 0x74);
    run_command(&mut cdrom, &mut bus, 0x02);

    assert!(cdrom.setloc_pending);
    assert_eq!(cdrom.setloc_position, CDPosition::new(25, 30, 74));
    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);

    // The wire value survives the BCD round trip.
    assert_eq!(dec_to_bcd(cdrom.setloc_position.minute), 0x25);
    assert_eq!(dec_to_bcd(cdrom.setloc_position.second), 0x30);
    assert_eq!(dec_to_bcd(cdrom.setloc_position.frame), 0x74);

    // Parameters were drained when the command finished.
    assert!(cdrom.param_fifo.is_empty());
}

#[test]
fn test_setloc_insufficient_parameters() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    push_param(&mut cdrom, &mut bus, 0x00);
    push_param(&mut cdrom, &mut bus, 0x02);
    run_command(&mut cdrom, &mut bus, 0x02);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 5);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x01, 0x20]);
    assert!(!cdrom.setloc_pending);
}

#[test]
fn test_setmode_stores_mode_byte() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    push_param(&mut cdrom, &mut bus, 0x80);
    run_command(&mut cdrom, &mut bus, 0x0E);

    assert!(cdrom.mode.double_speed);
    assert!(!cdrom.mode.xa_enable);
    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);
}

#[test]
fn test_setfilter_stores_file_and_channel() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    push_param(&mut cdrom, &mut bus, 1);
    push_param(&mut cdrom, &mut bus, 4);
    run_command(&mut cdrom, &mut bus, 0x0D);

    assert_eq!(cdrom.filter_file_number, 1);
    assert_eq!(cdrom.filter_channel_number, 4);
    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);
}

#[test]
fn test_mute_demute() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    run_command(&mut cdrom, &mut bus, 0x0B);
    assert!(cdrom.muted);
    ack_irq(&mut cdrom, &mut bus);
    drain_response(&mut cdrom, &mut bus);

    run_command(&mut cdrom, &mut bus, 0x0C);
    assert!(!cdrom.muted);
}

#[test]
fn test_getloc_l_returns_header_and_subheader() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    cdrom.last_sector_header = SectorHeader([0x00, 0x02, 0x16, 0x02]);
    cdrom.last_sector_subheader = SectorSubHeader([1, 0, 0x44, 0x01, 1, 0, 0x44, 0x01]);

    run_command(&mut cdrom, &mut bus, 0x10);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);
    assert_eq!(
        drain_response(&mut cdrom, &mut bus),
        vec![0x00, 0x02, 0x16, 0x02, 1, 0, 0x44, 0x01, 1, 0, 0x44, 0x01]
    );
}

#[test]
fn test_getloc_p_is_a_subchannel_stub() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    cdrom.last_sector_header = SectorHeader([0x00, 0x02, 0x16, 0x02]);

    run_command(&mut cdrom, &mut bus, 0x11);

    assert_eq!(
        drain_response(&mut cdrom, &mut bus),
        vec![1, 1, 0x00, 0x02, 0x16, 0x00, 0x02, 0x16]
    );
}

#[test]
fn test_get_tn_reports_track_counts() {
    let bin = numbered_sectors_bin(150);
    let (_cue, _bin, cue_path) = make_two_track_disc_files("gettn_", &bin);

    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();
    cdrom.insert_media(&cue_path).unwrap();

    run_command(&mut cdrom, &mut bus, 0x13);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);
    assert_eq!(
        drain_response(&mut cdrom, &mut bus),
        vec![0x00, 0x01, 0x02]
    );
}

#[test]
fn test_get_tn_without_media() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    run_command(&mut cdrom, &mut bus, 0x13);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 5);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x01, 0x80]);
}

#[test]
fn test_get_td_track_start_and_disc_end() {
    let bin = numbered_sectors_bin(150);
    let (_cue, _bin, cue_path) = make_two_track_disc_files("gettd_", &bin);

    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();
    cdrom.insert_media(&cue_path).unwrap();

    // Track 2 starts at 00:03:00.
    push_param(&mut cdrom, &mut bus, 0x02);
    run_command(&mut cdrom, &mut bus, 0x14);
    assert_eq!(
        drain_response(&mut cdrom, &mut bus),
        vec![0x00, 0x00, 0x03]
    );
    ack_irq(&mut cdrom, &mut bus);

    // Track 0 reports the end of the disc: 150 sectors => 00:04:00.
    push_param(&mut cdrom, &mut bus, 0x00);
    run_command(&mut cdrom, &mut bus, 0x14);
    assert_eq!(
        drain_response(&mut cdrom, &mut bus),
        vec![0x00, 0x00, 0x04]
    );
    ack_irq(&mut cdrom, &mut bus);

    // Past the last track: INT5 with the bad-track reason.
    push_param(&mut cdrom, &mut bus, 0x05);
    run_command(&mut cdrom, &mut bus, 0x14);
    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 5);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x01, 0x10]);
}

#[test]
fn test_seek_without_media() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    run_command(&mut cdrom, &mut bus, 0x15);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 5);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x01, 0x80]);
    assert!(!cdrom.secondary_status.seeking);
}

#[test]
fn test_read_without_media() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    run_command(&mut cdrom, &mut bus, 0x06);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 5);
    assert!(!cdrom.secondary_status.reading);
}

#[test]
fn test_play_without_media() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    run_command(&mut cdrom, &mut bus, 0x03);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 5);
    assert!(!cdrom.secondary_status.playing_cdda);
}

#[test]
fn test_pause_when_idle_completes_quickly() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    run_command(&mut cdrom, &mut bus, 0x09);
    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);
    drain_response(&mut cdrom, &mut bus);
    ack_irq(&mut cdrom, &mut bus);

    // Idle drive: the completion is only 7000 ticks out.
    assert_eq!(cdrom.next_event_ticks(), Some(7_000));
    cdrom.execute(7_000, &mut bus);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 2);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x00]);
    assert_eq!(cdrom.next_event_ticks(), None);
}

#[test]
fn test_init_two_stages_resets_mode() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    cdrom.mode.set_bits(0xE0);

    issue_command(&mut cdrom, &mut bus, 0x0A);
    // Init carries a long spin-up ack delay.
    assert_eq!(cdrom.next_event_ticks(), Some(60_000));
    cdrom.execute(60_000, &mut bus);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);
    drain_response(&mut cdrom, &mut bus);
    ack_irq(&mut cdrom, &mut bus);

    cdrom.execute(8_000, &mut bus);
    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 2);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x02]);
    assert_eq!(cdrom.mode.bits(), 0);
    assert!(cdrom.secondary_status.motor_on);
}

#[test]
fn test_read_toc_two_stages() {
    let bin = numbered_sectors_bin(20);
    let (_cue, _bin, cue_path) = make_disc_files("readtoc_", &bin);

    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();
    cdrom.insert_media(&cue_path).unwrap();

    run_command(&mut cdrom, &mut bus, 0x1E);
    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 3);
    drain_response(&mut cdrom, &mut bus);
    ack_irq(&mut cdrom, &mut bus);

    cdrom.execute(500_000, &mut bus);
    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 2);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x00]);
}

#[test]
fn test_read_toc_without_media() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    run_command(&mut cdrom, &mut bus, 0x1E);

    assert_eq!(read_irq_flag(&mut cdrom, &mut bus), 5);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x01, 0x80]);
}

#[test]
fn test_command_write_while_busy_is_ignored() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    issue_command(&mut cdrom, &mut bus, 0x01);
    // Still waiting for the Getstat ack delay; this write is dropped.
    issue_command(&mut cdrom, &mut bus, 0x0B);

    cdrom.execute(ACK_DELAY, &mut bus);

    assert!(!cdrom.muted);
    assert_eq!(drain_response(&mut cdrom, &mut bus), vec![0x00]);
}

#[test]
#[should_panic(expected = "unknown CD-ROM command")]
fn test_unknown_command_is_fatal() {
    let mut cdrom = CDROM::new();
    let mut bus = TestBus::new();

    run_command(&mut cdrom, &mut bus, 0x55);
}
