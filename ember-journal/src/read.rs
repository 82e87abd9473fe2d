//! Journal recovery: scan, verify, deliver, and truncate the corrupt tail.

use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};

use tracing::{info, warn};

use ember_common::error::EmberResult;

use crate::record::parse_line;
use crate::writer::Aof;

/// Per-line scratch buffer starts at 64 KiB and a record line may grow to 16 MiB.
const SCAN_BUF_SIZE: usize = 64 * 1024;
const MAX_LINE_SIZE: usize = 16 * 1024 * 1024;

/// Outcome of one recovery pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records delivered to the handler.
    pub valid_entries: usize,
    /// Records rejected by framing or checksum (scanning stops at the first).
    pub corrupt_entries: usize,
    /// Whether the file was cut back to the last valid record.
    pub truncated: bool,
    /// Byte offset of the first corrupt record.
    pub truncated_at: u64,
}

enum LineRead {
    Eof,
    /// Complete line; total bytes consumed including the `\n`.
    Line(usize),
    /// Line exceeded [`MAX_LINE_SIZE`] or hit EOF before its terminator.
    Broken,
}

fn read_line_capped<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> std::io::Result<LineRead> {
    line.clear();
    loop {
        let (consumed, terminated) = {
            let available = reader.fill_buf()?;
            if available.is_empty() {
                return Ok(if line.is_empty() {
                    LineRead::Eof
                } else {
                    LineRead::Broken
                });
            }
            match available.iter().position(|&byte| byte == b'\n') {
                Some(newline) => {
                    line.extend_from_slice(&available[..newline]);
                    (newline + 1, true)
                }
                None => {
                    line.extend_from_slice(available);
                    (available.len(), false)
                }
            }
        };
        reader.consume(consumed);
        if line.len() >= MAX_LINE_SIZE {
            return Ok(LineRead::Broken);
        }
        if terminated {
            return Ok(LineRead::Line(line.len() + 1));
        }
    }
}

impl Aof {
    /// Scans the journal from the start, verifying each record's checksum and delivering
    /// `(cmd, key, value, expire_at)` to `handler`. On the first corrupt record the scan stops
    /// and the file is truncated back to the last valid byte, so a subsequent pass is clean.
    ///
    /// # Errors
    ///
    /// Returns an error for I/O failures only; corruption is reported, not raised.
    pub fn read(
        &self,
        mut handler: impl FnMut(&[u8], &[u8], &[u8], i64),
    ) -> EmberResult<RecoveryReport> {
        let mut guard = self.lock_file();
        guard.writer.flush()?;

        let mut report = RecoveryReport::default();
        let mut last_valid_pos = 0_u64;
        {
            let file = guard.writer.get_mut();
            file.seek(SeekFrom::Start(0))?;
            let mut reader = BufReader::with_capacity(SCAN_BUF_SIZE, &mut *file);
            let mut line = Vec::new();

            loop {
                match read_line_capped(&mut reader, &mut line)? {
                    LineRead::Eof => break,
                    LineRead::Broken => {
                        report.corrupt_entries += 1;
                        report.truncated = true;
                        report.truncated_at = last_valid_pos;
                        break;
                    }
                    LineRead::Line(consumed) => match parse_line(&line) {
                        Some(record) => {
                            report.valid_entries += 1;
                            last_valid_pos += consumed as u64;
                            handler(record.cmd, record.key, record.value, record.expire_at);
                        }
                        None => {
                            warn!(offset = last_valid_pos, "corrupt journal record");
                            report.corrupt_entries += 1;
                            report.truncated = true;
                            report.truncated_at = last_valid_pos;
                            break;
                        }
                    },
                }
            }
        }

        if report.truncated {
            info!(
                offset = report.truncated_at,
                recovered = report.valid_entries,
                discarded = report.corrupt_entries,
                "truncating journal after corrupt record"
            );
            let file = guard.writer.get_mut();
            file.set_len(report.truncated_at)?;
            file.seek(SeekFrom::End(0))?;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::writer::{Aof, JOURNAL_FILE};
    use googletest::prelude::*;
    use rstest::rstest;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn collect_sets(aof: &Aof) -> (Vec<(Vec<u8>, Vec<u8>)>, crate::RecoveryReport) {
        let mut entries = Vec::new();
        let report = aof
            .read(|cmd, key, value, _| {
                if cmd == b"SET" {
                    entries.push((key.to_vec(), value.to_vec()));
                }
            })
            .expect("read");
        (entries, report)
    }

    #[rstest]
    fn write_close_reopen_replays_in_order() {
        let dir = TempDir::new().expect("tempdir");
        {
            let aof = Aof::open(dir.path()).expect("open");
            for i in 0..100_u32 {
                let key = format!("k:{i}");
                let value = format!("v:{i}");
                aof.append("SET", key.as_bytes(), value.as_bytes(), 0);
            }
            aof.append("DEL", b"k:0", b"", 0);
            aof.close();
        }

        let aof = Aof::open(dir.path()).expect("reopen");
        let mut deletes = 0_usize;
        let mut sets = Vec::new();
        let report = aof
            .read(|cmd, key, _, _| match cmd {
                b"SET" => sets.push(key.to_vec()),
                b"DEL" => deletes += 1,
                _ => {}
            })
            .expect("read");
        aof.close();

        assert_that!(report.valid_entries, eq(101));
        assert_that!(report.truncated, eq(false));
        assert_that!(deletes, eq(1));
        assert_that!(sets.first(), eq(Some(&b"k:0".to_vec())));
        assert_that!(sets.last(), eq(Some(&b"k:99".to_vec())));
    }

    #[rstest]
    fn garbage_tail_is_truncated_and_second_pass_is_clean() {
        let dir = TempDir::new().expect("tempdir");
        {
            let aof = Aof::open(dir.path()).expect("open");
            for i in 0..10_u32 {
                let key = format!("k:{i}");
                aof.append("SET", key.as_bytes(), b"v", 0);
            }
            aof.close();
        }
        let clean_size = std::fs::metadata(dir.path().join(JOURNAL_FILE))
            .expect("metadata")
            .len();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(dir.path().join(JOURNAL_FILE))
                .expect("open raw");
            file.write_all(b"???torn record without structure\n").expect("write");
        }

        let aof = Aof::open(dir.path()).expect("reopen");
        let (entries, report) = collect_sets(&aof);
        assert_that!(entries.len(), eq(10));
        assert_that!(report.truncated, eq(true));
        assert_that!(report.corrupt_entries, eq(1));
        assert_that!(report.truncated_at, eq(clean_size));

        // The truncation left a valid journal: a second recovery sees no corruption.
        let (entries, report) = collect_sets(&aof);
        assert_that!(entries.len(), eq(10));
        assert_that!(report.truncated, eq(false));
        assert_that!(report.corrupt_entries, eq(0));
        aof.close();

        let truncated_size = std::fs::metadata(dir.path().join(JOURNAL_FILE))
            .expect("metadata")
            .len();
        assert_that!(truncated_size, eq(clean_size));
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(25)]
    fn torn_final_record_recovers_a_strict_prefix(#[case] cut: u64) {
        let dir = TempDir::new().expect("tempdir");
        let values: Vec<Vec<u8>> = (0..50_u32)
            .map(|i| format!("value:{i:04}").into_bytes())
            .collect();
        {
            let aof = Aof::open(dir.path()).expect("open");
            for (i, value) in values.iter().enumerate() {
                let key = format!("k:{i:04}");
                aof.append("SET", key.as_bytes(), value, 0);
            }
            aof.close();
        }

        let path = dir.path().join(JOURNAL_FILE);
        let full = std::fs::metadata(&path).expect("metadata").len();
        let file = OpenOptions::new().write(true).open(&path).expect("open raw");
        file.set_len(full - cut).expect("truncate");
        drop(file);

        let aof = Aof::open(dir.path()).expect("reopen");
        let (entries, report) = collect_sets(&aof);
        aof.close();

        assert_that!(report.truncated, eq(true));
        assert_that!(entries.len() < 50, eq(true));
        // Recovered entries are a contiguous prefix with byte-identical values.
        for (i, (key, value)) in entries.iter().enumerate() {
            assert_that!(key, eq(&format!("k:{i:04}").into_bytes()));
            assert_that!(value, eq(&values[i]));
        }
    }

    #[rstest]
    fn legacy_records_without_checksums_replay() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(
            dir.path().join(JOURNAL_FILE),
            b"SET|old:1|0|alpha\nSET|old:2|0|beta\n",
        )
        .expect("seed legacy journal");

        let aof = Aof::open(dir.path()).expect("open");
        let (entries, report) = collect_sets(&aof);
        aof.close();

        assert_that!(report.valid_entries, eq(2));
        assert_that!(report.truncated, eq(false));
        assert_that!(
            entries,
            eq(&vec![
                (b"old:1".to_vec(), b"alpha".to_vec()),
                (b"old:2".to_vec(), b"beta".to_vec()),
            ])
        );
    }

    #[rstest]
    fn large_values_survive_crash_style_truncation() {
        let dir = TempDir::new().expect("tempdir");
        let value: Vec<u8> = (0..256_usize * 1024).map(|i| (i % 251) as u8 ^ 0x2a).collect();
        {
            let aof = Aof::open(dir.path()).expect("open");
            for i in 0..5_u32 {
                let key = format!("big:{i}");
                aof.append("SET", key.as_bytes(), &value, 0);
            }
            aof.close();
        }

        let path = dir.path().join(JOURNAL_FILE);
        let full = std::fs::metadata(&path).expect("metadata").len();
        let file = OpenOptions::new().write(true).open(&path).expect("open raw");
        // Cut into the middle of the last record.
        file.set_len(full - 100_000).expect("truncate");
        drop(file);

        let aof = Aof::open(dir.path()).expect("reopen");
        let (entries, report) = collect_sets(&aof);
        aof.close();

        assert_that!(report.truncated, eq(true));
        assert_that!(entries.len(), eq(4));
        for (_, recovered) in &entries {
            assert_that!(recovered, eq(&value));
        }
    }
}
