//! Read-only surface scan: sequential sampling of a block device.

use crate::error::{SmartError, SmartResult};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::str::FromStr;
use std::time::{Duration, Instant};

pub const BLOCK_SIZE: usize = 1 << 20;
pub const QUICK_SAMPLES: u64 = 256;
pub const MAX_LISTED_ERRORS: usize = 64;
pub const SLOW_BLOCK: Duration = Duration::from_millis(500);
/// Buffer address and transfer length granularity for `O_DIRECT` reads.
pub const DIRECT_ALIGN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ScanType {
    #[default]
    Quick,
    Deep,
}

impl ScanType {
    pub fn label(&self) -> &'static str {
        match self {
            ScanType::Quick => "quick",
            ScanType::Deep  => "deep",
        }
    }
}

impl FromStr for ScanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quick" => Ok(ScanType::Quick),
            "deep"  => Ok(ScanType::Deep),
            other   => Err(format!("unknown scan type '{}' (expected quick or deep)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadError {
    pub offset: u64,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurfaceReport {
    pub path:         String,
    pub scan_type:    ScanType,
    pub device_size:  u64,
    pub blocks_total: u64,
    pub blocks_read:  u64,
    pub bytes_read:   u64,
    pub error_count:  u64,
    /// First [`MAX_LISTED_ERRORS`] failures; `error_count` has the full total.
    pub errors:       Vec<ReadError>,
    pub slow_blocks:  u64,
    pub elapsed_ms:   u64,
    /// Reads bypassed the page cache.
    pub direct_io:    bool,
}

impl SurfaceReport {
    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }

    pub fn mb_per_sec(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        self.bytes_read as f64 / 1_000_000.0 / (self.elapsed_ms as f64 / 1000.0)
    }
}

/// Block indices to read. Quick spreads [`QUICK_SAMPLES`] reads evenly from
/// the first block to the last; deep reads every block.
pub fn sample_blocks(blocks_total: u64, scan_type: ScanType) -> Vec<u64> {
    match scan_type {
        ScanType::Quick if blocks_total > QUICK_SAMPLES => (0..QUICK_SAMPLES)
            .map(|i| i * (blocks_total - 1) / (QUICK_SAMPLES - 1))
            .collect(),
        _ => (0..blocks_total).collect(),
    }
}

/// Open `path` read-only and scan its first `size` bytes.
///
/// On Linux the device is opened with `O_DIRECT` so cached pages cannot hide
/// media errors. Filesystems that refuse `O_DIRECT` get a buffered open and
/// `direct_io` is false in the report.
pub fn scan(path: &str, size: u64, scan_type: ScanType) -> SmartResult<SurfaceReport> {
    let (file, direct) = open_device(path).map_err(|e| SmartError::from_io(path, e))?;
    let mut report = scan_reader(file, path, size, scan_type)?;
    report.direct_io = direct;
    Ok(report)
}

#[cfg(target_os = "linux")]
fn open_device(path: &str) -> io::Result<(File, bool)> {
    use std::os::unix::fs::OpenOptionsExt;

    match OpenOptions::new().read(true).custom_flags(libc::O_DIRECT).open(path) {
        Ok(f) => return Ok((f, true)),
        Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
            tracing::debug!(path, "O_DIRECT refused, scanning through the page cache");
        }
        Err(e) => return Err(e),
    }
    OpenOptions::new().read(true).open(path).map(|f| (f, false))
}

#[cfg(not(target_os = "linux"))]
fn open_device(path: &str) -> io::Result<(File, bool)> {
    OpenOptions::new().read(true).open(path).map(|f| (f, false))
}

/// Over-allocated backing store for one block.
fn block_buffer() -> Vec<u8> {
    vec![0u8; BLOCK_SIZE + DIRECT_ALIGN]
}

/// The [`DIRECT_ALIGN`]-aligned `BLOCK_SIZE` window inside `buf`.
fn aligned_block(buf: &mut [u8]) -> &mut [u8] {
    let off = buf.as_ptr().align_offset(DIRECT_ALIGN);
    let off = if off <= DIRECT_ALIGN { off } else { 0 };
    &mut buf[off..off + BLOCK_SIZE]
}

/// Fill at least `len` bytes of `buf`. Direct reads need a rounded-up
/// transfer length, so the slice may be longer than `len`.
fn read_block<R: Read>(reader: &mut R, buf: &mut [u8], len: usize) -> io::Result<()> {
    let mut filled = 0;
    while filled < len {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub fn scan_reader<R: Read + Seek>(
    mut reader: R,
    path: &str,
    size: u64,
    scan_type: ScanType,
) -> SmartResult<SurfaceReport> {
    if size == 0 {
        return Err(SmartError::InvalidParameter(format!("{}: device size is zero", path)));
    }
    let blocks_total = size.div_ceil(BLOCK_SIZE as u64);
    let mut report = SurfaceReport {
        path: path.to_string(),
        scan_type,
        device_size: size,
        blocks_total,
        blocks_read: 0,
        bytes_read: 0,
        error_count: 0,
        errors: Vec::new(),
        slow_blocks: 0,
        elapsed_ms: 0,
        direct_io: false,
    };

    let mut backing = block_buffer();
    let buf = aligned_block(&mut backing);
    let started = Instant::now();
    for block in sample_blocks(blocks_total, scan_type) {
        let offset = block * BLOCK_SIZE as u64;
        let len = (size - offset).min(BLOCK_SIZE as u64) as usize;
        let want = len.next_multiple_of(DIRECT_ALIGN).min(BLOCK_SIZE);

        let t0 = Instant::now();
        let res = reader
            .seek(SeekFrom::Start(offset))
            .and_then(|_| read_block(&mut reader, &mut buf[..want], len));
        let took = t0.elapsed();

        report.blocks_read += 1;
        if took > SLOW_BLOCK {
            report.slow_blocks += 1;
        }
        match res {
            Ok(()) => report.bytes_read += len as u64,
            Err(e) => {
                tracing::debug!(path, offset, error = %e, "surface read failed");
                report.error_count += 1;
                if report.errors.len() < MAX_LISTED_ERRORS {
                    report.errors.push(ReadError { offset, detail: e.to_string() });
                }
            }
        }
    }
    report.elapsed_ms = started.elapsed().as_millis() as u64;

    tracing::info!(
        path,
        scan = scan_type.label(),
        blocks = report.blocks_read,
        errors = report.error_count,
        "surface scan finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Cursor that fails every read starting inside one of the bad blocks.
    struct BadBlocks {
        inner: Cursor<Vec<u8>>,
        bad:   Vec<u64>,
    }

    impl Read for BadBlocks {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let block = self.inner.position() / BLOCK_SIZE as u64;
            if self.bad.contains(&block) {
                return Err(io::Error::new(io::ErrorKind::Other, "medium error"));
            }
            self.inner.read(buf)
        }
    }

    impl Seek for BadBlocks {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn quick_sampling_spans_the_device() {
        let blocks = sample_blocks(10_000, ScanType::Quick);
        assert_eq!(blocks.len(), 256);
        assert_eq!(blocks[0], 0);
        assert_eq!(*blocks.last().unwrap(), 9_999);
        assert!(blocks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn small_devices_are_read_whole() {
        assert_eq!(sample_blocks(3, ScanType::Quick), vec![0, 1, 2]);
        assert_eq!(sample_blocks(3, ScanType::Deep), vec![0, 1, 2]);
    }

    #[test]
    fn deep_scan_reads_partial_tail() {
        let size = 3 * BLOCK_SIZE as u64 + 10;
        let data = Cursor::new(vec![0u8; size as usize]);
        let r = scan_reader(data, "mem", size, ScanType::Deep).unwrap();
        assert_eq!(r.blocks_total, 4);
        assert_eq!(r.blocks_read, 4);
        assert_eq!(r.bytes_read, size);
        assert!(r.is_clean());
    }

    #[test]
    fn read_errors_are_recorded_with_offsets() {
        let size = 4 * BLOCK_SIZE as u64;
        let dev = BadBlocks { inner: Cursor::new(vec![0u8; size as usize]), bad: vec![1, 3] };
        let r = scan_reader(dev, "mem", size, ScanType::Deep).unwrap();
        assert_eq!(r.error_count, 2);
        assert_eq!(r.bytes_read, 2 * BLOCK_SIZE as u64);
        assert_eq!(r.errors[0].offset, BLOCK_SIZE as u64);
        assert_eq!(r.errors[1].offset, 3 * BLOCK_SIZE as u64);
    }

    #[test]
    fn reported_size_past_end_is_an_error_not_a_panic() {
        let data = Cursor::new(vec![0u8; BLOCK_SIZE]);
        let r = scan_reader(data, "mem", 2 * BLOCK_SIZE as u64, ScanType::Deep).unwrap();
        assert_eq!(r.error_count, 1);
    }

    #[test]
    fn zero_size_rejected() {
        let data = Cursor::new(Vec::new());
        assert!(matches!(
            scan_reader(data, "mem", 0, ScanType::Quick),
            Err(SmartError::InvalidParameter(_))
        ));
    }

    #[test]
    fn block_window_is_aligned_for_direct_io() {
        let mut backing = block_buffer();
        let block = aligned_block(&mut backing);
        assert_eq!(block.len(), BLOCK_SIZE);
        assert_eq!(block.as_ptr() as usize % DIRECT_ALIGN, 0);
    }

    #[test]
    fn short_reads_are_stitched_together() {
        /// Hands out at most 7 bytes per call.
        struct Trickle(Cursor<Vec<u8>>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = buf.len().min(7);
                self.0.read(&mut buf[..n])
            }
        }
        let mut r = Trickle(Cursor::new(vec![9u8; 100]));
        let mut buf = [0u8; 128];
        read_block(&mut r, &mut buf, 100).unwrap();
        assert!(buf[..100].iter().all(|&b| b == 9));
    }

    #[test]
    fn scan_of_a_regular_file_reads_the_unaligned_tail() {
        let path = std::env::temp_dir().join(format!("smart-surface-{}.img", std::process::id()));
        let size = 2 * BLOCK_SIZE as u64 + 100;
        std::fs::write(&path, vec![0x5Au8; size as usize]).unwrap();

        let r = scan(path.to_str().unwrap(), size, ScanType::Deep).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(r.is_clean(), "{:?}", r.errors);
        assert_eq!(r.blocks_read, 3);
        assert_eq!(r.bytes_read, size);
    }

    #[test]
    fn scan_type_parses() {
        assert_eq!("Deep".parse::<ScanType>(), Ok(ScanType::Deep));
        assert!("full".parse::<ScanType>().is_err());
    }
}
