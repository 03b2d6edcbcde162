//! Shared memory frame storage.
//!
//! A frame's memory goes through two phases. [`ShmMapping::allocate`]
//! creates an anonymous descriptor, sizes it for one ARGB frame and maps
//! it read/write into this process. Once the compositor has carved its
//! `wl_buffer` from the descriptor, [`ShmMapping::seal`] closes it and
//! hands back a [`SealedMapping`]: the compositor keeps its own reference
//! to the memory, we keep only the mapping for rendering.
//!
//! The region is never reachable through a filesystem path: `memfd_create`
//! where available, otherwise a temp file unlinked before first use.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, FromRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use memmap2::MmapMut;
use thiserror::Error;

/// Bytes per pixel of the fixed ARGB8888 format.
pub const BYTES_PER_PIXEL: usize = 4;

/// Creating or mapping a shared memory region failed.
#[derive(Debug, Error)]
#[error("shared memory allocation of {size} bytes failed: {source}")]
pub struct AllocationError {
    /// Requested region size in bytes.
    pub size: usize,
    #[source]
    source: io::Error,
}

impl AllocationError {
    pub(crate) fn new(size: usize, source: io::Error) -> Self {
        Self { size, source }
    }
}

/// A freshly allocated frame region: mapped, descriptor still open.
pub struct ShmMapping {
    file: File,
    map: MmapMut,
    width: i32,
    height: i32,
    stride: i32,
}

/// A frame region after the compositor holds its own reference.
///
/// The descriptor is closed; only the process-local mapping remains, and
/// it stays valid until the value is dropped.
pub struct SealedMapping {
    map: MmapMut,
    width: i32,
    height: i32,
    stride: i32,
}

impl ShmMapping {
    /// Create and map an anonymous region for a `width` x `height` ARGB frame.
    ///
    /// Stride is `width * 4`; total size is `stride * height` and must fit
    /// the protocol's signed 32-bit size fields.
    pub fn allocate(width: i32, height: i32) -> Result<Self, AllocationError> {
        if width <= 0 || height <= 0 {
            return Err(AllocationError::new(
                0,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid frame size {width}x{height}"),
                ),
            ));
        }

        let stride_bytes = width as usize * BYTES_PER_PIXEL;
        let size = stride_bytes * height as usize;
        if size > i32::MAX as usize {
            return Err(AllocationError::new(
                size,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{width}x{height} frame exceeds protocol size limit"),
                ),
            ));
        }

        let file =
            create_anonymous_file(size).map_err(|source| AllocationError::new(size, source))?;
        let map =
            unsafe { MmapMut::map_mut(&file) }.map_err(|source| AllocationError::new(size, source))?;

        debug!("allocated {size} B shm region for {width}x{height}");

        Ok(Self {
            file,
            map,
            width,
            height,
            stride: stride_bytes as i32,
        })
    }

    /// Descriptor to hand to the compositor.
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }

    /// Close the descriptor once the compositor's buffer object exists.
    pub fn seal(self) -> SealedMapping {
        SealedMapping {
            map: self.map,
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn stride(&self) -> i32 {
        self.stride
    }

    /// Total size in bytes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl SealedMapping {
    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn stride(&self) -> i32 {
        self.stride
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl AsRef<[u8]> for SealedMapping {
    fn as_ref(&self) -> &[u8] {
        &self.map
    }
}

impl AsMut<[u8]> for SealedMapping {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

static TEMP_SERIAL: AtomicU64 = AtomicU64::new(0);

/// An anonymous descriptor the compositor can map but no other process can
/// reach through the filesystem.
fn create_anonymous_file(size: usize) -> io::Result<File> {
    let file = match memfd() {
        Ok(file) => file,
        Err(e) => {
            debug!("memfd_create unavailable ({e}); using an unlinked temp file");
            unlinked_temp_file()?
        }
    };
    file.set_len(size as u64)?;
    Ok(file)
}

fn memfd() -> io::Result<File> {
    let fd = unsafe {
        libc::syscall(
            libc::SYS_memfd_create,
            c"marquee-frame".as_ptr(),
            libc::MFD_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { File::from_raw_fd(fd as RawFd) })
}

fn unlinked_temp_file() -> io::Result<File> {
    let path = std::env::temp_dir().join(format!(
        "marquee-shm-{}-{}",
        std::process::id(),
        TEMP_SERIAL.fetch_add(1, Ordering::Relaxed)
    ));
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "temp path contains NUL"))?;

    let fd = unsafe {
        libc::open(
            c_path.as_ptr(),
            libc::O_CREAT | libc::O_RDWR | libc::O_EXCL | libc::O_CLOEXEC,
            0o600,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let file = unsafe { File::from_raw_fd(fd) };

    // Unlink before anything is written so the content never has a path.
    if unsafe { libc::unlink(c_path.as_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_non_positive_dimensions() {
        assert!(ShmMapping::allocate(0, 32).is_err());
        assert!(ShmMapping::allocate(64, 0).is_err());
        assert!(ShmMapping::allocate(-1, -1).is_err());
    }

    #[test]
    fn region_starts_zeroed() {
        let mapping = ShmMapping::allocate(16, 16).unwrap();
        let sealed = mapping.seal();
        assert!(sealed.as_ref().iter().all(|&b| b == 0));
    }

    #[test]
    fn sealed_mapping_stays_writable() {
        let mapping = ShmMapping::allocate(8, 4).unwrap();
        let mut sealed = mapping.seal();
        sealed.as_mut().fill(0x5a);
        assert!(sealed.as_ref().iter().all(|&b| b == 0x5a));
    }

    #[test]
    fn descriptor_is_shareable_before_seal() {
        use std::os::fd::AsRawFd;
        let mapping = ShmMapping::allocate(4, 4).unwrap();
        assert!(mapping.fd().as_raw_fd() >= 0);
    }

    #[test]
    fn resize_target_dimensions_compute_exactly() {
        let mapping = ShmMapping::allocate(1200, 600).unwrap();
        assert_eq!(mapping.stride(), 4800);
        assert_eq!(mapping.len(), 2_880_000);
    }

    #[test]
    fn fallback_temp_file_has_no_path() {
        let file = unlinked_temp_file().unwrap();
        file.set_len(128).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 128);
    }

    proptest! {
        #[test]
        fn mapping_matches_requested_dimensions(width in 1i32..=96, height in 1i32..=96) {
            let mapping = ShmMapping::allocate(width, height).unwrap();
            prop_assert_eq!(mapping.stride(), width * 4);
            prop_assert_eq!(mapping.len(), width as usize * height as usize * 4);
            let sealed = mapping.seal();
            prop_assert_eq!(sealed.len(), width as usize * height as usize * 4);
        }
    }
}
