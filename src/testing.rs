//! Recording test doubles for the protocol seam.
//!
//! Protocol correctness here is mostly about request ordering, so the
//! fakes record every request verbatim; tests assert on the transcript.

use std::io;

use crate::render::Renderer;
use crate::session::{DisplayLink, Frame, LinkFrame};
use crate::shm::AllocationError;

/// One request a [`RecordingLink`] has seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    AckConfigure { serial: u32 },
    Commit,
    AllocateFrame { width: i32, height: i32 },
    Attach { buffer: u32 },
    ReleaseBuffer { buffer: u32 },
    BeginMove { serial: u32 },
    DestroyToplevel,
    DestroyShellSurface,
    DestroySurface,
}

/// Fake display link that records requests instead of sending them.
///
/// Buffer handles are sequential ids; pixel regions are plain vectors.
#[derive(Default)]
pub struct RecordingLink {
    pub requests: Vec<Request>,
    /// When set, the next allocation fails and the flag clears.
    pub fail_next_allocation: bool,
    next_buffer: u32,
}

impl DisplayLink for RecordingLink {
    type BufferHandle = u32;
    type PixelRegion = Vec<u8>;

    fn ack_configure(&mut self, serial: u32) {
        self.requests.push(Request::AckConfigure { serial });
    }

    fn commit(&mut self) {
        self.requests.push(Request::Commit);
    }

    fn allocate_frame(
        &mut self,
        width: i32,
        height: i32,
    ) -> Result<LinkFrame<Self>, AllocationError> {
        if self.fail_next_allocation {
            self.fail_next_allocation = false;
            return Err(AllocationError::new(
                width as usize * height as usize * 4,
                io::Error::new(io::ErrorKind::OutOfMemory, "allocation refused by test"),
            ));
        }
        self.requests.push(Request::AllocateFrame { width, height });
        let stride = width * 4;
        let handle = self.next_buffer;
        self.next_buffer += 1;
        Ok(Frame {
            handle,
            pixels: vec![0; (stride * height) as usize],
            width,
            height,
            stride,
        })
    }

    fn attach(&mut self, handle: &u32) {
        self.requests.push(Request::Attach { buffer: *handle });
    }

    fn release_buffer(&mut self, handle: u32) {
        self.requests.push(Request::ReleaseBuffer { buffer: handle });
    }

    fn begin_move(&mut self, serial: u32) {
        self.requests.push(Request::BeginMove { serial });
    }

    fn destroy_toplevel(&mut self) {
        self.requests.push(Request::DestroyToplevel);
    }

    fn destroy_shell_surface(&mut self) {
        self.requests.push(Request::DestroyShellSurface);
    }

    fn destroy_surface(&mut self) {
        self.requests.push(Request::DestroySurface);
    }
}

/// Renderer fake that records the dimensions it was asked to fill.
#[derive(Default)]
pub struct RecordingRenderer {
    /// (width, height, stride) per call.
    pub calls: Vec<(i32, i32, i32)>,
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, pixels: &mut [u8], width: i32, height: i32, stride: i32) {
        self.calls.push((width, height, stride));
        pixels.fill(0xab);
    }
}
