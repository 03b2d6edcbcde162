//! Top-level window lifecycle.
//!
//! The compositor drives us with configure, close and input events;
//! everything it sends is funneled into [`WindowEvent`] and applied by
//! [`WindowSession::handle`], one transition at a time. Requests flow the
//! other way through [`DisplayLink`], which hides whether the peer is a
//! live compositor or a recording fake in tests.
//!
//! Ordering rules the session upholds:
//! - a configure is acknowledged before any commit that follows it;
//! - the first buffer is attached only after the first configure round
//!   trip completed;
//! - a replacement buffer is attached and committed before the old buffer
//!   object is released, so a failed allocation leaves the previous frame
//!   on screen;
//! - teardown destroys children before parents, buffer last.

use log::{debug, warn};

use crate::render::Renderer;
use crate::shm::AllocationError;

/// One displayable frame: the server-side buffer object plus the writable
/// pixels behind it.
pub struct Frame<B, P> {
    /// Server-side buffer object, used for attach and release.
    pub handle: B,
    /// Mapped bytes the renderer draws into.
    pub pixels: P,
    pub width: i32,
    pub height: i32,
    pub stride: i32,
}

/// The frame type a given link produces.
pub type LinkFrame<L> =
    Frame<<L as DisplayLink>::BufferHandle, <L as DisplayLink>::PixelRegion>;

/// Server-bound requests the window session issues.
///
/// The live implementation speaks to real protocol objects in
/// [`crate::wayland`]; tests use [`crate::testing::RecordingLink`].
pub trait DisplayLink {
    /// Server-side buffer object handle.
    type BufferHandle;
    /// Writable pixel storage backing one frame.
    type PixelRegion: AsMut<[u8]>;

    /// Acknowledge a shell-surface configure event by serial.
    fn ack_configure(&mut self, serial: u32);
    /// Apply pending surface state.
    fn commit(&mut self);
    /// Allocate one frame: shared memory plus the server-side buffer over it.
    fn allocate_frame(&mut self, width: i32, height: i32)
        -> Result<LinkFrame<Self>, AllocationError>;
    /// Attach a frame's buffer to the surface at offset (0, 0).
    fn attach(&mut self, handle: &Self::BufferHandle);
    /// Destroy a server-side buffer object.
    fn release_buffer(&mut self, handle: Self::BufferHandle);
    /// Start a compositor-driven interactive move, authorized by the input
    /// event `serial`.
    fn begin_move(&mut self, serial: u32);
    fn destroy_toplevel(&mut self);
    fn destroy_shell_surface(&mut self);
    fn destroy_surface(&mut self);
}

/// Compositor-to-client events that drive the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// Shell-surface configure; must be acknowledged before the next commit.
    Configure { serial: u32 },
    /// Top-level configure proposing a size. Non-positive means the client
    /// picks its own.
    Resize { width: i32, height: i32 },
    /// The user asked for the window to close.
    CloseRequested,
    /// Primary pointer button went down; the serial authorizes a move.
    PointerPressed { serial: u32 },
}

/// Owned state of the single top-level window.
pub struct WindowSession<L: DisplayLink, R: Renderer> {
    link: L,
    renderer: R,
    width: i32,
    height: i32,
    configured: bool,
    running: bool,
    frame: Option<LinkFrame<L>>,
}

impl<L: DisplayLink, R: Renderer> WindowSession<L, R> {
    /// Set up the session and issue the initial empty commit: the
    /// compositor only configures surfaces that have been committed at
    /// least once.
    pub fn new(link: L, renderer: R, width: i32, height: i32) -> Self {
        let mut session = Self {
            link,
            renderer,
            width,
            height,
            configured: false,
            running: true,
            frame: None,
        };
        session.link.commit();
        session
    }

    /// True once the first configure has been acknowledged.
    pub fn configured(&self) -> bool {
        self.configured
    }

    /// False once the compositor asked us to close.
    pub fn running(&self) -> bool {
        self.running
    }

    /// Current target dimensions.
    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Apply one compositor event.
    pub fn handle(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::Configure { serial } => {
                self.link.ack_configure(serial);
                if self.configured && self.frame.is_some() {
                    // The acknowledgement only reaches the compositor with
                    // a commit; the attached buffer is unchanged.
                    self.link.commit();
                }
                self.configured = true;
            }
            WindowEvent::Resize { width, height } => {
                if width <= 0 || height <= 0 {
                    debug!("ignoring configure without a usable size ({width}x{height})");
                    return;
                }
                self.width = width;
                self.height = height;
                if self.frame.is_some() {
                    if let Err(e) = self.present() {
                        warn!("dropping resize to {width}x{height}: {e}");
                    }
                }
            }
            WindowEvent::CloseRequested => {
                debug!("close requested");
                self.running = false;
            }
            WindowEvent::PointerPressed { serial } => {
                self.link.begin_move(serial);
            }
        }
    }

    /// Allocate, render, attach and commit the first frame.
    ///
    /// Only called once the dispatch loop has seen the first configure.
    /// Unlike resizes, a failure here is fatal: there is nothing on screen
    /// to fall back to.
    pub fn present_first_frame(&mut self) -> Result<(), AllocationError> {
        self.present()
    }

    /// Render the current target size into a fresh frame and hand it to
    /// the compositor. The previous buffer object is released only after
    /// the replacement is attached and committed.
    fn present(&mut self) -> Result<(), AllocationError> {
        let mut frame = self.link.allocate_frame(self.width, self.height)?;
        self.renderer
            .render(frame.pixels.as_mut(), frame.width, frame.height, frame.stride);
        self.link.attach(&frame.handle);
        self.link.commit();
        if let Some(previous) = self.frame.replace(frame) {
            self.link.release_buffer(previous.handle);
        }
        debug!("presented {}x{} frame", self.width, self.height);
        Ok(())
    }

    /// Tear the window down in dependency order: top-level, shell surface,
    /// surface, then the last buffer object.
    pub fn teardown(mut self) -> L {
        self.link.destroy_toplevel();
        self.link.destroy_shell_surface();
        self.link.destroy_surface();
        if let Some(frame) = self.frame.take() {
            self.link.release_buffer(frame.handle);
        }
        self.link
    }
}
