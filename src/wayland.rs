//! Wayland wiring: registry binding, the live [`DisplayLink`] and the
//! two-phase dispatch loop.
//!
//! Protocol events land in the [`Dispatch`] impls below, get translated
//! into [`WindowEvent`] values and are applied by the session; no window
//! logic lives in the callbacks themselves.

use log::{debug, info, trace, warn};
use wayland_client::globals::{registry_queue_init, GlobalList, GlobalListContents};
use wayland_client::protocol::{
    wl_buffer::{self, WlBuffer},
    wl_compositor::WlCompositor,
    wl_pointer::{self, WlPointer},
    wl_registry::WlRegistry,
    wl_seat::{self, WlSeat},
    wl_shm::{self, WlShm},
    wl_shm_pool::WlShmPool,
    wl_surface::WlSurface,
};
use wayland_client::{Connection, Dispatch, QueueHandle, WEnum};
use wayland_protocols::xdg::decoration::zv1::client::{
    zxdg_decoration_manager_v1::ZxdgDecorationManagerV1,
    zxdg_toplevel_decoration_v1::{self, ZxdgToplevelDecorationV1},
};
use wayland_protocols::xdg::shell::client::{
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::{self, XdgToplevel},
    xdg_wm_base::{self, XdgWmBase},
};

use crate::config::MarqueeConfig;
use crate::error::MarqueeError;
use crate::render::LabelRenderer;
use crate::session::{DisplayLink, Frame, LinkFrame, WindowEvent, WindowSession};
use crate::shm::{AllocationError, SealedMapping, ShmMapping};

/// Linux input-event code for the primary (left) mouse button.
const BTN_LEFT: u32 = 0x110;

/// The compositor services we bind from the registry.
struct Globals {
    shm: WlShm,
    compositor: WlCompositor,
    wm_base: XdgWmBase,
    seat: Option<WlSeat>,
    decoration_manager: Option<ZxdgDecorationManagerV1>,
}

impl Globals {
    /// Bind every interface we use from an already-enumerated registry.
    ///
    /// The seat's event handler is in place from the moment it is bound,
    /// before the dispatch loop starts, so capability advertisements are
    /// never missed. Globals appearing or disappearing later are out of
    /// scope.
    fn bind(globals: &GlobalList, qh: &QueueHandle<WaylandApp>) -> Result<Self, MarqueeError> {
        debug!(
            "registry offers {} globals",
            globals.contents().with_list(|list| list.len())
        );

        let shm = globals
            .bind(qh, 1..=1, ())
            .map_err(|_| MarqueeError::MissingGlobal("wl_shm"))?;
        let compositor = globals
            .bind(qh, 1..=1, ())
            .map_err(|_| MarqueeError::MissingGlobal("wl_compositor"))?;
        let wm_base = globals
            .bind(qh, 1..=1, ())
            .map_err(|_| MarqueeError::MissingGlobal("xdg_wm_base"))?;

        let seat: Option<WlSeat> = globals.bind(qh, 1..=1, ()).ok();
        if seat.is_none() {
            debug!("no wl_seat; the window will not be draggable");
        }
        let decoration_manager: Option<ZxdgDecorationManagerV1> =
            globals.bind(qh, 1..=1, ()).ok();

        Ok(Self {
            shm,
            compositor,
            wm_base,
            seat,
            decoration_manager,
        })
    }
}

/// Live [`DisplayLink`] speaking to the compositor through real proxies.
pub struct WaylandLink {
    qh: QueueHandle<WaylandApp>,
    shm: WlShm,
    surface: WlSurface,
    xdg_surface: XdgSurface,
    toplevel: XdgToplevel,
    seat: Option<WlSeat>,
}

impl DisplayLink for WaylandLink {
    type BufferHandle = WlBuffer;
    type PixelRegion = SealedMapping;

    fn ack_configure(&mut self, serial: u32) {
        self.xdg_surface.ack_configure(serial);
    }

    fn commit(&mut self) {
        self.surface.commit();
    }

    fn allocate_frame(
        &mut self,
        width: i32,
        height: i32,
    ) -> Result<LinkFrame<Self>, AllocationError> {
        let mapping = ShmMapping::allocate(width, height)?;
        let stride = mapping.stride();

        // One short-lived pool per buffer; once the buffer object is
        // carved out, the compositor holds its own reference to the
        // memory and neither the pool nor our descriptor is needed.
        let pool = self
            .shm
            .create_pool(mapping.fd(), mapping.len() as i32, &self.qh, ());
        let handle = pool.create_buffer(
            0,
            width,
            height,
            stride,
            wl_shm::Format::Argb8888,
            &self.qh,
            (),
        );
        pool.destroy();

        Ok(Frame {
            handle,
            pixels: mapping.seal(),
            width,
            height,
            stride,
        })
    }

    fn attach(&mut self, handle: &WlBuffer) {
        self.surface.attach(Some(handle), 0, 0);
    }

    fn release_buffer(&mut self, handle: WlBuffer) {
        handle.destroy();
    }

    fn begin_move(&mut self, serial: u32) {
        if let Some(seat) = &self.seat {
            self.toplevel._move(seat, serial);
        }
    }

    fn destroy_toplevel(&mut self) {
        self.toplevel.destroy();
    }

    fn destroy_shell_surface(&mut self) {
        self.xdg_surface.destroy();
    }

    fn destroy_surface(&mut self) {
        self.surface.destroy();
    }
}

/// Client state driven by the event queue: the window session plus the
/// few proxies that outlive individual events.
pub struct WaylandApp {
    session: WindowSession<WaylandLink, LabelRenderer>,
    pointer: Option<WlPointer>,
    decoration: Option<ZxdgToplevelDecorationV1>,
}

/// Connect, bind globals, create the window and run until it is closed.
pub fn run(config: &MarqueeConfig) -> Result<(), MarqueeError> {
    let conn = Connection::connect_to_env()?;
    let (registry_globals, mut queue) = registry_queue_init::<WaylandApp>(&conn)?;
    let qh = queue.handle();

    let globals = Globals::bind(&registry_globals, &qh)?;
    info!("🔌 Connected to the compositor");

    let surface = globals.compositor.create_surface(&qh, ());
    let xdg_surface = globals.wm_base.get_xdg_surface(&surface, &qh, ());
    let toplevel = xdg_surface.get_toplevel(&qh, ());
    toplevel.set_title(config.window.title.clone());
    toplevel.set_app_id(config.window.app_id.clone());

    let decoration = match &globals.decoration_manager {
        Some(manager) if config.window.server_side_decorations => {
            let decoration = manager.get_toplevel_decoration(&toplevel, &qh, ());
            decoration.set_mode(zxdg_toplevel_decoration_v1::Mode::ServerSide);
            Some(decoration)
        }
        Some(_) => {
            debug!("server-side decorations disabled by configuration");
            None
        }
        None => {
            debug!("compositor offers no decoration manager");
            None
        }
    };

    let link = WaylandLink {
        qh: qh.clone(),
        shm: globals.shm.clone(),
        surface,
        xdg_surface,
        toplevel,
        seat: globals.seat.clone(),
    };
    let renderer = LabelRenderer::from_config(&config.label)?;
    let session = WindowSession::new(link, renderer, config.window.width, config.window.height);
    let mut app = WaylandApp {
        session,
        pointer: None,
        decoration,
    };

    // Phase 1: block until the compositor has configured the surface.
    while !app.session.configured() {
        queue.blocking_dispatch(&mut app)?;
    }

    // The first frame exists only once the handshake is done; failing to
    // allocate it is fatal, there is nothing on screen to fall back to.
    app.session.present_first_frame()?;
    let (width, height) = app.session.size();
    info!("🖼️ First frame presented at {width}x{height}");

    // Phase 2: run until the compositor asks us to close.
    while app.session.running() {
        queue.blocking_dispatch(&mut app)?;
    }

    if let Some(decoration) = app.decoration.take() {
        decoration.destroy();
    }
    app.session.teardown();
    info!("👋 Window closed");
    Ok(())
}

impl Dispatch<WlRegistry, GlobalListContents> for WaylandApp {
    fn event(
        _state: &mut Self,
        _proxy: &WlRegistry,
        _event: wayland_client::protocol::wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Globals are resolved once at startup; hot-plug is out of scope.
    }
}

impl Dispatch<WlCompositor, ()> for WaylandApp {
    fn event(
        _state: &mut Self,
        _proxy: &WlCompositor,
        _event: <WlCompositor as wayland_client::Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // wl_compositor has no events.
    }
}

impl Dispatch<WlSurface, ()> for WaylandApp {
    fn event(
        _state: &mut Self,
        _proxy: &WlSurface,
        _event: <WlSurface as wayland_client::Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Output enter/leave is irrelevant for a single surface.
    }
}

impl Dispatch<WlShm, ()> for WaylandApp {
    fn event(
        _state: &mut Self,
        _proxy: &WlShm,
        event: wl_shm::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_shm::Event::Format { format } = event {
            trace!("compositor supports shm format {format:?}");
        }
    }
}

impl Dispatch<WlShmPool, ()> for WaylandApp {
    fn event(
        _state: &mut Self,
        _proxy: &WlShmPool,
        _event: <WlShmPool as wayland_client::Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // wl_shm_pool has no events.
    }
}

impl Dispatch<WlBuffer, ()> for WaylandApp {
    fn event(
        _state: &mut Self,
        _proxy: &WlBuffer,
        event: wl_buffer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Buffers are only retired when a resize replaces them, so the
        // release notification needs no bookkeeping.
        if let wl_buffer::Event::Release = event {
            trace!("buffer released by compositor");
        }
    }
}

impl Dispatch<XdgWmBase, ()> for WaylandApp {
    fn event(
        _state: &mut Self,
        wm_base: &XdgWmBase,
        event: xdg_wm_base::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Liveness check; answer immediately or get disconnected.
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<XdgSurface, ()> for WaylandApp {
    fn event(
        state: &mut Self,
        _proxy: &XdgSurface,
        event: xdg_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            state.session.handle(WindowEvent::Configure { serial });
        }
    }
}

impl Dispatch<XdgToplevel, ()> for WaylandApp {
    fn event(
        state: &mut Self,
        _proxy: &XdgToplevel,
        event: xdg_toplevel::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                state.session.handle(WindowEvent::Resize { width, height });
            }
            xdg_toplevel::Event::Close => {
                state.session.handle(WindowEvent::CloseRequested);
            }
            _ => {}
        }
    }
}

impl Dispatch<WlSeat, ()> for WaylandApp {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(capabilities),
        } = event
        {
            if capabilities.contains(wl_seat::Capability::Pointer) && state.pointer.is_none() {
                debug!("seat advertises a pointer; binding it for window moves");
                state.pointer = Some(seat.get_pointer(qh, ()));
            }
        }
    }
}

impl Dispatch<WlPointer, ()> for WaylandApp {
    fn event(
        state: &mut Self,
        _proxy: &WlPointer,
        event: wl_pointer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Enter, leave, motion and axis carry no meaning for this window.
        if let wl_pointer::Event::Button {
            serial,
            button,
            state: WEnum::Value(wl_pointer::ButtonState::Pressed),
            ..
        } = event
        {
            if button == BTN_LEFT {
                state.session.handle(WindowEvent::PointerPressed { serial });
            }
        }
    }
}

impl Dispatch<ZxdgDecorationManagerV1, ()> for WaylandApp {
    fn event(
        _state: &mut Self,
        _proxy: &ZxdgDecorationManagerV1,
        _event: <ZxdgDecorationManagerV1 as wayland_client::Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // zxdg_decoration_manager_v1 has no events.
    }
}

impl Dispatch<ZxdgToplevelDecorationV1, ()> for WaylandApp {
    fn event(
        _state: &mut Self,
        _proxy: &ZxdgToplevelDecorationV1,
        event: zxdg_toplevel_decoration_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let zxdg_toplevel_decoration_v1::Event::Configure { mode } = event {
            match mode {
                WEnum::Value(mode) => debug!("decoration mode set to {mode:?}"),
                WEnum::Unknown(raw) => warn!("unknown decoration mode {raw}"),
            }
        }
    }
}
