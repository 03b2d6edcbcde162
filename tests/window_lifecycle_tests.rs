// Window lifecycle integration tests for marquee
//
// Drives the whole session against recording fakes: the complete
// open-configure-present-close run, and the resize path with its buffer
// swap, exactly as a compositor would sequence them.

use marquee::session::{WindowEvent, WindowSession};
use marquee::testing::{RecordingLink, RecordingRenderer, Request};

fn new_session() -> WindowSession<RecordingLink, RecordingRenderer> {
    WindowSession::new(
        RecordingLink::default(),
        RecordingRenderer::default(),
        1000,
        400,
    )
}

#[test]
fn full_session_from_connect_to_shutdown() {
    let mut session = new_session();

    // The surface must be committed once before any configure arrives.
    assert_eq!(session.link().requests, vec![Request::Commit]);
    assert!(!session.configured());

    // Compositor sends the first configure; the dispatch loop's first
    // phase ends once the session reports configured.
    session.handle(WindowEvent::Configure { serial: 1 });
    assert!(session.configured());
    assert!(session
        .link()
        .requests
        .contains(&Request::AckConfigure { serial: 1 }));

    // The driver presents the first frame at the default size.
    session.present_first_frame().unwrap();
    let requests = &session.link().requests;
    assert!(requests.contains(&Request::AllocateFrame {
        width: 1000,
        height: 400
    }));
    let attaches = requests
        .iter()
        .filter(|r| matches!(r, Request::Attach { .. }))
        .count();
    assert_eq!(attaches, 1, "exactly one attach for the first frame");
    assert_eq!(requests.last(), Some(&Request::Commit));

    // Close arrives; the run loop predicate must flip.
    session.handle(WindowEvent::CloseRequested);
    assert!(!session.running());

    // Teardown happens exactly once, children before parents.
    let link = session.teardown();
    let destroys: Vec<_> = link
        .requests
        .iter()
        .filter(|r| {
            matches!(
                r,
                Request::DestroyToplevel
                    | Request::DestroyShellSurface
                    | Request::DestroySurface
                    | Request::ReleaseBuffer { .. }
            )
        })
        .collect();
    assert_eq!(
        destroys,
        vec![
            &Request::DestroyToplevel,
            &Request::DestroyShellSurface,
            &Request::DestroySurface,
            &Request::ReleaseBuffer { buffer: 0 },
        ]
    );
}

#[test]
fn resize_reallocates_rerenders_and_recommits() {
    let mut session = new_session();
    session.handle(WindowEvent::Configure { serial: 1 });
    session.present_first_frame().unwrap();
    let before = session.link().requests.len();

    // Compositor proposes a new size, then configures again.
    session.handle(WindowEvent::Resize {
        width: 1200,
        height: 600,
    });
    session.handle(WindowEvent::Configure { serial: 2 });

    let tail = &session.link().requests[before..];
    assert_eq!(
        tail,
        &[
            Request::AllocateFrame {
                width: 1200,
                height: 600
            },
            Request::Attach { buffer: 1 },
            Request::Commit,
            Request::ReleaseBuffer { buffer: 0 },
            Request::AckConfigure { serial: 2 },
            Request::Commit,
        ]
    );

    // The renderer saw exactly the new dimensions; 1200 * 4 stride.
    assert_eq!(session.renderer().calls.last(), Some(&(1200, 600, 4800)));
}

#[test]
fn drag_request_uses_the_triggering_serial() {
    let mut session = new_session();
    session.handle(WindowEvent::Configure { serial: 1 });
    session.present_first_frame().unwrap();

    session.handle(WindowEvent::PointerPressed { serial: 4242 });
    assert_eq!(
        session.link().requests.last(),
        Some(&Request::BeginMove { serial: 4242 })
    );
}
