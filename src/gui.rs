//! A minimal preview GUI.
//!
//! [`run`] takes over the main thread to drive the window event loop and runs the application on a
//! background thread. Frames are shown with [`show_image`]. Pressing `q` or closing a window sets a
//! flag that the application polls with [`quit_requested`].

mod renderer;

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    thread,
};

use anyhow::anyhow;
use once_cell::sync::OnceCell;
use winit::{
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy},
    window::WindowId,
};

use crate::{
    image::{Image, Resolution},
    termination::Termination,
};

use self::renderer::{Gpu, Renderer, Window};

static PROXY: OnceCell<Mutex<EventLoopProxy<Msg>>> = OnceCell::new();
static QUIT: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
enum Msg {
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

struct Gui {
    gpu: Rc<Gpu>,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
}

impl Gui {
    fn new() -> anyhow::Result<Self> {
        Ok(Self {
            gpu: Rc::new(pollster::block_on(Gpu::open())?),
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
        })
    }

    fn show(
        &mut self,
        target: &winit::event_loop::EventLoopWindowTarget<Msg>,
        key: String,
        res: Resolution,
        data: &[u8],
    ) -> anyhow::Result<()> {
        if !self.windows.contains_key(&key) {
            log::debug!("creating window for image '{key}' at {res}");
            let win = Window::open(target, &key, res)?;
            self.win_id_to_key.insert(win.id(), key.clone());
            let renderer = Renderer::new(win, self.gpu.clone())?;
            self.windows.insert(key.clone(), renderer);
        }

        if let Some(renderer) = self.windows.get_mut(&key) {
            renderer.update_texture(res, data);
            renderer.window().request_redraw();
        }
        Ok(())
    }

    fn redraw(&mut self, window: WindowId) -> anyhow::Result<()> {
        let renderer = self
            .win_id_to_key
            .get(&window)
            .and_then(|key| self.windows.get_mut(key));
        match renderer {
            Some(renderer) => renderer.redraw(),
            None => Ok(()),
        }
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(Msg::Image { key, res, data }) => {
                    if let Err(e) = self.show(target, key, res, &data) {
                        log::error!("failed to display image: {:#}", e);
                    }
                }
                Event::RedrawRequested(window) => {
                    if let Err(e) = self.redraw(window) {
                        log::error!("failed to redraw window: {:#}", e);
                    }
                }
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested
                    | WindowEvent::KeyboardInput {
                        input:
                            KeyboardInput {
                                state: ElementState::Pressed,
                                virtual_keycode: Some(VirtualKeyCode::Q),
                                ..
                            },
                        ..
                    } => {
                        log::debug!("quit requested");
                        QUIT.store(true, Ordering::Relaxed);
                    }
                    _ => {}
                },
                _ => {}
            }
        });
    }
}

fn send(msg: Msg) -> anyhow::Result<()> {
    let proxy = PROXY
        .get()
        .ok_or_else(|| anyhow!("GUI is not running (`gui::run` must be called first)"))?;
    let proxy = proxy.lock().unwrap_or_else(|poison| poison.into_inner());
    proxy
        .send_event(msg)
        .map_err(|_closed| anyhow!("GUI event loop has exited"))
}

/// Runs `cb` on a background thread while the main thread handles windows.
///
/// Never returns: the process exits when `cb` returns, with a status indicating whether it was
/// successful. Errors are reported via [`std::process::Termination::report`].
///
/// # Panics
///
/// Panics when called more than once, or from a thread other than the main thread on platforms
/// that require the event loop to be created there.
pub fn run<F, R>(cb: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination + Send,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    if PROXY.set(Mutex::new(event_loop.create_proxy())).is_err() {
        panic!("`gui::run` called twice");
    }

    // Set up before `cb` runs, so exiting here never skips its destructors.
    let gui = match Gui::new() {
        Ok(gui) => gui,
        Err(e) => {
            log::error!("failed to initialize GUI: {:#}", e);
            process::exit(1);
        }
    };

    thread::spawn(move || process::exit(exit_code(catch_unwind(AssertUnwindSafe(cb)))));

    gui.run(event_loop)
}

/// Picks the process exit status for the outcome of the application thread, reporting errors.
fn exit_code<R: Termination>(result: thread::Result<R>) -> i32 {
    match result {
        Ok(r) if r.is_success() => 0,
        Ok(r) => {
            r.report();
            1
        }
        // The panic hook already printed the message; 101 matches libstd.
        Err(_payload) => 101,
    }
}

/// Displays an image in the window identified by `key`, creating the window when needed.
pub fn show_image(key: impl Into<String>, image: &Image) -> anyhow::Result<()> {
    send(Msg::Image {
        key: key.into(),
        res: image.resolution(),
        data: image.data().to_vec(),
    })
}

/// Returns whether the user has asked to quit, by pressing `q` or closing a window.
pub fn quit_requested() -> bool {
    QUIT.load(Ordering::Relaxed)
}
