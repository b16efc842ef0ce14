// ── winws-demo ───────────────────────────────────────────────────────────────
// A root window that paints a gradient with a pulsing marker, plus a popup
// menu opened with the right button.  The menu grabs input: clicking anywhere
// on the root while it is open reaches the menu, which closes itself.
#![deny(unsafe_code)]

// Release builds run as a GUI application (no console window).
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use winws::{
    Color, Display, DisplayConfig, Event, EventCode, EventHandler, EventKind, GrabGroup,
    MouseButton, MousePointer, Rect, Result, WindowShell,
};

const FRAME_MS: u64 = 40;

struct Root {
    display: Display,
    shell: RefCell<Option<Rc<WindowShell>>>,
    menu: RefCell<Option<Rc<WindowShell>>>,
    phase: Cell<f32>,
}

struct Menu {
    shell: RefCell<Option<Rc<WindowShell>>>,
}

impl Root {
    fn shell(&self) -> Option<Rc<WindowShell>> {
        self.shell.borrow().clone()
    }

    fn redraw(&self) {
        let Some(shell) = self.shell() else { return };
        let (w, h) = (shell.width() as f32, shell.height() as f32);
        let mut bg = self.display.create_linear_gradient(0.0, 0.0, 0.0, h);
        bg.add_color(0.0, Color::from_rgb24(0x20_3a_5c));
        bg.add_color(1.0, Color::from_rgb24(0x0b_12_1c));
        let pulse = 0.5 + 0.5 * self.phase.get().sin();

        shell.with_surface(|s| {
            s.begin_frame();
            s.fill_rect(&bg, 0.0, 0.0, w, h);
            s.fill_circle(
                Color::from_argb32(0xff_f0_a0_30),
                w / 2.0,
                h / 2.0,
                12.0 + 24.0 * pulse,
            );
            s.end_frame();
        });
    }

    fn open_menu(&self, left: i32, top: i32) {
        let menu = self.menu.borrow().clone();
        let Some(menu) = menu else { return };
        let result = menu
            .set_geometry(Rect::new(left, top, 120, 80))
            .and_then(|_| menu.show())
            .and_then(|_| menu.grab_events(GrabGroup::Menu));
        if let Err(e) = result {
            log::warn!("demo: menu unavailable: {e}");
        }
    }

    fn schedule(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let at = self.display.now() + FRAME_MS;
        let submitted = self.display.submit_task(at, move |_sched, _now| {
            if let Some(root) = weak.upgrade() {
                root.phase.set(root.phase.get() + 0.15);
                root.redraw();
                root.schedule();
            }
            Ok(())
        });
        if let Err(e) = submitted {
            log::error!("demo: animation stopped: {e}");
        }
    }
}

impl EventHandler for Root {
    fn handle_event(&self, event: &Event) {
        match (event.kind, event.code) {
            (EventKind::Show | EventKind::Resize | EventKind::Redraw, _) => self.redraw(),
            (EventKind::MouseDown, EventCode::Button(MouseButton::Right)) => {
                self.open_menu(event.left, event.top)
            }
            (EventKind::Close, _) => {
                if let Some(shell) = self.shell() {
                    shell.destroy();
                }
            }
            _ => {}
        }
    }
}

impl EventHandler for Menu {
    fn handle_event(&self, event: &Event) {
        let Some(shell) = self.shell.borrow().clone() else {
            return;
        };
        match event.kind {
            EventKind::Show | EventKind::Redraw => {
                let (w, h) = (shell.width() as f32, shell.height() as f32);
                shell.with_surface(|s| {
                    s.begin_frame();
                    s.clear_rgb(0xee_ee_ee);
                    s.wire_rect(Color::from_rgb24(0x44_44_44), 0.5, 0.5, w - 1.0, h - 1.0, 1.0);
                    s.end_frame();
                });
            }
            EventKind::MouseClick => {
                log::info!("demo: menu clicked at ({}, {})", event.left, event.top);
                if let Err(e) = shell.hide() {
                    log::warn!("demo: {e}");
                }
            }
            _ => {}
        }
    }
}

fn run() -> Result<()> {
    let display = Display::open(DisplayConfig::load_or_default())?;

    let root = Rc::new(Root {
        display: display.clone(),
        shell: RefCell::new(None),
        menu: RefCell::new(None),
        phase: Cell::new(0.0),
    });
    let root_handler: Weak<dyn EventHandler> = Rc::downgrade(&root) as Weak<dyn EventHandler>;
    let shell = display.create_window(root_handler);
    shell.set_caption("winws demo")?;
    shell.set_geometry(Rect::new(120, 120, 640, 400))?;
    shell.set_mouse_pointer(MousePointer::Cross);
    shell.init()?;
    *root.shell.borrow_mut() = Some(shell.clone());

    let menu = Rc::new(Menu {
        shell: RefCell::new(None),
    });
    let menu_handler: Weak<dyn EventHandler> = Rc::downgrade(&menu) as Weak<dyn EventHandler>;
    let popup = display.create_window_on(shell.screen(), menu_handler)?;
    popup.init()?;
    *menu.shell.borrow_mut() = Some(popup.clone());
    *root.menu.borrow_mut() = Some(popup);

    shell.show()?;
    root.schedule();
    display.main()?;

    // Break the handler → shell cycles before the display goes away.
    root.menu.borrow_mut().take();
    root.shell.borrow_mut().take();
    menu.shell.borrow_mut().take();
    display.destroy();
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        log::error!("winws-demo: {e}");
        #[cfg(windows)]
        winws::platform::win32::window::show_error_dialog(&e.to_string());
        std::process::exit(1);
    }
}
