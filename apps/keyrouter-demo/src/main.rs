//! Key Router Demo - vim-style navigation over a list.

mod app;
mod keys;
mod ui;

use anyhow::Context;
use app::{Action, App};
use keys::{normal_router, select_router, InputSlot};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};
use std::thread;
use tracing_subscriber::EnvFilter;
use tui_keyrouter::{Input, Message, Reader};

/// Section of the shared key config used by this app.
const APP_NAME: &str = "keyrouter_demo";

fn main() -> anyhow::Result<()> {
    init_logging()?;

    if std::env::args().any(|arg| arg == "--print-config") {
        let (tx, _rx) = mpsc::channel();
        let select = Arc::new(select_router(tx.clone(), Arc::default()));
        let router = normal_router(tx, Arc::default(), Arc::default(), select);
        router.write_default_bindings(io::stdout(), APP_NAME)?;
        return Ok(());
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run app
    let result = run_app(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    Ok(())
}

/// Log to a file when `KEYROUTER_LOG` is set; the terminal belongs to the UI.
fn init_logging() -> anyhow::Result<()> {
    let Ok(filter) = EnvFilter::try_from_env("KEYROUTER_LOG") else {
        return Ok(());
    };

    let dir = directories::ProjectDirs::from("", "", "keyrouter-demo")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("keyrouter-demo.log");
    let file = std::fs::File::create(&path)
        .with_context(|| format!("creating log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel::<Message>();
    let playing = Arc::new(AtomicBool::new(false));

    let slot = InputSlot::default();

    let mut select = select_router(tx.clone(), slot.clone());
    select.load_bindings(APP_NAME)?;
    let mut normal = normal_router(tx.clone(), playing.clone(), slot.clone(), Arc::new(select));
    normal.load_bindings(APP_NAME)?;

    let input = Input::new(normal);
    let _ = slot.set(input.clone());
    let mut app = App::new(input.clone(), playing);

    let redraw = tx;
    thread::Builder::new()
        .name("keyrouter-demo-input".to_string())
        .spawn(move || {
            let mut reader = Reader::new(io::stdin());
            let result = input.run(&mut reader, |_| {
                let _ = redraw.send(Box::new(Action::Redraw));
            });
            if let Err(err) = result {
                tracing::debug!(%err, "input loop ended");
            }
            let _ = redraw.send(Box::new(Action::Quit));
        })?;

    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        let Ok(msg) = rx.recv() else {
            break;
        };
        match msg.downcast::<Action>() {
            Ok(action) => app.apply(*action),
            Err(_) => tracing::warn!("unexpected message type"),
        }
        if app.should_quit {
            break;
        }
    }

    Ok(())
}
