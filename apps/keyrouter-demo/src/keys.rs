//! Routers for the demo's two modes.

use crate::app::Action;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, OnceLock};
use tui_keyrouter::{Input, Message, Router};

/// Filled in once the [`Input`] exists, so handlers can act on it
/// synchronously. That keeps mode switches and recording boundaries in step
/// with the keys being dispatched.
pub type InputSlot = Arc<OnceLock<Input>>;

fn with_input(slot: &InputSlot, f: impl FnOnce(&Input)) {
    if let Some(input) = slot.get() {
        f(input);
    }
}

/// Handlers that act during macro playback return `Ignored` instead of
/// toggling recording or replaying again.
pub fn normal_router(
    tx: mpsc::Sender<Message>,
    playing: Arc<AtomicBool>,
    slot: InputSlot,
    select: Arc<Router>,
) -> Router {
    let mut router = Router::new().with_name("normal").with_sender(tx);

    router.handle_named_msg("down", "j", |m| Action::Down(m.count));
    router.handle_named_msg("up", "k", |m| Action::Up(m.count));
    router.handle_named_msg("top", "gg", |_| Action::Top);
    router.handle_named_msg("bottom", "G", |_| Action::Bottom);
    router.handle_named_msg("half_page_down", "<C-d>", |m| Action::HalfPageDown(m.count));
    router.handle_named_msg("half_page_up", "<C-u>", |m| Action::HalfPageUp(m.count));
    router.handle_named_msg("delete", "dd", |m| Action::Delete(m.count));
    let s = slot.clone();
    router.handle_named_msg("select", "v", move |_| {
        with_input(&s, |input| input.push(Arc::clone(&select)));
        Action::EnterSelect
    });
    let p = playing.clone();
    router.handle_named_msg("record", "m", move |_| {
        if p.load(Ordering::SeqCst) {
            return Action::Ignored;
        }
        let mut action = Action::Ignored;
        with_input(&slot, |input| {
            action = match input.stop_recording() {
                Some(keys) => Action::Recorded(keys),
                None => {
                    input.start_recording();
                    Action::RecordingStarted
                }
            };
        });
        action
    });
    router.handle_named_msg("replay", "@", move |_| {
        if playing.load(Ordering::SeqCst) {
            Action::Ignored
        } else {
            Action::Replay
        }
    });
    router.handle_named_msg("quit", "q", |_| Action::Quit);
    router
}

pub fn select_router(tx: mpsc::Sender<Message>, slot: InputSlot) -> Router {
    let mut router = Router::new().with_name("select").with_sender(tx);

    router.handle_named_msg("extend_down", "j", |m| Action::Down(m.count));
    router.handle_named_msg("extend_up", "k", |m| Action::Up(m.count));
    let s = slot.clone();
    router.handle_named_msg("delete_selection", "d", move |_| {
        with_input(&s, Input::pop);
        Action::DeleteSelection
    });
    router.handle_named_msg("leave", "<Esc>", move |_| {
        with_input(&slot, Input::pop);
        Action::ExitSelect
    });
    router
}
