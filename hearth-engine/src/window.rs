//! ## hearth-engine::window
//! **The windowing collaborator the main loop drives**

use tracing::trace;

/// What the main loop needs from a windowing/rendering backend.
pub trait Window {
    fn is_open(&self) -> bool;

    /// Pumps platform events.
    fn poll_events(&mut self);

    /// Presents the finished frame.
    fn swap_buffers(&mut self);

    /// Requests the window to close; `is_open` turns false.
    fn close(&mut self);
}

/// Window without a display. Closes itself after an optional number of
/// presented frames.
#[derive(Debug, Clone, Default)]
pub struct HeadlessWindow {
    frame_limit: Option<u64>,
    presented: u64,
    polled: u64,
    closed: bool,
}

impl HeadlessWindow {
    /// Stays open until [`Window::close`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes after `frames` calls to `swap_buffers`. Zero starts closed.
    pub fn with_frame_limit(frames: u64) -> Self {
        Self {
            frame_limit: Some(frames),
            closed: frames == 0,
            ..Self::default()
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn polled(&self) -> u64 {
        self.polled
    }
}

impl Window for HeadlessWindow {
    fn is_open(&self) -> bool {
        !self.closed
    }

    fn poll_events(&mut self) {
        self.polled += 1;
    }

    fn swap_buffers(&mut self) {
        self.presented += 1;
        trace!(frame = self.presented, "present");
        if self.frame_limit.is_some_and(|limit| self.presented >= limit) {
            self.closed = true;
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_after_frame_limit() {
        let mut window = HeadlessWindow::with_frame_limit(2);
        assert!(window.is_open());
        window.swap_buffers();
        assert!(window.is_open());
        window.swap_buffers();
        assert!(!window.is_open());
        assert_eq!(window.presented(), 2);

        assert!(!HeadlessWindow::with_frame_limit(0).is_open());
    }

    #[test]
    fn unlimited_window_closes_on_request() {
        let mut window = HeadlessWindow::new();
        for _ in 0..100 {
            window.swap_buffers();
        }
        assert!(window.is_open());
        window.close();
        assert!(!window.is_open());
    }
}
