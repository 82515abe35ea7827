use crate::{domain::Generation, ports::IrcSession};

/// Owner of the active session handle.
///
/// Holds at most one session. A reconnect replaces the handle wholesale (the
/// old one is dropped, which tears its connection down); nothing mutates a
/// session in place.
#[derive(Default)]
pub struct SessionHolder {
    current: Option<Box<dyn IrcSession>>,
    generation: Generation,
}

impl SessionHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&dyn IrcSession> {
        self.current.as_deref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether `generation` names the session currently held.
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current.is_some() && self.generation == generation
    }

    pub fn is_connected(&self) -> bool {
        self.get().map(|s| s.is_connected()).unwrap_or(false)
    }

    /// Drop the held session and install the one `build` returns for the next
    /// generation.
    pub fn replace_with<F>(&mut self, build: F) -> Generation
    where
        F: FnOnce(Generation) -> Box<dyn IrcSession>,
    {
        self.current = None;
        self.generation = self.generation.next();
        self.current = Some(build(self.generation));
        self.generation
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
