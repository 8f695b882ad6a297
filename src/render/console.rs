use super::{Position, Scene};
use std::io::{self, Stdout, Write};

/// Prints each new annotation as a line of text.
pub struct ConsoleScene<W: Write> {
    out: W,
    visible: Option<String>,
}

impl ConsoleScene<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleScene<W> {
    pub fn new(out: W) -> Self {
        Self { out, visible: None }
    }

    #[cfg(test)]
    fn visible(&self) -> Option<&str> {
        self.visible.as_deref()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Scene for ConsoleScene<W> {
    fn clear(&mut self) {
        if let Some(previous) = self.visible.take() {
            tracing::trace!("cleared annotation: {previous}");
        }
    }

    fn add_annotation(&mut self, text: &str, position: Position) {
        tracing::debug!(
            "annotation at ({:.2}, {:.2}, {:.2}): {}",
            position.x,
            position.y,
            position.z,
            text
        );

        if let Err(err) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            tracing::warn!("Failed to print annotation: {err}");
        }
        self.visible = Some(text.to_string());
    }
}
